use super::{
    error::{GridError, GridResult},
    metadata::ProtocolConfig,
};

// Corner & axis
//------------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
}

impl Corner {
    pub const ALL: [Corner; 3] = [Corner::TopLeft, Corner::TopRight, Corner::BottomLeft];

    pub fn index(self) -> usize {
        match self {
            Self::TopLeft => 0,
            Self::TopRight => 1,
            Self::BottomLeft => 2,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
pub enum Axis {
    Horizontal,
    Vertical,
}

// Zone
//------------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
pub enum Zone {
    FinderCore(Corner),
    FinderMargin(Corner),
    Timing(Axis),
    CalibrationPatch(usize),
    Metadata,
    DataEcc,
}

impl Zone {
    pub fn is_fixed(&self) -> bool {
        !matches!(self, Self::Metadata | Self::DataEcc)
    }
}

// Closed interval cell bounds
//------------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct Bounds {
    pub row_start: usize,
    pub row_end: usize,
    pub col_start: usize,
    pub col_end: usize,
}

impl Bounds {
    pub const fn new(row_start: usize, row_end: usize, col_start: usize, col_end: usize) -> Self {
        Self { row_start, row_end, col_start, col_end }
    }

    pub fn contains(&self, r: usize, c: usize) -> bool {
        (self.row_start..=self.row_end).contains(&r) && (self.col_start..=self.col_end).contains(&c)
    }

    pub fn height(&self) -> usize {
        self.row_end - self.row_start + 1
    }

    pub fn width(&self) -> usize {
        self.col_end - self.col_start + 1
    }

    pub fn area(&self) -> usize {
        self.height() * self.width()
    }

    /// Row-major cell coordinates.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> {
        let Bounds { row_start, row_end, col_start, col_end } = *self;
        (row_start..=row_end).flat_map(move |r| (col_start..=col_end).map(move |c| (r, c)))
    }

    fn shrink(&self, by: usize) -> Self {
        Self::new(self.row_start + by, self.row_end - by, self.col_start + by, self.col_end - by)
    }
}

// Zone layout
//------------------------------------------------------------------------------

/// Zone partition of one protocol configuration. The zone table and both fill
/// orders are computed once on construction and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct ZoneLayout {
    config: ProtocolConfig,
    zones: Vec<Zone>,
    data_order: Vec<(usize, usize)>,
    metadata_order: Vec<(usize, usize)>,
}

impl ProtocolConfig {
    pub fn layout(&self) -> GridResult<ZoneLayout> {
        ZoneLayout::new(*self)
    }
}

impl ZoneLayout {
    pub fn new(config: ProtocolConfig) -> GridResult<Self> {
        config.validate()?;

        let dim = config.matrix_dim;
        let mut layout =
            Self { config, zones: Vec::new(), data_order: Vec::new(), metadata_order: Vec::new() };

        let mut zones = Vec::with_capacity(dim * dim);
        for r in 0..dim {
            for c in 0..dim {
                let zone = layout.classify(r, c);
                match zone {
                    Zone::DataEcc => layout.data_order.push((r, c)),
                    Zone::Metadata => layout.metadata_order.push((r, c)),
                    _ => (),
                }
                zones.push(zone);
            }
        }
        layout.zones = zones;

        let md = &layout.config.metadata;
        if layout.metadata_order.len() * config.bits_per_cell != md.total_bits {
            return Err(GridError::InvalidLayout("metadata area overlaps fixed patterns"));
        }

        Ok(layout)
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn dim(&self) -> usize {
        self.config.matrix_dim
    }

    pub fn zone_of(&self, r: usize, c: usize) -> Zone {
        let dim = self.dim();
        debug_assert!(r < dim && c < dim, "Cell outside matrix: Row {r}, Col {c}, Dim {dim}");
        self.zones[r * dim + c]
    }

    /// Uncached zone rule. Cores win over patches, patches over margins,
    /// margins over timing lines, timing lines over metadata.
    pub fn classify(&self, r: usize, c: usize) -> Zone {
        for corner in Corner::ALL {
            if self.finder_core_bounds(corner).contains(r, c) {
                return Zone::FinderCore(corner);
            }
        }
        for i in 0..self.config.calibration.colors.len() {
            if self.patch_bounds(i).contains(r, c) {
                return Zone::CalibrationPatch(i);
            }
        }
        for corner in Corner::ALL {
            if self.finder_bounds(corner).contains(r, c) {
                return Zone::FinderMargin(corner);
            }
        }
        for axis in [Axis::Horizontal, Axis::Vertical] {
            if self.timing_bounds(axis).contains(r, c) {
                return Zone::Timing(axis);
            }
        }
        if self.metadata_bounds().contains(r, c) {
            return Zone::Metadata;
        }
        Zone::DataEcc
    }

    /// Bounds of a rectangular zone. Finder margins report the whole finder
    /// box, since the margin is its remainder. Data/ECC has no rectangle.
    pub fn zone_bounds(&self, zone: Zone) -> Option<Bounds> {
        match zone {
            Zone::FinderCore(corner) => Some(self.finder_core_bounds(corner)),
            Zone::FinderMargin(corner) => Some(self.finder_bounds(corner)),
            Zone::Timing(axis) => Some(self.timing_bounds(axis)),
            Zone::CalibrationPatch(i) if i < self.config.calibration.colors.len() => {
                Some(self.patch_bounds(i))
            }
            Zone::Metadata => Some(self.metadata_bounds()),
            Zone::CalibrationPatch(_) | Zone::DataEcc => None,
        }
    }

    pub fn finder_bounds(&self, corner: Corner) -> Bounds {
        let s = self.config.finder.size;
        let far = self.dim() - s;
        match corner {
            Corner::TopLeft => Bounds::new(0, s - 1, 0, s - 1),
            Corner::TopRight => Bounds::new(0, s - 1, far, far + s - 1),
            Corner::BottomLeft => Bounds::new(far, far + s - 1, 0, s - 1),
        }
    }

    pub fn finder_core_bounds(&self, corner: Corner) -> Bounds {
        self.finder_bounds(corner).shrink(self.config.finder.margin)
    }

    pub fn timing_bounds(&self, axis: Axis) -> Bounds {
        let s = self.config.finder.size;
        let (idx, start, end) = (s - 1, s, self.dim() - 1 - s);
        match axis {
            Axis::Horizontal => Bounds::new(idx, idx, start, end),
            Axis::Vertical => Bounds::new(start, end, idx, idx),
        }
    }

    pub fn metadata_bounds(&self) -> Bounds {
        let md = &self.config.metadata;
        let c_start = self.dim() - self.config.finder.size - md.cols;
        Bounds::new(0, md.rows - 1, c_start, c_start + md.cols - 1)
    }

    pub fn patch_bounds(&self, i: usize) -> Bounds {
        let s = self.config.finder.size;
        let p = self.config.calibration.patch_size;
        let r_start = self.dim() - s;
        let c_start = s + i * p;
        Bounds::new(r_start, r_start + p - 1, c_start, c_start + p - 1)
    }

    /// Logical center of a finder pattern in cell units, as (x, y).
    pub fn finder_center(&self, corner: Corner) -> (f64, f64) {
        let b = self.finder_bounds(corner);
        let half = self.config.finder.size as f64 / 2.0;
        (b.col_start as f64 + half, b.row_start as f64 + half)
    }

    pub fn data_ecc_fill_order(&self) -> &[(usize, usize)] {
        &self.data_order
    }

    pub fn metadata_order(&self) -> &[(usize, usize)] {
        &self.metadata_order
    }

    pub fn available_bits(&self) -> usize {
        self.data_order.len() * self.config.bits_per_cell
    }
}

#[cfg(test)]
mod zone_layout_tests {
    use std::collections::HashMap;

    use test_case::test_case;

    use super::{Axis, Bounds, Corner, Zone, ZoneLayout};
    use crate::common::metadata::{ProtocolConfig, V1, V2_M, V2_S};

    #[test_case(V1, 984)]
    #[test_case(V2_S, 2316)]
    #[test_case(V2_M, 2304)]
    fn test_partition_is_total_and_exclusive(cfg: ProtocolConfig, data_cells: usize) {
        let layout = ZoneLayout::new(cfg).unwrap();
        let dim = layout.dim();
        let mut counts: HashMap<Zone, usize> = HashMap::new();
        for r in 0..dim {
            for c in 0..dim {
                let zone = layout.zone_of(r, c);
                assert_eq!(zone, layout.classify(r, c), "Memo mismatch at {r} {c}");
                *counts.entry(zone).or_default() += 1;
            }
        }
        assert_eq!(counts.values().sum::<usize>(), dim * dim);

        let s = cfg.finder.size;
        let core = (s - 2) * (s - 2);
        for corner in Corner::ALL {
            assert_eq!(counts[&Zone::FinderCore(corner)], core);
            assert_eq!(counts[&Zone::FinderMargin(corner)], s * s - core);
        }
        for axis in [Axis::Horizontal, Axis::Vertical] {
            assert_eq!(counts[&Zone::Timing(axis)], dim - 2 * s);
        }
        for i in 0..4 {
            assert_eq!(counts[&Zone::CalibrationPatch(i)], 4);
        }
        assert_eq!(counts[&Zone::Metadata], cfg.metadata.rows * cfg.metadata.cols);
        assert_eq!(counts[&Zone::DataEcc], data_cells);
        assert_eq!(layout.data_ecc_fill_order().len(), data_cells);
    }

    #[test]
    fn test_v1_bounds() {
        let layout = V1.layout().unwrap();
        assert_eq!(layout.finder_bounds(Corner::TopLeft), Bounds::new(0, 6, 0, 6));
        assert_eq!(layout.finder_bounds(Corner::TopRight), Bounds::new(0, 6, 28, 34));
        assert_eq!(layout.finder_bounds(Corner::BottomLeft), Bounds::new(28, 34, 0, 6));
        assert_eq!(layout.zone_bounds(Zone::FinderCore(Corner::TopRight)), Some(Bounds::new(1, 5, 29, 33)));
        assert_eq!(layout.zone_bounds(Zone::Timing(Axis::Horizontal)), Some(Bounds::new(6, 6, 7, 27)));
        assert_eq!(layout.zone_bounds(Zone::Timing(Axis::Vertical)), Some(Bounds::new(7, 27, 6, 6)));
        assert_eq!(layout.zone_bounds(Zone::Metadata), Some(Bounds::new(0, 5, 22, 27)));
        assert_eq!(layout.zone_bounds(Zone::CalibrationPatch(0)), Some(Bounds::new(28, 29, 7, 8)));
        assert_eq!(layout.zone_bounds(Zone::CalibrationPatch(3)), Some(Bounds::new(28, 29, 13, 14)));
        assert_eq!(layout.zone_bounds(Zone::CalibrationPatch(4)), None);
        assert_eq!(layout.zone_bounds(Zone::DataEcc), None);
        assert_eq!(layout.available_bits(), 1968);
    }

    #[test]
    fn test_fill_order_is_row_major() {
        let layout = V1.layout().unwrap();
        let order = layout.data_ecc_fill_order();
        assert!(order.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(order[0], (0, 7));
        assert!(order.iter().all(|&(r, c)| layout.zone_of(r, c) == Zone::DataEcc));
        let md = layout.metadata_order();
        assert_eq!(md.first(), Some(&(0, 22)));
        assert_eq!(md.last(), Some(&(5, 27)));
    }

    #[test]
    fn test_finder_centers() {
        let layout = V1.layout().unwrap();
        assert_eq!(layout.finder_center(Corner::TopLeft), (3.5, 3.5));
        assert_eq!(layout.finder_center(Corner::TopRight), (31.5, 3.5));
        assert_eq!(layout.finder_center(Corner::BottomLeft), (3.5, 31.5));
    }
}

// Fixed pattern symbols
//------------------------------------------------------------------------------

impl ZoneLayout {
    /// Symbol of a fixed zone at a position relative to the zone's bounds.
    pub fn fixed_pattern_symbol(&self, zone: Zone, rr: usize, rc: usize) -> GridResult<u8> {
        let cfg = &self.config;
        let color = match zone {
            Zone::FinderCore(corner) => {
                let n = cfg.finder.size - 2 * cfg.finder.margin;
                let mid = n / 2;
                let d = rr.abs_diff(mid).max(rc.abs_diff(mid));
                match d {
                    0 => cfg.finder.center_colors[corner.index()],
                    _ => *cfg
                        .finder
                        .rings
                        .get(d - 1)
                        .ok_or(GridError::InvalidLayout("finder ring out of range"))?,
                }
            }
            Zone::FinderMargin(_) => cfg.finder.margin_color,
            Zone::Timing(axis) => {
                let idx = match axis {
                    Axis::Horizontal => rc,
                    Axis::Vertical => rr,
                };
                cfg.timing.colors[idx & 1]
            }
            Zone::CalibrationPatch(i) => *cfg
                .calibration
                .colors
                .get(i)
                .ok_or(GridError::InvalidLayout("calibration patch out of range"))?,
            Zone::Metadata | Zone::DataEcc => {
                return Err(GridError::InvalidLayout("zone carries no fixed pattern"))
            }
        };
        cfg.symbol_of(color)
    }

    /// Fixed symbol of the cell at absolute coordinates, if its zone has one.
    pub fn fixed_symbol_at(&self, r: usize, c: usize) -> GridResult<Option<u8>> {
        let zone = self.zone_of(r, c);
        if !zone.is_fixed() {
            return Ok(None);
        }
        // Margins are the finder box minus the core; every margin cell has the same color
        let b = self.zone_bounds(zone).ok_or(GridError::InvalidLayout("zone has no bounds"))?;
        self.fixed_pattern_symbol(zone, r - b.row_start, c - b.col_start).map(Some)
    }
}


// Zone map
//------------------------------------------------------------------------------

impl ZoneLayout {
    /// One character per cell: 'F' finder core, 'f' finder margin, 't' timing,
    /// 'c' calibration patch, 'm' metadata, '.' data/ecc.
    pub fn to_debug_str(&self) -> String {
        let dim = self.dim();
        let mut res = String::with_capacity(dim * (dim + 1) + 1);
        res.push('\n');
        for r in 0..dim {
            for c in 0..dim {
                let ch = match self.zone_of(r, c) {
                    Zone::FinderCore(_) => 'F',
                    Zone::FinderMargin(_) => 'f',
                    Zone::Timing(_) => 't',
                    Zone::CalibrationPatch(_) => 'c',
                    Zone::Metadata => 'm',
                    Zone::DataEcc => '.',
                };
                res.push(ch);
            }
            res.push('\n');
        }
        res
    }
}

#[cfg(test)]
mod zone_map_tests {
    use crate::common::metadata::V1;

    #[test]
    fn test_zone_map() {
        let map = V1.layout().unwrap().to_debug_str();
        let rows: Vec<&str> = map.trim_start_matches('\n').lines().collect();
        assert_eq!(rows.len(), 35);
        let row = |parts: &[(char, usize)]| -> String {
            parts.iter().map(|&(ch, n)| ch.to_string().repeat(n)).collect()
        };
        assert_eq!(rows[0], row(&[('f', 7), ('.', 15), ('m', 6), ('f', 7)]));
        assert_eq!(rows[3], row(&[('f', 1), ('F', 5), ('f', 1), ('.', 15), ('m', 6), ('f', 1), ('F', 5), ('f', 1)]));
        assert_eq!(rows[6], row(&[('f', 7), ('t', 21), ('f', 7)]));
        assert_eq!(rows[7], row(&[('.', 6), ('t', 1), ('.', 28)]));
        assert_eq!(rows[28], row(&[('f', 7), ('c', 8), ('.', 20)]));
        assert_eq!(rows[34], row(&[('f', 7), ('.', 28)]));
    }
}
