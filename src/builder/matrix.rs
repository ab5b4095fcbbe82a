use image::{Rgb, RgbImage};

use crate::common::{
    bitstream::BitStream,
    error::{GridError, GridResult},
    layout::ZoneLayout,
    metadata::{Color, ProtocolConfig},
};

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum Cell {
    #[default]
    Unfilled,
    Symbol(u8),
}

// Bit matrix
//------------------------------------------------------------------------------

/// Square grid of symbol cells laid out by a [`ZoneLayout`].
#[derive(Debug, Clone)]
pub struct BitMatrix {
    layout: ZoneLayout,
    grid: Vec<Cell>,
}

impl BitMatrix {
    pub fn new(layout: ZoneLayout) -> Self {
        let dim = layout.dim();
        Self { layout, grid: vec![Cell::Unfilled; dim * dim] }
    }

    pub fn layout(&self) -> &ZoneLayout {
        &self.layout
    }

    pub fn config(&self) -> &ProtocolConfig {
        self.layout.config()
    }

    pub fn dim(&self) -> usize {
        self.layout.dim()
    }

    fn index(&self, r: usize, c: usize) -> usize {
        let dim = self.dim();
        debug_assert!(r < dim && c < dim, "Cell outside matrix: Row {r}, Col {c}, Dim {dim}");
        r * dim + c
    }

    pub fn get(&self, r: usize, c: usize) -> Cell {
        self.grid[self.index(r, c)]
    }

    pub fn set(&mut self, r: usize, c: usize, cell: Cell) {
        let idx = self.index(r, c);
        self.grid[idx] = cell;
    }

    /// Symbol at a cell that must already be populated.
    pub fn symbol(&self, r: usize, c: usize) -> GridResult<u8> {
        match self.get(r, c) {
            Cell::Symbol(s) => Ok(s),
            Cell::Unfilled => Err(GridError::UnfilledCell { row: r, col: c }),
        }
    }

    pub fn color(&self, r: usize, c: usize) -> GridResult<Color> {
        Ok(self.config().color_of(self.symbol(r, c)?))
    }

    pub fn is_complete(&self) -> bool {
        !self.grid.contains(&Cell::Unfilled)
    }

    pub fn count_unfilled(&self) -> usize {
        self.grid.iter().filter(|c| matches!(c, Cell::Unfilled)).count()
    }
}

// Fixed patterns
//------------------------------------------------------------------------------

impl BitMatrix {
    /// Paints finder patterns, timing lines and calibration patches.
    pub fn draw_fixed_patterns(&mut self) -> GridResult<()> {
        let dim = self.dim();
        for r in 0..dim {
            for c in 0..dim {
                if let Some(sym) = self.layout.fixed_symbol_at(r, c)? {
                    self.set(r, c, Cell::Symbol(sym));
                }
            }
        }
        Ok(())
    }
}

// Bit placement
//------------------------------------------------------------------------------

impl BitMatrix {
    /// Writes `bits` into `cells` in order, `bits_per_cell` bits per cell.
    pub fn draw_bits(&mut self, cells: &[(usize, usize)], bits: &BitStream) {
        let bpc = self.config().bits_per_cell;
        debug_assert!(
            cells.len() * bpc == bits.len(),
            "Bit count doesn't match cell capacity: Bits {}, Capacity {}",
            bits.len(),
            cells.len() * bpc
        );

        let mut bits = bits.clone();
        for &(r, c) in cells {
            match bits.take_bits(bpc) {
                Some(sym) => self.set(r, c, Cell::Symbol(sym as u8)),
                None => break,
            }
        }
    }

    /// Reads `cells` in order back into a bit stream.
    pub fn read_bits(&self, cells: &[(usize, usize)]) -> GridResult<BitStream> {
        let bpc = self.config().bits_per_cell;
        let mut bs = BitStream::new(cells.len() * bpc);
        for &(r, c) in cells {
            bs.push_bits(self.symbol(r, c)?, bpc);
        }
        Ok(bs)
    }
}

#[cfg(test)]
mod bit_matrix_tests {
    use super::{BitMatrix, Cell};
    use crate::common::{
        bitstream::BitStream,
        error::GridError,
        layout::Zone,
        metadata::{Color, V1},
    };

    #[test]
    fn test_fixed_patterns_leave_payload_unfilled() {
        let mut mat = BitMatrix::new(V1.layout().unwrap());
        mat.draw_fixed_patterns().unwrap();
        let layout = V1.layout().unwrap();
        let open = layout.data_ecc_fill_order().len() + layout.metadata_order().len();
        assert_eq!(mat.count_unfilled(), open);
        assert_eq!(mat.color(3, 3), Ok(Color::Red));
        assert_eq!(mat.color(3, 31), Ok(Color::Black));
        assert_eq!(mat.color(31, 3), Ok(Color::Blue));
        assert_eq!(mat.color(3, 2), Ok(Color::Blue));
        assert_eq!(mat.color(1, 1), Ok(Color::Black));
        assert_eq!(mat.color(0, 0), Ok(Color::White));
        assert_eq!(mat.symbol(10, 10), Err(GridError::UnfilledCell { row: 10, col: 10 }));
    }

    #[test]
    fn test_draw_and_read_bits() {
        let mut mat = BitMatrix::new(V1.layout().unwrap());
        let cells = [(10, 10), (10, 11), (11, 10)];
        let bits = BitStream::from_bit_str("011011").unwrap();
        mat.draw_bits(&cells, &bits);
        assert_eq!(mat.get(10, 10), Cell::Symbol(0b01));
        assert_eq!(mat.get(10, 11), Cell::Symbol(0b10));
        assert_eq!(mat.get(11, 10), Cell::Symbol(0b11));
        assert_eq!(mat.read_bits(&cells).unwrap(), bits);
        assert_eq!(mat.layout().zone_of(10, 10), Zone::DataEcc);
    }
}

// Render
//------------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct RenderOptions {
    pub cell_px: u32,
    pub margin_px: u32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self { cell_px: 10, margin_px: 0 }
    }
}

impl RenderOptions {
    /// Canvas side: matrix plus margins, rounded up to a whole number of cells.
    pub fn canvas_size(&self, dim: usize) -> u32 {
        let raw = dim as u32 * self.cell_px + 2 * self.margin_px;
        raw.div_ceil(self.cell_px) * self.cell_px
    }
}

impl BitMatrix {
    pub fn to_image(&self, opts: &RenderOptions) -> GridResult<RgbImage> {
        if opts.cell_px == 0 {
            return Err(GridError::InvalidLayout("cell size must be positive"));
        }
        if !self.is_complete() {
            let idx = self.grid.iter().position(|c| matches!(c, Cell::Unfilled)).unwrap_or(0);
            return Err(GridError::UnfilledCell { row: idx / self.dim(), col: idx % self.dim() });
        }

        let dim = self.dim() as u32;
        let (cell, margin) = (opts.cell_px, opts.margin_px);
        let side = opts.canvas_size(self.dim());
        let mut canvas = RgbImage::from_pixel(side, side, Color::White.rgb());
        for r in 0..dim {
            for c in 0..dim {
                let px: Rgb<u8> = self.color(r as usize, c as usize)?.into();
                for y in 0..cell {
                    for x in 0..cell {
                        canvas.put_pixel(margin + c * cell + x, margin + r * cell + y, px);
                    }
                }
            }
        }
        Ok(canvas)
    }

    /// One character per cell: '.' white, '#' black, 'R' red, 'B' blue, '?' unfilled.
    pub fn to_debug_str(&self) -> String {
        let dim = self.dim();
        let mut res = String::with_capacity(dim * (dim + 1) + 1);
        res.push('\n');
        for r in 0..dim {
            for c in 0..dim {
                let ch = match self.get(r, c) {
                    Cell::Unfilled => '?',
                    Cell::Symbol(s) => match self.config().color_of(s) {
                        Color::White => '.',
                        Color::Black => '#',
                        Color::Red => 'R',
                        Color::Blue => 'B',
                    },
                };
                res.push(ch);
            }
            res.push('\n');
        }
        res
    }
}
