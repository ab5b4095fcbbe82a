use super::{
    galois::{eval_poly, G},
    Codeword,
};
use crate::common::error::{GridError, GridResult};

// Corrector
//------------------------------------------------------------------------------

impl Codeword {
    /// Corrects up to parity_len / 2 byte errors in place and returns the data bytes.
    pub fn correct(&mut self) -> GridResult<&[u8]> {
        // Compute syndromes
        let synd = match self.syndromes() {
            None => return Ok(self.data()),
            Some(s) => s,
        };

        // Error locator polynomial
        let sig = berlekamp_massey(&synd);
        let err_count = sig.len() - 1;
        if 2 * err_count > self.parity_len() {
            return Err(GridError::TooManyErrors);
        }

        let err_loc = self.chien_search(&sig);
        if err_loc.len() != err_count {
            return Err(GridError::TooManyErrors);
        }

        // Sigma derivative
        let mut dsig = vec![G(0); err_count.max(1)];
        for i in (1..sig.len()).step_by(2) {
            dsig[i - 1] = sig[i];
        }

        // Error evaluator
        let omg = omega(&synd, &sig);

        // Error magnitude via Forney, then rectify by XORing
        for &pos in err_loc.iter() {
            let x = G::gen_pow(pos);
            let xinv = G::gen_pow(255 - pos % 255);
            let den = eval_poly(&dsig, xinv);
            if den.0 == 0 {
                return Err(GridError::TooManyErrors);
            }
            let mag = x * eval_poly(&omg, xinv) / den;
            let idx = self.bytes.len() - 1 - pos;
            self.bytes[idx] ^= mag.0;
        }

        match self.syndromes() {
            None => Ok(self.data()),
            Some(_) => Err(GridError::TooManyErrors),
        }
    }

    // S_i = c(a^i) for i in 0..ec_len, None when all are zero
    fn syndromes(&self) -> Option<Vec<G>> {
        let synd: Vec<G> = (0..self.parity_len())
            .map(|i| {
                let x = G::gen_pow(i);
                self.symbols().iter().fold(G(0), |acc, &b| acc * x + G(b))
            })
            .collect();

        if synd.iter().all(|s| s.0 == 0) {
            None
        } else {
            Some(synd)
        }
    }

    // Degree positions p whose inverse locator a^-p is a root of sigma
    fn chien_search(&self, sig: &[G]) -> Vec<usize> {
        (0..self.bytes.len()).filter(|&p| eval_poly(sig, G::gen_pow(255 - p % 255)).0 == 0).collect()
    }
}

// Sigma polynomial, lowest degree first, trimmed to its linear complexity
fn berlekamp_massey(synd: &[G]) -> Vec<G> {
    let n = synd.len();
    let mut l = 0usize;
    let mut m = 1usize;
    let mut b = G(1);
    let mut cx = vec![G(0); n + 1];
    let mut bx = vec![G(0); n + 1];
    cx[0] = G(1);
    bx[0] = G(1);

    for k in 0..n {
        // Calculate discrepancy
        let mut d = synd[k];
        for i in 1..=l {
            d += cx[i] * synd[k - i];
        }

        if d.0 == 0 {
            m += 1;
            continue;
        }

        let tx = cx.clone();
        let scale = d / b;
        for i in 0..(n + 1).saturating_sub(m) {
            cx[i + m] += scale * bx[i];
        }

        if 2 * l <= k {
            l = k + 1 - l;
            bx = tx;
            b = d;
            m = 1;
        } else {
            m += 1;
        }
    }

    cx.truncate(l + 1);
    cx
}

// Error evaluator polynomial: S(x) * sigma(x) mod x^ec_len
fn omega(synd: &[G], sig: &[G]) -> Vec<G> {
    let n = synd.len();
    let mut omg = vec![G(0); n];
    for (i, &s) in synd.iter().enumerate() {
        for (j, &c) in sig.iter().enumerate() {
            if i + j < n {
                omg[i + j] += s * c;
            }
        }
    }
    omg
}

#[cfg(test)]
mod ec_decoder_tests {
    use proptest::prelude::*;
    use test_case::test_case;

    use super::Codeword;
    use crate::common::error::GridError;

    #[test_case(&[32, 91, 11, 45, 89, 123, 77, 44, 56, 99, 202], &[32, 91, 11, 45, 89, 46, 77, 44, 56, 99, 202, 0, 0, 0, 0])]
    #[test_case(&[32, 91, 11, 45, 89, 123, 77, 44, 56, 99, 202], &[32, 91, 11, 45, 89, 46, 77, 44, 56, 99, 249, 0, 0, 0, 0])]
    fn test_correct(data: &[u8], bad: &[u8]) {
        let mut blk = Codeword::encode(data, 15 - data.len());
        blk.bytes[..11].copy_from_slice(&bad[..11]);
        let fixed = blk.correct().unwrap();
        assert_eq!(fixed, data, "Corrected data and original data don't match: Corrected {fixed:?}, Original data {data:?}");
    }

    #[test]
    fn test_correct_error_in_ecc() {
        let data = [1, 2, 3, 4, 5, 6, 7, 8];
        let mut blk = Codeword::encode(&data, 6);
        blk.bytes[12] ^= 0x5A;
        blk.bytes[0] ^= 0xFF;
        assert_eq!(blk.correct().unwrap(), data);
    }

    #[test_case(&[32, 91, 11, 45, 89, 123, 77, 44, 56, 99, 202], &[138, 91, 161, 45, 243, 46, 231, 44, 146, 99, 202, 0, 0, 0, 0])]
    fn test_correct_beyond_capacity(data: &[u8], bad: &[u8]) {
        let mut blk = Codeword::encode(data, 15 - data.len());
        blk.bytes[..11].copy_from_slice(&bad[..11]);
        let res = blk.correct().map(|d| d.to_vec());
        assert_ne!(res, Ok(data.to_vec()));
    }

    #[test]
    fn test_correct_no_ecc() {
        let mut blk = Codeword::encode(b"plain", 0);
        assert_eq!(blk.correct().unwrap(), b"plain");
    }

    #[test]
    fn test_too_many_errors_is_reported() {
        let data: Vec<u8> = (0..40).collect();
        let mut blk = Codeword::encode(&data, 4);
        // 2 correctable, 20 is far beyond; any failure must be an ecc error
        for i in 0..20 {
            blk.bytes[i] ^= 0xA5;
        }
        if let Err(e) = blk.correct() {
            assert_eq!(e, GridError::TooManyErrors);
        }
    }

    proptest! {
        #[test]
        fn proptest_correct_within_capacity(
            data in prop::collection::vec(any::<u8>(), 1..180),
            ecc_len in 2usize..60,
            seed in prop::collection::vec((any::<usize>(), 1u8..=255), 0..30),
        ) {
            let len = data.len() + ecc_len;
            let mut blk = Codeword::encode(&data, ecc_len);
            let mut used = Vec::new();
            for (pos, err) in seed.into_iter().take(ecc_len / 2) {
                let pos = pos % len;
                if used.contains(&pos) {
                    continue;
                }
                used.push(pos);
                blk.bytes[pos] ^= err;
            }
            prop_assert_eq!(blk.correct().unwrap(), &data[..]);
        }
    }
}
