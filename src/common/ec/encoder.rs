use super::galois::G;

// Generator polynomial g(x) = (x - a^0)(x - a^1)...(x - a^(n-1)),
// coefficients highest degree first, leading 1 included
pub fn generator_poly(ecc_count: usize) -> Vec<G> {
    let mut gen = vec![G(1)];
    for i in 0..ecc_count {
        let root = G::gen_pow(i);
        let mut next = vec![G(0); gen.len() + 1];
        for (j, &coeff) in gen.iter().enumerate() {
            next[j] += coeff;
            next[j + 1] += coeff * root;
        }
        gen = next;
    }
    gen
}

// Performs polynomial long division with data polynomial(num)
// and generator polynomial(den) to compute remainder polynomial,
// the coefficients of which are the ecc
pub fn ecc(block: &[u8], ecc_count: usize) -> Vec<u8> {
    let len = block.len();
    let gen_poly = generator_poly(ecc_count);

    let mut res = block.to_vec();
    res.resize(len + ecc_count, 0);

    for i in 0..len {
        let lead_coeff = G(res[i]);
        if lead_coeff.0 == 0 {
            continue;
        }

        for (u, &v) in res[i + 1..].iter_mut().zip(gen_poly[1..].iter()) {
            *u ^= (v * lead_coeff).0;
        }
    }

    res.split_off(len)
}
