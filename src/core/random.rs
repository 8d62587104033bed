use std::f64::consts::PI;

/// Derives an independent stream seed for one simulation cell/path so
/// grid cells stay reproducible and order-independent.
pub fn derive_seed(base_seed: u64, cell: u32, path: u32) -> u64 {
    let mixed = base_seed ^ ((cell as u64) << 32) ^ path as u64;
    splitmix64(mixed)
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Small xorshift64* generator with a Box-Muller normal transform.
/// Explicitly seeded everywhere; there is no global random source in
/// this crate.
pub struct Rng {
    state: u64,
    cached_normal: Option<f64>,
}

impl Rng {
    pub fn new(seed: u64) -> Self {
        let state = if seed == 0 {
            0xA5A5_A5A5_A5A5_A5A5
        } else {
            seed
        };
        Self {
            state,
            cached_normal: None,
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    fn next_f64(&mut self) -> f64 {
        const DENOM: f64 = (1_u64 << 53) as f64;
        let v = self.next_u64() >> 11;
        ((v as f64) + 0.5) / DENOM
    }

    /// Standard normal draw. Box-Muller produces two variates per pair
    /// of uniforms; the sine half is cached for the next call.
    pub fn standard_normal(&mut self) -> f64 {
        if let Some(z) = self.cached_normal.take() {
            return z;
        }

        let u1 = self.next_f64().max(1e-12);
        let u2 = self.next_f64();
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * PI * u2;

        let z0 = r * theta.cos();
        let z1 = r * theta.sin();
        self.cached_normal = Some(z1);
        z0
    }
}

/// Lower-triangular Cholesky factor of a 3x3 correlation matrix.
/// Rejects matrices that are not positive definite instead of letting
/// a negative square root poison every downstream path with NaN.
pub fn cholesky3(matrix: &[[f64; 3]; 3]) -> Result<[[f64; 3]; 3], String> {
    let mut l = [[0.0_f64; 3]; 3];

    for i in 0..3 {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[i][k] * l[j][k];
            }

            if i == j {
                let diag = matrix[j][j] - sum;
                if diag <= 0.0 {
                    return Err(
                        "correlation matrix is not positive definite; check the pairwise correlations"
                            .to_string(),
                    );
                }
                l[j][j] = diag.sqrt();
            } else {
                l[i][j] = (matrix[i][j] - sum) / l[j][j];
            }
        }
    }

    Ok(l)
}

/// Symmetric 3x3 correlation matrix for (equity, bond, property).
pub fn correlation_matrix(
    stock_bond: f64,
    stock_property: f64,
    bond_property: f64,
) -> [[f64; 3]; 3] {
    [
        [1.0, stock_bond, stock_property],
        [stock_bond, 1.0, bond_property],
        [stock_property, bond_property, 1.0],
    ]
}

/// One draw of three jointly-normal shocks with the correlation
/// structure encoded by the Cholesky factor `l`.
pub fn correlated_normals(rng: &mut Rng, l: &[[f64; 3]; 3]) -> [f64; 3] {
    let z1 = rng.standard_normal();
    let z2 = rng.standard_normal();
    let z3 = rng.standard_normal();

    [
        l[0][0] * z1,
        l[1][0] * z1 + l[1][1] * z2,
        l[2][0] * z1 + l[2][1] * z2 + l[2][2] * z3,
    ]
}

/// Annual return under a one-year geometric Brownian motion step:
/// exp(mu - sigma^2/2 + sigma * z) - 1. Never below -100%.
pub fn lognormal_return(mu: f64, sigma: f64, z: f64) -> f64 {
    (mu - 0.5 * sigma * sigma + sigma * z).exp() - 1.0
}
