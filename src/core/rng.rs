use std::f64::consts::PI;

use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

// Independent streams within one run. Append only: reordering changes seeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum Stream {
    Returns = 0,
    AgedCare = 1,
    Plan = 2,
}

pub struct SimRng {
    inner: Pcg64Mcg,
    cached_normal: Option<f64>,
}

impl SimRng {
    pub fn new(seed: u64) -> Self {
        Self {
            inner: Pcg64Mcg::seed_from_u64(seed),
            cached_normal: None,
        }
    }

    pub fn for_run(base_seed: u64, run_index: u32, stream: Stream) -> Self {
        Self::new(derive_seed(base_seed, run_index, stream))
    }

    pub fn next_f64(&mut self) -> f64 {
        const DENOM: f64 = (1_u64 << 53) as f64;
        (self.inner.next_u64() >> 11) as f64 / DENOM
    }

    pub fn below(&mut self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        (self.inner.next_u64() % n as u64) as usize
    }

    pub fn standard_normal(&mut self) -> f64 {
        if let Some(z) = self.cached_normal.take() {
            return z;
        }

        let u1 = self.next_f64().max(1e-12);
        let u2 = self.next_f64();
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * PI * u2;

        self.cached_normal = Some(r * theta.sin());
        r * theta.cos()
    }

    pub fn normal(&mut self, mean: f64, std_dev: f64) -> f64 {
        mean + std_dev * self.standard_normal()
    }
}

pub fn derive_seed(base_seed: u64, run_index: u32, stream: Stream) -> u64 {
    let mixed = base_seed ^ ((stream as u64) << 32) ^ run_index as u64;
    splitmix64(mixed)
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}
