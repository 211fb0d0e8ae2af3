//! # Synthetic Source Module
//!
//! Generates plausible fallback values when a real stream is silent.
//!
//! Values are independent and uniformly distributed:
//! - speed in [0, 99) km/h
//! - rpm in [0, ceiling) where the ceiling is 9000 or 9999
//! - acceleration in [0, 100) %

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Exclusive upper bound of synthetic speed, km/h
pub const SYNTHETIC_SPEED_MAX: u32 = 99;

/// Exclusive upper bound of synthetic acceleration, %
pub const SYNTHETIC_ACCELERATION_MAX: u8 = 100;

/// Random fallback source for speed, rpm and acceleration
#[derive(Debug)]
pub struct SyntheticGenerator {
    rng: StdRng,
    rpm_ceiling: u16,
}

impl SyntheticGenerator {
    /// Create a generator seeded from OS entropy
    pub fn new(rpm_ceiling: u16) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            rpm_ceiling: rpm_ceiling.max(1),
        }
    }

    /// Create a deterministic generator
    pub fn with_seed(rpm_ceiling: u16, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            rpm_ceiling: rpm_ceiling.max(1),
        }
    }

    /// Whole km/h in [0, 99)
    pub fn speed(&mut self) -> f64 {
        f64::from(self.rng.gen_range(0..SYNTHETIC_SPEED_MAX))
    }

    /// Engine rpm in [0, ceiling)
    pub fn rpm(&mut self) -> u16 {
        self.rng.gen_range(0..self.rpm_ceiling)
    }

    /// Throttle percentage in [0, 100)
    pub fn acceleration(&mut self) -> u8 {
        self.rng.gen_range(0..SYNTHETIC_ACCELERATION_MAX)
    }

    pub fn rpm_ceiling(&self) -> u16 {
        self.rpm_ceiling
    }
}
