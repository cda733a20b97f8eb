//! satellites.rs — Satellite visibility model
//!
//! A fixed set of satellites whose elevation, azimuth and SNR take a bounded
//! random walk every tick. Spawn ranges are narrower than the steady-state
//! bounds, so a fresh constellation always has room to drift.

use gps_types::Satellite;
use rand::Rng;
use rand_distr::{Distribution, Uniform};

pub const ELEVATION_MIN: i32 = 5;
pub const ELEVATION_MAX: i32 = 85;
pub const SNR_MIN: i32 = 15;
pub const SNR_MAX: i32 = 55;

#[derive(Debug, Clone)]
pub struct Constellation {
    satellites: Vec<Satellite>,
}

impl Constellation {
    /// Spawn `count` satellites with IDs 1..=count.
    pub fn spawn<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Self {
        let satellites = (0..count)
            .map(|i| Satellite {
                id: i as u32 + 1,
                elevation: rng.gen_range(10..80),
                azimuth: rng.gen_range(0..360),
                snr: rng.gen_range(20..50),
            })
            .collect();
        Self { satellites }
    }

    #[cfg(test)]
    pub fn from_satellites(satellites: Vec<Satellite>) -> Self {
        Self { satellites }
    }

    pub fn satellites(&self) -> &[Satellite] {
        &self.satellites
    }

    /// One random-walk step for every satellite. Clamps, never rejects, so a
    /// satellite pinned at a bound can leave it on the next step.
    pub fn drift<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let angle_step = Uniform::new_inclusive(-1, 1);
        let snr_step = Uniform::new_inclusive(-3, 3);

        for sat in &mut self.satellites {
            sat.elevation = (sat.elevation + angle_step.sample(rng)).clamp(ELEVATION_MIN, ELEVATION_MAX);
            sat.azimuth = (sat.azimuth + angle_step.sample(rng)).rem_euclid(360);
            sat.snr = (sat.snr + snr_step.sample(rng)).clamp(SNR_MIN, SNR_MAX);
        }
    }
}
