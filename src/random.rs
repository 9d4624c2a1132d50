//! Process-wide random source for admission-control plugins.
//!
//! The source is seeded exactly once by the process owner via [`init`],
//! independently of pipeline construction or reload. Sampling before that is
//! an error rather than an implicit seeding.

use crate::error::RandomError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Mutex, OnceLock};
use tracing::info;

static SOURCE: OnceLock<Mutex<StdRng>> = OnceLock::new();

/// Seed the process-wide source. A fixed seed makes sampling reproducible;
/// `None` seeds from the operating system.
pub fn init(seed: Option<u64>) -> Result<(), RandomError> {
    let rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    SOURCE
        .set(Mutex::new(rng))
        .map_err(|_| RandomError::AlreadyInitialised)?;

    info!(fixed_seed = seed.is_some(), "Random source initialised");
    Ok(())
}

pub fn is_initialised() -> bool {
    SOURCE.get().is_some()
}

/// Draw one uniform sample in `[0, 1)`.
pub fn sample() -> Result<f64, RandomError> {
    let source = SOURCE.get().ok_or(RandomError::Uninitialised)?;
    // Generator state is valid even if a holder panicked.
    let mut rng = source.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    Ok(rng.random::<f64>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_rejected() {
        let _ = init(Some(7));
        assert!(is_initialised());
        assert_eq!(init(Some(8)), Err(RandomError::AlreadyInitialised));
    }

    #[test]
    fn test_samples_are_in_unit_interval() {
        let _ = init(Some(7));
        for _ in 0..1000 {
            let x = sample().unwrap();
            assert!((0.0..1.0).contains(&x));
        }
    }
}
