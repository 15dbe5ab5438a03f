// src/scan/prescale.rs

use crate::config::validate::{PrescaleSettings, PRESCALE_RANGE};

/// Deterministic fractional sampling of discovered files.
///
/// A file is admitted when `hash(name + salt) % RANGE` falls below the
/// configured threshold, so the same file always resolves the same way for
/// a given salt. Used to load-test or sample a firehose of inputs.
#[derive(Debug, Clone)]
pub struct Prescale {
    threshold: u64,
    salt: String,
}

impl Prescale {
    pub fn new(settings: &PrescaleSettings) -> Self {
        Self {
            threshold: settings.threshold,
            salt: settings.salt.clone(),
        }
    }

    pub fn admits(&self, name: &str) -> bool {
        let mut hasher = blake3::Hasher::new();
        hasher.update(name.as_bytes());
        hasher.update(self.salt.as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest.as_bytes()[..8]);
        u64::from_le_bytes(bytes) % PRESCALE_RANGE < self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prescale(threshold: u64, salt: &str) -> Prescale {
        Prescale::new(&PrescaleSettings {
            threshold,
            salt: salt.to_string(),
        })
    }

    #[test]
    fn admission_is_deterministic() {
        let p = prescale(5000, "salt");
        for name in ["a.hdf5", "b.hdf5", "run12345_0001.hdf5"] {
            assert_eq!(p.admits(name), p.admits(name));
        }
    }

    #[test]
    fn full_threshold_admits_everything() {
        let p = prescale(PRESCALE_RANGE, "");
        assert!((0..100).all(|i| p.admits(&format!("f{i}.hdf5"))));
    }

    #[test]
    fn zero_threshold_admits_nothing() {
        let p = prescale(0, "");
        assert!(!(0..100).any(|i| p.admits(&format!("f{i}.hdf5"))));
    }

    #[test]
    fn half_threshold_admits_roughly_half() {
        let p = prescale(5000, "salt");
        let admitted = (0..2000)
            .filter(|i| p.admits(&format!("file_{i}.hdf5")))
            .count();
        assert!((800..1200).contains(&admitted), "admitted {admitted} of 2000");
    }

    #[test]
    fn salt_changes_the_selection() {
        let a = prescale(5000, "one");
        let b = prescale(5000, "two");
        let differs = (0..200).any(|i| {
            let name = format!("file_{i}.hdf5");
            a.admits(&name) != b.admits(&name)
        });
        assert!(differs);
    }
}
