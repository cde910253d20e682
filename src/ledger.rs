use std::collections::HashSet;
use std::sync::Mutex;

use crate::pick::ExposureKey;

/// Tracks which `(fixture, market)` pairs already back an accepted parlay.
pub trait ExposureLedger {
    /// Claims every key or none. On conflict returns the first key already held.
    fn try_claim(&mut self, keys: &[ExposureKey]) -> Result<(), ExposureKey>;

    fn release(&mut self, keys: &[ExposureKey]);
}

impl ExposureLedger for HashSet<ExposureKey> {
    fn try_claim(&mut self, keys: &[ExposureKey]) -> Result<(), ExposureKey> {
        claim_in(self, keys)
    }

    fn release(&mut self, keys: &[ExposureKey]) {
        for key in keys {
            self.remove(key);
        }
    }
}

fn claim_in(held: &mut HashSet<ExposureKey>, keys: &[ExposureKey]) -> Result<(), ExposureKey> {
    if let Some(conflict) = keys.iter().find(|k| held.contains(k)) {
        return Err(*conflict);
    }
    let mut inserted = Vec::with_capacity(keys.len());
    for key in keys {
        if !held.insert(*key) {
            // Repeated key inside one claim.
            for k in &inserted {
                held.remove(k);
            }
            return Err(*key);
        }
        inserted.push(*key);
    }
    Ok(())
}

/// Exposure set shared across concurrent batches. Claims are atomic under the
/// lock, so two batches can never admit the same key.
#[derive(Debug, Default)]
pub struct SharedExposure {
    held: Mutex<HashSet<ExposureKey>>,
}

impl SharedExposure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, key: &ExposureKey) -> bool {
        self.lock().contains(key)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<ExposureKey>> {
        // A panic while holding the lock cannot leave a half-applied claim.
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ExposureLedger for &SharedExposure {
    fn try_claim(&mut self, keys: &[ExposureKey]) -> Result<(), ExposureKey> {
        claim_in(&mut self.lock(), keys)
    }

    fn release(&mut self, keys: &[ExposureKey]) {
        let mut held = self.lock();
        for key in keys {
            held.remove(key);
        }
    }
}
