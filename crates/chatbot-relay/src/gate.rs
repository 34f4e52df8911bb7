//! Single-flight generation gate

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{RelayError, RelayResult};

/// Process-wide flags allowing at most one generation at a time
///
/// Requests arriving while a generation is running, or while the model is
/// still preloading, fail fast instead of queueing.
#[derive(Debug, Default)]
pub struct GenerationGate {
    generating: AtomicBool,
    preloading: AtomicBool,
}

impl GenerationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the gate for one generation.
    pub fn try_begin(&self) -> RelayResult<GenerationGuard<'_>> {
        if self
            .generating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(RelayError::AlreadyGenerating);
        }
        if self.preloading.load(Ordering::Acquire) {
            self.generating.store(false, Ordering::Release);
            return Err(RelayError::Loading);
        }
        Ok(GenerationGuard { gate: self })
    }

    pub fn set_preloading(&self, preloading: bool) {
        self.preloading.store(preloading, Ordering::Release);
    }

    pub fn is_generating(&self) -> bool {
        self.generating.load(Ordering::Acquire)
    }

    pub fn is_preloading(&self) -> bool {
        self.preloading.load(Ordering::Acquire)
    }
}

/// Releases the gate when dropped, on every exit path
#[derive(Debug)]
pub struct GenerationGuard<'a> {
    gate: &'a GenerationGate,
}

impl Drop for GenerationGuard<'_> {
    fn drop(&mut self) {
        self.gate.generating.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_is_rejected_until_release() {
        let gate = GenerationGate::new();
        let guard = gate.try_begin().unwrap();
        assert!(gate.is_generating());
        assert!(matches!(gate.try_begin(), Err(RelayError::AlreadyGenerating)));

        drop(guard);
        assert!(!gate.is_generating());
        assert!(gate.try_begin().is_ok());
    }

    #[test]
    fn preloading_rejects_with_loading() {
        let gate = GenerationGate::new();
        gate.set_preloading(true);
        assert!(matches!(gate.try_begin(), Err(RelayError::Loading)));
        assert!(!gate.is_generating());

        gate.set_preloading(false);
        assert!(gate.try_begin().is_ok());
    }

    #[test]
    fn guard_released_on_panic() {
        let gate = GenerationGate::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = gate.try_begin().unwrap();
            panic!("generation failed");
        }));
        assert!(result.is_err());
        assert!(!gate.is_generating());
    }
}
