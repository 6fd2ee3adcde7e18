use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use thiserror::Error;

/// Raised when a generator handed out every identifier of its range.
///
/// This is fatal for the run: it is surfaced to the tick barrier rather
/// than logged, because reusing identifiers would silently merge distinct
/// packets, events or label bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{what} identifier space exhausted (last: {last})")]
pub struct IdentifierOverflow {
    pub what: &'static str,
    pub last: u64,
}

/// a generator for monotonicaly increasing **unique** identifiers
///
/// Cloning the generator shares the underlying counter, so every clone
/// keeps handing out identifiers from the same sequence.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    next: Arc<AtomicU64>,
    first: u64,
    last: u64,
    what: &'static str,
}

impl IdGenerator {
    /// Generator over `1..u64::MAX`. `0` is never handed out.
    pub fn new(what: &'static str) -> Self {
        Self::with_range(what, 1, u64::MAX - 1)
    }

    /// Generator over the inclusive range `first..=last`.
    ///
    /// `last` must be smaller than [`u64::MAX`].
    pub fn with_range(what: &'static str, first: u64, last: u64) -> Self {
        debug_assert!(first <= last && last < u64::MAX);
        Self {
            next: Arc::new(AtomicU64::new(first)),
            first,
            last,
            what,
        }
    }

    /// generate a new unique identifier
    pub fn generate(&self) -> Result<u64, IdentifierOverflow> {
        let last = self.last;
        self.next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |id| {
                (id <= last).then_some(id + 1)
            })
            .map_err(|_| IdentifierOverflow {
                what: self.what,
                last,
            })
    }

    /// Restart the sequence from the first identifier.
    pub fn reset(&self) {
        self.next.store(self.first, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_and_shared() {
        let ids = IdGenerator::new("test");
        let shared = ids.clone();

        assert_eq!(ids.generate().unwrap(), 1);
        assert_eq!(shared.generate().unwrap(), 2);
        assert_eq!(ids.generate().unwrap(), 3);
    }

    #[test]
    fn overflow_is_an_error() {
        let ids = IdGenerator::with_range("label", 16, 17);

        assert_eq!(ids.generate().unwrap(), 16);
        assert_eq!(ids.generate().unwrap(), 17);

        let error = ids.generate().unwrap_err();
        assert_eq!(error.what, "label");
        assert_eq!(
            error.to_string(),
            "label identifier space exhausted (last: 17)"
        );
        // stays exhausted
        assert!(ids.generate().is_err());
    }

    #[test]
    fn reset_restarts() {
        let ids = IdGenerator::with_range("label", 16, 17);
        ids.generate().unwrap();
        ids.generate().unwrap();
        ids.reset();
        assert_eq!(ids.generate().unwrap(), 16);
    }
}
