/// the tick generation
///
/// Every timer event the [`Clock`] broadcasts carries the generation of
/// its tick. Elements use it to reject a timer event that is not the
/// direct successor of the last one they handled, and to tag the packets
/// they receive so that a packet handed over during a tick is only
/// processed on the next one, whatever the order the worker pool runs the
/// elements in.
///
/// [`Clock`]: crate::clock::Clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(C)]
pub struct TickGeneration(u64);

impl TickGeneration {
    pub const ZERO: Self = TickGeneration(0);

    /// get the next generation.
    ///
    /// # Example
    ///
    /// ```
    /// # use gossim_core::element::TickGeneration;
    /// let prev = TickGeneration::ZERO;
    /// let next = prev.next();
    /// assert!(prev < next);
    /// ```
    #[inline(always)]
    #[must_use = "function does not modify the current value"]
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    #[inline(always)]
    pub fn into_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TickGeneration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_around_on_overflow() {
        let generation = TickGeneration(u64::MAX).next();
        assert_eq!(generation, TickGeneration::ZERO);
    }

    #[test]
    fn ordering() {
        let first = TickGeneration::ZERO.next();
        assert_eq!(first.into_u64(), 1);
        assert!(first < first.next());
    }
}
