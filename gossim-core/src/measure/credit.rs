/// Nanosecond credit available to an element for its transmissions.
///
/// Every tick adds the tick duration to the credit and every transmission
/// spends the time it needs at the element's [`BitRate`]. The credit
/// never goes below zero: a transmission that does not fit is left for a
/// later tick and the remaining credit carries over.
///
/// [`BitRate`]: crate::measure::BitRate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NsCredit(u64);

impl NsCredit {
    pub const ZERO: Self = Self(0);

    #[inline]
    pub fn available(&self) -> u64 {
        self.0
    }

    /// Add `ns` nanoseconds to the credit.
    #[inline]
    pub fn accrue(&mut self, ns: u64) {
        self.0 = self.0.saturating_add(ns);
    }

    /// Spend `ns` nanoseconds if the credit covers them.
    ///
    /// Returns `false` (and keeps the credit untouched) otherwise.
    #[inline]
    pub fn try_spend(&mut self, ns: u64) -> bool {
        match self.0.checked_sub(ns) {
            Some(rem) => {
                self.0 = rem;
                true
            }
            None => false,
        }
    }

    #[inline]
    pub fn clear(&mut self) {
        self.0 = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carries_over() {
        let mut credit = NsCredit::ZERO;
        credit.accrue(100);
        assert!(credit.try_spend(60));
        assert!(!credit.try_spend(60));
        assert_eq!(credit.available(), 40);

        credit.accrue(100);
        assert!(credit.try_spend(60));
        assert_eq!(credit.available(), 80);
    }

    #[test]
    fn never_negative() {
        let mut credit = NsCredit::ZERO;
        assert!(!credit.try_spend(1));
        assert_eq!(credit.available(), 0);
        assert!(credit.try_spend(0));
    }

    #[test]
    fn saturates() {
        let mut credit = NsCredit::ZERO;
        credit.accrue(u64::MAX);
        credit.accrue(1);
        assert_eq!(credit.available(), u64::MAX);
    }
}
