use anyhow::{Result, anyhow, bail, ensure};
use core::fmt;
use logos::Logos;
use std::time;

/// A point on the simulated time line, in nanoseconds since the start of
/// the run.
///
/// Every tick ends on a [`TimeInstant`] (the tick's upper time limit) and
/// the statistics series are keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TimeInstant(u64);

impl TimeInstant {
    pub const ZERO: Self = Self(0);

    #[inline]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    #[inline]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Advance this instant by `duration`, saturating at [`u64::MAX`]
    /// nanoseconds.
    #[must_use = "function does not modify the current value"]
    pub fn saturating_add(self, duration: time::Duration) -> Self {
        Self(self.0.saturating_add(nanos(duration)))
    }

    /// The instant `nanos` before this one, floored at [`TimeInstant::ZERO`].
    #[must_use = "function does not modify the current value"]
    pub fn saturating_sub_nanos(self, nanos: u64) -> Self {
        Self(self.0.saturating_sub(nanos))
    }

    /// Time elapsed between `earlier` and `self`, zero if `earlier` is later.
    pub fn duration_since(self, earlier: Self) -> time::Duration {
        time::Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Display for TimeInstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

/// Whole nanoseconds of a [`time::Duration`], saturating at [`u64::MAX`].
#[inline]
pub fn nanos(duration: time::Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// Parse a human readable duration such as `"100ns"` or `"1ms 500us"`.
///
/// Every term is a number followed by its unit, the terms are summed.
///
/// ```
/// # use gossim_core::time::parse_duration;
/// # use std::time::Duration;
/// assert_eq!(parse_duration("1ms 500us").unwrap(), Duration::from_micros(1_500));
/// ```
pub fn parse_duration(s: &str) -> Result<time::Duration> {
    let mut lex = Unit::lexer(s);
    let mut total = time::Duration::ZERO;
    let mut terms = 0;

    while let Some(token) = lex.next() {
        let Ok(Unit::Number) = token else {
            bail!("Expected a number at {:?} in {s:?}", lex.span());
        };
        let amount: u64 = lex.slice().parse()?;

        let term = match lex.next() {
            Some(Ok(Unit::Nanos)) => time::Duration::from_nanos(amount),
            Some(Ok(Unit::Micros)) => time::Duration::from_micros(amount),
            Some(Ok(Unit::Millis)) => time::Duration::from_millis(amount),
            Some(Ok(Unit::Secs)) => time::Duration::from_secs(amount),
            _ => bail!("Missing the unit after {amount} in {s:?}"),
        };
        total = total
            .checked_add(term)
            .ok_or_else(|| anyhow!("Duration overflow in {s:?}"))?;
        terms += 1;
    }

    ensure!(terms > 0, "Empty duration");
    Ok(total)
}

#[derive(Logos, Debug, PartialEq)]
#[logos(skip r"[ \t\n\f]+")]
enum Unit {
    #[regex("[0-9]+")]
    Number,
    #[token("ns")]
    Nanos,
    #[regex("us|μs|µs")]
    Micros,
    #[token("ms")]
    Millis,
    #[token("s")]
    Secs,
}
