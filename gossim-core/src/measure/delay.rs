use std::{fmt, str::FromStr, time::Duration};

/// The time a packet takes to traverse a [`Link`] from one end to the
/// other, in nanoseconds.
///
/// The delay of a well configured link is at least [`LinkDelay::MIN`]
/// (1ns). A zero delay can be constructed but is reported by
/// [`Link::validate_config`] and the transit percentage never divides by
/// it.
///
/// ```
/// # use gossim_core::measure::LinkDelay;
/// let delay: LinkDelay = "1us".parse().unwrap();
/// assert_eq!(delay.as_nanos(), 1_000);
/// assert_eq!(delay.to_string(), "1µs");
/// ```
///
/// [`Link`]: crate::link::Link
/// [`Link::validate_config`]: crate::link::Link::validate_config
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkDelay(u64);

impl LinkDelay {
    pub const MIN: Self = Self(1);

    #[inline(always)]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    #[inline(always)]
    pub fn new(duration: Duration) -> Self {
        Self(crate::time::nanos(duration))
    }

    #[inline(always)]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 >= Self::MIN.0
    }

    #[inline(always)]
    pub fn into_duration(self) -> Duration {
        Duration::from_nanos(self.0)
    }
}

impl Default for LinkDelay {
    fn default() -> Self {
        crate::defaults::DEFAULT_LINK_DELAY
    }
}

impl From<Duration> for LinkDelay {
    fn from(value: Duration) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for LinkDelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.into_duration(), f)
    }
}

impl FromStr for LinkDelay {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::time::parse_duration(s).map(Self::new)
    }
}
