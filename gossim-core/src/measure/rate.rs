use anyhow::{bail, ensure};
use logos::{Lexer, Logos};
use std::{fmt, str::FromStr};

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// A transmission or switching rate, in bits per second.
///
/// Used for the traffic generation rate of senders and for the switching
/// power of routers. Every element turns its tick duration into an
/// nanosecond credit and spends it at this rate.
///
/// # Example
///
/// ```
/// # use gossim_core::measure::BitRate;
/// let rate: BitRate = "8mbps".parse().unwrap();
/// // 8 Mbps is exactly one byte per microsecond
/// assert_eq!(rate.transmission_ns(8), 1_000);
/// assert_eq!(rate.bits_within(1_000), 8);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BitRate(u64);

impl BitRate {
    pub const ZERO: Self = Self(0);

    pub const fn from_bps(bits_per_sec: u64) -> Self {
        Self(bits_per_sec)
    }

    pub const fn from_mbps(mbps: u64) -> Self {
        Self(mbps.saturating_mul(1_000_000))
    }

    #[inline]
    pub const fn bits_per_sec(self) -> u64 {
        self.0
    }

    /// Whole megabits per second (truncated).
    #[inline]
    pub const fn mbps(self) -> u64 {
        self.0 / 1_000_000
    }

    /// Nanoseconds needed to put `bits` on the wire, rounded up.
    ///
    /// A zero rate never transmits anything and returns [`u64::MAX`].
    pub fn transmission_ns(self, bits: u64) -> u64 {
        if self.0 == 0 {
            return u64::MAX;
        }
        let ns = (bits as u128 * NANOS_PER_SEC).div_ceil(self.0 as u128);
        ns.min(u64::MAX as u128) as u64
    }

    /// Maximum number of bits that fit in a budget of `ns` nanoseconds,
    /// i.e. `floor(ns / (1e9 / rate))`.
    pub fn bits_within(self, ns: u64) -> u64 {
        let bits = ns as u128 * self.0 as u128 / NANOS_PER_SEC;
        bits.min(u64::MAX as u128) as u64
    }
}

impl fmt::Display for BitRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.0;
        if v >= 1_000_000_000 && v % 1_000_000_000 == 0 {
            write!(f, "{}gbps", v / 1_000_000_000)
        } else if v >= 1_000_000 && v % 1_000_000 == 0 {
            write!(f, "{}mbps", v / 1_000_000)
        } else if v >= 1_000 && v % 1_000 == 0 {
            write!(f, "{}kbps", v / 1_000)
        } else {
            write!(f, "{v}bps")
        }
    }
}

#[derive(Logos, Debug, PartialEq)]
#[logos(skip r"[ \t\n\f]+")] // Ignore this regex pattern between tokens
enum RateToken {
    #[regex("bps")]
    Bps,
    #[regex("kbps")]
    Kbps,
    #[regex("mbps")]
    Mbps,
    #[regex("gbps")]
    Gbps,

    #[regex("[0-9]+")]
    Value,
}

impl FromStr for BitRate {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut lex = Lexer::<'_, RateToken>::new(s);

        let Some(Ok(RateToken::Value)) = lex.next() else {
            bail!("Expecting to parse a number")
        };
        let number: u64 = lex.slice().parse()?;
        let Some(Ok(token)) = lex.next() else {
            bail!("Expecting to parse a unit")
        };
        let bps = match token {
            RateToken::Bps => number,
            RateToken::Kbps => number.saturating_mul(1_000),
            RateToken::Mbps => number.saturating_mul(1_000_000),
            RateToken::Gbps => number.saturating_mul(1_000_000_000),
            RateToken::Value => bail!("Expecting to parse a unit (bps, kbps, ...)"),
        };

        ensure!(
            lex.next().is_none(),
            "Not expecting any other tokens to parse a rate"
        );

        Ok(Self(bps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rate() {
        macro_rules! assert_rate {
            ($string:literal == $value:expr) => {
                assert_eq!($string.parse::<BitRate>().unwrap(), BitRate::from_bps($value));
            };
        }

        assert_rate!("0bps" == 0);
        assert_rate!("42bps" == 42);
        assert_rate!("42kbps" == 42_000);
        assert_rate!("42mbps" == 42_000_000);
        assert_rate!("1gbps" == 1_000_000_000);
    }

    #[test]
    fn parse_invalid_strings() {
        assert!("42".parse::<BitRate>().is_err());
        assert!("mbps".parse::<BitRate>().is_err());
        assert!("".parse::<BitRate>().is_err());
        assert!("42mbps extra".parse::<BitRate>().is_err());
    }

    #[test]
    fn display() {
        assert_eq!(BitRate::from_mbps(10).to_string(), "10mbps");
        assert_eq!(BitRate::from_bps(2_000_000_000).to_string(), "2gbps");
        assert_eq!(BitRate::from_bps(1_500).to_string(), "1500bps");
        assert_eq!(BitRate::from_bps(3_000).to_string(), "3kbps");
    }

    #[test]
    fn transmission_time_rounds_up() {
        let rate = BitRate::from_mbps(3);
        // 1 bit at 3 Mbps is 333.33ns
        assert_eq!(rate.transmission_ns(1), 334);
        assert_eq!(rate.transmission_ns(3), 1_000);
        assert_eq!(BitRate::ZERO.transmission_ns(1), u64::MAX);
    }

    #[test]
    fn bits_within_floors() {
        let rate = BitRate::from_mbps(3);
        assert_eq!(rate.bits_within(333), 0);
        assert_eq!(rate.bits_within(334), 1);
        assert_eq!(rate.bits_within(1_000), 3);
    }

    #[test]
    fn transmission_fits_budget() {
        // whatever fits by transmission time also fits by bit budget
        let rate = BitRate::from_mbps(7);
        for bits in [1u64, 8, 160, 12_000] {
            let ns = rate.transmission_ns(bits);
            assert!(rate.bits_within(ns) >= bits);
        }
    }
}
