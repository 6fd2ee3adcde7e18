use anyhow::anyhow;
use std::{fmt, str};

/// The identifier of a node or a link of the topology.
///
/// Nodes and links share the same sequence so an [`ElementId`] is unique
/// across the whole topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(C)]
pub struct ElementId(u64);

impl ElementId {
    pub const ZERO: Self = ElementId::new(0);

    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use = "function does not modify the current value"]
    pub(crate) fn next(self) -> Self {
        Self::new(self.0 + 1)
    }

    pub const fn into_u64(self) -> u64 {
        self.0
    }
}

impl str::FromStr for ElementId {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self).map_err(|error| anyhow!("{error}"))
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print() {
        assert_eq!(format!("{}", ElementId(42)), "42")
    }
    #[test]
    fn parse() {
        assert_eq!("42".parse::<ElementId>().unwrap(), ElementId(42));
        assert!("x".parse::<ElementId>().is_err());
    }
    #[test]
    fn next() {
        assert_eq!(ElementId::ZERO.next(), ElementId(1));
    }
}
