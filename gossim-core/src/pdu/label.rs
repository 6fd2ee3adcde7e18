use std::fmt;

/// Guarantee of Service level of a packet, `0` (best effort) to `3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct GosLevel(u8);

impl GosLevel {
    pub const NONE: Self = Self(0);
    pub const MAX: Self = Self(3);

    /// All the levels, lowest first.
    pub const ALL: [Self; 4] = [Self(0), Self(1), Self(2), Self(3)];

    /// `None` if `level` is above [`GosLevel::MAX`].
    pub const fn new(level: u8) -> Option<Self> {
        if level <= Self::MAX.0 {
            Some(Self(level))
        } else {
            None
        }
    }

    #[inline]
    pub const fn into_u8(self) -> u8 {
        self.0
    }

    /// GoS-marked packets are the ones with a level above `0`; those are
    /// the packets active routers try to recover.
    #[inline]
    pub const fn is_marked(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for GosLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The 3-bit EXP field carried in the IPv4 GoS field and in every label.
///
/// The low two bits hold the [`GosLevel`], the third bit requests a
/// backup LSP: `exp = level | backup << 2`.
///
/// ```
/// # use gossim_core::pdu::{Exp, GosLevel};
/// let exp = Exp::new(GosLevel::new(2).unwrap(), true);
/// assert_eq!(exp.into_u8(), 6);
/// assert_eq!(exp.gos_level(), GosLevel::new(2).unwrap());
/// assert!(exp.requires_backup());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Exp(u8);

impl Exp {
    pub const BEST_EFFORT: Self = Self(0);

    const BACKUP_BIT: u8 = 0b100;
    const LEVEL_MASK: u8 = 0b011;

    pub const fn new(level: GosLevel, backup: bool) -> Self {
        Self(level.0 | if backup { Self::BACKUP_BIT } else { 0 })
    }

    #[inline]
    pub const fn gos_level(self) -> GosLevel {
        GosLevel(self.0 & Self::LEVEL_MASK)
    }

    #[inline]
    pub const fn requires_backup(self) -> bool {
        self.0 & Self::BACKUP_BIT != 0
    }

    #[inline]
    pub const fn into_u8(self) -> u8 {
        self.0
    }
}

/// Label values below this one are reserved.
pub const FIRST_UNRESERVED_LABEL: u32 = 16;

/// Largest value of the 20-bit label field.
pub const MAX_LABEL: u32 = (1 << 20) - 1;

/// Label value a sender uses when it encapsulates its own traffic in MPLS.
pub const ENCAPSULATION_LABEL: u32 = 1;

/// One entry of an MPLS label stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label {
    pub value: u32,
    pub exp: Exp,
}

impl Label {
    /// Bytes one stack entry adds to a packet.
    pub const SIZE: u32 = 4;

    pub const fn new(value: u32, exp: Exp) -> Self {
        Self { value, exp }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/exp{}", self.value, self.exp.0)
    }
}

/// MPLS label stack; the last entry is the top of the stack.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LabelStack(Vec<Label>);

impl LabelStack {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, label: Label) {
        self.0.push(label);
    }

    pub fn pop(&mut self) -> Option<Label> {
        self.0.pop()
    }

    pub fn top(&self) -> Option<&Label> {
        self.0.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut Label> {
        self.0.last_mut()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn bytes_size(&self) -> u32 {
        self.0.len() as u32 * Label::SIZE
    }
}

impl FromIterator<Label> for LabelStack {
    fn from_iter<I: IntoIterator<Item = Label>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gos_level_range() {
        assert!(GosLevel::new(3).is_some());
        assert!(GosLevel::new(4).is_none());
        assert!(!GosLevel::NONE.is_marked());
        assert!(GosLevel::MAX.is_marked());
    }

    #[test]
    fn exp_encoding() {
        for level in GosLevel::ALL {
            for backup in [false, true] {
                let exp = Exp::new(level, backup);
                assert_eq!(exp.gos_level(), level);
                assert_eq!(exp.requires_backup(), backup);
                assert!(exp.into_u8() < 8);
            }
        }
        assert_eq!(Exp::new(GosLevel::NONE, false), Exp::BEST_EFFORT);
    }

    #[test]
    fn stack_order() {
        let mut stack = LabelStack::new();
        stack.push(Label::new(ENCAPSULATION_LABEL, Exp::BEST_EFFORT));
        stack.push(Label::new(16, Exp::BEST_EFFORT));

        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.bytes_size(), 8);
        assert_eq!(stack.top().map(|l| l.value), Some(16));
        assert_eq!(stack.pop().map(|l| l.value), Some(16));
        assert_eq!(stack.top().map(|l| l.value), Some(ENCAPSULATION_LABEL));
    }
}
