//! The packets flowing through ports and links.
//!
//! A [`Pdu`] is an IPv4 packet that may carry an MPLS label stack or one
//! of the two control protocols of the simulator (TLDP label distribution
//! and GPSRP retransmission). Its binary layout is not modelled, only its
//! size and the accessors the switching code needs.

mod control;
mod label;

use crate::ids::{IdGenerator, IdentifierOverflow};
use std::fmt;

pub use self::{
    control::{GpsrpKind, GpsrpMessage, TldpKind, TldpMessage},
    label::{
        ENCAPSULATION_LABEL, Exp, FIRST_UNRESERVED_LABEL, GosLevel, Label, LabelStack, MAX_LABEL,
    },
};

/// Nodes are addressed with IPv4 addresses.
pub type Address = std::net::Ipv4Addr;

/// Size of the IPv4 header of every [`Pdu`], in bytes.
pub const IPV4_HEADER_SIZE: u32 = 20;

/// Largest IPv4 packet, in bytes.
pub const MAX_PACKET_SIZE: u32 = 65_535;

/// # [`Pdu`] Identifier
///
/// Unique among the packets generated during a run. A retransmitted
/// packet keeps the identifier of the original.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PduId(u64);

impl PduId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Draw the next identifier from `generator`.
    pub fn generate(generator: &IdGenerator) -> Result<Self, IdentifierOverflow> {
        generator.generate().map(Self)
    }

    pub const fn into_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PduId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

/// What a [`Pdu`] carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PduBody {
    Ipv4,
    Mpls(LabelStack),
    Tldp(TldpMessage),
    Gpsrp(GpsrpMessage),
}

/// Accounting class of a [`Pdu`]: protocol subtype and, for data
/// packets, GoS level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PduClass {
    Ipv4 { gos: GosLevel },
    Mpls { gos: GosLevel },
    Tldp,
    Gpsrp(GpsrpKind),
}

impl PduClass {
    pub fn gos_level(self) -> GosLevel {
        match self {
            Self::Ipv4 { gos } | Self::Mpls { gos } => gos,
            Self::Tldp | Self::Gpsrp(_) => GosLevel::NONE,
        }
    }
}

impl fmt::Display for PduClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ipv4 { gos } if gos.is_marked() => write!(f, "IPv4 GoS{gos}"),
            Self::Ipv4 { .. } => f.write_str("IPv4"),
            Self::Mpls { gos } if gos.is_marked() => write!(f, "MPLS GoS{gos}"),
            Self::Mpls { .. } => f.write_str("MPLS"),
            Self::Tldp => f.write_str("TLDP"),
            Self::Gpsrp(kind) => write!(f, "GPSRP {kind}"),
        }
    }
}

/// # A simulated packet
///
/// Carries the addressing, the size model (IPv4 header plus payload plus
/// label stack or control message), the GoS field and the address of the
/// last active router the packet crossed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    id: PduId,
    source: Address,
    destination: Address,
    payload: u32,
    exp: Exp,
    last_active: Option<Address>,
    body: PduBody,
}

impl Pdu {
    /// A plain IPv4 data packet.
    pub fn ipv4(id: PduId, source: Address, destination: Address, payload: u32) -> Self {
        Self {
            id,
            source,
            destination,
            payload,
            exp: Exp::BEST_EFFORT,
            last_active: None,
            body: PduBody::Ipv4,
        }
    }

    /// A data packet already carrying `labels`.
    pub fn mpls(
        id: PduId,
        source: Address,
        destination: Address,
        payload: u32,
        labels: LabelStack,
    ) -> Self {
        Self {
            body: PduBody::Mpls(labels),
            ..Self::ipv4(id, source, destination, payload)
        }
    }

    pub fn tldp(id: PduId, source: Address, destination: Address, message: TldpMessage) -> Self {
        Self {
            body: PduBody::Tldp(message),
            ..Self::ipv4(id, source, destination, 0)
        }
    }

    pub fn gpsrp(id: PduId, source: Address, destination: Address, message: GpsrpMessage) -> Self {
        Self {
            body: PduBody::Gpsrp(message),
            ..Self::ipv4(id, source, destination, 0)
        }
    }

    /// Stamp the GoS field. Labels pushed afterwards copy it.
    #[must_use]
    pub fn with_exp(mut self, exp: Exp) -> Self {
        self.exp = exp;
        self
    }

    pub fn id(&self) -> PduId {
        self.id
    }

    pub fn source(&self) -> Address {
        self.source
    }

    pub fn destination(&self) -> Address {
        self.destination
    }

    pub fn payload(&self) -> u32 {
        self.payload
    }

    pub fn body(&self) -> &PduBody {
        &self.body
    }

    pub fn into_body(self) -> PduBody {
        self.body
    }

    pub fn exp(&self) -> Exp {
        self.exp
    }

    /// The GoS level of the packet: the EXP of the top label for MPLS
    /// packets, the IPv4 GoS field otherwise.
    pub fn gos_level(&self) -> GosLevel {
        match &self.body {
            PduBody::Mpls(stack) => stack
                .top()
                .map(|label| label.exp.gos_level())
                .unwrap_or_else(|| self.exp.gos_level()),
            PduBody::Ipv4 => self.exp.gos_level(),
            PduBody::Tldp(_) | PduBody::Gpsrp(_) => GosLevel::NONE,
        }
    }

    /// `true` for data packets with a GoS level above `0`.
    pub fn is_gos_marked(&self) -> bool {
        self.gos_level().is_marked()
    }

    pub fn is_data(&self) -> bool {
        matches!(self.body, PduBody::Ipv4 | PduBody::Mpls(_))
    }

    pub fn last_active(&self) -> Option<Address> {
        self.last_active
    }

    pub fn set_last_active(&mut self, address: Address) {
        self.last_active = Some(address);
    }

    pub fn labels(&self) -> Option<&LabelStack> {
        match &self.body {
            PduBody::Mpls(stack) => Some(stack),
            _ => None,
        }
    }

    /// Push `value` with the packet's EXP, turning an IPv4 packet into an
    /// MPLS one if needed.
    pub fn push_label(&mut self, value: u32) {
        let label = Label::new(value, self.exp);
        match &mut self.body {
            PduBody::Mpls(stack) => stack.push(label),
            body => {
                debug_assert!(matches!(body, PduBody::Ipv4));
                *body = PduBody::Mpls(LabelStack::from_iter([label]));
            }
        }
    }

    /// Replace the value of the top label, keeping its EXP.
    ///
    /// Returns `false` if the packet has no label.
    pub fn swap_label(&mut self, value: u32) -> bool {
        match &mut self.body {
            PduBody::Mpls(stack) => match stack.top_mut() {
                Some(top) => {
                    top.value = value;
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    /// Pop the top label. An emptied stack turns the packet back into a
    /// plain IPv4 packet.
    pub fn pop_label(&mut self) -> Option<Label> {
        let PduBody::Mpls(stack) = &mut self.body else {
            return None;
        };
        let label = stack.pop();
        if stack.is_empty() {
            self.body = PduBody::Ipv4;
        }
        label
    }

    pub fn class(&self) -> PduClass {
        match &self.body {
            PduBody::Ipv4 => PduClass::Ipv4 {
                gos: self.gos_level(),
            },
            PduBody::Mpls(_) => PduClass::Mpls {
                gos: self.gos_level(),
            },
            PduBody::Tldp(_) => PduClass::Tldp,
            PduBody::Gpsrp(message) => PduClass::Gpsrp(message.kind),
        }
    }

    /// Size of the packet on the wire, in bytes.
    pub fn bytes_size(&self) -> u32 {
        let body = match &self.body {
            PduBody::Ipv4 => 0,
            PduBody::Mpls(stack) => stack.bytes_size(),
            PduBody::Tldp(_) => TldpMessage::SIZE,
            PduBody::Gpsrp(message) => message.bytes_size(),
        };
        IPV4_HEADER_SIZE
            .saturating_add(self.payload)
            .saturating_add(body)
    }

    /// Size of the packet on the wire, in bits.
    pub fn bits_size(&self) -> u64 {
        self.bytes_size() as u64 * 8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> Address {
        Address::new(10, 0, 0, last)
    }

    #[test]
    fn pdu_id_display() {
        assert_eq!(PduId::new(0).to_string(), "0x0000000000000000");
        assert_eq!(PduId::new(42).to_string(), "0x000000000000002a");
    }

    #[test]
    fn sizes() {
        let pdu = Pdu::ipv4(PduId::new(1), addr(1), addr(2), 100);
        assert_eq!(pdu.bytes_size(), 120);
        assert_eq!(pdu.bits_size(), 960);

        let tldp = Pdu::tldp(PduId::new(2), addr(1), addr(2), TldpMessage::request(addr(9)));
        assert_eq!(tldp.bytes_size(), IPV4_HEADER_SIZE + TldpMessage::SIZE);

        let ok = Pdu::gpsrp(
            PduId::new(3),
            addr(1),
            addr(2),
            GpsrpMessage::ok(pdu.clone()),
        );
        assert_eq!(
            ok.bytes_size(),
            IPV4_HEADER_SIZE + GpsrpMessage::SIZE + pdu.bytes_size()
        );
    }

    #[test]
    fn push_swap_pop() {
        let exp = Exp::new(GosLevel::new(3).unwrap(), false);
        let mut pdu = Pdu::ipv4(PduId::new(1), addr(1), addr(2), 0).with_exp(exp);
        assert_eq!(pdu.class(), PduClass::Ipv4 { gos: exp.gos_level() });

        pdu.push_label(16);
        assert_eq!(pdu.bytes_size(), IPV4_HEADER_SIZE + Label::SIZE);
        assert_eq!(pdu.class(), PduClass::Mpls { gos: exp.gos_level() });
        assert_eq!(pdu.labels().and_then(|s| s.top()).map(|l| l.exp), Some(exp));

        assert!(pdu.swap_label(17));
        assert_eq!(pdu.labels().and_then(|s| s.top()).map(|l| l.value), Some(17));

        assert_eq!(pdu.pop_label().map(|l| l.value), Some(17));
        assert_eq!(pdu.body(), &PduBody::Ipv4);
        assert!(pdu.pop_label().is_none());
        assert!(!pdu.swap_label(18));
    }

    #[test]
    fn gos_marking() {
        let pdu = Pdu::ipv4(PduId::new(1), addr(1), addr(2), 0);
        assert!(!pdu.is_gos_marked());

        let pdu = pdu.with_exp(Exp::new(GosLevel::new(1).unwrap(), true));
        assert!(pdu.is_gos_marked());
        assert!(pdu.is_data());

        let gpsrp = Pdu::gpsrp(
            PduId::new(2),
            addr(1),
            addr(2),
            GpsrpMessage::request(addr(1), PduId::new(1)),
        );
        assert!(!gpsrp.is_gos_marked());
        assert_eq!(
            gpsrp.class(),
            PduClass::Gpsrp(GpsrpKind::RetransmissionRequest)
        );
    }

    #[test]
    fn class_display() {
        assert_eq!(PduClass::Ipv4 { gos: GosLevel::NONE }.to_string(), "IPv4");
        assert_eq!(
            PduClass::Mpls {
                gos: GosLevel::new(2).unwrap()
            }
            .to_string(),
            "MPLS GoS2"
        );
        assert_eq!(
            PduClass::Gpsrp(GpsrpKind::Ok).to_string(),
            "GPSRP retransmission ok"
        );
    }
}
