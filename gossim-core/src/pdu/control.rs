use super::{Address, Pdu, PduId};
use std::fmt;

/// Label distribution (TLDP) message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TldpKind {
    /// upstream asks its downstream neighbour for a label for a FEC
    Request,
    /// downstream grants `label` for the FEC
    Ok,
    /// no label can be granted for the FEC
    Denied,
    /// a previously granted binding for the FEC is no longer valid
    Withdraw,
}

/// Label distribution message exchanged between adjacent routers.
///
/// The forwarding equivalence class (FEC) is the destination address of
/// the traffic the binding is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TldpMessage {
    pub kind: TldpKind,
    pub fec: Address,
    pub label: Option<u32>,
}

impl TldpMessage {
    /// Bytes of the message, on top of the IPv4 header.
    pub const SIZE: u32 = 20;

    pub fn request(fec: Address) -> Self {
        Self {
            kind: TldpKind::Request,
            fec,
            label: None,
        }
    }

    pub fn ok(fec: Address, label: u32) -> Self {
        Self {
            kind: TldpKind::Ok,
            fec,
            label: Some(label),
        }
    }

    pub fn denied(fec: Address) -> Self {
        Self {
            kind: TldpKind::Denied,
            fec,
            label: None,
        }
    }

    pub fn withdraw(fec: Address) -> Self {
        Self {
            kind: TldpKind::Withdraw,
            fec,
            label: None,
        }
    }
}

/// GPSRP message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GpsrpKind {
    /// a downstream active router lost a GoS packet and asks for it again
    RetransmissionRequest,
    /// the upstream active router no longer holds the packet
    NotPossible,
    /// the upstream active router retransmits the packet
    Ok,
}

impl fmt::Display for GpsrpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RetransmissionRequest => f.write_str("retransmission request"),
            Self::NotPossible => f.write_str("retransmission not possible"),
            Self::Ok => f.write_str("retransmission ok"),
        }
    }
}

/// GPSRP message. A packet is identified by its flow (the address of the
/// node that generated it) and its [`PduId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpsrpMessage {
    pub kind: GpsrpKind,
    pub flow: Address,
    pub packet: PduId,
    /// the retransmitted packet, only on [`GpsrpKind::Ok`]
    pub recovered: Option<Box<Pdu>>,
}

impl GpsrpMessage {
    /// Bytes of the message without the retransmitted packet, on top of
    /// the IPv4 header.
    pub const SIZE: u32 = 16;

    pub fn request(flow: Address, packet: PduId) -> Self {
        Self {
            kind: GpsrpKind::RetransmissionRequest,
            flow,
            packet,
            recovered: None,
        }
    }

    pub fn not_possible(flow: Address, packet: PduId) -> Self {
        Self {
            kind: GpsrpKind::NotPossible,
            flow,
            packet,
            recovered: None,
        }
    }

    pub fn ok(recovered: Pdu) -> Self {
        Self {
            kind: GpsrpKind::Ok,
            flow: recovered.source(),
            packet: recovered.id(),
            recovered: Some(Box::new(recovered)),
        }
    }

    pub fn bytes_size(&self) -> u32 {
        Self::SIZE
            + self
                .recovered
                .as_ref()
                .map(|pdu| pdu.bytes_size())
                .unwrap_or(0)
    }
}
