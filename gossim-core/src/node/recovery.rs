//! GPSRP state of an active router.
//!
//! An active router keeps a copy of the GoS packets it forwards in its
//! DMGP (dynamic memory for GoS packets) so that a downstream active
//! router that lost one of them can ask for a retransmission.

use crate::pdu::{Address, GosLevel, GpsrpMessage, Pdu, PduId};
use std::collections::VecDeque;

/// Share of the DMGP given to GoS levels 1, 2 and 3, in percent.
const LEVEL_SHARES: [u64; 3] = [20, 30, 50];

#[derive(Debug, Default)]
struct Partition {
    capacity: u64,
    used: u64,
    packets: VecDeque<Pdu>,
}

impl Partition {
    fn store(&mut self, pdu: Pdu) {
        let bytes = pdu.bytes_size() as u64;
        if bytes > self.capacity {
            return;
        }
        while self.used + bytes > self.capacity {
            let Some(oldest) = self.packets.pop_front() else {
                break;
            };
            self.used -= oldest.bytes_size() as u64;
        }
        self.used += bytes;
        self.packets.push_back(pdu);
    }
}

/// Bounded memory partitioned by GoS level, oldest packets evicted first.
#[derive(Debug)]
pub(super) struct Dmgp {
    partitions: [Partition; 3],
}

impl Dmgp {
    pub(super) fn new(capacity: u64) -> Self {
        Self {
            partitions: LEVEL_SHARES.map(|share| Partition {
                capacity: capacity.saturating_mul(share) / 100,
                ..Partition::default()
            }),
        }
    }

    fn partition(&mut self, level: GosLevel) -> Option<&mut Partition> {
        let index = (level.into_u8() as usize).checked_sub(1)?;
        self.partitions.get_mut(index)
    }

    /// Keep a copy of `pdu`. Packets that are not GoS-marked are ignored.
    pub(super) fn store(&mut self, pdu: Pdu) {
        if let Some(partition) = self.partition(pdu.gos_level()) {
            partition.store(pdu);
        }
    }

    pub(super) fn find(&self, flow: Address, packet: PduId) -> Option<&Pdu> {
        self.partitions
            .iter()
            .flat_map(|partition| partition.packets.iter())
            .find(|pdu| pdu.source() == flow && pdu.id() == packet)
    }

    pub(super) fn len(&self) -> usize {
        self.partitions
            .iter()
            .map(|partition| partition.packets.len())
            .sum()
    }
}

/// A GoS packet lost here, to be asked again to `upstream`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Loss {
    pub upstream: Address,
    pub flow: Address,
    pub packet: PduId,
}

#[derive(Debug)]
pub(super) struct Recovery {
    dmgp: Dmgp,
    pending: Vec<Loss>,
}

impl Recovery {
    pub(super) fn new(dmgp_bytes: u64) -> Self {
        Self {
            dmgp: Dmgp::new(dmgp_bytes),
            pending: Vec::new(),
        }
    }

    /// Stamp `pdu` with this router's address and keep a copy of it.
    pub(super) fn remember(&mut self, pdu: &mut Pdu, own: Address) {
        if !pdu.is_data() || !pdu.is_gos_marked() {
            return;
        }
        pdu.set_last_active(own);
        self.dmgp.store(pdu.clone());
    }

    /// Note the loss of `pdu` if an upstream active router may still have
    /// it. Returns `true` if a retransmission will be requested.
    pub(super) fn record_loss(&mut self, pdu: &Pdu, own: Address) -> bool {
        if !pdu.is_data() || !pdu.is_gos_marked() {
            return false;
        }
        let Some(upstream) = pdu.last_active().filter(|upstream| *upstream != own) else {
            return false;
        };
        self.pending.push(Loss {
            upstream,
            flow: pdu.source(),
            packet: pdu.id(),
        });
        true
    }

    pub(super) fn take_pending(&mut self) -> Vec<Loss> {
        std::mem::take(&mut self.pending)
    }

    /// The answer to a retransmission request.
    pub(super) fn answer(&self, flow: Address, packet: PduId) -> GpsrpMessage {
        match self.dmgp.find(flow, packet) {
            Some(pdu) => GpsrpMessage::ok(pdu.clone()),
            None => GpsrpMessage::not_possible(flow, packet),
        }
    }

    pub(super) fn dmgp_len(&self) -> usize {
        self.dmgp.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdu::{Exp, GpsrpKind};

    fn addr(last: u8) -> Address {
        Address::new(10, 0, 0, last)
    }

    fn gos(id: u64, level: u8, payload: u32) -> Pdu {
        Pdu::ipv4(PduId::new(id), addr(1), addr(9), payload)
            .with_exp(Exp::new(GosLevel::new(level).unwrap(), false))
    }

    #[test]
    fn partitions_follow_the_shares() {
        let dmgp = Dmgp::new(1_000);
        let capacities: Vec<_> = dmgp.partitions.iter().map(|p| p.capacity).collect();
        assert_eq!(capacities, [200, 300, 500]);
    }

    #[test]
    fn oldest_is_evicted_first() {
        // level 1 partition holds 200 bytes, 120 bytes per packet
        let mut dmgp = Dmgp::new(1_000);
        dmgp.store(gos(1, 1, 100));
        dmgp.store(gos(2, 1, 100));

        assert_eq!(dmgp.len(), 1);
        assert!(dmgp.find(addr(1), PduId::new(1)).is_none());
        assert!(dmgp.find(addr(1), PduId::new(2)).is_some());
    }

    #[test]
    fn levels_do_not_evict_each_other() {
        let mut dmgp = Dmgp::new(1_000);
        dmgp.store(gos(1, 1, 100));
        dmgp.store(gos(2, 3, 100));
        dmgp.store(gos(3, 3, 100));
        assert_eq!(dmgp.len(), 3);
    }

    #[test]
    fn best_effort_and_oversized_are_not_kept() {
        let mut dmgp = Dmgp::new(1_000);
        dmgp.store(gos(1, 0, 10));
        dmgp.store(gos(2, 1, 500));
        assert_eq!(dmgp.len(), 0);
    }

    #[test]
    fn remember_stamps_and_answers() {
        let mut recovery = Recovery::new(10_000);
        let mut pdu = gos(1, 2, 10);
        recovery.remember(&mut pdu, addr(5));
        assert_eq!(pdu.last_active(), Some(addr(5)));

        let ok = recovery.answer(addr(1), PduId::new(1));
        assert_eq!(ok.kind, GpsrpKind::Ok);
        assert_eq!(ok.recovered.unwrap().id(), PduId::new(1));

        let refused = recovery.answer(addr(1), PduId::new(2));
        assert_eq!(refused.kind, GpsrpKind::NotPossible);
    }

    #[test]
    fn losses_need_another_upstream() {
        let mut recovery = Recovery::new(10_000);
        let me = addr(5);

        // never crossed an active router
        assert!(!recovery.record_loss(&gos(1, 2, 10), me));

        let mut own = gos(2, 2, 10);
        own.set_last_active(me);
        assert!(!recovery.record_loss(&own, me));

        let mut lost = gos(3, 2, 10);
        lost.set_last_active(addr(4));
        assert!(recovery.record_loss(&lost, me));
        // best effort
        let mut plain = gos(4, 0, 10);
        plain.set_last_active(addr(4));
        assert!(!recovery.record_loss(&plain, me));

        let pending = recovery.take_pending();
        assert_eq!(
            pending,
            [Loss {
                upstream: addr(4),
                flow: addr(1),
                packet: PduId::new(3)
            }]
        );
        assert!(recovery.take_pending().is_empty());
    }
}
