use super::{NodeIo, PayloadMode, SenderConfig};
use crate::{
    element::ElementError,
    event::EventKind,
    measure::NsCredit,
    pdu::{ENCAPSULATION_LABEL, Label, LabelStack, MAX_PACKET_SIZE, Pdu},
};
use rand_chacha::ChaChaRng;
use rand_core::{Rng, SeedableRng as _};

/// A range of packet sizes (header included, `min..max` bytes) and its
/// relative weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketSizes {
    pub weight: u32,
    pub min: u32,
    pub max: u32,
}

/// Distribution of the packet sizes seen on the internet, used by the
/// senders in [`PayloadMode::Variable`].
///
/// The weights are relative to their sum.
pub const PAYLOAD_DISTRIBUTION: [PacketSizes; 4] = [
    PacketSizes {
        weight: 47,
        min: 0,
        max: 100,
    },
    PacketSizes {
        weight: 24,
        min: 100,
        max: 1_400,
    },
    PacketSizes {
        weight: 18,
        min: 1_400,
        max: 1_500,
    },
    PacketSizes {
        weight: 1,
        min: 1_500,
        max: MAX_PACKET_SIZE + 1,
    },
];

/// Draw a packet size, header included, from [`PAYLOAD_DISTRIBUTION`].
fn sample_packet_size<R: Rng>(rng: &mut R) -> u32 {
    let total: u64 = PAYLOAD_DISTRIBUTION
        .iter()
        .map(|sizes| sizes.weight as u64)
        .sum();

    let mut pick = rng.next_u64() % total;
    let sizes = PAYLOAD_DISTRIBUTION
        .iter()
        .find(|sizes| {
            let weight = sizes.weight as u64;
            if pick < weight {
                true
            } else {
                pick -= weight;
                false
            }
        })
        .unwrap_or(&PAYLOAD_DISTRIBUTION[0]);

    let range = (sizes.max - sizes.min) as u64;
    sizes.min + (rng.next_u64() % range) as u32
}

pub(super) struct SenderState {
    config: SenderConfig,
    rng: ChaChaRng,
    /// generated but not sent yet, waiting for enough credit
    pending: Option<Pdu>,
}

impl SenderState {
    pub(super) fn new(config: SenderConfig, seed: u64) -> Self {
        Self {
            config,
            rng: ChaChaRng::seed_from_u64(seed),
            pending: None,
        }
    }

    fn next_payload(&mut self) -> u32 {
        match self.config.payload {
            PayloadMode::Constant(payload) => payload,
            PayloadMode::Variable => {
                sample_packet_size(&mut self.rng).saturating_sub(self.config.header_size())
            }
        }
    }

    fn generate(&mut self, io: &NodeIo<'_>) -> Result<Pdu, ElementError> {
        let id = io.next_pdu_id()?;
        let payload = self.next_payload();
        let exp = self.config.exp();

        let pdu = if self.config.mpls {
            let labels = LabelStack::from_iter([Label::new(ENCAPSULATION_LABEL, exp)]);
            Pdu::mpls(id, io.address(), self.config.target, payload, labels)
        } else {
            Pdu::ipv4(id, io.address(), self.config.target, payload)
        };
        Ok(pdu.with_exp(exp))
    }

    /// Send as many packets as the credit pays for. The packet that does
    /// not fit waits for the next tick.
    pub(super) fn tick(
        &mut self,
        io: &mut NodeIo<'_>,
        credit: &mut NsCredit,
    ) -> Result<(), ElementError> {
        loop {
            let pdu = match self.pending.take() {
                Some(pdu) => pdu,
                None => self.generate(io)?,
            };

            let cost = self.config.rate.transmission_ns(pdu.bits_size());
            if !credit.try_spend(cost) {
                self.pending = Some(pdu);
                return Ok(());
            }

            io.emit(EventKind::PacketGenerated {
                pdu: pdu.id(),
                class: pdu.class(),
                bytes: pdu.bytes_size(),
            })?;
            io.route(pdu)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{measure::BitRate, pdu::Address};
    use proptest::prelude::*;

    #[test]
    fn distribution_covers_every_size() {
        let mut previous = 0;
        for sizes in PAYLOAD_DISTRIBUTION {
            assert_eq!(sizes.min, previous);
            assert!(sizes.min < sizes.max);
            previous = sizes.max;
        }
        assert_eq!(previous, MAX_PACKET_SIZE + 1);
    }

    #[test]
    fn small_packets_dominate() {
        let mut rng = ChaChaRng::seed_from_u64(7);
        let small = (0..10_000)
            .filter(|_| sample_packet_size(&mut rng) < 100)
            .count();
        // 47 out of 90
        assert!((4_800..5_650).contains(&small), "{small}");
    }

    #[test]
    fn payload_is_floored_at_zero() {
        let mut sender = SenderState::new(
            SenderConfig::new("10.0.0.2".parse().unwrap())
                .set_mpls(true)
                .set_payload(PayloadMode::Variable),
            1,
        );
        let header = sender.config.header_size();
        for _ in 0..1_000 {
            let payload = sender.next_payload();
            assert!(payload + header <= MAX_PACKET_SIZE);
        }
    }

    proptest! {
        #[test]
        fn sampled_sizes_are_packet_sizes(seed: u64) {
            let mut rng = ChaChaRng::seed_from_u64(seed);
            for _ in 0..64 {
                let size = sample_packet_size(&mut rng);
                prop_assert!(size <= MAX_PACKET_SIZE);
            }
        }

        #[test]
        fn same_seed_same_payloads(seed: u64) {
            let config = SenderConfig::new("10.0.0.2".parse().unwrap())
                .set_payload(PayloadMode::Variable);
            let mut a = SenderState::new(config.clone(), seed);
            let mut b = SenderState::new(config, seed);
            for _ in 0..16 {
                prop_assert_eq!(a.next_payload(), b.next_payload());
            }
        }
    }

    /// Run `ticks` ticks of `tick_ns` on a lone sender, returning for every
    /// tick the credit it started with, the bits it generated and the
    /// credit left.
    fn run_ticks(
        config: SenderConfig,
        seed: u64,
        tick_ns: u64,
        ticks: u64,
    ) -> Vec<(u64, Vec<u64>, u64)> {
        use crate::{
            element::{TickContext, TickGeneration, TimerEvent},
            event::EventLog,
            node::{NodeConfig, PortSet},
            routing::RoutingTable,
            stats::Stats,
            time::TimeInstant,
            topology::Topology,
        };
        use std::{sync::Arc, time::Duration};

        let mut topology = Topology::new();
        let id = topology.add_node(NodeConfig::sender(
            "s",
            Address::new(10, 0, 0, 1),
            config.clone(),
        ));
        let node = topology.node(id).unwrap();
        let log = Arc::new(EventLog::new());
        node.subscribe(log.clone()).unwrap();

        let routes = RoutingTable::default();
        let mut sender = SenderState::new(config, seed);
        let mut ports = PortSet::unlimited(1);
        let mut stats = Stats::new(node.address(), true);
        let mut credit = NsCredit::ZERO;
        let mut generation = TickGeneration::ZERO;

        let mut report = Vec::new();
        for tick in 1..=ticks {
            generation = generation.next();
            let ctx = TickContext {
                timer: TimerEvent {
                    generation,
                    tick_duration: Duration::from_nanos(tick_ns),
                    upper_limit: TimeInstant::from_nanos(tick * tick_ns),
                },
                topology: &topology,
                routes: &routes,
            };

            credit.accrue(tick_ns);
            let before = credit.available();
            let mut io = NodeIo {
                node,
                ctx: &ctx,
                ports: &mut ports,
                stats: &mut stats,
                emitted: false,
            };
            sender.tick(&mut io, &mut credit).unwrap();

            let bits = log
                .drain()
                .into_iter()
                .filter_map(|event| match event.kind {
                    EventKind::PacketGenerated { bytes, .. } => Some(bytes as u64 * 8),
                    _ => None,
                })
                .collect();
            report.push((before, bits, credit.available()));
        }
        report
    }

    proptest! {
        #[test]
        fn emissions_fit_the_credit(
            rate_bps in 1_000_000u64..=10_240_000_000,
            tick_ns in 1u64..50_000,
            payload in prop::option::of(0u32..1_480),
            seed: u64,
        ) {
            let rate = BitRate::from_bps(rate_bps);
            let config = SenderConfig::new(Address::new(10, 0, 0, 2))
                .set_rate(rate)
                .set_payload(payload.map_or(PayloadMode::Variable, PayloadMode::Constant));

            let mut carried = 0;
            for (before, bits, after) in run_ticks(config, seed, tick_ns, 16) {
                prop_assert_eq!(before, carried + tick_ns);

                let bound = rate.bits_within(before);
                let spent: u64 = bits.iter().map(|&bits| rate.transmission_ns(bits)).sum();
                for &bits in &bits {
                    prop_assert!(bits <= bound, "{bits} bits with a bound of {bound}");
                }
                prop_assert!(bits.iter().sum::<u64>() <= bound);
                prop_assert_eq!(after, before - spent);
                carried = after;
            }
        }
    }
}
