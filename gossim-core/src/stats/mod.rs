//! Per node traffic and recovery statistics.
//!
//! A node accounts every packet it receives, sends or discards in the
//! counters of the current tick. Once every element is done with the
//! tick, the clock calls [`Stats::consolidate`]: non-zero counters
//! become points of time series and the tick counters are cleared.

mod series;

use crate::{
    pdu::{Address, GpsrpKind, Pdu, PduBody, PduClass},
    time::TimeInstant,
};
use std::{collections::BTreeMap, fmt};

pub use self::series::Series;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Direction {
    Incoming,
    Outgoing,
    Discarded,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incoming => f.write_str("incoming"),
            Self::Outgoing => f.write_str("outgoing"),
            Self::Discarded => f.write_str("discarded"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecoveryMetric {
    RequestsSent,
    RequestsReceived,
    RetransmissionsRealized,
    RetransmissionsNotPossible,
    RetransmissionsUnrealized,
    GosLost,
    GosRecovered,
    GosUnrecovered,
    RequestsUnanswered,
}

impl RecoveryMetric {
    pub const ALL: [Self; 9] = [
        Self::RequestsSent,
        Self::RequestsReceived,
        Self::RetransmissionsRealized,
        Self::RetransmissionsNotPossible,
        Self::RetransmissionsUnrealized,
        Self::GosLost,
        Self::GosRecovered,
        Self::GosUnrecovered,
        Self::RequestsUnanswered,
    ];
}

/// Name of a consolidated [`Series`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SeriesKey {
    Traffic {
        direction: Direction,
        class: PduClass,
    },
    Recovery(RecoveryMetric),
}

/// Cumulative GPSRP counters of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecoveryCounters {
    pub requests_sent: u64,
    pub requests_received: u64,
    pub retransmissions_realized: u64,
    pub retransmissions_not_possible: u64,
    pub gos_lost: u64,
    pub gos_recovered: u64,
    pub gos_unrecovered: u64,
}

impl RecoveryCounters {
    /// Requests received that were neither answered with the packet nor
    /// refused.
    pub fn retransmissions_unrealized(&self) -> u64 {
        self.requests_received
            .saturating_sub(self.retransmissions_realized)
            .saturating_sub(self.retransmissions_not_possible)
    }

    /// Requests sent that got no answer yet.
    pub fn requests_unanswered(&self) -> u64 {
        self.requests_sent
            .saturating_sub(self.gos_recovered)
            .saturating_sub(self.gos_unrecovered)
    }

    pub fn get(&self, metric: RecoveryMetric) -> u64 {
        match metric {
            RecoveryMetric::RequestsSent => self.requests_sent,
            RecoveryMetric::RequestsReceived => self.requests_received,
            RecoveryMetric::RetransmissionsRealized => self.retransmissions_realized,
            RecoveryMetric::RetransmissionsNotPossible => self.retransmissions_not_possible,
            RecoveryMetric::RetransmissionsUnrealized => self.retransmissions_unrealized(),
            RecoveryMetric::GosLost => self.gos_lost,
            RecoveryMetric::GosRecovered => self.gos_recovered,
            RecoveryMetric::GosUnrecovered => self.gos_unrecovered,
            RecoveryMetric::RequestsUnanswered => self.requests_unanswered(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Stats {
    address: Address,
    enabled: bool,

    tick: BTreeMap<(Direction, PduClass), u64>,
    recovery_changed: bool,

    totals: BTreeMap<(Direction, PduClass), u64>,
    recovery: RecoveryCounters,
    series: BTreeMap<SeriesKey, Series>,
}

impl Stats {
    pub fn new(address: Address, enabled: bool) -> Self {
        Self {
            address,
            enabled,
            tick: BTreeMap::new(),
            recovery_changed: false,
            totals: BTreeMap::new(),
            recovery: RecoveryCounters::default(),
            series: BTreeMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Count `pdu` in the current tick.
    pub fn account(&mut self, pdu: &Pdu, direction: Direction) {
        if !self.enabled {
            return;
        }

        let class = pdu.class();
        *self.tick.entry((direction, class)).or_default() += 1;
        *self.totals.entry((direction, class)).or_default() += 1;

        self.account_recovery(pdu, direction);
    }

    fn account_recovery(&mut self, pdu: &Pdu, direction: Direction) {
        let counters = &mut self.recovery;
        let counter = match (pdu.body(), direction) {
            (PduBody::Gpsrp(message), Direction::Outgoing) if pdu.source() == self.address => {
                match message.kind {
                    GpsrpKind::RetransmissionRequest => &mut counters.requests_sent,
                    GpsrpKind::Ok => &mut counters.retransmissions_realized,
                    GpsrpKind::NotPossible => &mut counters.retransmissions_not_possible,
                }
            }
            (PduBody::Gpsrp(message), Direction::Incoming)
                if pdu.destination() == self.address =>
            {
                match message.kind {
                    GpsrpKind::RetransmissionRequest => &mut counters.requests_received,
                    GpsrpKind::Ok => &mut counters.gos_recovered,
                    GpsrpKind::NotPossible => &mut counters.gos_unrecovered,
                }
            }
            (_, Direction::Discarded) if pdu.is_gos_marked() => &mut counters.gos_lost,
            _ => return,
        };
        *counter += 1;
        self.recovery_changed = true;
    }

    /// Turn the counters of the tick ending at `instant` into points of
    /// the series, then clear them.
    ///
    /// Consolidating twice without accounting anything in between does
    /// not change the series.
    pub fn consolidate(&mut self, instant: TimeInstant) {
        if !self.enabled {
            return;
        }

        for ((direction, class), count) in std::mem::take(&mut self.tick) {
            if count == 0 {
                continue;
            }
            self.series
                .entry(SeriesKey::Traffic { direction, class })
                .or_default()
                .add(instant, count);
        }

        if std::mem::take(&mut self.recovery_changed) {
            for metric in RecoveryMetric::ALL {
                let value = self.recovery.get(metric);
                let series = self.series.get(&SeriesKey::Recovery(metric));
                if value == 0 && series.is_none() {
                    continue;
                }
                self.series
                    .entry(SeriesKey::Recovery(metric))
                    .or_default()
                    .set(instant, value);
            }
        }
    }

    pub fn series(&self) -> &BTreeMap<SeriesKey, Series> {
        &self.series
    }

    pub fn get(&self, key: &SeriesKey) -> Option<&Series> {
        self.series.get(key)
    }

    pub fn recovery(&self) -> RecoveryCounters {
        self.recovery
    }

    /// Packets of `class` accounted in `direction` since the start.
    pub fn total(&self, direction: Direction, class: PduClass) -> u64 {
        self.totals.get(&(direction, class)).copied().unwrap_or(0)
    }

    /// Packets of any class accounted in `direction` since the start.
    pub fn total_by_direction(&self, direction: Direction) -> u64 {
        self.totals
            .iter()
            .filter(|((d, _), _)| *d == direction)
            .map(|(_, count)| count)
            .sum()
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.address, self.enabled);
    }
}
