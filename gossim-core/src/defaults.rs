use crate::measure::{BitRate, LinkDelay};
use std::time::Duration;

/// Default [`LinkDelay`]
///
/// This is the default value that is used for a [`Link`] delay.
///
/// ```
/// # use gossim_core::defaults::*;
/// assert_eq!(
///     DEFAULT_LINK_DELAY.to_string(),
///     "1µs"
/// );
/// ```
///
/// [`Link`]: crate::link::Link
pub const DEFAULT_LINK_DELAY: LinkDelay = LinkDelay::from_nanos(1_000);

/// Default simulation step (tick duration).
pub const DEFAULT_STEP: Duration = Duration::from_nanos(100);

/// Default simulated duration of a run.
pub const DEFAULT_DURATION: Duration = Duration::from_micros(100);

/// Default traffic generation rate of a sender.
pub const DEFAULT_SENDER_RATE: BitRate = BitRate::from_mbps(1_000);

/// Default switching power of a router.
pub const DEFAULT_SWITCHING_RATE: BitRate = BitRate::from_mbps(1_024);

/// Default size of the buffer shared by all the ports of a router, in MiB.
pub const DEFAULT_BUFFER_MIB: u64 = 1;

/// Default size of the memory an active router keeps for GoS packets,
/// in KiB.
pub const DEFAULT_DMGP_KIB: u64 = 64;

/// Default number of ports of a router.
pub const DEFAULT_ROUTER_PORTS: usize = 8;

/// Default constant payload of a sender, in bytes.
pub const DEFAULT_PAYLOAD: u32 = 1_000;

/// Accepted range for sender generation rates, in Mbps.
pub const SENDER_RATE_RANGE_MBPS: std::ops::RangeInclusive<u64> = 1..=10_240;

/// Accepted range for router switching power, in Mbps.
pub const SWITCHING_RATE_RANGE_MBPS: std::ops::RangeInclusive<u64> = 1..=10_240;

/// Accepted range for router buffers, in MiB.
pub const BUFFER_RANGE_MIB: std::ops::RangeInclusive<u64> = 1..=1_024;

/// Accepted range for the GoS packet memory of active routers, in KiB.
pub const DMGP_RANGE_KIB: std::ops::RangeInclusive<u64> = 1..=1_024;

/// Accepted range for the number of ports of a router.
pub const ROUTER_PORTS_RANGE: std::ops::RangeInclusive<usize> = 2..=32;

/// Default seed of the random generators of the senders.
pub const DEFAULT_SEED: u64 = 0x6055_1a7e;
