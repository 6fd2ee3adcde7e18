use crate::{
    defaults::{
        BUFFER_RANGE_MIB, DEFAULT_BUFFER_MIB, DEFAULT_DMGP_KIB, DEFAULT_PAYLOAD,
        DEFAULT_ROUTER_PORTS, DEFAULT_SENDER_RATE, DEFAULT_SWITCHING_RATE, DMGP_RANGE_KIB,
        ROUTER_PORTS_RANGE, SENDER_RATE_RANGE_MBPS, SWITCHING_RATE_RANGE_MBPS,
    },
    element::ElementId,
    measure::BitRate,
    node::PortId,
    pdu::{Address, Exp, GosLevel, IPV4_HEADER_SIZE, Label, MAX_PACKET_SIZE},
};
use thiserror::Error;

/// Why an element cannot take part in a simulation.
///
/// The `Display` implementation is the message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("The name is empty")]
    EmptyName,
    #[error("The name is only made of blanks")]
    BlankName,
    #[error("Another element is already named {name:?}")]
    DuplicateName { name: String },
    #[error("The address is unspecified (0.0.0.0)")]
    UnspecifiedAddress,
    #[error("Another node already uses the address {address}")]
    DuplicateAddress { address: Address },
    #[error("The transmission rate {rate} is out of range ({min} to {max} Mbps)")]
    RateOutOfRange { rate: BitRate, min: u64, max: u64 },
    #[error("The switching power {rate} is out of range ({min} to {max} Mbps)")]
    SwitchingRateOutOfRange { rate: BitRate, min: u64, max: u64 },
    #[error("The payload of {payload} bytes does not fit in a packet (max {max})")]
    PayloadOutOfRange { payload: u32, max: u32 },
    #[error("No receiver has the target address {target}")]
    TargetMissing { target: Address },
    #[error("A sender cannot target itself")]
    TargetIsSelf,
    #[error("The buffer of {mib} MiB is out of range ({min} to {max} MiB)")]
    BufferOutOfRange { mib: u64, min: u64, max: u64 },
    #[error("The DMGP of {kib} KiB is out of range ({min} to {max} KiB)")]
    DmgpOutOfRange { kib: u64, min: u64, max: u64 },
    #[error("A router needs {min} to {max} ports, not {count}")]
    PortCountOutOfRange { count: usize, min: usize, max: usize },
    #[error("The delay of a link must be at least 1ns")]
    DelayOutOfRange,
    #[error("The link end node {address} does not exist")]
    MissingEndNode { address: Address },
    #[error("Both ends of the link are the same node")]
    SameEndNodes,
    #[error("Node {node} has no port {port}")]
    PortOutOfRange { node: ElementId, port: PortId },
    #[error("Port {port} of node {node} is already in use")]
    PortInUse { node: ElementId, port: PortId },
    #[error("The end nodes do not fit a link of this kind: {reason}")]
    WrongKindForEnds { reason: &'static str },
}

/// How a sender sizes the payload of the packets it generates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadMode {
    /// every packet carries the same payload, in bytes
    Constant(u32),
    /// packet sizes follow the internet traffic distribution
    Variable,
}

impl Default for PayloadMode {
    fn default() -> Self {
        Self::Constant(DEFAULT_PAYLOAD)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderConfig {
    pub target: Address,
    pub rate: BitRate,
    pub payload: PayloadMode,
    pub gos: GosLevel,
    pub backup: bool,
    pub mpls: bool,
}

impl SenderConfig {
    pub fn new(target: Address) -> Self {
        Self {
            target,
            rate: DEFAULT_SENDER_RATE,
            payload: PayloadMode::default(),
            gos: GosLevel::NONE,
            backup: false,
            mpls: false,
        }
    }

    pub fn set_rate(mut self, rate: BitRate) -> Self {
        self.rate = rate;
        self
    }

    pub fn set_payload(mut self, payload: PayloadMode) -> Self {
        self.payload = payload;
        self
    }

    pub fn set_gos(mut self, gos: GosLevel) -> Self {
        self.gos = gos;
        self
    }

    /// Request a backup LSP for the flow (carried in the EXP field).
    pub fn set_backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }

    /// Encapsulate the generated traffic in MPLS.
    pub fn set_mpls(mut self, mpls: bool) -> Self {
        self.mpls = mpls;
        self
    }

    /// The EXP value stamped on every generated packet.
    pub fn exp(&self) -> Exp {
        Exp::new(self.gos, self.backup)
    }

    /// bytes the sender adds on top of the payload
    pub fn header_size(&self) -> u32 {
        if self.mpls {
            IPV4_HEADER_SIZE + Label::SIZE
        } else {
            IPV4_HEADER_SIZE
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterConfig {
    pub switching_rate: BitRate,
    pub buffer_mib: u64,
    pub active: bool,
    pub dmgp_kib: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            switching_rate: DEFAULT_SWITCHING_RATE,
            buffer_mib: DEFAULT_BUFFER_MIB,
            active: false,
            dmgp_kib: DEFAULT_DMGP_KIB,
        }
    }
}

impl RouterConfig {
    pub fn set_switching_rate(mut self, rate: BitRate) -> Self {
        self.switching_rate = rate;
        self
    }

    pub fn set_buffer_mib(mut self, mib: u64) -> Self {
        self.buffer_mib = mib;
        self
    }

    /// Run GPSRP and keep a DMGP of `dmgp_kib` KiB.
    pub fn set_active(mut self, dmgp_kib: u64) -> Self {
        self.active = true;
        self.dmgp_kib = dmgp_kib;
        self
    }

    pub fn buffer_bytes(&self) -> u64 {
        self.buffer_mib.saturating_mul(1024 * 1024)
    }

    pub fn dmgp_bytes(&self) -> u64 {
        self.dmgp_kib.saturating_mul(1024)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeRole {
    Sender(SenderConfig),
    Receiver,
    /// label edge router, at the border of the MPLS domain
    Ler(RouterConfig),
    /// label switching router, inside the MPLS domain
    Lsr(RouterConfig),
}

impl NodeRole {
    pub fn is_router(&self) -> bool {
        matches!(self, Self::Ler(_) | Self::Lsr(_))
    }

    /// Routers are inside the MPLS domain, senders and receivers are not.
    pub fn in_domain(&self) -> bool {
        self.is_router()
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Ler(config) | Self::Lsr(config) if config.active)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sender(_) => "Sender",
            Self::Receiver => "Receiver",
            Self::Ler(config) if config.active => "ActiveLER",
            Self::Ler(_) => "LER",
            Self::Lsr(config) if config.active => "ActiveLSR",
            Self::Lsr(_) => "LSR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub name: String,
    pub address: Address,
    pub show_name: bool,
    pub stats_enabled: bool,
    /// number of ports, senders and receivers always have exactly one
    pub ports: usize,
    pub role: NodeRole,
}

impl NodeConfig {
    pub fn new(name: impl Into<String>, address: Address, role: NodeRole) -> Self {
        let ports = if role.is_router() {
            DEFAULT_ROUTER_PORTS
        } else {
            1
        };
        Self {
            name: name.into(),
            address,
            show_name: true,
            stats_enabled: true,
            ports,
            role,
        }
    }

    pub fn sender(name: impl Into<String>, address: Address, config: SenderConfig) -> Self {
        Self::new(name, address, NodeRole::Sender(config))
    }

    pub fn receiver(name: impl Into<String>, address: Address) -> Self {
        Self::new(name, address, NodeRole::Receiver)
    }

    pub fn ler(name: impl Into<String>, address: Address, config: RouterConfig) -> Self {
        Self::new(name, address, NodeRole::Ler(config))
    }

    pub fn lsr(name: impl Into<String>, address: Address, config: RouterConfig) -> Self {
        Self::new(name, address, NodeRole::Lsr(config))
    }

    pub fn set_show_name(mut self, show_name: bool) -> Self {
        self.show_name = show_name;
        self
    }

    pub fn set_stats_enabled(mut self, stats_enabled: bool) -> Self {
        self.stats_enabled = stats_enabled;
        self
    }

    /// Only routers may have more than one port.
    pub fn set_ports(mut self, ports: usize) -> Self {
        if self.role.is_router() {
            self.ports = ports;
        }
        self
    }

    /// Checks the configuration of the node on its own.
    ///
    /// What depends on the rest of the topology (unique names and
    /// addresses, the sender's target) is checked by the topology.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.name.trim().is_empty() {
            return Err(ConfigError::BlankName);
        }
        if self.address.is_unspecified() {
            return Err(ConfigError::UnspecifiedAddress);
        }

        match &self.role {
            NodeRole::Sender(sender) => {
                let (min, max) = SENDER_RATE_RANGE_MBPS.into_inner();
                if !SENDER_RATE_RANGE_MBPS.contains(&sender.rate.mbps()) {
                    return Err(ConfigError::RateOutOfRange {
                        rate: sender.rate,
                        min,
                        max,
                    });
                }
                if let PayloadMode::Constant(payload) = sender.payload {
                    let max = MAX_PACKET_SIZE - sender.header_size();
                    if payload > max {
                        return Err(ConfigError::PayloadOutOfRange { payload, max });
                    }
                }
                if sender.target == self.address {
                    return Err(ConfigError::TargetIsSelf);
                }
            }
            NodeRole::Receiver => (),
            NodeRole::Ler(router) | NodeRole::Lsr(router) => {
                let (min, max) = SWITCHING_RATE_RANGE_MBPS.into_inner();
                if !SWITCHING_RATE_RANGE_MBPS.contains(&router.switching_rate.mbps()) {
                    return Err(ConfigError::SwitchingRateOutOfRange {
                        rate: router.switching_rate,
                        min,
                        max,
                    });
                }
                let (min, max) = BUFFER_RANGE_MIB.into_inner();
                if !BUFFER_RANGE_MIB.contains(&router.buffer_mib) {
                    return Err(ConfigError::BufferOutOfRange {
                        mib: router.buffer_mib,
                        min,
                        max,
                    });
                }
                let (min, max) = DMGP_RANGE_KIB.into_inner();
                if router.active && !DMGP_RANGE_KIB.contains(&router.dmgp_kib) {
                    return Err(ConfigError::DmgpOutOfRange {
                        kib: router.dmgp_kib,
                        min,
                        max,
                    });
                }
                let (min, max) = ROUTER_PORTS_RANGE.into_inner();
                if !ROUTER_PORTS_RANGE.contains(&self.ports) {
                    return Err(ConfigError::PortCountOutOfRange {
                        count: self.ports,
                        min,
                        max,
                    });
                }
            }
        }

        Ok(())
    }
}
