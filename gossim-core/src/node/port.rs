use crate::{element::ElementId, element::TickGeneration, link::LinkEnd, pdu::Pdu};
use std::{collections::VecDeque, fmt, str};

/// Index of a port within its node, starting at `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortId(u16);

impl PortId {
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl str::FromStr for PortId {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The link end a port is plugged into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortBinding {
    pub link: ElementId,
    /// the end of the link on this node's side
    pub end: LinkEnd,
}

#[derive(Debug)]
struct Arrival {
    pdu: Pdu,
    generation: TickGeneration,
}

/// A FIFO queue of the packets that arrived through one link end.
#[derive(Debug, Default)]
pub struct Port {
    binding: Option<PortBinding>,
    queue: VecDeque<Arrival>,
}

impl Port {
    pub fn binding(&self) -> Option<PortBinding> {
        self.binding
    }

    pub fn is_available(&self) -> bool {
        self.binding.is_none()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// The packet at the head of the queue, if it arrived before
    /// `generation`.
    fn eligible(&self, generation: TickGeneration) -> Option<&Pdu> {
        self.queue
            .front()
            .filter(|arrival| arrival.generation < generation)
            .map(|arrival| &arrival.pdu)
    }
}

/// The ports of a node.
///
/// Either unlimited (senders and receivers never apply backpressure) or
/// bounded by a byte budget shared by all of its ports (routers).
#[derive(Debug)]
pub struct PortSet {
    ports: Vec<Port>,
    budget: Option<u64>,
    used: u64,
}

impl PortSet {
    pub fn unlimited(count: usize) -> Self {
        Self {
            ports: (0..count).map(|_| Port::default()).collect(),
            budget: None,
            used: 0,
        }
    }

    /// `count` ports sharing `budget` bytes.
    pub fn bounded(count: usize, budget: u64) -> Self {
        Self {
            budget: Some(budget),
            ..Self::unlimited(count)
        }
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn port(&self, id: PortId) -> Option<&Port> {
        self.ports.get(id.index())
    }

    pub fn ports(&self) -> impl Iterator<Item = (PortId, &Port)> {
        self.ports
            .iter()
            .enumerate()
            .map(|(index, port)| (PortId::new(index as u16), port))
    }

    pub fn has_available_ports(&self) -> bool {
        self.ports.iter().any(Port::is_available)
    }

    pub fn budget(&self) -> Option<u64> {
        self.budget
    }

    /// bytes currently queued in all the ports
    pub fn used(&self) -> u64 {
        self.used
    }

    pub(crate) fn bind(&mut self, id: PortId, binding: PortBinding) {
        if let Some(port) = self.ports.get_mut(id.index()) {
            port.binding = Some(binding);
        }
    }

    /// The port plugged into `link`, if any.
    pub fn port_of(&self, link: ElementId) -> Option<PortId> {
        self.ports()
            .find(|(_, port)| port.binding.is_some_and(|binding| binding.link == link))
            .map(|(id, _)| id)
    }

    /// Queue `pdu` on `port`.
    ///
    /// Hands the packet back if the port does not exist or if the byte
    /// budget cannot fit it.
    pub fn push(&mut self, port: PortId, pdu: Pdu, generation: TickGeneration) -> Result<(), Pdu> {
        let bytes = pdu.bytes_size() as u64;
        if let Some(budget) = self.budget
            && self.used.saturating_add(bytes) > budget
        {
            return Err(pdu);
        }
        let Some(port) = self.ports.get_mut(port.index()) else {
            return Err(pdu);
        };

        port.queue.push_back(Arrival { pdu, generation });
        self.used += bytes;
        Ok(())
    }

    /// Size in bytes of the packet at the head of `port`, if it arrived
    /// before `generation`.
    pub fn peek(&self, port: PortId, generation: TickGeneration) -> Option<u32> {
        self.port(port)
            .and_then(|port| port.eligible(generation))
            .map(Pdu::bytes_size)
    }

    /// Take the packet at the head of `port` if it arrived before
    /// `generation`.
    pub fn pop(&mut self, port: PortId, generation: TickGeneration) -> Option<Pdu> {
        let port = self.ports.get_mut(port.index())?;
        port.eligible(generation)?;
        let arrival = port.queue.pop_front()?;
        self.used = self.used.saturating_sub(arrival.pdu.bytes_size() as u64);
        Some(arrival.pdu)
    }

    /// Round robin: the first port, starting at `start` and wrapping
    /// around, with a packet eligible for `generation`.
    pub fn next_ready(&self, start: usize, generation: TickGeneration) -> Option<PortId> {
        let count = self.ports.len();
        (0..count)
            .map(|offset| (start + offset) % count)
            .find(|&index| self.ports[index].eligible(generation).is_some())
            .map(|index| PortId::new(index as u16))
    }

    /// Drop every queued packet, keeping the bindings.
    pub fn clear(&mut self) -> Vec<Pdu> {
        self.used = 0;
        self.ports
            .iter_mut()
            .flat_map(|port| port.queue.drain(..).map(|arrival| arrival.pdu))
            .collect()
    }
}
