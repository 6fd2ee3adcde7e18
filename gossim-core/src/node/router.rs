//! Label switching.
//!
//! LERs and LSRs switch the packets waiting in their ports within the
//! credit of their switching power, round robin over the ports. Labels are
//! distributed hop by hop with TLDP, on demand: the ingress LER asks its
//! downstream neighbour for a label for the destination (the FEC) of the
//! first packet it cannot switch, and each router on the path does the
//! same until the egress LER answers.

use super::{
    NodeIo, PortId, RouterConfig,
    recovery::{Loss, Recovery},
};
use crate::{
    element::ElementError,
    event::EventKind,
    ids::IdGenerator,
    measure::{BitRate, NsCredit},
    pdu::{
        Address, FIRST_UNRESERVED_LABEL, GpsrpKind, GpsrpMessage, MAX_LABEL, Pdu, PduBody,
        PduClass, TldpKind, TldpMessage,
    },
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LabelOp {
    Swap { label: u32, port: PortId },
    Pop { port: PortId },
}

impl LabelOp {
    fn port(self) -> PortId {
        match self {
            Self::Swap { port, .. } | Self::Pop { port } => port,
        }
    }
}

/// An incoming label this router granted to an upstream neighbour.
#[derive(Debug, Clone, Copy)]
struct LabelEntry {
    fec: Address,
    op: LabelOp,
    upstream: PortId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FecState {
    Requested,
    Established { label: u32 },
}

/// The binding obtained from the downstream neighbour for a FEC.
#[derive(Debug)]
struct FecBinding {
    /// port towards the downstream neighbour
    port: PortId,
    state: FecState,
    /// upstream ports waiting for a label for this FEC
    waiting: Vec<PortId>,
}

pub(super) struct RouterState {
    switching_rate: BitRate,
    edge: bool,

    labels: IdGenerator,
    label_table: BTreeMap<u32, LabelEntry>,
    fecs: BTreeMap<Address, FecBinding>,
    /// packets waiting for their LSP
    parked: BTreeMap<Address, Vec<Pdu>>,
    /// ports whose link is broken and whose bindings were withdrawn
    withdrawn: BTreeSet<PortId>,

    cursor: usize,
    recovery: Option<Recovery>,
}

impl RouterState {
    pub(super) fn new(config: RouterConfig, edge: bool) -> Self {
        Self {
            switching_rate: config.switching_rate,
            edge,
            labels: IdGenerator::with_range(
                "label",
                FIRST_UNRESERVED_LABEL as u64,
                MAX_LABEL as u64,
            ),
            label_table: BTreeMap::new(),
            fecs: BTreeMap::new(),
            parked: BTreeMap::new(),
            withdrawn: BTreeSet::new(),
            cursor: 0,
            recovery: config
                .active
                .then(|| Recovery::new(config.dmgp_bytes())),
        }
    }

    pub(super) fn established_label(&self, fec: Address) -> Option<u32> {
        match self.fecs.get(&fec)?.state {
            FecState::Established { label } => Some(label),
            FecState::Requested => None,
        }
    }

    pub(super) fn dmgp_len(&self) -> usize {
        self.recovery.as_ref().map_or(0, Recovery::dmgp_len)
    }

    pub(super) fn record_loss(&mut self, pdu: &Pdu, own: Address) {
        if let Some(recovery) = self.recovery.as_mut()
            && recovery.record_loss(pdu, own)
        {
            trace!(pdu = %pdu.id(), "GoS packet lost, retransmission to request");
        }
    }

    fn allocate_label(&self) -> Result<u32, ElementError> {
        Ok(self.labels.generate()? as u32)
    }

    pub(super) fn tick(
        &mut self,
        io: &mut NodeIo<'_>,
        credit: &mut NsCredit,
    ) -> Result<(), ElementError> {
        self.check_links(io)?;
        self.request_retransmissions(io)?;

        let generation = io.generation();
        loop {
            let Some(port) = io.ports.next_ready(self.cursor, generation) else {
                // nothing to switch, idle credit is not kept
                credit.clear();
                return Ok(());
            };
            let Some(bytes) = io.ports.peek(port, generation) else {
                return Ok(());
            };
            let cost = self.switching_rate.transmission_ns(bytes as u64 * 8);
            if !credit.try_spend(cost) {
                return Ok(());
            }
            let Some(pdu) = io.ports.pop(port, generation) else {
                return Ok(());
            };
            self.cursor = port.index() + 1;

            io.receive(&pdu, Some(port))?;
            self.handle(io, pdu, Some(port))?;
        }
    }

    /// Withdraw the bindings going through the ports whose link broke.
    fn check_links(&mut self, io: &mut NodeIo<'_>) -> Result<(), ElementError> {
        let bound: Vec<PortId> = io
            .ports
            .ports()
            .filter(|(_, port)| port.binding().is_some())
            .map(|(id, _)| id)
            .collect();

        for port in bound {
            let broken = io.link(port).is_some_and(|link| link.is_broken());
            if broken && self.withdrawn.insert(port) {
                debug!(node = %io.id(), %port, "outgoing link broken, withdrawing");
                self.withdraw_port(io, port)?;
            } else if !broken {
                self.withdrawn.remove(&port);
            }
        }
        Ok(())
    }

    fn request_retransmissions(&mut self, io: &mut NodeIo<'_>) -> Result<(), ElementError> {
        let Some(recovery) = self.recovery.as_mut() else {
            return Ok(());
        };
        for Loss {
            upstream,
            flow,
            packet,
        } in recovery.take_pending()
        {
            let request = Pdu::gpsrp(
                io.next_pdu_id()?,
                io.address(),
                upstream,
                GpsrpMessage::request(flow, packet),
            );
            io.route(request)?;
        }
        Ok(())
    }

    fn handle(
        &mut self,
        io: &mut NodeIo<'_>,
        pdu: Pdu,
        in_port: Option<PortId>,
    ) -> Result<(), ElementError> {
        let for_me = pdu.destination() == io.address();
        match (pdu.class(), in_port) {
            (PduClass::Tldp, Some(port)) if for_me => self.handle_tldp(io, pdu, port),
            (PduClass::Tldp, _) => io.discard(pdu),
            (PduClass::Gpsrp(_), _) if for_me => self.handle_gpsrp(io, pdu),
            (PduClass::Gpsrp(_), _) => {
                self.switched(io, &pdu)?;
                io.route(pdu)
            }
            (PduClass::Ipv4 { .. } | PduClass::Mpls { .. }, _) => {
                self.handle_data(io, pdu, in_port)
            }
        }
    }

    fn handle_data(
        &mut self,
        io: &mut NodeIo<'_>,
        pdu: Pdu,
        in_port: Option<PortId>,
    ) -> Result<(), ElementError> {
        let entering = in_port
            .and_then(|port| io.neighbor(port))
            .is_some_and(|neighbor| !neighbor.role().in_domain());

        if entering {
            if self.edge {
                self.ingress(io, pdu)
            } else {
                io.discard(pdu)
            }
        } else if pdu.labels().is_some() {
            self.switch_label(io, pdu)
        } else if self.edge
            && let Some(hop) = io.next_hop(pdu.destination())
            && !io.is_in_domain(hop.neighbor)
        {
            self.forward(io, pdu, hop.port)
        } else {
            io.discard(pdu)
        }
    }

    /// Data entering the MPLS domain.
    fn ingress(&mut self, io: &mut NodeIo<'_>, mut pdu: Pdu) -> Result<(), ElementError> {
        let fec = pdu.destination();

        if let Some(binding) = self.fecs.get(&fec) {
            return match binding.state {
                FecState::Established { label } => {
                    let port = binding.port;
                    pdu.push_label(label);
                    self.forward(io, pdu, port)
                }
                FecState::Requested => {
                    self.parked.entry(fec).or_default().push(pdu);
                    Ok(())
                }
            };
        }

        let Some(hop) = io.next_hop(fec) else {
            return io.discard(pdu);
        };
        if !io.is_in_domain(hop.neighbor) {
            // the destination is right behind this LER
            return self.forward(io, pdu, hop.port);
        }

        self.signal(io, hop.port, TldpMessage::request(fec))?;
        self.fecs.insert(
            fec,
            FecBinding {
                port: hop.port,
                state: FecState::Requested,
                waiting: Vec::new(),
            },
        );
        self.parked.entry(fec).or_default().push(pdu);
        Ok(())
    }

    fn switch_label(&mut self, io: &mut NodeIo<'_>, mut pdu: Pdu) -> Result<(), ElementError> {
        let entry = pdu
            .labels()
            .and_then(|stack| stack.top())
            .and_then(|top| self.label_table.get(&top.value))
            .copied();

        match entry.map(|entry| entry.op) {
            Some(LabelOp::Swap { label, port }) => {
                pdu.swap_label(label);
                self.forward(io, pdu, port)
            }
            Some(LabelOp::Pop { port }) => {
                pdu.pop_label();
                self.forward(io, pdu, port)
            }
            None => io.discard(pdu),
        }
    }

    fn switched(&self, io: &mut NodeIo<'_>, pdu: &Pdu) -> Result<(), ElementError> {
        io.emit(EventKind::PacketSwitched {
            pdu: pdu.id(),
            class: pdu.class(),
        })
    }

    /// Send a data packet; an active router keeps a copy of GoS packets.
    fn forward(
        &mut self,
        io: &mut NodeIo<'_>,
        mut pdu: Pdu,
        port: PortId,
    ) -> Result<(), ElementError> {
        if let Some(recovery) = self.recovery.as_mut() {
            recovery.remember(&mut pdu, io.address());
        }
        self.switched(io, &pdu)?;
        io.send(port, pdu)
    }

    /// Send a TLDP message to the neighbour plugged into `port`.
    fn signal(
        &self,
        io: &mut NodeIo<'_>,
        port: PortId,
        message: TldpMessage,
    ) -> Result<(), ElementError> {
        let Some(neighbor) = io.neighbor(port) else {
            return Ok(());
        };
        if io.link(port).is_some_and(|link| link.is_broken()) {
            return Ok(());
        }
        trace!(node = %io.id(), %port, kind = ?message.kind, fec = %message.fec, "TLDP");
        let pdu = Pdu::tldp(io.next_pdu_id()?, io.address(), neighbor.address(), message);
        io.send(port, pdu)
    }

    fn handle_tldp(
        &mut self,
        io: &mut NodeIo<'_>,
        pdu: Pdu,
        port: PortId,
    ) -> Result<(), ElementError> {
        let PduBody::Tldp(message) = pdu.into_body() else {
            return Ok(());
        };
        match (message.kind, message.label) {
            (TldpKind::Request, _) => self.on_request(io, message.fec, port),
            (TldpKind::Ok, Some(label)) => self.on_granted(io, message.fec, label, port),
            (TldpKind::Ok, None) | (TldpKind::Denied, _) => self.on_denied(io, message.fec, port),
            (TldpKind::Withdraw, _) => self.withdraw(io, message.fec, port),
        }
    }

    /// Grant `op` to the upstream neighbour on `upstream`.
    fn grant(
        &mut self,
        io: &mut NodeIo<'_>,
        fec: Address,
        op: LabelOp,
        upstream: PortId,
    ) -> Result<(), ElementError> {
        let label = self.allocate_label()?;
        self.label_table.insert(label, LabelEntry { fec, op, upstream });
        self.signal(io, upstream, TldpMessage::ok(fec, label))
    }

    fn on_request(
        &mut self,
        io: &mut NodeIo<'_>,
        fec: Address,
        upstream: PortId,
    ) -> Result<(), ElementError> {
        let granted = self
            .label_table
            .iter()
            .find(|(_, entry)| entry.fec == fec && entry.upstream == upstream)
            .map(|(label, _)| *label);
        if let Some(label) = granted {
            return self.signal(io, upstream, TldpMessage::ok(fec, label));
        }

        let Some(hop) = io.next_hop(fec).filter(|hop| hop.port != upstream) else {
            return self.signal(io, upstream, TldpMessage::denied(fec));
        };

        if !io.is_in_domain(hop.neighbor) {
            // egress: the label is popped on the way out of the domain
            return self.grant(io, fec, LabelOp::Pop { port: hop.port }, upstream);
        }

        match self.fecs.get_mut(&fec) {
            Some(FecBinding {
                state: FecState::Established { label },
                port,
                ..
            }) => {
                let op = LabelOp::Swap {
                    label: *label,
                    port: *port,
                };
                self.grant(io, fec, op, upstream)
            }
            Some(binding) => {
                if !binding.waiting.contains(&upstream) {
                    binding.waiting.push(upstream);
                }
                Ok(())
            }
            None => {
                self.signal(io, hop.port, TldpMessage::request(fec))?;
                self.fecs.insert(
                    fec,
                    FecBinding {
                        port: hop.port,
                        state: FecState::Requested,
                        waiting: vec![upstream],
                    },
                );
                Ok(())
            }
        }
    }

    fn on_granted(
        &mut self,
        io: &mut NodeIo<'_>,
        fec: Address,
        label: u32,
        downstream: PortId,
    ) -> Result<(), ElementError> {
        let Some(binding) = self.fecs.get_mut(&fec) else {
            return Ok(());
        };
        if binding.port != downstream || binding.state != FecState::Requested {
            return Ok(());
        }
        binding.state = FecState::Established { label };
        let waiting = std::mem::take(&mut binding.waiting);

        debug!(node = %io.id(), %fec, label, "LSP established");
        io.emit(EventKind::LspEstablished { fec, label })?;

        for upstream in waiting {
            let op = LabelOp::Swap {
                label,
                port: downstream,
            };
            self.grant(io, fec, op, upstream)?;
        }

        for mut pdu in self.parked.remove(&fec).unwrap_or_default() {
            pdu.push_label(label);
            self.forward(io, pdu, downstream)?;
        }
        Ok(())
    }

    fn on_denied(
        &mut self,
        io: &mut NodeIo<'_>,
        fec: Address,
        downstream: PortId,
    ) -> Result<(), ElementError> {
        if !self
            .fecs
            .get(&fec)
            .is_some_and(|binding| binding.port == downstream)
        {
            return Ok(());
        }
        self.drop_binding(io, fec)
    }

    /// Forget the downstream binding of `fec`: the packets waiting for it
    /// are discarded and the upstream neighbours waiting for a label are
    /// denied.
    fn drop_binding(&mut self, io: &mut NodeIo<'_>, fec: Address) -> Result<(), ElementError> {
        let Some(binding) = self.fecs.remove(&fec) else {
            return Ok(());
        };
        for pdu in self.parked.remove(&fec).unwrap_or_default() {
            io.discard(pdu)?;
        }
        for upstream in binding.waiting {
            self.signal(io, upstream, TldpMessage::denied(fec))?;
        }
        Ok(())
    }

    /// The binding of `fec` through `downstream` is no longer valid:
    /// remove it and the labels relying on it, and tell the upstream
    /// neighbours.
    fn withdraw(
        &mut self,
        io: &mut NodeIo<'_>,
        fec: Address,
        downstream: PortId,
    ) -> Result<(), ElementError> {
        if self
            .fecs
            .get(&fec)
            .is_some_and(|binding| binding.port == downstream)
        {
            self.drop_binding(io, fec)?;
        }

        let stale: Vec<u32> = self
            .label_table
            .iter()
            .filter(|(_, entry)| entry.fec == fec && entry.op.port() == downstream)
            .map(|(label, _)| *label)
            .collect();

        let mut upstreams = BTreeSet::new();
        for label in stale {
            if let Some(entry) = self.label_table.remove(&label) {
                upstreams.insert(entry.upstream);
            }
        }
        for upstream in upstreams {
            self.signal(io, upstream, TldpMessage::withdraw(fec))?;
        }
        Ok(())
    }

    fn withdraw_port(&mut self, io: &mut NodeIo<'_>, port: PortId) -> Result<(), ElementError> {
        let fecs: BTreeSet<Address> = self
            .fecs
            .iter()
            .filter(|(_, binding)| binding.port == port)
            .map(|(fec, _)| *fec)
            .chain(
                self.label_table
                    .values()
                    .filter(|entry| entry.op.port() == port)
                    .map(|entry| entry.fec),
            )
            .collect();

        for fec in fecs {
            self.withdraw(io, fec, port)?;
        }
        Ok(())
    }

    fn handle_gpsrp(&mut self, io: &mut NodeIo<'_>, pdu: Pdu) -> Result<(), ElementError> {
        let requester = pdu.source();
        let PduBody::Gpsrp(message) = pdu.into_body() else {
            return Ok(());
        };

        match message.kind {
            GpsrpKind::RetransmissionRequest => {
                let Some(recovery) = self.recovery.as_ref() else {
                    return Ok(());
                };
                let answer = recovery.answer(message.flow, message.packet);
                debug!(
                    node = %io.id(),
                    packet = %message.packet,
                    kind = %answer.kind,
                    "answering retransmission request"
                );
                let reply = Pdu::gpsrp(io.next_pdu_id()?, io.address(), requester, answer);
                io.route(reply)
            }
            GpsrpKind::Ok => match message.recovered {
                Some(recovered) => {
                    debug!(node = %io.id(), packet = %recovered.id(), "GoS packet recovered");
                    self.handle(io, *recovered, None)
                }
                None => Ok(()),
            },
            GpsrpKind::NotPossible => Ok(()),
        }
    }
}
