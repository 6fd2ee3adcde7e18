use gossim_core::{
    Address, Clock, EventKind, EventLog, Topology,
    link::{LinkConfig, LinkEndpoint, LinkKind},
    node::{NodeConfig, PortId, RouterConfig, SenderConfig},
    pdu::GosLevel,
    stats::Direction,
};
use std::{sync::Arc, time::Duration};

fn main() -> anyhow::Result<()> {
    let sender: Address = "10.0.0.1".parse()?;
    let ingress: Address = "10.0.0.2".parse()?;
    let core: Address = "10.0.0.3".parse()?;
    let egress: Address = "10.0.0.4".parse()?;
    let receiver: Address = "10.0.0.5".parse()?;

    let mut topology = Topology::with_seed(42);
    topology.add_node(NodeConfig::sender(
        "sender",
        sender,
        SenderConfig::new(receiver)
            .set_rate("100mbps".parse()?)
            .set_gos(GosLevel::MAX),
    ));
    topology.add_node(NodeConfig::ler("ingress", ingress, RouterConfig::default()));
    topology.add_node(NodeConfig::lsr("core", core, RouterConfig::default()));
    topology.add_node(NodeConfig::ler("egress", egress, RouterConfig::default()));
    topology.add_node(NodeConfig::receiver("receiver", receiver));

    let hops = [
        (sender, ingress, LinkKind::External),
        (ingress, core, LinkKind::Internal),
        (core, egress, LinkKind::Internal),
        (egress, receiver, LinkKind::External),
    ];
    for (index, (head, tail, kind)) in hops.into_iter().enumerate() {
        let head_port = if index == 0 { 0 } else { 1 };
        topology.add_link(
            LinkConfig::new(
                format!("{head}-{tail}"),
                kind,
                LinkEndpoint::new(head, PortId::new(head_port)),
                LinkEndpoint::new(tail, PortId::new(0)),
            )
            .set_delay("2us".parse()?),
        );
    }

    let errors = topology.validate();
    anyhow::ensure!(errors.is_empty(), "invalid topology: {errors:?}");

    let log = Arc::new(EventLog::new());
    topology.subscribe_all(log.clone())?;

    let mut clock = Clock::new(Duration::from_nanos(500), Duration::from_micros(500), 2)?;
    let ticks = clock.run_until_finished(&topology)?;

    for event in log.drain() {
        if let EventKind::LspEstablished { fec, label } = event.kind {
            println!("[{}] {}: LSP to {fec} on label {label}", event.instant, event.source);
        }
    }

    let stats = topology
        .node_by_address(receiver)
        .map(|node| node.stats().total_by_direction(Direction::Incoming))
        .unwrap_or_default();
    println!("{ticks} ticks, {stats} packets received");

    Ok(())
}
