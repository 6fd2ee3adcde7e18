use gossim::{
    EventKind, GosLevel, PduClass, ScenarioConfig, Simulation, SimulationError, TimeInstant,
};
use gossim_core::{
    ClockError, ElementError, EventLog,
    element::{TickContext, TickGeneration, TimerEvent, Tickable as _},
    link::LinkEnd,
    node::ConfigError,
    routing::RoutingTable,
    stats::Direction,
};
use std::{sync::Arc, time::Duration};

/// sender -> ingress LER -> core LSR -> egress LER -> receiver
fn lsp_scenario(active: bool, gos: u8) -> ScenarioConfig {
    let (ler, lsr) = if active {
        ("ActiveLER", "ActiveLSR")
    } else {
        ("LER", "LSR")
    };
    let dmgp = if active { "64#" } else { "" };
    format!(
        "\
#Timing#100#200000#
#Sender#1#sender#true#10.0.0.1#10.0.0.5#1000#{gos}#false#false#1000#
#{ler}#2#ingress#true#10.0.0.2#1024#1#4#{dmgp}
#{lsr}#3#core#true#10.0.0.3#1024#1#4#{dmgp}
#{ler}#4#egress#true#10.0.0.4#1024#1#4#{dmgp}
#Receiver#5#receiver#true#10.0.0.5#
#ExternalLink#6#access#true#1000#10.0.0.1#0#10.0.0.2#0#
#InternalLink#7#up#true#5000#10.0.0.2#1#10.0.0.3#0#
#InternalLink#8#down#true#1000#10.0.0.3#1#10.0.0.4#0#
#ExternalLink#9#exit#true#1000#10.0.0.4#1#10.0.0.5#0#
"
    )
    .parse()
    .unwrap()
}

#[test]
fn lsp_across_the_domain() {
    let mut simulation = Simulation::new(lsp_scenario(false, 0)).unwrap();
    simulation.run().unwrap();

    let receiver = simulation.node("receiver").unwrap().address();
    let ingress = simulation.node("ingress").unwrap();
    let core = simulation.node("core").unwrap();
    assert!(ingress.established_label(receiver).is_some());
    assert!(core.established_label(receiver).is_some());

    let events = simulation.events();
    let established: Vec<_> = events
        .iter()
        .filter(|event| matches!(event.kind, EventKind::LspEstablished { .. }))
        .map(|event| event.source)
        .collect();
    // the core then the ingress, the egress pops the label
    assert_eq!(established, [core.id(), ingress.id()]);

    let stats = simulation.stats();
    let core = stats.node("core").unwrap();
    assert!(
        core.inner.total(
            Direction::Incoming,
            PduClass::Mpls {
                gos: GosLevel::NONE
            }
        ) > 0
    );
    assert_eq!(
        core.inner.total(
            Direction::Incoming,
            PduClass::Ipv4 {
                gos: GosLevel::NONE
            }
        ),
        0
    );

    let receiver = stats.node("receiver").unwrap();
    assert!(receiver.incoming() > 0);
    assert_eq!(
        receiver.incoming(),
        receiver.inner.total(
            Direction::Incoming,
            PduClass::Ipv4 {
                gos: GosLevel::NONE
            }
        )
    );
    assert_eq!(stats.node("sender").unwrap().discarded(), 0);
}

#[test]
fn same_seed_same_run() {
    // identifiers are handed out in scheduling order, one worker keeps it fixed
    let run = || {
        let mut simulation = Simulation::builder(lsp_scenario(false, 0).set_seed(7))
            .set_workers(1)
            .build()
            .unwrap();
        simulation.run().unwrap();
        simulation.events()
    };
    assert_eq!(run(), run());
}

#[test]
fn gos_packet_recovered_from_upstream() {
    let mut simulation = Simulation::builder(lsp_scenario(true, 3))
        .set_workers(2)
        .build()
        .unwrap();
    let receiver = simulation.node("receiver").unwrap().address();

    // wait for a GoS packet on its way to the core once the LSP is up
    loop {
        simulation.step().unwrap().expect("the LSP never carried traffic");
        let established = simulation
            .node("ingress")
            .unwrap()
            .established_label(receiver)
            .is_some();
        let towards_core = simulation
            .link("up")
            .unwrap()
            .in_transit()
            .iter()
            .any(|entry| entry.end == LinkEnd::Tail);
        if established && towards_core {
            break;
        }
    }
    assert!(simulation.node("ingress").unwrap().dmgp_len() > 0);

    // lose what is on the link, the link is back for the next tick
    simulation.break_link("up").unwrap();
    simulation.recover_link("up").unwrap();
    simulation.run().unwrap();

    let stats = simulation.stats();
    let core = stats.node("core").unwrap().recovery();
    assert!(core.gos_lost > 0);
    assert!(core.requests_sent > 0);
    assert!(core.gos_recovered > 0);
    assert_eq!(core.gos_unrecovered, 0);

    let ingress = stats.node("ingress").unwrap().recovery();
    assert_eq!(ingress.requests_received, core.requests_sent);
    assert_eq!(ingress.retransmissions_realized, core.gos_recovered);
}

#[test]
fn breaking_a_link_discards_what_it_carries() {
    let mut simulation = Simulation::new(lsp_scenario(false, 0)).unwrap();
    while simulation.link("up").unwrap().in_transit().is_empty() {
        simulation.step().unwrap().unwrap();
    }
    simulation.events();

    let carried = simulation.link("up").unwrap().in_transit().len();
    simulation.break_link("up").unwrap();

    let events = simulation.events();
    let discarded = events
        .iter()
        .filter(|event| matches!(event.kind, EventKind::PacketDiscarded { .. }))
        .count();
    assert_eq!(discarded, carried);
    assert!(matches!(events.last().unwrap().kind, EventKind::LinkBroken));
    assert!(simulation.stats().link("up").unwrap().broken);

    // nothing crosses a broken link, whatever the routers try
    simulation.run().unwrap();
    assert!(simulation.link("up").unwrap().in_transit().is_empty());
}

#[test]
fn first_packet_waits_for_the_credit() {
    // 1 Mbps with 8µs ticks: one byte of credit per tick
    let scenario: ScenarioConfig = "\
#Timing#8000#200000#
#Sender#1#sender#true#10.0.0.1#10.0.0.3#1#0#false#false#0#
#LER#2#edge#true#10.0.0.2#1024#1#8#
#Receiver#3#receiver#true#10.0.0.3#
#ExternalLink#4#in#true#1000#10.0.0.1#0#10.0.0.2#0#
#ExternalLink#5#out#true#1000#10.0.0.2#1#10.0.0.3#0#
"
    .parse()
    .unwrap();

    let mut simulation = Simulation::new(scenario).unwrap();
    simulation.run().unwrap();

    let sender = simulation.node("sender").unwrap().id();
    let generated: Vec<TimeInstant> = simulation
        .events()
        .into_iter()
        .filter(|event| {
            event.source == sender && matches!(event.kind, EventKind::PacketGenerated { .. })
        })
        .map(|event| event.instant)
        .collect();

    // the 20 bytes of the IPv4 header take 20 ticks
    assert_eq!(generated, [TimeInstant::from_nanos(20 * 8_000)]);
}

#[test]
fn misconfigured_topology_is_rejected() {
    let scenario: ScenarioConfig = "\
#Sender#1#sender#true#10.0.0.1#10.0.0.9#100#0#false#false#100#
#LSR#2#core#true#10.0.0.2#1024#1#8#
#ExternalLink#3#in#true#0#10.0.0.1#0#10.0.0.2#0#
"
    .parse()
    .unwrap();

    let error = Simulation::new(scenario).err().unwrap();
    let SimulationError::InvalidTopology(errors) = error.downcast_ref::<SimulationError>().unwrap();
    let names: Vec<&str> = errors.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, ["sender", "in"]);
}

#[test]
fn oversized_port_count_is_a_config_error() {
    let scenario: ScenarioConfig = "#LSR#1#core#true#10.0.0.2#1024#1#4000000000000#"
        .parse()
        .unwrap();

    let error = Simulation::new(scenario).err().unwrap();
    let SimulationError::InvalidTopology(errors) = error.downcast_ref::<SimulationError>().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, "core");
    assert!(matches!(
        errors[0].1,
        ConfigError::PortCountOutOfRange {
            count: 4_000_000_000_000,
            ..
        }
    ));
}

#[test]
fn a_failing_element_aborts_the_run() {
    let mut simulation = Simulation::new(lsp_scenario(false, 0)).unwrap();

    // the receiver handles the first tick on its own
    let routes = RoutingTable::default();
    let ctx = TickContext {
        timer: TimerEvent {
            generation: TickGeneration::ZERO.next(),
            tick_duration: Duration::from_nanos(100),
            upper_limit: TimeInstant::from_nanos(100),
        },
        topology: simulation.topology(),
        routes: &routes,
    };
    let receiver = simulation.node("receiver").unwrap();
    receiver.receive_timer_event(&ctx).unwrap();
    let receiver = receiver.id();

    let error = simulation.step().unwrap_err();
    match error.downcast_ref::<ClockError>() {
        Some(ClockError::ElementFailed {
            element,
            source: ElementError::StaleTick { .. },
        }) => assert_eq!(*element, receiver),
        other => panic!("unexpected {other:?}"),
    }

    let error = simulation.run().unwrap_err();
    assert!(matches!(
        error.downcast_ref::<ClockError>(),
        Some(ClockError::Aborted)
    ));

    simulation.reset();
    simulation.run().unwrap();
}

#[test]
fn one_sink_per_element() {
    let log = Arc::new(EventLog::new());
    let simulation = Simulation::builder(lsp_scenario(false, 0))
        .set_sink(log.clone())
        .build()
        .unwrap();

    assert!(
        simulation
            .topology()
            .subscribe_all(Arc::new(EventLog::new()))
            .is_err()
    );
    assert!(simulation.events().is_empty());
}
