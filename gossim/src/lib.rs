/*!
# GoS label switching network simulator

Reads a scenario, either built in code with [`ScenarioConfig`] or from
its textual `#`-records, assembles and validates the topology and runs
it with the [`gossim_core`] engine.

```
use gossim::{ScenarioConfig, Simulation};

let scenario: ScenarioConfig = "\
#Timing#100#20000#
#Sender#1#sender#true#10.0.0.1#10.0.0.3#1000#0#false#false#500#
#LER#2#edge#true#10.0.0.2#1024#1#8#
#Receiver#3#receiver#true#10.0.0.3#
#ExternalLink#4#in#true#1000#10.0.0.1#0#10.0.0.2#0#
#ExternalLink#5#out#true#1000#10.0.0.2#1#10.0.0.3#0#
"
.parse()
.unwrap();

let mut simulation = Simulation::new(scenario).unwrap();
simulation.run().unwrap();

let stats = simulation.stats();
assert!(stats.node("receiver").unwrap().incoming() > 0);
```
*/

pub mod scenario;
mod simulation;
pub mod stats;

// convenient re-export of `gossim_core` core objects
pub use gossim_core::{
    Address, BitRate, ElementId, EventKind, EventSink, LinkDelay, PduClass, SimulationEvent,
    TickReport, TimeInstant,
    link::{LinkConfig, LinkEndpoint, LinkKind},
    node::{NodeConfig, PayloadMode, PortId, RouterConfig, SenderConfig},
    pdu::GosLevel,
};

pub use self::{
    scenario::ScenarioConfig,
    simulation::{Simulation, SimulationBuilder, SimulationError},
    stats::{LinkStats, NodeStats, SimStats},
};
