use crate::{
    scenario::ScenarioConfig,
    stats::{LinkStats, NodeStats, SimStats},
};
use anyhow::{Context as _, Result, anyhow};
use gossim_core::{
    Clock, ElementId, EventLog, EventSink, Link, Node, SimulationEvent, TickReport, TimeInstant,
    Topology, node::ConfigError,
};
use std::{collections::HashMap, fmt, sync::Arc};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("The topology has {} misconfigured element(s): {}", .0.len(), ConfigErrors(.0))]
    InvalidTopology(Vec<(String, ConfigError)>),
}

struct ConfigErrors<'a>(&'a [(String, ConfigError)]);

impl fmt::Display for ConfigErrors<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, (name, error)) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{name}: {error}")?;
        }
        Ok(())
    }
}

/// Builder for a [`Simulation`].
///
/// Obtained via [`Simulation::builder`]. By default every event is kept
/// in memory (see [`Simulation::events`]) and the element jobs run on one
/// worker thread per core.
pub struct SimulationBuilder {
    scenario: ScenarioConfig,
    workers: usize,
    sink: Option<Arc<dyn EventSink>>,
}

impl SimulationBuilder {
    /// Number of worker threads running the element jobs, `0` for one
    /// per core.
    pub fn set_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Publish the events to `sink` instead of keeping them in memory.
    pub fn set_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Assemble and validate the topology.
    pub fn build(self) -> Result<Simulation> {
        let Self {
            scenario,
            workers,
            sink,
        } = self;

        let mut topology = Topology::with_seed(scenario.seed);
        let mut names = HashMap::new();
        for node in scenario.nodes.iter().cloned() {
            let name = node.name.clone();
            let id = topology.add_node(node);
            names.entry(name).or_insert(id);
        }
        for link in scenario.links.iter().cloned() {
            let name = link.name.clone();
            let id = topology.add_link(link);
            names.entry(name).or_insert(id);
        }

        let errors = topology.validate();
        if !errors.is_empty() {
            let errors = errors
                .into_iter()
                .map(|(id, error)| (element_name(&topology, id), error))
                .collect();
            return Err(SimulationError::InvalidTopology(errors).into());
        }

        let log = match sink {
            Some(sink) => {
                topology.subscribe_all(sink)?;
                None
            }
            None => {
                let log = Arc::new(EventLog::new());
                topology.subscribe_all(log.clone())?;
                Some(log)
            }
        };

        let clock = Clock::new(scenario.step, scenario.duration, workers)
            .context("Failed to set up the clock")?;

        info!(
            nodes = scenario.nodes.len(),
            links = scenario.links.len(),
            step = ?scenario.step,
            duration = ?scenario.duration,
            "simulation ready"
        );

        Ok(Simulation {
            scenario,
            topology,
            clock,
            names,
            log,
        })
    }
}

fn element_name(topology: &Topology, id: ElementId) -> String {
    topology
        .node(id)
        .map(|node| node.name().to_owned())
        .or_else(|| topology.link(id).map(|link| link.name().to_owned()))
        .unwrap_or_else(|| id.to_string())
}

/// A validated topology and the clock driving it.
pub struct Simulation {
    scenario: ScenarioConfig,
    topology: Topology,
    clock: Clock,
    names: HashMap<String, ElementId>,
    log: Option<Arc<EventLog>>,
}

impl Simulation {
    pub fn builder(scenario: ScenarioConfig) -> SimulationBuilder {
        SimulationBuilder {
            scenario,
            workers: 0,
            sink: None,
        }
    }

    pub fn new(scenario: ScenarioConfig) -> Result<Self> {
        Self::builder(scenario).build()
    }

    pub fn scenario(&self) -> &ScenarioConfig {
        &self.scenario
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn now(&self) -> TimeInstant {
        self.clock.now()
    }

    pub fn is_finished(&self) -> bool {
        self.clock.is_finished()
    }

    pub fn node(&self, name: &str) -> Option<&Arc<Node>> {
        self.names.get(name).and_then(|id| self.topology.node(*id))
    }

    pub fn link(&self, name: &str) -> Option<&Arc<Link>> {
        self.names.get(name).and_then(|id| self.topology.link(*id))
    }

    /// Run a single tick, `None` once the scenario's duration is reached.
    pub fn step(&mut self) -> Result<Option<TickReport>> {
        self.clock
            .tick(&self.topology)
            .with_context(|| format!("Simulation aborted at {}", self.clock.now()))
    }

    /// Run until the scenario's duration is reached, returning the number
    /// of ticks executed.
    pub fn run(&mut self) -> Result<u64> {
        let ticks = self
            .clock
            .run_until_finished(&self.topology)
            .with_context(|| format!("Simulation aborted at {}", self.clock.now()))?;
        info!(ticks, now = %self.clock.now(), "simulation finished");
        Ok(ticks)
    }

    fn link_id(&self, name: &str) -> Result<ElementId> {
        self.link(name)
            .map(|link| link.id())
            .ok_or_else(|| anyhow!("No link named {name:?}"))
    }

    /// Break the link `name` before the next tick. The packets it was
    /// carrying are lost.
    pub fn break_link(&self, name: &str) -> Result<()> {
        let id = self.link_id(name)?;
        debug!(link = name, now = %self.now(), "breaking");
        self.topology
            .set_link_broken(id, true)
            .with_context(|| format!("Failed to break the link {name:?}"))
    }

    pub fn recover_link(&self, name: &str) -> Result<()> {
        let id = self.link_id(name)?;
        debug!(link = name, now = %self.now(), "recovering");
        self.topology
            .set_link_broken(id, false)
            .with_context(|| format!("Failed to recover the link {name:?}"))
    }

    pub fn stats(&self) -> SimStats {
        SimStats {
            instant: self.clock.now(),
            nodes: self.topology.nodes().map(|node| NodeStats::new(node)).collect(),
            links: self.topology.links().map(|link| LinkStats::new(link)).collect(),
        }
    }

    /// Take the events published since the last call, in order. Always
    /// empty when the events go to a sink given to the builder.
    pub fn events(&self) -> Vec<SimulationEvent> {
        self.log
            .as_ref()
            .map(|log| log.drain())
            .unwrap_or_default()
    }

    /// Back to time zero with the same topology.
    pub fn reset(&mut self) {
        self.clock.reset();
        self.topology.reset();
        if let Some(log) = &self.log {
            log.drain();
        }
        debug!("simulation reset");
    }
}
