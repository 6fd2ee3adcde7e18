//! Typed description of a simulation run.
//!
//! A [`ScenarioConfig`] is either built in code with its setters or read
//! from the textual `#`-record format (see [`record`]).

pub mod record;

use self::record::{Record, parse_records};
use anyhow::{Result, bail, ensure};
use gossim_core::{
    defaults::{DEFAULT_DURATION, DEFAULT_SEED, DEFAULT_STEP},
    link::LinkConfig,
    node::NodeConfig,
};
use std::{collections::BTreeSet, fmt, str::FromStr, time::Duration};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioConfig {
    /// simulated time covered by one tick
    pub step: Duration,
    /// simulated time covered by the whole run
    pub duration: Duration,
    /// seed of the random generators of the senders
    pub seed: u64,

    pub nodes: Vec<NodeConfig>,
    pub links: Vec<LinkConfig>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            step: DEFAULT_STEP,
            duration: DEFAULT_DURATION,
            seed: DEFAULT_SEED,
            nodes: Vec::new(),
            links: Vec::new(),
        }
    }
}

impl ScenarioConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_step(mut self, step: Duration) -> Self {
        self.step = step;
        self
    }

    pub fn set_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn add_node(mut self, node: NodeConfig) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn add_link(mut self, link: LinkConfig) -> Self {
        self.links.push(link);
        self
    }

    /// Read a scenario from its `#`-records.
    ///
    /// The timing record is optional, the defaults apply without it. The
    /// record identifiers must be unique but are otherwise not kept: the
    /// topology numbers its elements in the order of the records.
    pub fn from_records(text: &str) -> Result<Self> {
        let mut scenario = Self::default();
        let mut timing = false;
        let mut ids = BTreeSet::new();

        for record in parse_records(text)? {
            match record {
                Record::Timing { step, duration } => {
                    ensure!(!timing, "The timing is given more than once");
                    timing = true;
                    scenario.step = step;
                    scenario.duration = duration;
                }
                Record::Node { id, config } => {
                    if !ids.insert(id) {
                        bail!("The record identifier {id} is used more than once");
                    }
                    scenario.nodes.push(config);
                }
                Record::Link { id, config } => {
                    if !ids.insert(id) {
                        bail!("The record identifier {id} is used more than once");
                    }
                    scenario.links.push(config);
                }
            }
        }

        Ok(scenario)
    }

    /// The records of this scenario, numbered from 1, nodes first.
    pub fn to_records(&self) -> Vec<Record> {
        let timing = Record::Timing {
            step: self.step,
            duration: self.duration,
        };
        let mut records = vec![timing];
        let mut id = 0;
        for config in &self.nodes {
            id += 1;
            records.push(Record::Node {
                id,
                config: config.clone(),
            });
        }
        for config in &self.links {
            id += 1;
            records.push(Record::Link {
                id,
                config: config.clone(),
            });
        }
        records
    }
}

impl FromStr for ScenarioConfig {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_records(s)
    }
}

impl fmt::Display for ScenarioConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for record in self.to_records() {
            writeln!(f, "{record}")?;
        }
        Ok(())
    }
}
