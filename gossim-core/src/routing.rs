//! Hop by hop routing.
//!
//! The [`RoutingTable`] holds, for every node, the first hop of the
//! shortest path to every reachable address. Paths are weighted with
//! [`Routable::routing_weight`] and only go through routers: senders and
//! receivers are the ends of a path, never a step in the middle of one.

use crate::{
    element::{ElementId, Routable as _},
    node::PortId,
    pdu::Address,
    topology::Topology,
};
use std::{
    cmp::Reverse,
    collections::{BTreeMap, BinaryHeap},
};
use tracing::trace;

/// Where to send a packet next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hop {
    /// the port of the current node to send the packet on
    pub port: PortId,
    /// the node at the other end of the link
    pub neighbor: ElementId,
    pub link: ElementId,
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    hop: Hop,
    weight: u64,
}

#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    routes: BTreeMap<ElementId, BTreeMap<Address, Hop>>,
}

impl RoutingTable {
    /// Shortest paths over every link of `topology` that is not broken.
    pub fn compute(topology: &Topology) -> Self {
        let mut adjacency: BTreeMap<ElementId, Vec<Edge>> = BTreeMap::new();
        for link in topology.links() {
            let Some(weight) = link.routing_weight() else {
                continue;
            };
            let (Some(head), Some(tail)) = (
                link.node_at(crate::link::LinkEnd::Head),
                link.node_at(crate::link::LinkEnd::Tail),
            ) else {
                continue;
            };
            let config = link.config();
            adjacency.entry(head).or_default().push(Edge {
                hop: Hop {
                    port: config.head.port,
                    neighbor: tail,
                    link: link.id(),
                },
                weight,
            });
            adjacency.entry(tail).or_default().push(Edge {
                hop: Hop {
                    port: config.tail.port,
                    neighbor: head,
                    link: link.id(),
                },
                weight,
            });
        }

        let mut routes = BTreeMap::new();
        for node in topology.nodes() {
            let first_hops = shortest_paths(topology, &adjacency, node.id());
            let by_address = first_hops
                .into_iter()
                .filter_map(|(id, hop)| topology.node(id).map(|node| (node.address(), hop)))
                .collect();
            routes.insert(node.id(), by_address);
        }

        trace!(nodes = routes.len(), "routing table computed");
        Self { routes }
    }

    /// The first hop from `from` towards `to`.
    pub fn next_hop(&self, from: ElementId, to: Address) -> Option<Hop> {
        self.routes.get(&from)?.get(&to).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.values().all(BTreeMap::is_empty)
    }
}

/// Dijkstra from `source`, returning the first hop to every reachable
/// node.
fn shortest_paths(
    topology: &Topology,
    adjacency: &BTreeMap<ElementId, Vec<Edge>>,
    source: ElementId,
) -> BTreeMap<ElementId, Hop> {
    let mut distances: BTreeMap<ElementId, u64> = BTreeMap::new();
    let mut first_hops: BTreeMap<ElementId, Hop> = BTreeMap::new();
    let mut queue = BinaryHeap::new();

    distances.insert(source, 0);
    queue.push(Reverse((0u64, source)));

    while let Some(Reverse((distance, node))) = queue.pop() {
        if distances.get(&node).is_some_and(|known| *known < distance) {
            continue;
        }
        let transit = node == source
            || topology
                .node(node)
                .is_some_and(|node| node.role().in_domain());
        if !transit {
            continue;
        }

        for edge in adjacency.get(&node).into_iter().flatten() {
            let next = edge.hop.neighbor;
            let candidate = distance.saturating_add(edge.weight);
            if distances.get(&next).is_some_and(|known| *known <= candidate) {
                continue;
            }
            distances.insert(next, candidate);
            let hop = if node == source {
                edge.hop
            } else {
                let Some(hop) = first_hops.get(&node).copied() else {
                    continue;
                };
                hop
            };
            first_hops.insert(next, hop);
            queue.push(Reverse((candidate, next)));
        }
    }

    first_hops.remove(&source);
    first_hops
}
