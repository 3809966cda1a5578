//! Topology graph
//!
//! Nodes and directed links live in arenas; an undirected connection is two
//! `Link` records addressed by their ordered (source, target) pair.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use telemetry::Node;
use tracing::warn;

use crate::config::{QosConfig, SimConfig};
use crate::error::{Result, SimError};
use crate::link::Link;

pub type LinkId = usize;

#[derive(Debug, Clone)]
pub struct Topology {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    links: Vec<Link>,
    by_pair: HashMap<(usize, usize), LinkId>,
    adjacency: Vec<Vec<usize>>,
    params: QosConfig,
    history_len: usize,
}

impl Topology {
    pub fn new(nodes: Vec<Node>, params: QosConfig, history_len: usize) -> Self {
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();
        let adjacency = vec![Vec::new(); nodes.len()];
        Self {
            nodes,
            index,
            links: Vec::new(),
            by_pair: HashMap::new(),
            adjacency,
            params,
            history_len,
        }
    }

    /// Build nodes and both directions of every configured link
    pub fn from_config(config: &SimConfig, now: Duration) -> Result<Self> {
        let mut topology = Self::new(config.topology.nodes.clone(), config.qos, config.history_len);
        for entry in &config.topology.links {
            topology
                .add_link(&entry.a, &entry.b, entry.capacity, entry.base_latency_ms, now)
                .ok_or_else(|| SimError::UnknownNode(format!("{} or {}", entry.a, entry.b)))?;
        }
        Ok(topology)
    }

    /// Create a→b and b→a. Returns `None` when either endpoint is unknown.
    pub fn add_link(
        &mut self,
        a: &str,
        b: &str,
        capacity: f64,
        base_latency: f64,
        now: Duration,
    ) -> Option<(LinkId, LinkId)> {
        let (Some(ia), Some(ib)) = (self.node_index(a), self.node_index(b)) else {
            warn!(a, b, "link endpoint is not a node");
            return None;
        };

        let (params, history_len) = (self.params, self.history_len);
        let forward = self.insert(
            ia,
            ib,
            Link::new(a, b, capacity, base_latency, params, history_len, now),
        );
        let backward = self.insert(
            ib,
            ia,
            Link::new(b, a, capacity, base_latency, params, history_len, now),
        );
        if !self.adjacency[ia].contains(&ib) {
            self.adjacency[ia].push(ib);
            self.adjacency[ib].push(ia);
        }
        Some((forward, backward))
    }

    fn insert(&mut self, from: usize, to: usize, link: Link) -> LinkId {
        match self.by_pair.get(&(from, to)) {
            Some(&id) => {
                self.links[id] = link;
                id
            }
            None => {
                self.links.push(link);
                let id = self.links.len() - 1;
                self.by_pair.insert((from, to), id);
                id
            }
        }
    }

    fn node_index(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn links_mut(&mut self) -> &mut [Link] {
        &mut self.links
    }

    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(id)
    }

    pub fn link_mut(&mut self, id: LinkId) -> Option<&mut Link> {
        self.links.get_mut(id)
    }

    /// Directed link id for source → target
    pub fn link_between(&self, source: &str, target: &str) -> Option<LinkId> {
        let key = (self.node_index(source)?, self.node_index(target)?);
        self.by_pair.get(&key).copied()
    }

    /// Minimum-hop path by breadth-first search, ignoring capacity and latency
    pub fn shortest_path(&self, start: &str, end: &str) -> Option<Vec<String>> {
        let from = self.node_index(start)?;
        let to = self.node_index(end)?;

        let mut parent: Vec<Option<usize>> = vec![None; self.nodes.len()];
        let mut visited = vec![false; self.nodes.len()];
        let mut queue = VecDeque::new();
        visited[from] = true;
        queue.push_back(from);

        while let Some(node) = queue.pop_front() {
            if node == to {
                let mut path = vec![to];
                let mut cur = to;
                while let Some(prev) = parent[cur] {
                    path.push(prev);
                    cur = prev;
                }
                path.reverse();
                return Some(path.into_iter().map(|i| self.nodes[i].id.clone()).collect());
            }
            for &next in &self.adjacency[node] {
                if !visited[next] {
                    visited[next] = true;
                    parent[next] = Some(node);
                    queue.push_back(next);
                }
            }
        }
        None
    }

    /// Directed links along a node path, in travel order
    pub fn path_links(&self, path: &[String]) -> Vec<LinkId> {
        path.windows(2)
            .filter_map(|hop| self.link_between(&hop[0], &hop[1]))
            .collect()
    }
}
