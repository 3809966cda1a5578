//! Traffic generation
//!
//! Every tick each link gets a background mixture from the active
//! [`Workload`]. On top of that, mesh flows follow shortest paths between
//! random sites, and in DDOS mode the compromised devices flood the core.

use rand::seq::index::sample;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use telemetry::TrafficMode;
use tracing::warn;

use crate::link::Link;
use crate::topology::{LinkId, Topology};
use crate::traffic::{Flow, TrafficClass};

/// Light background mixture offered to every link, (class, min, max) Mbps
const BACKGROUND: [(TrafficClass, f64, f64); 8] = [
    (TrafficClass::Voip, 2.0, 10.0),
    (TrafficClass::Emr, 5.0, 30.0),
    (TrafficClass::Dns, 0.5, 2.0),
    (TrafficClass::Ntp, 0.1, 0.5),
    (TrafficClass::Dicom, 5.0, 40.0),
    (TrafficClass::Iot, 1.0, 5.0),
    (TrafficClass::Http, 5.0, 30.0),
    (TrafficClass::Guest, 2.0, 15.0),
];

/// Probability that a mesh flow is injected in a tick
pub const MESH_PROBABILITY: f64 = 0.6;
/// Links receiving a bulk burst in CONGESTED mode
pub const BURST_LINKS: usize = 4;
/// Flood rate carried along each compromised device's path to the core
pub const ATTACK_RATE: f64 = 4000.0;

fn offer_background(link: &mut Link, scale: f64, rng: &mut dyn RngCore) {
    for (class, lo, hi) in BACKGROUND {
        link.offer(Flow::new(class, rng.gen_range(lo..hi) * scale));
    }
}

/// Per-mode background traffic
pub trait Workload {
    fn mode(&self) -> TrafficMode;

    /// Offer this tick's background flows
    fn offer(&mut self, links: &mut [Link], rng: &mut dyn RngCore);

    /// Size of one mesh flow
    fn mesh_rate(&self, rng: &mut dyn RngCore) -> f64 {
        rng.gen_range(20.0..60.0)
    }
}

/// Light background everywhere
#[derive(Debug, Default)]
pub struct NormalWorkload;

impl Workload for NormalWorkload {
    fn mode(&self) -> TrafficMode {
        TrafficMode::Normal
    }

    fn offer(&mut self, links: &mut [Link], rng: &mut dyn RngCore) {
        for link in links {
            offer_background(link, 1.0, rng);
        }
    }
}

/// Heavier legitimate demand plus bulk bursts on a few links
#[derive(Debug)]
pub struct CongestedWorkload {
    scale_range: (f64, f64),
    burst_share: (f64, f64), // burst size as a share of link capacity
}

impl CongestedWorkload {
    pub fn new() -> Self {
        Self {
            scale_range: (1.2, 1.8),
            burst_share: (0.6, 0.9),
        }
    }
}

impl Default for CongestedWorkload {
    fn default() -> Self {
        Self::new()
    }
}

impl Workload for CongestedWorkload {
    fn mode(&self) -> TrafficMode {
        TrafficMode::Congested
    }

    fn offer(&mut self, links: &mut [Link], rng: &mut dyn RngCore) {
        // one factor for the whole network this tick
        let scale = rng.gen_range(self.scale_range.0..self.scale_range.1);
        for link in links.iter_mut() {
            offer_background(link, scale, rng);
        }

        let picks = BURST_LINKS.min(links.len());
        for idx in sample(rng, links.len(), picks) {
            let link = &mut links[idx];
            let share = rng.gen_range(self.burst_share.0..self.burst_share.1);
            link.offer(Flow::new(TrafficClass::Bulk, link.capacity * share));
        }
    }

    fn mesh_rate(&self, rng: &mut dyn RngCore) -> f64 {
        2.0 * rng.gen_range(20.0..60.0)
    }
}

/// Light background under a flood on every link
#[derive(Debug)]
pub struct DdosWorkload {
    flood_share: (f64, f64), // flood size as a share of link capacity
}

impl DdosWorkload {
    pub fn new() -> Self {
        Self {
            flood_share: (0.5, 1.0),
        }
    }
}

impl Default for DdosWorkload {
    fn default() -> Self {
        Self::new()
    }
}

impl Workload for DdosWorkload {
    fn mode(&self) -> TrafficMode {
        TrafficMode::Ddos
    }

    fn offer(&mut self, links: &mut [Link], rng: &mut dyn RngCore) {
        for link in links {
            offer_background(link, 1.0, rng);
            let share = rng.gen_range(self.flood_share.0..self.flood_share.1);
            link.offer(Flow::new(TrafficClass::Ddos, link.capacity * share));
        }
    }
}

pub fn workload_for(mode: TrafficMode) -> Box<dyn Workload> {
    match mode {
        TrafficMode::Normal => Box::new(NormalWorkload),
        TrafficMode::Congested => Box::new(CongestedWorkload::new()),
        TrafficMode::Ddos => Box::new(DdosWorkload::new()),
    }
}

/// Populates every link's offered flows for the current tick
pub struct TrafficGenerator {
    workload: Box<dyn Workload>,
    core_node: String,
    attack_sources: Vec<String>,
}

impl TrafficGenerator {
    pub fn new(core_node: &str, attack_sources: Vec<String>) -> Self {
        Self {
            workload: workload_for(TrafficMode::Normal),
            core_node: core_node.to_string(),
            attack_sources,
        }
    }

    pub fn mode(&self) -> TrafficMode {
        self.workload.mode()
    }

    pub fn set_mode(&mut self, mode: TrafficMode) {
        if mode != self.mode() {
            self.workload = workload_for(mode);
        }
    }

    pub fn generate(&mut self, topology: &mut Topology, rng: &mut dyn RngCore) {
        for link in topology.links_mut() {
            link.clear_offered();
        }

        self.workload.offer(topology.links_mut(), rng);

        if rng.gen_bool(MESH_PROBABILITY) {
            self.inject_mesh(topology, rng);
        }

        if self.mode() == TrafficMode::Ddos {
            self.inject_attack(topology);
        }
    }

    fn inject_mesh(&self, topology: &mut Topology, rng: &mut dyn RngCore) {
        let ids: Vec<String> = topology.nodes().iter().map(|n| n.id.clone()).collect();
        if ids.len() < 2 {
            return;
        }
        let pair: Vec<&String> = ids.choose_multiple(rng, 2).collect();
        let rate = self.workload.mesh_rate(rng);
        if route_flow(topology, pair[0], pair[1], Flow::new(TrafficClass::General, rate)).is_none() {
            warn!(src = %pair[0], dst = %pair[1], "no mesh route");
        }
    }

    fn inject_attack(&self, topology: &mut Topology) {
        for source in &self.attack_sources {
            if *source == self.core_node {
                continue;
            }
            let flood = Flow::new(TrafficClass::Ddos, ATTACK_RATE);
            if route_flow(topology, source, &self.core_node, flood).is_none() {
                warn!(%source, core = %self.core_node, "attack source cannot reach core");
            }
        }
    }
}

/// Offer `flow` on every directed link of the shortest path from `from` to
/// `to`. Returns the links used in travel order, or `None` when unroutable.
pub fn route_flow(topology: &mut Topology, from: &str, to: &str, flow: Flow) -> Option<Vec<LinkId>> {
    let path = topology.shortest_path(from, to)?;
    let ids = topology.path_links(&path);
    for &id in &ids {
        if let Some(link) = topology.link_mut(id) {
            link.offer(flow);
        }
    }
    Some(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::time::Duration;

    fn setup() -> (Topology, TrafficGenerator) {
        let config = SimConfig::default();
        let topology = Topology::from_config(&config, Duration::ZERO).unwrap();
        let sources = config.threat_sources.iter().map(|s| s.node.clone()).collect();
        let generator = TrafficGenerator::new(&config.topology.core_node, sources);
        (topology, generator)
    }

    fn has(link: &Link, class: TrafficClass) -> bool {
        link.offered().iter().any(|f| f.class == class)
    }

    #[test]
    fn test_normal_offers_background_everywhere() {
        let (mut topology, mut generator) = setup();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        generator.generate(&mut topology, &mut rng);

        for link in topology.links() {
            assert!(link.offered().len() >= BACKGROUND.len());
            assert!(!has(link, TrafficClass::Ddos));
            assert!(!has(link, TrafficClass::Bulk));
        }
    }

    #[test]
    fn test_flows_are_regenerated_each_tick() {
        let (mut topology, mut generator) = setup();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        generator.set_mode(TrafficMode::Ddos);
        generator.generate(&mut topology, &mut rng);
        generator.set_mode(TrafficMode::Normal);
        generator.generate(&mut topology, &mut rng);

        assert!(topology.links().iter().all(|l| !has(l, TrafficClass::Ddos)));
    }

    #[test]
    fn test_congested_bursts_four_links() {
        let (mut topology, mut generator) = setup();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        generator.set_mode(TrafficMode::Congested);
        generator.generate(&mut topology, &mut rng);

        let bursting: Vec<&Link> = topology
            .links()
            .iter()
            .filter(|l| has(l, TrafficClass::Bulk))
            .collect();
        assert_eq!(bursting.len(), BURST_LINKS);
        for link in bursting {
            let bulk: f64 = link
                .offered()
                .iter()
                .filter(|f| f.class == TrafficClass::Bulk)
                .map(|f| f.rate)
                .sum();
            assert!(bulk >= link.capacity * 0.6 && bulk < link.capacity * 0.9);
        }
    }

    #[test]
    fn test_ddos_floods_every_link_and_attack_paths() {
        let (mut topology, mut generator) = setup();
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        generator.set_mode(TrafficMode::Ddos);
        generator.generate(&mut topology, &mut rng);

        assert!(topology.links().iter().all(|l| has(l, TrafficClass::Ddos)));

        // Public-Wifi -> Admin -> Server Room carries a full attack flow
        for (a, b) in [("Public-Wifi", "Admin"), ("Admin", "Server Room")] {
            let link = topology.link(topology.link_between(a, b).unwrap()).unwrap();
            assert!(link
                .offered()
                .iter()
                .any(|f| f.class == TrafficClass::Ddos && f.rate == ATTACK_RATE));
        }
        // the reverse direction only carries the per-link flood
        let back = topology
            .link(topology.link_between("Admin", "Public-Wifi").unwrap())
            .unwrap();
        assert!(back.offered().iter().all(|f| f.rate < ATTACK_RATE));
    }

    #[test]
    fn test_mesh_frequency() {
        let (mut topology, mut generator) = setup();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut ticks_with_mesh = 0;
        for _ in 0..200 {
            generator.generate(&mut topology, &mut rng);
            if topology.links().iter().any(|l| has(l, TrafficClass::General)) {
                ticks_with_mesh += 1;
            }
        }
        assert!((90..=150).contains(&ticks_with_mesh), "got {ticks_with_mesh}");
    }

    #[test]
    fn test_mesh_rate_doubles_when_congested() {
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        for _ in 0..50 {
            let normal = NormalWorkload.mesh_rate(&mut rng);
            let congested = CongestedWorkload::new().mesh_rate(&mut rng);
            assert!((20.0..60.0).contains(&normal));
            assert!((40.0..120.0).contains(&congested));
        }
    }

    #[test]
    fn test_set_mode() {
        let (_, mut generator) = setup();
        assert_eq!(generator.mode(), TrafficMode::Normal);
        generator.set_mode(TrafficMode::Congested);
        assert_eq!(generator.mode(), TrafficMode::Congested);
    }

    #[test]
    fn test_mesh_follows_directed_path() {
        let (mut topology, _) = setup();
        let flow = Flow::new(TrafficClass::General, 40.0);
        let used = route_flow(&mut topology, "Public-Wifi", "OT-1", flow).unwrap();

        let path = topology.shortest_path("Public-Wifi", "OT-1").unwrap();
        assert_eq!(used, topology.path_links(&path));
        assert_eq!(used.len(), path.len() - 1);
        // consecutive hops chain source -> target
        for (hop, pair) in used.iter().zip(path.windows(2)) {
            let link = topology.link(*hop).unwrap();
            assert_eq!(link.source, pair[0]);
            assert_eq!(link.target, pair[1]);
        }

        let carrying: Vec<LinkId> = (0..topology.links().len())
            .filter(|&id| has(topology.link(id).unwrap(), TrafficClass::General))
            .collect();
        let mut expected = used.clone();
        expected.sort_unstable();
        assert_eq!(carrying, expected);
    }

    #[test]
    fn test_route_flow_unreachable() {
        let (mut topology, _) = setup();
        let flow = Flow::new(TrafficClass::General, 40.0);
        assert!(route_flow(&mut topology, "Public-Wifi", "Mars", flow).is_none());
        assert!(topology.links().iter().all(|l| l.offered().is_empty()));
    }

    #[test]
    fn test_generated_mesh_links_form_a_chain() {
        let (mut topology, mut generator) = setup();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..50 {
            generator.generate(&mut topology, &mut rng);
            let carrying: Vec<&Link> = topology
                .links()
                .iter()
                .filter(|l| has(l, TrafficClass::General))
                .collect();
            if carrying.is_empty() {
                continue;
            }
            // a simple path has exactly one start: a source no hop arrives at
            let starts: Vec<&&Link> = carrying
                .iter()
                .filter(|l| !carrying.iter().any(|o| o.target == l.source))
                .collect();
            assert_eq!(starts.len(), 1);
            let mut at = starts[0].source.clone();
            for _ in 0..carrying.len() {
                let next = carrying.iter().find(|l| l.source == at).unwrap();
                at = next.target.clone();
            }
            assert!(carrying.iter().all(|l| l.source != at));
        }
    }
}
