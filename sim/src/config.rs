//! Simulation configuration
//!
//! The default configuration is a private hospital WAN: a basement data
//! center, three floors of departments, and four internal devices that act
//! as attack sources when the DDOS mode is selected.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use telemetry::{DeviceClass, Node, Position};

use crate::error::{Result, SimError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub seed: Option<u64>,      // None draws from OS entropy
    pub tick_rate_hz: u32,
    pub history_len: usize,     // load samples kept per link
    pub alert_log_cap: usize,
    pub alert_tail: usize,      // alerts exposed per snapshot
    pub qos: QosConfig,
    pub topology: TopologyConfig,
    pub threat_sources: Vec<ThreatSource>,
}

/// Per-link admission parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QosConfig {
    pub choke_threshold: f64,   // buffer occupancy above which only GOLD is admitted
    pub bucket_ratio: f64,      // token bucket size as a fraction of capacity
    pub ewma_alpha: f64,
}

impl Default for QosConfig {
    fn default() -> Self {
        Self {
            choke_threshold: 0.7,
            bucket_ratio: 0.5,
            ewma_alpha: 0.125,
        }
    }
}

/// Undirected link definition; becomes two directed links
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkSpec {
    pub a: String,
    pub b: String,
    pub capacity: f64,          // Mbps
    pub base_latency_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyConfig {
    pub nodes: Vec<Node>,
    pub links: Vec<LinkSpec>,
    pub core_node: String,      // attack target and data center
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ThreatLevel {
    Low,
    Medium,
    High,
}

/// Internal device that can be compromised
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatSource {
    pub node: String,
    pub ip: String,
    pub device: String,
    pub level: ThreatLevel,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: None,
            tick_rate_hz: 20,
            history_len: 50,
            alert_log_cap: 50,
            alert_tail: 10,
            qos: QosConfig::default(),
            topology: TopologyConfig::default(),
            threat_sources: default_threat_sources(),
        }
    }
}

impl Default for TopologyConfig {
    fn default() -> Self {
        let node = |id: &str, label: &str, floor: u8, device_class: DeviceClass, x: f32, y: f32| Node {
            id: id.to_string(),
            label: label.to_string(),
            floor,
            device_class,
            position: Position { x, y },
        };
        let link = |a: &str, b: &str, capacity: f64, base_latency_ms: f64| LinkSpec {
            a: a.to_string(),
            b: b.to_string(),
            capacity,
            base_latency_ms,
        };

        Self {
            nodes: vec![
                node("Server Room", "Main Data Center", 0, DeviceClass::Server, 500.0, 500.0),
                node("ICU-A", "ICU Unit A", 1, DeviceClass::Critical, 300.0, 300.0),
                node("ICU-B", "ICU Unit B", 1, DeviceClass::Critical, 700.0, 300.0),
                node("OT-1", "Operation Theater", 1, DeviceClass::Critical, 500.0, 200.0),
                node("Radiology", "Radiology Dept", 2, DeviceClass::HighBandwidth, 400.0, 400.0),
                node("Lab", "Pathology Lab", 2, DeviceClass::Staff, 600.0, 400.0),
                node("Admin", "Admin Block", 3, DeviceClass::Staff, 200.0, 500.0),
                node("Wards", "Patient Wards", 3, DeviceClass::General, 500.0, 600.0),
                node("Public-Wifi", "Guest Wi-Fi", 3, DeviceClass::Guest, 800.0, 500.0),
            ],
            links: vec![
                // backbone to floors
                link("Server Room", "ICU-A", 2000.0, 1.0),
                link("Server Room", "ICU-B", 2000.0, 1.0),
                link("Server Room", "Radiology", 5000.0, 2.0),
                link("Server Room", "Admin", 1000.0, 3.0),
                // cross-department
                link("ICU-A", "OT-1", 1000.0, 1.0),
                link("Radiology", "ICU-A", 1000.0, 2.0),
                link("Radiology", "Lab", 800.0, 2.0),
                link("Lab", "Server Room", 600.0, 3.0),
                link("Admin", "Public-Wifi", 500.0, 5.0),
                link("Admin", "Wards", 500.0, 3.0),
            ],
            core_node: "Server Room".to_string(),
        }
    }
}

fn default_threat_sources() -> Vec<ThreatSource> {
    let source = |node: &str, ip: &str, device: &str, level: ThreatLevel| ThreatSource {
        node: node.to_string(),
        ip: ip.to_string(),
        device: device.to_string(),
        level,
    };
    vec![
        source("Public-Wifi", "10.0.3.50", "Guest AP", ThreatLevel::High),
        source("Lab", "10.0.2.20", "Compromised IoT", ThreatLevel::Medium),
        source("Wards", "10.0.3.20", "Bedside Terminal", ThreatLevel::Medium),
        source("OT-1", "10.0.1.30", "Surgical Device", ThreatLevel::Low),
    ]
}

impl SimConfig {
    /// Load from a JSON file; missing fields fall back to defaults
    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let config: SimConfig = serde_json::from_slice(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.tick_rate_hz.max(1)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_rate_hz == 0 {
            return Err(SimError::Config("tick_rate_hz must be positive".into()));
        }
        if self.history_len == 0 || self.alert_log_cap == 0 {
            return Err(SimError::Config("history_len and alert_log_cap must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.qos.choke_threshold) {
            return Err(SimError::Config(format!(
                "choke_threshold {} outside [0, 1]",
                self.qos.choke_threshold
            )));
        }
        if !(self.qos.ewma_alpha > 0.0 && self.qos.ewma_alpha <= 1.0) {
            return Err(SimError::Config(format!(
                "ewma_alpha {} outside (0, 1]",
                self.qos.ewma_alpha
            )));
        }

        let mut ids = HashSet::new();
        for node in &self.topology.nodes {
            if !ids.insert(node.id.as_str()) {
                return Err(SimError::Config(format!("duplicate node id {:?}", node.id)));
            }
        }
        for link in &self.topology.links {
            for end in [&link.a, &link.b] {
                if !ids.contains(end.as_str()) {
                    return Err(SimError::UnknownNode(end.clone()));
                }
            }
            if link.a == link.b {
                return Err(SimError::Config(format!("self-loop on {:?}", link.a)));
            }
            if link.capacity <= 0.0 || link.base_latency_ms <= 0.0 {
                return Err(SimError::Config(format!(
                    "link {}-{} needs positive capacity and latency",
                    link.a, link.b
                )));
            }
        }
        if !ids.contains(self.topology.core_node.as_str()) {
            return Err(SimError::UnknownNode(self.topology.core_node.clone()));
        }
        for source in &self.threat_sources {
            if !ids.contains(source.node.as_str()) {
                return Err(SimError::UnknownNode(source.node.clone()));
            }
        }
        Ok(())
    }
}
