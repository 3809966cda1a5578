//! WAN Telemetry Schema v1
//!
//! Read-only state handed to the presentation layer once per tick, plus the
//! two control verbs it may send back (lifecycle action and traffic mode).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Wire parse failures for control verbs
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown traffic mode: {0:?} (expected NORMAL, CONGESTED or DDOS)")]
    UnknownMode(String),
    #[error("unknown control action: {0:?} (expected start, stop or reset)")]
    UnknownAction(String),
}

/// Traffic mode selected by the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrafficMode {
    #[default]
    Normal,
    Congested,
    Ddos,
}

impl TrafficMode {
    pub const ALL: [TrafficMode; 3] = [TrafficMode::Normal, TrafficMode::Congested, TrafficMode::Ddos];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficMode::Normal => "NORMAL",
            TrafficMode::Congested => "CONGESTED",
            TrafficMode::Ddos => "DDOS",
        }
    }
}

impl fmt::Display for TrafficMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrafficMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NORMAL" => Ok(TrafficMode::Normal),
            "CONGESTED" => Ok(TrafficMode::Congested),
            "DDOS" => Ok(TrafficMode::Ddos),
            _ => Err(ParseError::UnknownMode(s.to_string())),
        }
    }
}

/// Lifecycle verb
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Start,
    Stop,
    Reset,
}

impl FromStr for ControlAction {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(ControlAction::Start),
            "stop" => Ok(ControlAction::Stop),
            "reset" => Ok(ControlAction::Reset),
            _ => Err(ParseError::UnknownAction(s.to_string())),
        }
    }
}

/// Device class of a site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Server,
    Critical,
    HighBandwidth,
    Guest,
    Staff,
    General,
}

/// 2-D layout hint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

/// Site in the WAN. Immutable once the topology is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub label: String,
    pub floor: u8,
    pub device_class: DeviceClass,
    pub position: Position,
}

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

/// Alert record. Never mutated after it is appended to the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub time: String,   // HH:MM:SS of the simulation clock
    pub message: String,
    pub level: AlertLevel,
}

/// Display status of a directed link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LinkStatus {
    Normal,
    Warning,
    Critical,
}

impl LinkStatus {
    /// Loss above 5% is critical; otherwise offered load above 80% of capacity is a warning.
    pub fn classify(packet_loss: f64, load: f64, capacity: f64) -> Self {
        if packet_loss > 0.05 {
            LinkStatus::Critical
        } else if load > capacity * 0.8 {
            LinkStatus::Warning
        } else {
            LinkStatus::Normal
        }
    }
}

/// Per-priority admission counters and buffer state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QosReport {
    pub gold_served: u64,
    pub gold_dropped: u64,
    pub silver_served: u64,
    pub silver_dropped: u64,
    pub bronze_served: u64,
    pub bronze_dropped: u64,
    pub buffer_occupancy_pct: f64,
    pub choke: bool,
    pub gold_loss_pct: f64,
    pub bronze_loss_pct: f64,
}

/// Share of dropped flows in percent, 0 when nothing was offered.
pub fn loss_pct(served: u64, dropped: u64) -> f64 {
    let total = served + dropped;
    if total == 0 {
        0.0
    } else {
        dropped as f64 / total as f64 * 100.0
    }
}

/// Serialized state of one directed link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkReport {
    pub source: String,
    pub target: String,
    pub capacity: f64,          // Mbps
    pub load: f64,              // offered Mbps
    pub utilization_pct: f64,
    pub latency_ms: f64,        // EWMA RTT
    pub jitter_ms: f64,
    pub packet_loss_pct: f64,
    pub entropy: f64,
    pub status: LinkStatus,
    pub qos: QosReport,
}

/// Network-wide aggregates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalStats {
    pub total_throughput: f64,  // Mbps, sum of offered load
    pub avg_entropy: f64,       // load-weighted
    pub active_nodes: usize,
}

/// Post-tick state published for readers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tick: u64,
    pub running: bool,
    pub mode: TrafficMode,
    pub nodes: Vec<Node>,
    pub links: Vec<LinkReport>,
    pub alerts: Vec<Alert>,
    pub global_stats: GlobalStats,
}

impl Snapshot {
    /// Find a link report by endpoints
    pub fn link(&self, source: &str, target: &str) -> Option<&LinkReport> {
        self.links
            .iter()
            .find(|l| l.source == source && l.target == target)
    }

    /// Highest packet loss across links, as a fraction
    pub fn max_packet_loss(&self) -> f64 {
        self.links
            .iter()
            .map(|l| l.packet_loss_pct / 100.0)
            .fold(0.0, f64::max)
    }

    pub fn total_gold_served(&self) -> u64 {
        self.links.iter().map(|l| l.qos.gold_served).sum()
    }
}
