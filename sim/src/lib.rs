//! WAN congestion and anomaly simulator
//!
//! A tick-driven model of a multi-site network: per-link weighted-priority
//! admission with choke protection, latency and entropy tracking, and an
//! anomaly engine that raises alerts from congestion severity and load
//! statistics. The [`Controller`] owns all state and publishes a
//! [`telemetry::Snapshot`] after every tick.

pub mod anomaly;
pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod link;
pub mod topology;
pub mod traffic;
pub mod workload;

pub use anomaly::{AlertLog, AnomalyEngine};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{QosConfig, SimConfig};
pub use controller::{summarize, Controller, PhaseRunner, PhaseSample, PhaseSummary, RunState};
pub use error::{Result, SimError};
pub use link::Link;
pub use topology::Topology;
pub use traffic::{Flow, Priority, TrafficClass};
pub use workload::{TrafficGenerator, Workload};
