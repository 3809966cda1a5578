//! Simulation controller
//!
//! Owns the topology, the alert log and the run state. `tick()` runs traffic
//! generation, link updates and anomaly evaluation, then publishes an
//! immutable [`Snapshot`] that readers can hold without observing a
//! half-finished tick.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use telemetry::{ControlAction, GlobalStats, Snapshot, TrafficMode};
use tracing::{debug, info};

use crate::anomaly::{AlertLog, AnomalyEngine};
use crate::clock::{format_hms, Clock, ManualClock, SystemClock};
use crate::config::SimConfig;
use crate::error::Result;
use crate::topology::Topology;
use crate::workload::TrafficGenerator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Running,
}

pub struct Controller<C: Clock = SystemClock> {
    config: SimConfig,
    clock: C,
    rng: ChaCha8Rng,
    topology: Topology,
    generator: TrafficGenerator,
    engine: AnomalyEngine,
    alerts: AlertLog,
    state: RunState,
    tick: u64,
    snapshot: Arc<Snapshot>,
}

impl Controller<SystemClock> {
    pub fn new(config: SimConfig) -> Result<Self> {
        Self::with_clock(config, SystemClock::new())
    }
}

fn seeded_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}

impl<C: Clock> Controller<C> {
    pub fn with_clock(config: SimConfig, clock: C) -> Result<Self> {
        config.validate()?;
        let topology = Topology::from_config(&config, clock.now())?;
        let sources = config
            .threat_sources
            .iter()
            .map(|s| s.node.clone())
            .collect();
        let generator = TrafficGenerator::new(&config.topology.core_node, sources);
        let engine = AnomalyEngine::new(config.threat_sources.clone());

        let mut controller = Self {
            rng: seeded_rng(config.seed),
            alerts: AlertLog::new(config.alert_log_cap),
            clock,
            topology,
            generator,
            engine,
            state: RunState::Stopped,
            tick: 0,
            snapshot: Arc::new(empty_snapshot()),
            config,
        };
        controller.publish();
        Ok(controller)
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }

    pub fn mode(&self) -> TrafficMode {
        self.generator.mode()
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn alerts(&self) -> &AlertLog {
        &self.alerts
    }

    pub fn ticks(&self) -> u64 {
        self.tick
    }

    pub fn start(&mut self) {
        if self.state != RunState::Running {
            info!(mode = %self.mode(), "simulation started");
        }
        self.state = RunState::Running;
        self.publish();
    }

    pub fn stop(&mut self) {
        if self.state != RunState::Stopped {
            info!(tick = self.tick, "simulation paused");
        }
        self.state = RunState::Stopped;
        self.publish();
    }

    /// Back to construction-time state: stopped, NORMAL, fresh links, no alerts
    pub fn reset(&mut self) -> Result<()> {
        self.topology = Topology::from_config(&self.config, self.clock.now())?;
        self.generator.set_mode(TrafficMode::Normal);
        self.alerts.clear();
        self.state = RunState::Stopped;
        self.tick = 0;
        if self.config.seed.is_some() {
            self.rng = seeded_rng(self.config.seed);
        }
        info!("simulation reset");
        self.publish();
        Ok(())
    }

    pub fn control(&mut self, action: ControlAction) -> Result<()> {
        match action {
            ControlAction::Start => self.start(),
            ControlAction::Stop => self.stop(),
            ControlAction::Reset => self.reset()?,
        }
        Ok(())
    }

    /// Parse and apply a lifecycle verb from the control surface
    pub fn handle_control(&mut self, action: &str) -> Result<ControlAction> {
        let action: ControlAction = action.parse()?;
        self.control(action)?;
        Ok(action)
    }

    /// Switch traffic mode; starts the simulation if it was stopped
    pub fn set_mode(&mut self, mode: TrafficMode) {
        if mode != self.mode() {
            info!(from = %self.mode(), to = %mode, "traffic mode changed");
        }
        self.generator.set_mode(mode);
        if self.state == RunState::Stopped {
            self.start();
        } else {
            self.publish();
        }
    }

    pub fn handle_mode(&mut self, mode: &str) -> Result<TrafficMode> {
        let mode: TrafficMode = mode.parse()?;
        self.set_mode(mode);
        Ok(mode)
    }

    /// Advance one step. Returns false when stopped.
    pub fn tick(&mut self) -> bool {
        if self.state != RunState::Running {
            return false;
        }

        self.generator.generate(&mut self.topology, &mut self.rng);

        let now = self.clock.now();
        for link in self.topology.links_mut() {
            link.update(now, &mut self.rng);
        }

        let counts = self.engine.evaluate(
            self.topology.links(),
            self.mode(),
            &format_hms(now),
            &mut self.alerts,
            &mut self.rng,
        );

        self.tick += 1;
        self.publish();
        debug!(
            tick = self.tick,
            mode = %self.mode(),
            total_load = self.snapshot.global_stats.total_throughput,
            avg_entropy = self.snapshot.global_stats.avg_entropy,
            critical = counts.critical,
            warning = counts.warning,
            "tick complete"
        );
        true
    }

    /// Latest published state. Cheap to clone and never partially updated.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot)
    }

    fn publish(&mut self) {
        let links = self.topology.links();
        let total_load: f64 = links.iter().map(|l| l.current_load).sum();
        let avg_entropy = if total_load > 0.0 {
            links.iter().map(|l| l.entropy * l.current_load).sum::<f64>() / total_load
        } else {
            1.0
        };

        self.snapshot = Arc::new(Snapshot {
            tick: self.tick,
            running: self.is_running(),
            mode: self.mode(),
            nodes: self.topology.nodes().to_vec(),
            links: links.iter().map(|l| l.report()).collect(),
            alerts: self.alerts.tail(self.config.alert_tail),
            global_stats: GlobalStats {
                total_throughput: total_load,
                avg_entropy,
                active_nodes: self.topology.nodes().len(),
            },
        });
    }
}

fn empty_snapshot() -> Snapshot {
    Snapshot {
        tick: 0,
        running: false,
        mode: TrafficMode::Normal,
        nodes: Vec::new(),
        links: Vec::new(),
        alerts: Vec::new(),
        global_stats: GlobalStats {
            total_throughput: 0.0,
            avg_entropy: 1.0,
            active_nodes: 0,
        },
    }
}

/// One row of a scripted phase run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseSample {
    pub step: usize,
    pub mode: TrafficMode,
    pub total_throughput: f64,
    pub avg_entropy: f64,
    pub max_packet_loss: f64,
    pub gold_served: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhaseSummary {
    pub mode: TrafficMode,
    pub steps: usize,
    pub mean_throughput: f64,
    pub mean_entropy: f64,
    pub peak_packet_loss: f64,
}

/// Drives a controller through fixed traffic phases on a manual clock
pub struct PhaseRunner {
    controller: Controller<ManualClock>,
    clock: ManualClock,
    interval: Duration,
    step: usize,
}

impl PhaseRunner {
    pub fn new(config: SimConfig) -> Result<Self> {
        let clock = ManualClock::new();
        let interval = config.tick_interval();
        let controller = Controller::with_clock(config, clock.clone())?;
        Ok(Self {
            controller,
            clock,
            interval,
            step: 0,
        })
    }

    pub fn controller(&self) -> &Controller<ManualClock> {
        &self.controller
    }

    /// Switch to `mode` and sample `steps` ticks
    pub fn run_phase(&mut self, mode: TrafficMode, steps: usize) -> Vec<PhaseSample> {
        self.controller.set_mode(mode);
        info!(%mode, steps, "phase started");

        let mut samples = Vec::with_capacity(steps);
        for _ in 0..steps {
            self.clock.advance(self.interval);
            self.controller.tick();
            let snap = self.controller.snapshot();
            samples.push(PhaseSample {
                step: self.step,
                mode,
                total_throughput: snap.global_stats.total_throughput,
                avg_entropy: snap.global_stats.avg_entropy,
                max_packet_loss: snap.max_packet_loss(),
                gold_served: snap.total_gold_served(),
            });
            self.step += 1;
        }
        samples
    }

    /// NORMAL, then CONGESTED, then DDOS
    pub fn run(&mut self, steps_per_phase: usize) -> Vec<PhaseSample> {
        TrafficMode::ALL
            .into_iter()
            .flat_map(|mode| self.run_phase(mode, steps_per_phase))
            .collect()
    }
}

/// Per-mode means, in order of first appearance
pub fn summarize(samples: &[PhaseSample]) -> Vec<PhaseSummary> {
    let mut out: Vec<PhaseSummary> = Vec::new();
    for sample in samples {
        let idx = match out.iter().position(|s| s.mode == sample.mode) {
            Some(idx) => idx,
            None => {
                out.push(PhaseSummary {
                    mode: sample.mode,
                    steps: 0,
                    mean_throughput: 0.0,
                    mean_entropy: 0.0,
                    peak_packet_loss: 0.0,
                });
                out.len() - 1
            }
        };
        let summary = &mut out[idx];
        summary.steps += 1;
        summary.mean_throughput += sample.total_throughput;
        summary.mean_entropy += sample.avg_entropy;
        summary.peak_packet_loss = summary.peak_packet_loss.max(sample.max_packet_loss);
    }
    for summary in &mut out {
        let n = summary.steps as f64;
        summary.mean_throughput /= n;
        summary.mean_entropy /= n;
    }
    out
}
