//! Directed link model
//!
//! Each tick a link receives its offered flows, admits them in priority
//! order against the capacity available in the elapsed time slice, and
//! updates its latency, loss and entropy statistics.

use rand::Rng;
use std::collections::VecDeque;
use std::time::Duration;
use telemetry::{loss_pct, LinkReport, LinkStatus, QosReport};
use tracing::trace;

use crate::config::QosConfig;
use crate::traffic::{Flow, Priority, TrafficClass};

/// Utilization above which queueing inflates RTT
const QUEUE_KNEE: f64 = 0.6;
/// RTT growth per unit of utilization above the knee
const QUEUE_SLOPE: f64 = 15.0;
/// Utilization above which jitter becomes heavy
const JITTER_KNEE: f64 = 0.8;
/// Occupancy below which a single-class link still counts as diverse
const IDLE_OCCUPANCY: f64 = 0.1;

/// Token bucket state. Refilled every update and reported, but admission
/// does not gate on it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenBucket {
    pub capacity: f64,
    pub tokens: f64,
    pub last_refill: Duration,
}

impl TokenBucket {
    fn new(capacity: f64, now: Duration) -> Self {
        Self {
            capacity,
            tokens: capacity,
            last_refill: now,
        }
    }

    fn refill(&mut self, rate: f64, dt: f64, now: Duration) {
        self.tokens = (self.tokens + rate * dt).min(self.capacity);
        self.last_refill = now;
    }
}

/// Cumulative per-priority flow counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QosCounters {
    served: [u64; 3],
    dropped: [u64; 3],
}

impl QosCounters {
    fn slot(priority: Priority) -> usize {
        match priority {
            Priority::Gold => 0,
            Priority::Silver => 1,
            Priority::Bronze => 2,
        }
    }

    pub fn served(&self, priority: Priority) -> u64 {
        self.served[Self::slot(priority)]
    }

    pub fn dropped(&self, priority: Priority) -> u64 {
        self.dropped[Self::slot(priority)]
    }

    fn serve(&mut self, priority: Priority) {
        self.served[Self::slot(priority)] += 1;
    }

    fn drop_flow(&mut self, priority: Priority) {
        self.dropped[Self::slot(priority)] += 1;
    }

    /// Move one flow served this tick to the dropped column
    fn revoke(&mut self, priority: Priority) {
        let slot = Self::slot(priority);
        self.served[slot] = self.served[slot].saturating_sub(1);
        self.dropped[slot] += 1;
    }
}

/// Result of one admission pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Admission {
    pub offered: f64,
    pub served: f64,
    pub occupancy: f64,
    pub choke: bool,
}

#[derive(Debug, Clone)]
pub struct Link {
    pub source: String,
    pub target: String,
    pub capacity: f64,          // Mbps
    pub base_latency: f64,      // ms

    pub current_load: f64,      // offered, not admitted
    pub served_load: f64,
    pub packet_loss: f64,       // fraction
    pub jitter: f64,
    pub buffer_occupancy: f64,
    pub choke: bool,
    pub qos: QosCounters,

    pub ewma_rtt: f64,
    pub current_rtt: f64,
    pub bucket: TokenBucket,
    pub entropy: f64,

    offered: Vec<Flow>,
    history: VecDeque<f64>,
    history_len: usize,
    params: QosConfig,
    last_update: Duration,
}

impl Link {
    pub fn new(
        source: &str,
        target: &str,
        capacity: f64,
        base_latency: f64,
        params: QosConfig,
        history_len: usize,
        now: Duration,
    ) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            capacity,
            base_latency,
            current_load: 0.0,
            served_load: 0.0,
            packet_loss: 0.0,
            jitter: 0.0,
            buffer_occupancy: 0.0,
            choke: false,
            qos: QosCounters::default(),
            ewma_rtt: base_latency,
            current_rtt: base_latency,
            bucket: TokenBucket::new(capacity * params.bucket_ratio, now),
            entropy: 1.0,
            offered: Vec::new(),
            history: VecDeque::with_capacity(history_len),
            history_len,
            params,
            last_update: now,
        }
    }

    /// Add a flow to this tick's offered load
    pub fn offer(&mut self, flow: Flow) {
        self.offered.push(flow);
    }

    pub fn offered(&self) -> &[Flow] {
        &self.offered
    }

    pub fn clear_offered(&mut self) {
        self.offered.clear();
    }

    pub fn history(&self) -> &VecDeque<f64> {
        &self.history
    }

    /// Run one tick against the offered flows. Returns false when no time
    /// has elapsed since the last update, in which case nothing changes.
    pub fn update<R: Rng + ?Sized>(&mut self, now: Duration, rng: &mut R) -> bool {
        let dt = now.saturating_sub(self.last_update).as_secs_f64();
        if dt <= 0.0 {
            return false;
        }
        self.last_update = now;

        self.bucket.refill(self.capacity, dt, now);

        let flows = std::mem::take(&mut self.offered);
        let admission = self.admit(&flows, dt);
        self.record_load(admission);
        self.update_latency(rng);
        self.entropy = class_entropy(&flows, admission.offered, admission.occupancy);

        let top = flows.iter().max_by(|a, b| a.rate.total_cmp(&b.rate)).map(|f| f.class);
        trace!(
            source = %self.source,
            target = %self.target,
            top_class = top.map_or("none", |c| c.name()),
            offered = admission.offered,
            served = admission.served,
            choke = admission.choke,
            loss = self.packet_loss,
            "link updated"
        );
        true
    }

    /// Weighted-priority admission over a time slice of `dt` seconds
    pub fn admit(&mut self, flows: &[Flow], dt: f64) -> Admission {
        let offered: f64 = flows.iter().map(|f| f.rate).sum();
        let occupancy = if self.capacity > 0.0 {
            (offered / self.capacity).min(1.0)
        } else if offered > 0.0 {
            1.0
        } else {
            0.0
        };
        let choke = occupancy > self.params.choke_threshold;

        let mut ordered = flows.to_vec();
        ordered.sort_by(|a, b| b.priority().weight().cmp(&a.priority().weight()));
        let served = self.schedule(&ordered, dt, choke);

        self.buffer_occupancy = occupancy;
        self.choke = choke;
        Admission {
            offered,
            served,
            occupancy,
            choke,
        }
    }

    /// Serve flows in the given order. A GOLD flow that does not fit
    /// preempts the most recent BRONZE flow served in the same pass.
    fn schedule(&mut self, ordered: &[Flow], dt: f64, choke: bool) -> f64 {
        let mut remaining = self.capacity * dt;
        let mut served = 0.0;
        let mut bronze_admitted: Vec<Flow> = Vec::new();

        for flow in ordered {
            let priority = flow.priority();
            if choke && priority != Priority::Gold {
                self.qos.drop_flow(priority);
                continue;
            }

            let demand = flow.rate * dt;
            if demand <= remaining {
                remaining -= demand;
                served += flow.rate;
                self.qos.serve(priority);
                if priority == Priority::Bronze {
                    bronze_admitted.push(*flow);
                }
            } else if priority == Priority::Gold {
                match bronze_admitted.pop() {
                    Some(victim) => {
                        self.qos.revoke(Priority::Bronze);
                        remaining += victim.rate * dt;
                        served -= victim.rate;
                        remaining = (remaining - demand).max(0.0);
                        served += flow.rate;
                        self.qos.serve(Priority::Gold);
                    }
                    None => self.qos.drop_flow(priority),
                }
            } else {
                self.qos.drop_flow(priority);
            }
        }
        served
    }

    fn record_load(&mut self, admission: Admission) {
        self.current_load = admission.offered;
        self.served_load = admission.served;
        if self.history.len() == self.history_len {
            self.history.pop_front();
        }
        self.history.push_back(self.current_load);

        self.packet_loss = if admission.offered > 0.0 {
            (1.0 - admission.served / admission.offered).max(0.0)
        } else {
            0.0
        };
    }

    fn update_latency<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let utilization = self.utilization();
        let mut rtt = if utilization > QUEUE_KNEE {
            self.base_latency * (1.0 + QUEUE_SLOPE * (utilization - QUEUE_KNEE))
        } else {
            self.base_latency
        };

        self.jitter = if utilization < JITTER_KNEE {
            rng.gen_range(0.0..2.0)
        } else {
            5.0 + rng.gen_range(0.0..20.0)
        };
        rtt += self.jitter;

        let alpha = self.params.ewma_alpha;
        self.ewma_rtt = (1.0 - alpha) * self.ewma_rtt + alpha * rtt;
        self.current_rtt = rtt;
    }

    /// Admitted load over capacity
    pub fn utilization(&self) -> f64 {
        if self.capacity > 0.0 {
            self.served_load / self.capacity
        } else {
            0.0
        }
    }

    pub fn status(&self) -> LinkStatus {
        LinkStatus::classify(self.packet_loss, self.current_load, self.capacity)
    }

    pub fn report(&self) -> LinkReport {
        let utilization_pct = if self.capacity > 0.0 {
            self.current_load / self.capacity * 100.0
        } else {
            0.0
        };
        let qos = &self.qos;
        LinkReport {
            source: self.source.clone(),
            target: self.target.clone(),
            capacity: self.capacity,
            load: self.current_load,
            utilization_pct,
            latency_ms: self.ewma_rtt,
            jitter_ms: self.jitter,
            packet_loss_pct: self.packet_loss * 100.0,
            entropy: self.entropy,
            status: self.status(),
            qos: QosReport {
                gold_served: qos.served(Priority::Gold),
                gold_dropped: qos.dropped(Priority::Gold),
                silver_served: qos.served(Priority::Silver),
                silver_dropped: qos.dropped(Priority::Silver),
                bronze_served: qos.served(Priority::Bronze),
                bronze_dropped: qos.dropped(Priority::Bronze),
                buffer_occupancy_pct: self.buffer_occupancy * 100.0,
                choke: self.choke,
                gold_loss_pct: loss_pct(qos.served(Priority::Gold), qos.dropped(Priority::Gold)),
                bronze_loss_pct: loss_pct(
                    qos.served(Priority::Bronze),
                    qos.dropped(Priority::Bronze),
                ),
            },
        }
    }
}

/// Normalized Shannon entropy of per-class volume shares
pub fn class_entropy(flows: &[Flow], offered: f64, occupancy: f64) -> f64 {
    if offered <= 0.0 {
        return 1.0;
    }

    let mut volume = [0.0f64; TrafficClass::COUNT];
    for flow in flows {
        volume[flow.class.index()] += flow.rate;
    }

    let present: Vec<f64> = volume.iter().copied().filter(|v| *v > 0.0).collect();
    match present.len() {
        0 => 1.0,
        1 => {
            if occupancy < IDLE_OCCUPANCY {
                1.0
            } else {
                0.0
            }
        }
        n => {
            let h: f64 = present
                .iter()
                .map(|v| {
                    let p = v / offered;
                    -p * p.log2()
                })
                .sum();
            (h / (n as f64).log2()).clamp(0.0, 1.0)
        }
    }
}
