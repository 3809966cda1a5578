//! Anomaly detection and alerting
//!
//! Runs after every link has been updated for the tick. Two signals:
//! - Congestion Severity Score (CSS), a composite of latency inflation,
//!   loss and entropy collapse, raises CRITICAL alerts.
//! - Z-score of the current offered load against the link's history raises
//!   WARNING alerts.
//! Both are quiet in NORMAL mode and capped per tick.

use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use std::collections::VecDeque;
use telemetry::{Alert, AlertLevel, TrafficMode};

use crate::config::ThreatSource;
use crate::link::Link;

pub const CSS_THRESHOLD: f64 = 4.0;
pub const Z_THRESHOLD: f64 = 3.0;
pub const MIN_HISTORY: usize = 10;
pub const MAX_CRITICAL_PER_TICK: usize = 2;
pub const MAX_WARNING_PER_TICK: usize = 2;
pub const LOW_ENTROPY: f64 = 0.3;
pub const LOW_ENTROPY_PROBABILITY: f64 = 0.2;
pub const QOS_NOTICE_PROBABILITY: f64 = 0.1;

const ATTACK_PROTOCOLS: [&str; 3] = ["TCP SYN flood", "UDP flood", "ICMP flood"];

/// Congestion Severity Score
pub fn severity_score(link: &Link) -> f64 {
    let delay_factor = if link.base_latency > 0.0 {
        (link.ewma_rtt / link.base_latency).min(3.0)
    } else {
        1.0
    };
    let loss_factor = link.packet_loss * 10.0;
    let entropy_factor = 1.0 - link.entropy;
    0.5 * delay_factor + 20.0 * loss_factor + 2.0 * entropy_factor
}

/// Population z-score of `current` against `history`. `None` until enough
/// samples exist or when the history is flat.
pub fn z_score(history: &VecDeque<f64>, current: f64) -> Option<f64> {
    if history.len() < MIN_HISTORY {
        return None;
    }
    let n = history.len() as f64;
    let mean = history.iter().sum::<f64>() / n;
    let variance = history.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();
    if std_dev > 0.0 {
        Some((current - mean) / std_dev)
    } else {
        None
    }
}

/// Append-only alert log keeping the newest `cap` entries
#[derive(Debug, Clone)]
pub struct AlertLog {
    entries: VecDeque<Alert>,
    cap: usize,
}

impl AlertLog {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(cap),
            cap,
        }
    }

    /// Append unless it repeats the latest alert's message and time
    pub fn push(&mut self, alert: Alert) -> bool {
        if let Some(last) = self.entries.back() {
            if last.message == alert.message && last.time == alert.time {
                return false;
            }
        }
        self.entries.push_back(alert);
        while self.entries.len() > self.cap {
            self.entries.pop_front();
        }
        true
    }

    /// Newest `n` alerts, oldest first
    pub fn tail(&self, n: usize) -> Vec<Alert> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Alerts appended during one evaluation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertCounts {
    pub critical: usize,
    pub warning: usize,
    pub info: usize,
}

impl AlertCounts {
    pub fn total(&self) -> usize {
        self.critical + self.warning + self.info
    }
}

pub struct AnomalyEngine {
    threat_sources: Vec<ThreatSource>,
}

impl AnomalyEngine {
    pub fn new(threat_sources: Vec<ThreatSource>) -> Self {
        Self { threat_sources }
    }

    fn suspect(&self, rng: &mut dyn RngCore) -> (String, String) {
        match self.threat_sources.choose(rng) {
            Some(s) => (s.ip.clone(), s.device.clone()),
            None => ("unknown".to_string(), "unknown device".to_string()),
        }
    }

    /// Inspect updated links and append alerts for this tick
    pub fn evaluate(
        &self,
        links: &[Link],
        mode: TrafficMode,
        time: &str,
        log: &mut AlertLog,
        rng: &mut dyn RngCore,
    ) -> AlertCounts {
        let mut counts = AlertCounts::default();
        if mode == TrafficMode::Normal {
            return counts;
        }

        let mut emit = |log: &mut AlertLog, message: String, level: AlertLevel| {
            let appended = log.push(Alert {
                time: time.to_string(),
                message,
                level,
            });
            if appended {
                match level {
                    AlertLevel::Critical => counts.critical += 1,
                    AlertLevel::Warning => counts.warning += 1,
                    AlertLevel::Info => counts.info += 1,
                }
            }
        };

        let mut criticals = 0;
        let mut warnings = 0;
        for link in links {
            let css = severity_score(link);
            if css > CSS_THRESHOLD && criticals < MAX_CRITICAL_PER_TICK {
                let message = if mode == TrafficMode::Ddos {
                    let (ip, device) = self.suspect(rng);
                    let protocol = ATTACK_PROTOCOLS.choose(rng).copied().unwrap_or("flood");
                    format!(
                        "DDoS attack on {}->{} (CSS {:.1}): attacker {} ({}) -> victim {} [{}]",
                        link.source, link.target, css, ip, device, link.target, protocol
                    )
                } else {
                    format!(
                        "Critical congestion on {}->{} (CSS {:.1}, loss {:.1}%)",
                        link.source,
                        link.target,
                        css,
                        link.packet_loss * 100.0
                    )
                };
                emit(log, message, AlertLevel::Critical);
                criticals += 1;
            }

            if warnings < MAX_WARNING_PER_TICK {
                if let Some(z) = z_score(link.history(), link.current_load) {
                    if z > Z_THRESHOLD {
                        let (ip, device) = self.suspect(rng);
                        emit(
                            log,
                            format!(
                                "Traffic anomaly on {}->{} (z-score {:.1}): {} {} suspected of lateral movement",
                                link.source, link.target, z, device, ip
                            ),
                            AlertLevel::Warning,
                        );
                        warnings += 1;
                    }
                }
            }
        }

        if mode == TrafficMode::Ddos && rng.gen_bool(LOW_ENTROPY_PROBABILITY) {
            let lowest = links
                .iter()
                .filter(|l| l.entropy < LOW_ENTROPY)
                .min_by(|a, b| a.entropy.total_cmp(&b.entropy));
            if let Some(link) = lowest {
                emit(
                    log,
                    format!(
                        "Low entropy {:.2} on {}->{}: single traffic type dominant",
                        link.entropy, link.source, link.target
                    ),
                    AlertLevel::Warning,
                );
            }
        }

        if rng.gen_bool(QOS_NOTICE_PROBABILITY) {
            let choked = links.iter().filter(|l| l.choke).count();
            emit(
                log,
                format!("QoS active: GOLD traffic protected, {choked} choked links shedding lower priorities"),
                AlertLevel::Info,
            );
        }

        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{QosConfig, SimConfig};
    use crate::traffic::{Flow, TrafficClass};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::time::Duration;

    fn link(source: &str) -> Link {
        Link::new(source, "Core", 1000.0, 2.0, QosConfig::default(), 50, Duration::ZERO)
    }

    fn engine() -> AnomalyEngine {
        AnomalyEngine::new(SimConfig::default().threat_sources)
    }

    fn critical_link(source: &str) -> Link {
        let mut l = link(source);
        l.packet_loss = 0.5;
        l
    }

    fn alert(time: &str, message: &str) -> Alert {
        Alert {
            time: time.to_string(),
            message: message.to_string(),
            level: AlertLevel::Info,
        }
    }

    #[test]
    fn test_severity_score() {
        let mut l = link("A");
        // idle: delay factor 1, no loss, entropy 1
        assert_eq!(severity_score(&l), 0.5);

        l.ewma_rtt = 20.0; // capped at 3x
        l.packet_loss = 0.1;
        l.entropy = 0.25;
        let expected = 0.5 * 3.0 + 20.0 * 1.0 + 2.0 * 0.75;
        assert!((severity_score(&l) - expected).abs() < 1e-9);

        l.base_latency = 0.0;
        assert!(severity_score(&l).is_finite());
    }

    #[test]
    fn test_z_score() {
        let short: VecDeque<f64> = (0..9).map(|i| i as f64).collect();
        assert_eq!(z_score(&short, 100.0), None);

        let flat: VecDeque<f64> = std::iter::repeat(5.0).take(20).collect();
        assert_eq!(z_score(&flat, 100.0), None);

        let history: VecDeque<f64> = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0, 5.0, 5.0]
            .into_iter()
            .collect();
        // mean 5, population variance 3.2
        let z = z_score(&history, 11.0).unwrap();
        assert!((z - 6.0 / 3.2f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_alert_log_dedup_and_cap() {
        let mut log = AlertLog::new(50);
        assert!(log.push(alert("00:00:01", "a")));
        assert!(!log.push(alert("00:00:01", "a")));
        assert!(log.push(alert("00:00:02", "a")));
        assert!(log.push(alert("00:00:02", "b")));
        // only the latest entry is compared
        assert!(log.push(alert("00:00:02", "a")));
        assert_eq!(log.len(), 4);

        for i in 0..100 {
            log.push(alert("00:00:03", &format!("m{i}")));
        }
        assert_eq!(log.len(), 50);
        let tail = log.tail(10);
        assert_eq!(tail.len(), 10);
        assert_eq!(tail[0].message, "m90");
        assert_eq!(tail[9].message, "m99");

        log.clear();
        assert!(log.is_empty());
        assert!(log.tail(10).is_empty());
    }

    #[test]
    fn test_normal_mode_is_quiet() {
        let links = vec![critical_link("A"), critical_link("B")];
        let mut log = AlertLog::new(50);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let counts = engine().evaluate(&links, TrafficMode::Normal, "00:00:01", &mut log, &mut rng);
        assert_eq!(counts.total(), 0);
        assert!(log.is_empty());
    }

    #[test]
    fn test_critical_alerts_capped_per_tick() {
        let links: Vec<Link> = ["A", "B", "C", "D"].iter().map(|s| critical_link(s)).collect();
        let mut log = AlertLog::new(50);
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let counts = engine().evaluate(&links, TrafficMode::Congested, "00:00:01", &mut log, &mut rng);

        assert_eq!(counts.critical, MAX_CRITICAL_PER_TICK);
        let alerts = log.tail(50);
        let criticals: Vec<&Alert> = alerts
            .iter()
            .filter(|a| a.level == AlertLevel::Critical)
            .collect();
        assert_eq!(criticals.len(), 2);
        assert!(criticals[0].message.contains("A->Core"));
        assert!(criticals[0].message.contains("loss 50.0%"));
    }

    #[test]
    fn test_ddos_wording_names_attacker() {
        let links = vec![critical_link("Public-Wifi")];
        let mut log = AlertLog::new(50);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        engine().evaluate(&links, TrafficMode::Ddos, "00:00:01", &mut log, &mut rng);

        let critical = log
            .tail(10)
            .into_iter()
            .find(|a| a.level == AlertLevel::Critical)
            .unwrap();
        assert!(critical.message.starts_with("DDoS attack on Public-Wifi->Core"));
        assert!(critical.message.contains("attacker 10.0."));
        assert!(critical.message.contains("victim Core"));
    }

    fn spiking_link(source: &str, rng: &mut ChaCha8Rng) -> Link {
        let mut l = Link::new(source, "Core", 100_000.0, 2.0, QosConfig::default(), 50, Duration::ZERO);
        for i in 1..=20u64 {
            let rate = if i % 2 == 0 { 100.0 } else { 110.0 };
            l.offer(Flow::new(TrafficClass::Voip, rate));
            l.offer(Flow::new(TrafficClass::Emr, rate));
            l.update(Duration::from_millis(50 * i), rng);
        }
        l.offer(Flow::new(TrafficClass::Voip, 2000.0));
        l.offer(Flow::new(TrafficClass::Emr, 2000.0));
        l.update(Duration::from_millis(50 * 21), rng);
        l
    }

    #[test]
    fn test_load_spike_raises_warning() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let l = spiking_link("A", &mut rng);

        let mut log = AlertLog::new(50);
        let counts = engine().evaluate(&[l], TrafficMode::Congested, "00:00:01", &mut log, &mut rng);
        assert_eq!(counts.warning, 1);
        let warning = log
            .tail(10)
            .into_iter()
            .find(|a| a.level == AlertLevel::Warning)
            .unwrap();
        assert!(warning.message.contains("lateral movement"));
    }

    #[test]
    fn test_warning_alerts_capped_per_tick() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let links: Vec<Link> = ["A", "B", "C", "D", "E"]
            .iter()
            .map(|s| spiking_link(s, &mut rng))
            .collect();
        for l in &links {
            assert!(z_score(l.history(), l.current_load).unwrap() > Z_THRESHOLD);
        }

        let mut log = AlertLog::new(50);
        let counts = engine().evaluate(&links, TrafficMode::Congested, "00:00:01", &mut log, &mut rng);
        assert_eq!(counts.warning, MAX_WARNING_PER_TICK);
        assert_eq!(counts.critical, 0);
        let warnings: Vec<Alert> = log
            .tail(50)
            .into_iter()
            .filter(|a| a.level == AlertLevel::Warning)
            .collect();
        assert_eq!(warnings.len(), MAX_WARNING_PER_TICK);
        assert!(warnings[0].message.contains("A->Core"));
        assert!(warnings[1].message.contains("B->Core"));
    }

    #[test]
    fn test_low_entropy_signature_in_ddos() {
        let mut l = link("A");
        l.entropy = 0.1;
        let links = vec![l];
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut seen = 0;
        for tick in 0..200 {
            let mut log = AlertLog::new(50);
            let time = format!("t{tick}");
            engine().evaluate(&links, TrafficMode::Ddos, &time, &mut log, &mut rng);
            if log.tail(10).iter().any(|a| a.message.starts_with("Low entropy")) {
                seen += 1;
            }
        }
        // roughly one tick in five
        assert!((15..=70).contains(&seen), "got {seen}");
    }

    #[test]
    fn test_qos_notice_is_info() {
        let links = vec![link("A")];
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let mut log = AlertLog::new(50);
        for tick in 0..100 {
            engine().evaluate(&links, TrafficMode::Congested, &format!("t{tick}"), &mut log, &mut rng);
        }
        assert!(!log.is_empty());
        assert!(log.tail(50).iter().all(|a| a.level == AlertLevel::Info));
    }
}
