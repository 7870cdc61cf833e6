//! Monitor: per-session protocol metrics, edge-case flags and advisory
//! threshold suggestions
//!
//! Suggestions are reported, never applied.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::ArbiterConfig;
use crate::types::{LoopOutcome, LoopPhase, ReplyKind, SubsystemId};

/// Rejections per loop iteration at which a session counts as consistently rejecting
const REJECTION_RATE_FLAG: f64 = 0.6;

/// Loop iterations needed before rates are trusted
const MIN_ITERATIONS_FOR_RATES: u64 = 3;

/// Loop displacements at which topic shifting counts as rapid
const TOPIC_SHIFT_FLAG: u64 = 3;

/// Silences per loop iteration at which silence counts as extended
const SILENCE_RATE_FLAG: f64 = 0.5;

/// Fraction of turns over the collection budget worth a suggestion
const OVERRUN_RATE_FLAG: f64 = 0.1;

/// Fraction of turns forced to the fallback worth a suggestion
const GOVERNOR_RATE_FLAG: f64 = 0.5;

/// Turns needed before turn-level rates are trusted
const MIN_TURNS_FOR_RATES: u64 = 5;

/// Something the orchestrator observed
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    Turn {
        leader: SubsystemId,
        over_budget: bool,
        governed: bool,
        detector_failures: usize,
    },
    LoopStarted,
    LoopReply {
        reply: ReplyKind,
        rejected: bool,
    },
    LoopEnded(LoopOutcome),
    Interrupt,
    Catastrophic,
}

/// Counters for one session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetrics {
    pub turns: u64,
    pub loops_started: u64,
    pub loops_completed: u64,
    pub loops_aborted: u64,
    pub loop_replies: u64,
    pub rejections: u64,
    pub silences: u64,
    /// Loops displaced by another leader
    pub topic_shifts: u64,
    pub interrupts: u64,
    pub paradigm_mismatches: u64,
    pub budget_overruns: u64,
    pub governor_overrides: u64,
    pub detector_failures: u64,
    pub catastrophic_detections: u64,
    pub leaders: BTreeMap<SubsystemId, u64>,
}

impl SessionMetrics {
    fn apply(&mut self, event: &MonitorEvent) {
        match event {
            MonitorEvent::Turn { leader, over_budget, governed, detector_failures } => {
                self.turns += 1;
                *self.leaders.entry(*leader).or_insert(0) += 1;
                self.budget_overruns += u64::from(*over_budget);
                self.governor_overrides += u64::from(*governed);
                self.detector_failures += *detector_failures as u64;
            }
            MonitorEvent::LoopStarted => self.loops_started += 1,
            MonitorEvent::LoopReply { reply, rejected } => {
                self.loop_replies += 1;
                self.rejections += u64::from(*rejected);
                if *reply == ReplyKind::Silent {
                    self.silences += 1;
                }
            }
            MonitorEvent::LoopEnded(outcome) => {
                if outcome.terminal_phase() == LoopPhase::Transitioning {
                    self.loops_completed += 1;
                } else {
                    self.loops_aborted += 1;
                }
                match outcome {
                    LoopOutcome::Displaced => self.topic_shifts += 1,
                    LoopOutcome::ParadigmMismatch => self.paradigm_mismatches += 1,
                    _ => {}
                }
            }
            MonitorEvent::Interrupt => self.interrupts += 1,
            MonitorEvent::Catastrophic => self.catastrophic_detections += 1,
        }
    }

    fn merge(&mut self, other: &SessionMetrics) {
        self.turns += other.turns;
        self.loops_started += other.loops_started;
        self.loops_completed += other.loops_completed;
        self.loops_aborted += other.loops_aborted;
        self.loop_replies += other.loop_replies;
        self.rejections += other.rejections;
        self.silences += other.silences;
        self.topic_shifts += other.topic_shifts;
        self.interrupts += other.interrupts;
        self.paradigm_mismatches += other.paradigm_mismatches;
        self.budget_overruns += other.budget_overruns;
        self.governor_overrides += other.governor_overrides;
        self.detector_failures += other.detector_failures;
        self.catastrophic_detections += other.catastrophic_detections;
        for (leader, count) in &other.leaders {
            *self.leaders.entry(*leader).or_insert(0) += count;
        }
    }

    pub fn rates(&self) -> MetricRates {
        MetricRates {
            rejection_rate: ratio(self.rejections, self.loop_replies),
            silence_rate: ratio(self.silences, self.loop_replies),
            topic_shift_rate: ratio(self.topic_shifts, self.loops_started),
            overrun_rate: ratio(self.budget_overruns, self.turns),
            governor_rate: ratio(self.governor_overrides, self.turns),
        }
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRates {
    pub rejection_rate: f64,
    pub silence_rate: f64,
    pub topic_shift_rate: f64,
    pub overrun_rate: f64,
    pub governor_rate: f64,
}

/// Patterns worth a human look
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeCaseFlag {
    ConsistentRejection,
    RapidTopicShift,
    ExtendedSilence,
    ParadigmMismatch,
}

/// Advisory change to a configuration value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdSuggestion {
    /// Dotted configuration key
    pub parameter: String,
    pub current: f64,
    pub suggested: f64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorReport {
    pub session_id: String,
    pub metrics: SessionMetrics,
    pub rates: MetricRates,
    pub flags: Vec<EdgeCaseFlag>,
    pub suggestions: Vec<ThresholdSuggestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSummary {
    pub sessions: usize,
    pub flagged_sessions: usize,
    pub totals: SessionMetrics,
    pub rates: MetricRates,
    pub suggestions: Vec<ThresholdSuggestion>,
}

/// Values the suggestions are computed against
#[derive(Debug, Clone, Copy)]
struct Baseline {
    paradigm_mismatch_threshold: f64,
    silence_timeout_ms: f64,
    budget_ms: f64,
    governor_threshold: f64,
}

#[derive(Debug)]
pub struct Monitor {
    baseline: Baseline,
    sessions: Mutex<HashMap<String, SessionMetrics>>,
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new(&ArbiterConfig::default())
    }
}

impl Monitor {
    pub fn new(config: &ArbiterConfig) -> Self {
        Self {
            baseline: Baseline {
                paradigm_mismatch_threshold: f64::from(config.looping.paradigm_mismatch_threshold),
                silence_timeout_ms: config.looping.silence_timeout_ms as f64,
                budget_ms: config.collector.budget_ms as f64,
                governor_threshold: config.resolver.governor_threshold,
            },
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn record(&self, session_id: &str, event: MonitorEvent) {
        self.lock()
            .entry(session_id.to_string())
            .or_default()
            .apply(&event);
    }

    /// Drop the metrics of evicted sessions
    pub fn forget(&self, session_ids: &[String]) {
        if session_ids.is_empty() {
            return;
        }
        let mut sessions = self.lock();
        for id in session_ids {
            sessions.remove(id);
        }
    }

    pub fn metrics(&self, session_id: &str) -> Option<SessionMetrics> {
        self.lock().get(session_id).cloned()
    }

    /// Metrics, flags and suggestions for one session
    pub fn report(&self, session_id: &str) -> Option<MonitorReport> {
        let metrics = self.metrics(session_id)?;
        let rates = metrics.rates();
        let flags = flags_for(&metrics, &rates);
        let suggestions = self.suggest(&metrics, &rates);
        if !flags.is_empty() {
            info!(session_id, flags = ?flags, "edge cases flagged");
        }
        Some(MonitorReport {
            session_id: session_id.to_string(),
            metrics,
            rates,
            flags,
            suggestions,
        })
    }

    /// Totals across every session seen
    pub fn global_summary(&self) -> GlobalSummary {
        let sessions = self.lock();
        let mut totals = SessionMetrics::default();
        let mut flagged_sessions = 0;
        for metrics in sessions.values() {
            totals.merge(metrics);
            if !flags_for(metrics, &metrics.rates()).is_empty() {
                flagged_sessions += 1;
            }
        }
        let count = sessions.len();
        drop(sessions);

        let rates = totals.rates();
        let suggestions = self.suggest(&totals, &rates);
        GlobalSummary {
            sessions: count,
            flagged_sessions,
            totals,
            rates,
            suggestions,
        }
    }

    fn suggest(&self, metrics: &SessionMetrics, rates: &MetricRates) -> Vec<ThresholdSuggestion> {
        let baseline = self.baseline;
        let mut suggestions = Vec::new();

        if metrics.loop_replies >= MIN_ITERATIONS_FOR_RATES && rates.rejection_rate >= REJECTION_RATE_FLAG {
            suggestions.push(ThresholdSuggestion {
                parameter: "looping.paradigm_mismatch_threshold".into(),
                current: baseline.paradigm_mismatch_threshold,
                suggested: (baseline.paradigm_mismatch_threshold - 1.0).max(1.0),
                reason: format!("{:.0}% of loop replies were rejections", rates.rejection_rate * 100.0),
            });
        }
        if metrics.loop_replies >= MIN_ITERATIONS_FOR_RATES && rates.silence_rate >= SILENCE_RATE_FLAG {
            suggestions.push(ThresholdSuggestion {
                parameter: "looping.silence_timeout_ms".into(),
                current: baseline.silence_timeout_ms,
                suggested: baseline.silence_timeout_ms * 1.5,
                reason: format!("{:.0}% of loop replies were silent", rates.silence_rate * 100.0),
            });
        }
        if metrics.turns >= MIN_TURNS_FOR_RATES && rates.overrun_rate >= OVERRUN_RATE_FLAG {
            suggestions.push(ThresholdSuggestion {
                parameter: "collector.budget_ms".into(),
                current: baseline.budget_ms,
                suggested: baseline.budget_ms * 1.5,
                reason: format!("{:.0}% of turns exceeded the collection budget", rates.overrun_rate * 100.0),
            });
        }
        if metrics.turns >= MIN_TURNS_FOR_RATES && rates.governor_rate >= GOVERNOR_RATE_FLAG {
            suggestions.push(ThresholdSuggestion {
                parameter: "resolver.governor_threshold".into(),
                current: baseline.governor_threshold,
                suggested: (baseline.governor_threshold - 0.05).max(0.0),
                reason: format!("{:.0}% of turns were forced to the fallback", rates.governor_rate * 100.0),
            });
        }
        suggestions
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SessionMetrics>> {
        self.sessions.lock().unwrap_or_else(|poisoned| {
            error!(category = "monitor", "metrics lock poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

fn flags_for(metrics: &SessionMetrics, rates: &MetricRates) -> Vec<EdgeCaseFlag> {
    let mut flags = Vec::new();
    if metrics.loop_replies >= MIN_ITERATIONS_FOR_RATES && rates.rejection_rate >= REJECTION_RATE_FLAG {
        flags.push(EdgeCaseFlag::ConsistentRejection);
    }
    if metrics.topic_shifts >= TOPIC_SHIFT_FLAG {
        flags.push(EdgeCaseFlag::RapidTopicShift);
    }
    if metrics.loop_replies >= 2 && rates.silence_rate >= SILENCE_RATE_FLAG {
        flags.push(EdgeCaseFlag::ExtendedSilence);
    }
    if metrics.paradigm_mismatches > 0 {
        flags.push(EdgeCaseFlag::ParadigmMismatch);
    }
    flags
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn turn(leader: SubsystemId) -> MonitorEvent {
        MonitorEvent::Turn { leader, over_budget: false, governed: false, detector_failures: 0 }
    }

    fn reply(kind: ReplyKind, rejected: bool) -> MonitorEvent {
        MonitorEvent::LoopReply { reply: kind, rejected }
    }

    #[test]
    fn test_unknown_session_has_no_report() {
        assert!(Monitor::default().report("nope").is_none());
    }

    #[test]
    fn test_forget_drops_evicted_sessions() {
        let monitor = Monitor::default();
        monitor.record("a", turn(SubsystemId::Narrative));
        monitor.record("b", turn(SubsystemId::Narrative));
        monitor.forget(&["a".to_string(), "missing".to_string()]);

        assert!(monitor.metrics("a").is_none());
        assert_eq!(monitor.metrics("b").unwrap().turns, 1);
        assert_eq!(monitor.global_summary().sessions, 1);
    }

    #[test]
    fn test_counts_turns_and_leaders() {
        let monitor = Monitor::default();
        monitor.record("s", turn(SubsystemId::Narrative));
        monitor.record("s", turn(SubsystemId::Narrative));
        monitor.record("s", turn(SubsystemId::Urgency));
        let metrics = monitor.metrics("s").unwrap();
        assert_eq!(metrics.turns, 3);
        assert_eq!(metrics.leaders[&SubsystemId::Narrative], 2);
        assert_eq!(metrics.leaders[&SubsystemId::Urgency], 1);
    }

    #[test]
    fn test_loop_outcomes_split() {
        let monitor = Monitor::default();
        monitor.record("s", MonitorEvent::LoopStarted);
        monitor.record("s", MonitorEvent::LoopEnded(LoopOutcome::Converged));
        monitor.record("s", MonitorEvent::LoopStarted);
        monitor.record("s", MonitorEvent::LoopEnded(LoopOutcome::Displaced));
        let metrics = monitor.metrics("s").unwrap();
        assert_eq!(metrics.loops_started, 2);
        assert_eq!(metrics.loops_completed, 1);
        assert_eq!(metrics.loops_aborted, 1);
        assert_eq!(metrics.topic_shifts, 1);
    }

    #[test]
    fn test_consistent_rejection_flagged_with_suggestion() {
        let monitor = Monitor::default();
        monitor.record("s", MonitorEvent::LoopStarted);
        for _ in 0..3 {
            monitor.record("s", reply(ReplyKind::Correct, true));
        }
        monitor.record("s", MonitorEvent::LoopEnded(LoopOutcome::ParadigmMismatch));

        let report = monitor.report("s").unwrap();
        assert!(report.flags.contains(&EdgeCaseFlag::ConsistentRejection));
        assert!(report.flags.contains(&EdgeCaseFlag::ParadigmMismatch));
        let suggestion = report
            .suggestions
            .iter()
            .find(|s| s.parameter == "looping.paradigm_mismatch_threshold")
            .unwrap();
        assert_eq!(suggestion.current, 3.0);
        assert_eq!(suggestion.suggested, 2.0);
    }

    #[test]
    fn test_extended_silence_flagged() {
        let monitor = Monitor::default();
        monitor.record("s", reply(ReplyKind::Silent, false));
        monitor.record("s", reply(ReplyKind::Silent, false));
        let report = monitor.report("s").unwrap();
        assert_eq!(report.flags, vec![EdgeCaseFlag::ExtendedSilence]);
    }

    #[test]
    fn test_rapid_topic_shift_flagged() {
        let monitor = Monitor::default();
        for _ in 0..3 {
            monitor.record("s", MonitorEvent::LoopStarted);
            monitor.record("s", MonitorEvent::LoopEnded(LoopOutcome::Displaced));
        }
        let report = monitor.report("s").unwrap();
        assert!(report.flags.contains(&EdgeCaseFlag::RapidTopicShift));
    }

    #[test]
    fn test_quiet_session_has_no_flags() {
        let monitor = Monitor::default();
        for _ in 0..6 {
            monitor.record("s", turn(SubsystemId::TonalResonance));
        }
        let report = monitor.report("s").unwrap();
        assert!(report.flags.is_empty());
        assert!(report.suggestions.is_empty());
    }

    #[test]
    fn test_budget_overruns_suggest_larger_budget() {
        let monitor = Monitor::default();
        for i in 0..6 {
            monitor.record("s", MonitorEvent::Turn {
                leader: SubsystemId::Narrative,
                over_budget: i % 2 == 0,
                governed: false,
                detector_failures: 0,
            });
        }
        let report = monitor.report("s").unwrap();
        assert!(report.suggestions.iter().any(|s| s.parameter == "collector.budget_ms"));
    }

    #[test]
    fn test_global_summary_totals() {
        let monitor = Monitor::default();
        monitor.record("a", turn(SubsystemId::Narrative));
        monitor.record("b", turn(SubsystemId::Narrative));
        monitor.record("b", MonitorEvent::LoopEnded(LoopOutcome::ParadigmMismatch));
        let summary = monitor.global_summary();
        assert_eq!(summary.sessions, 2);
        assert_eq!(summary.totals.turns, 2);
        assert_eq!(summary.flagged_sessions, 1);
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let monitor = Monitor::default();
        monitor.record("s", turn(SubsystemId::Narrative));
        let json = serde_json::to_string(&monitor.report("s").unwrap()).unwrap();
        assert!(json.contains("\"sessionId\""));
        assert!(json.contains("\"loopsStarted\""));
        assert!(json.contains("\"narrative\""));
    }
}
