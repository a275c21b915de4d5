//! Cross-request behavioral history per client identity.

use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::RwLock;

use cue_common::Flag;
use cue_common::constants::BEHAVIOR_HISTORY_CAPACITY;

/// One verification attempt as seen by the history tracker
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    /// Server clock, epoch ms
    pub timestamp_ms: i64,
    pub reaction_ms: f64,
    /// Movement confidence, 0-1
    pub accuracy: f64,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnomalyReport {
    /// 0-1
    pub score: f64,
    pub flags: Vec<Flag>,
}

/// Bounded attempt history with derived aggregates
#[derive(Debug, Default)]
pub struct BehaviorHistory {
    attempts: VecDeque<Attempt>,
    user_agents: HashSet<String>,
    avg_reaction_ms: f64,
    avg_accuracy: f64,
}

impl BehaviorHistory {
    /// Append an attempt, evicting the oldest beyond capacity
    pub fn record(&mut self, attempt: Attempt) {
        if let Some(ua) = &attempt.user_agent {
            self.user_agents.insert(ua.clone());
        }
        self.attempts.push_back(attempt);
        while self.attempts.len() > BEHAVIOR_HISTORY_CAPACITY {
            self.attempts.pop_front();
        }

        let reactions: Vec<f64> = self
            .attempts
            .iter()
            .map(|a| a.reaction_ms)
            .filter(|&r| r > 0.0)
            .collect();
        if !reactions.is_empty() {
            self.avg_reaction_ms = reactions.iter().sum::<f64>() / reactions.len() as f64;
        }
        self.avg_accuracy =
            self.attempts.iter().map(|a| a.accuracy).sum::<f64>() / self.attempts.len() as f64;
    }

    /// Judge `current` against the recorded (strictly prior) attempts
    pub fn detect(&self, current: &Attempt, now_ms: i64) -> AnomalyReport {
        if self.attempts.len() < 2 {
            return AnomalyReport::default();
        }

        let mut report = AnomalyReport::default();
        let mut raise = |flag: Flag, weight: f64| {
            report.flags.push(flag);
            report.score += weight;
        };

        // Sudden change in reaction time over the last five attempts
        let recent: Vec<f64> = self
            .attempts
            .iter()
            .rev()
            .take(5)
            .map(|a| a.reaction_ms)
            .filter(|&r| r > 0.0)
            .collect();
        if recent.len() >= 3 {
            let mean = recent.iter().sum::<f64>() / recent.len() as f64;
            // `recent` is newest first
            if (recent[0] - mean).abs() > mean * 0.8 {
                raise(Flag::VelocityAnomaly, 0.15);
            }
        }

        let mut agents = self.user_agents.len();
        if let Some(ua) = &current.user_agent {
            if !self.user_agents.contains(ua) {
                agents += 1;
            }
        }
        if agents > 3 {
            raise(Flag::MultipleUserAgents, 0.2);
        }

        if current.reaction_ms > 0.0 && current.reaction_ms < 200.0 {
            raise(Flag::SuspiciousReactionTime, 0.25);
        }

        if self.avg_accuracy > 0.95 && self.attempts.len() >= 5 {
            raise(Flag::PerfectAccuracyPattern, 0.2);
        }

        if self.attempts.len() >= 3 {
            let intervals: Vec<f64> = self
                .attempts
                .iter()
                .zip(self.attempts.iter().skip(1))
                .map(|(a, b)| (b.timestamp_ms - a.timestamp_ms) as f64)
                .collect();
            let (mean, variance) = super::movement::mean_variance(&intervals);
            if variance < mean * 0.05 {
                raise(Flag::ConstantAttemptIntervals, 0.15);
            }
        }

        let minute_ago = now_ms - 60_000;
        let last_minute = self
            .attempts
            .iter()
            .filter(|a| a.timestamp_ms > minute_ago)
            .count();
        if last_minute > 10 {
            raise(Flag::RapidAttempts, 0.2);
        }

        report.score = report.score.min(1.0);
        report
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    #[cfg(test)]
    pub fn avg_reaction_ms(&self) -> f64 {
        self.avg_reaction_ms
    }

    #[cfg(test)]
    pub fn avg_accuracy(&self) -> f64 {
        self.avg_accuracy
    }

    fn last_seen(&self) -> Option<i64> {
        self.attempts.back().map(|a| a.timestamp_ms)
    }
}

/// Histories of every identity seen by this process
#[derive(Default)]
pub struct BehaviorTracker {
    histories: RwLock<HashMap<String, BehaviorHistory>>,
}

impl BehaviorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Detect anomalies against prior history, then record the attempt.
    /// Both happen under one write lock so concurrent attempts serialize.
    pub async fn observe(&self, identity: &str, attempt: Attempt) -> AnomalyReport {
        let mut histories = self.histories.write().await;
        let history = histories.entry(identity.to_string()).or_default();
        let report = history.detect(&attempt, attempt.timestamp_ms);
        history.record(attempt);
        report
    }

    #[cfg(test)]
    pub async fn record(&self, identity: &str, attempt: Attempt) {
        self.histories
            .write()
            .await
            .entry(identity.to_string())
            .or_default()
            .record(attempt);
    }

    #[cfg(test)]
    pub async fn detect_anomalies(&self, identity: &str, current: &Attempt) -> AnomalyReport {
        self.histories
            .read()
            .await
            .get(identity)
            .map(|history| history.detect(current, current.timestamp_ms))
            .unwrap_or_default()
    }

    /// Drop identities idle for longer than `idle_ms`
    pub async fn prune(&self, now_ms: i64, idle_ms: i64) -> usize {
        let mut histories = self.histories.write().await;
        let before = histories.len();
        histories.retain(|_, history| {
            history
                .last_seen()
                .is_some_and(|seen| now_ms - seen <= idle_ms)
        });
        before - histories.len()
    }

    pub async fn identities(&self) -> usize {
        self.histories.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(timestamp_ms: i64, reaction_ms: f64, accuracy: f64, ua: &str) -> Attempt {
        Attempt {
            timestamp_ms,
            reaction_ms,
            accuracy,
            user_agent: Some(ua.to_string()),
        }
    }

    #[test]
    fn test_quiet_until_two_prior_attempts() {
        let mut history = BehaviorHistory::default();
        let bot = attempt(1_000, 50.0, 1.0, "curl");
        assert_eq!(history.detect(&bot, 1_000), AnomalyReport::default());
        history.record(bot.clone());
        assert_eq!(history.detect(&bot, 1_000), AnomalyReport::default());
        history.record(bot.clone());
        assert!(history.detect(&bot, 1_000).flags.contains(&Flag::SuspiciousReactionTime));
    }

    #[test]
    fn test_capacity_and_averages() {
        let mut history = BehaviorHistory::default();
        for i in 0..150 {
            history.record(attempt(i * 1_000, 400.0 + (i % 2) as f64 * 200.0, 0.5, "ua"));
        }
        assert_eq!(history.len(), BEHAVIOR_HISTORY_CAPACITY);
        assert!((history.avg_reaction_ms() - 500.0).abs() < 1e-9);
        assert!((history.avg_accuracy() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_scripted_pattern_flags() {
        let mut history = BehaviorHistory::default();
        // Eleven attempts, exactly 2s apart, perfect accuracy
        for i in 0..11 {
            history.record(attempt(100_000 + i * 2_000, 300.0, 0.99, "bot"));
        }
        let now = 100_000 + 11 * 2_000;
        let report = history.detect(&attempt(now, 120.0, 0.99, "bot"), now);

        assert!(report.flags.contains(&Flag::SuspiciousReactionTime));
        assert!(report.flags.contains(&Flag::PerfectAccuracyPattern));
        assert!(report.flags.contains(&Flag::ConstantAttemptIntervals));
        assert!(report.flags.contains(&Flag::RapidAttempts));
        assert!(!report.flags.contains(&Flag::VelocityAnomaly));
        assert!((report.score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_velocity_anomaly_and_agent_switching() {
        let mut history = BehaviorHistory::default();
        let reactions = [800.0, 760.0, 820.0, 790.0, 3_000.0];
        let agents = ["firefox", "chrome", "safari", "edge", "edge"];
        for (i, (reaction, ua)) in reactions.iter().zip(agents).enumerate() {
            history.record(attempt(i as i64 * 37_000 + (i * i) as i64 * 5_000, *reaction, 0.6, ua));
        }
        let now = 1_000_000;
        let report = history.detect(&attempt(now, 900.0, 0.6, "opera"), now);
        assert!(report.flags.contains(&Flag::VelocityAnomaly));
        assert!(report.flags.contains(&Flag::MultipleUserAgents));
        assert!(!report.flags.contains(&Flag::RapidAttempts));
    }

    #[tokio::test]
    async fn test_observe_judges_before_recording() {
        let tracker = BehaviorTracker::new();
        let fast = attempt(1_000, 100.0, 0.8, "ua");

        assert!(tracker.observe("ip", fast.clone()).await.flags.is_empty());
        assert!(tracker.observe("ip", fast.clone()).await.flags.is_empty());
        let third = tracker.observe("ip", fast.clone()).await;
        assert!(third.flags.contains(&Flag::SuspiciousReactionTime));

        assert_eq!(
            tracker.detect_anomalies("other", &fast).await,
            AnomalyReport::default()
        );
    }

    #[tokio::test]
    async fn test_prune_idle_identities() {
        let tracker = BehaviorTracker::new();
        tracker.record("old", attempt(0, 500.0, 0.5, "ua")).await;
        tracker.record("new", attempt(50_000, 500.0, 0.5, "ua")).await;

        assert_eq!(tracker.prune(60_000, 30_000).await, 1);
        assert_eq!(tracker.identities().await, 1);
    }
}
