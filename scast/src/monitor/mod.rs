//! Session health monitoring.
//!
//! Samples a session's push processes on a fixed interval and classifies the
//! result. A sample is healthy iff the process is running and forward
//! progress (output activity) has been observed within the staleness window.
//! Demotion to Degraded requires a configurable number of consecutive
//! unhealthy samples, suppressing flapping on single transient hiccups.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::process::ChildStream;

/// Default interval between health samples.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(5);

/// Default window in which output activity must have been observed.
pub const DEFAULT_STALENESS_WINDOW: Duration = Duration::from_secs(30);

/// Default number of consecutive unhealthy samples before demotion.
pub const DEFAULT_DEBOUNCE_SAMPLES: u32 = 2;

/// Default number of consecutive healthy samples after which a recovered
/// session is considered stable and its retry counter resets.
pub const DEFAULT_STABILIZATION_SAMPLES: u32 = 3;

/// Default bound on how long a Starting/Reconnecting session may wait for
/// its first successful sample.
pub const DEFAULT_FIRST_SAMPLE_DEADLINE: Duration = Duration::from_secs(30);

/// How a secondary destination failure affects session-level health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecondaryFailurePolicy {
    /// Secondary failures are logged and notified but never demote the
    /// session (the default; losing a simulcast target degrades gracefully).
    #[default]
    Ignore,
    /// Secondary failures make the sample unhealthy, escalating through the
    /// normal debounce path.
    Degrade,
}

/// Health monitor tuning.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub sample_interval: Duration,
    pub staleness_window: Duration,
    pub debounce_samples: u32,
    pub stabilization_samples: u32,
    pub first_sample_deadline: Duration,
    pub secondary_failure_policy: SecondaryFailurePolicy,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            staleness_window: DEFAULT_STALENESS_WINDOW,
            debounce_samples: DEFAULT_DEBOUNCE_SAMPLES,
            stabilization_samples: DEFAULT_STABILIZATION_SAMPLES,
            first_sample_deadline: DEFAULT_FIRST_SAMPLE_DEADLINE,
            secondary_failure_policy: SecondaryFailurePolicy::default(),
        }
    }
}

/// Health observed for one child stream at sampling time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildHealth {
    pub target_url: String,
    pub primary: bool,
    pub alive: bool,
    pub exit_code: Option<i32>,
    pub activity_elapsed_ms: u64,
    pub healthy: bool,
}

/// One aggregated health sample across a session's child streams.
#[derive(Debug, Clone)]
pub struct HealthSample {
    pub healthy: bool,
    /// Why the sample is unhealthy, when it is.
    pub reason: Option<String>,
    pub children: Vec<ChildHealth>,
    pub taken_at: DateTime<Utc>,
}

impl HealthSample {
    /// Health of the primary child, if present.
    pub fn primary(&self) -> Option<&ChildHealth> {
        self.children.iter().find(|c| c.primary)
    }

    /// Secondary children that failed in this sample.
    pub fn failed_secondaries(&self) -> impl Iterator<Item = &ChildHealth> {
        self.children.iter().filter(|c| !c.primary && !c.healthy)
    }
}

/// Verdict after feeding a sample through the debounce tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthVerdict {
    Healthy,
    /// Unhealthy, but below the debounce threshold.
    Unhealthy { consecutive: u32 },
    /// The debounce threshold was reached; the session should demote.
    Degraded { reason: String },
}

/// Classify a single child: healthy iff running with recent activity.
fn classify_child(alive: bool, activity_elapsed: Duration, staleness_window: Duration) -> bool {
    alive && activity_elapsed <= staleness_window
}

/// Per-session health monitor with debounce state.
pub struct HealthMonitor {
    config: MonitorConfig,
    consecutive_unhealthy: u32,
}

impl HealthMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            consecutive_unhealthy: 0,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Take one sample across the session's child streams.
    pub fn sample(&self, children: &mut [ChildStream]) -> HealthSample {
        let staleness = self.config.staleness_window;
        let mut child_health = Vec::with_capacity(children.len());

        for child in children.iter_mut() {
            let alive = child.handle.is_alive();
            let activity_elapsed = child.handle.activity_elapsed();
            child_health.push(ChildHealth {
                target_url: child.handle.target_url().to_string(),
                primary: child.primary,
                alive,
                exit_code: child.handle.exit_code(),
                activity_elapsed_ms: activity_elapsed.as_millis() as u64,
                healthy: classify_child(alive, activity_elapsed, staleness),
            });
        }

        let primary_unhealthy = child_health
            .iter()
            .find(|c| c.primary)
            .map(|c| !c.healthy)
            .unwrap_or(true);
        let secondary_unhealthy = child_health.iter().any(|c| !c.primary && !c.healthy);

        let escalate_secondary = secondary_unhealthy
            && self.config.secondary_failure_policy == SecondaryFailurePolicy::Degrade;
        let healthy = !primary_unhealthy && !escalate_secondary;

        let reason = if healthy {
            None
        } else if primary_unhealthy {
            Some(Self::describe(child_health.iter().find(|c| c.primary), staleness))
        } else {
            Some("secondary destination unhealthy".to_string())
        };

        HealthSample {
            healthy,
            reason,
            children: child_health,
            taken_at: Utc::now(),
        }
    }

    fn describe(primary: Option<&ChildHealth>, staleness: Duration) -> String {
        match primary {
            None => "no primary push process".to_string(),
            Some(c) if !c.alive => match c.exit_code {
                Some(code) => format!("primary push process exited with code {code}"),
                None => "primary push process exited".to_string(),
            },
            Some(_) => format!("no activity observed within {}s", staleness.as_secs()),
        }
    }

    /// Feed a sample into the debounce tracker and obtain a verdict.
    pub fn observe(&mut self, sample: &HealthSample) -> HealthVerdict {
        if sample.healthy {
            self.consecutive_unhealthy = 0;
            return HealthVerdict::Healthy;
        }

        self.consecutive_unhealthy += 1;
        if self.consecutive_unhealthy >= self.config.debounce_samples {
            self.consecutive_unhealthy = 0;
            HealthVerdict::Degraded {
                reason: sample
                    .reason
                    .clone()
                    .unwrap_or_else(|| "unhealthy".to_string()),
            }
        } else {
            HealthVerdict::Unhealthy {
                consecutive: self.consecutive_unhealthy,
            }
        }
    }

    /// Reset debounce state, e.g. after a restart attempt.
    pub fn reset(&mut self) {
        self.consecutive_unhealthy = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unhealthy_sample(reason: &str) -> HealthSample {
        HealthSample {
            healthy: false,
            reason: Some(reason.to_string()),
            children: Vec::new(),
            taken_at: Utc::now(),
        }
    }

    fn healthy_sample() -> HealthSample {
        HealthSample {
            healthy: true,
            reason: None,
            children: Vec::new(),
            taken_at: Utc::now(),
        }
    }

    #[test]
    fn test_classify_child_boundaries() {
        let staleness = Duration::from_secs(30);
        assert!(classify_child(true, Duration::from_secs(29), staleness));
        assert!(classify_child(true, Duration::from_secs(30), staleness));
        assert!(!classify_child(true, Duration::from_secs(31), staleness));
        assert!(!classify_child(false, Duration::ZERO, staleness));
    }

    #[test]
    fn test_two_consecutive_unhealthy_samples_degrade() {
        let mut monitor = HealthMonitor::new(MonitorConfig::default());

        assert_eq!(
            monitor.observe(&unhealthy_sample("process exited")),
            HealthVerdict::Unhealthy { consecutive: 1 }
        );
        assert!(matches!(
            monitor.observe(&unhealthy_sample("process exited")),
            HealthVerdict::Degraded { .. }
        ));
    }

    #[test]
    fn test_isolated_unhealthy_sample_does_not_degrade() {
        let mut monitor = HealthMonitor::new(MonitorConfig::default());

        monitor.observe(&unhealthy_sample("hiccup"));
        assert_eq!(monitor.observe(&healthy_sample()), HealthVerdict::Healthy);
        // The counter was reset: one more unhealthy sample is again below
        // the threshold
        assert_eq!(
            monitor.observe(&unhealthy_sample("hiccup")),
            HealthVerdict::Unhealthy { consecutive: 1 }
        );
    }

    #[test]
    fn test_custom_debounce_count() {
        let config = MonitorConfig {
            debounce_samples: 3,
            ..Default::default()
        };
        let mut monitor = HealthMonitor::new(config);

        monitor.observe(&unhealthy_sample("x"));
        assert_eq!(
            monitor.observe(&unhealthy_sample("x")),
            HealthVerdict::Unhealthy { consecutive: 2 }
        );
        assert!(matches!(
            monitor.observe(&unhealthy_sample("x")),
            HealthVerdict::Degraded { .. }
        ));
    }

    #[test]
    fn test_debounce_of_one_degrades_immediately() {
        let config = MonitorConfig {
            debounce_samples: 1,
            ..Default::default()
        };
        let mut monitor = HealthMonitor::new(config);
        assert!(matches!(
            monitor.observe(&unhealthy_sample("x")),
            HealthVerdict::Degraded { .. }
        ));
    }

    #[test]
    fn test_reset_clears_debounce_state() {
        let mut monitor = HealthMonitor::new(MonitorConfig::default());
        monitor.observe(&unhealthy_sample("x"));
        monitor.reset();
        assert_eq!(
            monitor.observe(&unhealthy_sample("x")),
            HealthVerdict::Unhealthy { consecutive: 1 }
        );
    }

    #[tokio::test]
    async fn test_sample_against_real_processes() {
        use crate::process::{PushCommand, PushProcessHandle};

        let alive = PushProcessHandle::spawn(
            &PushCommand::new("sleep", vec!["30".into()]),
            "rtmp://t/primary",
        )
        .unwrap();
        let mut children = vec![ChildStream::new(alive, true)];

        let monitor = HealthMonitor::new(MonitorConfig::default());
        let sample = monitor.sample(&mut children);
        assert!(sample.healthy);
        assert!(sample.primary().unwrap().alive);

        children[0].terminate(Duration::from_millis(500)).await;
        let sample = monitor.sample(&mut children);
        assert!(!sample.healthy);
        assert!(sample.reason.is_some());
    }

    #[tokio::test]
    async fn test_secondary_failure_policy() {
        use crate::process::{PushCommand, PushProcessHandle};

        let primary = PushProcessHandle::spawn(
            &PushCommand::new("sleep", vec!["30".into()]),
            "rtmp://t/primary",
        )
        .unwrap();
        let secondary = PushProcessHandle::spawn(
            &PushCommand::new("sh", vec!["-c".into(), "exit 1".into()]),
            "rtmp://t/secondary",
        )
        .unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let mut children = vec![
            ChildStream::new(primary, true),
            ChildStream::new(secondary, false),
        ];

        // Default policy: a dead secondary does not make the sample unhealthy
        let monitor = HealthMonitor::new(MonitorConfig::default());
        let sample = monitor.sample(&mut children);
        assert!(sample.healthy);
        assert_eq!(sample.failed_secondaries().count(), 1);

        // Degrade policy: it does
        let monitor = HealthMonitor::new(MonitorConfig {
            secondary_failure_policy: SecondaryFailurePolicy::Degrade,
            ..Default::default()
        });
        let sample = monitor.sample(&mut children);
        assert!(!sample.healthy);

        children[0].terminate(Duration::from_millis(500)).await;
    }
}
