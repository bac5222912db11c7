//! In-memory state for a connected tunnel, owned exclusively by the
//! monitor loop. Lives from a successful connection attempt until cleanup.

use serde::{Deserialize, Serialize};

use std::time::{Duration, SystemTime};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub location: String,
    pub original_public_ip: String,
    pub expected_public_ip: String,
    pub internal_ip: String,
    pub forwarded_port: ForwardedPort,
    pub started_at: SystemTime,
    pub reconnections: u32,
    pub corrections: u32,
    pub correction_timestamps: Vec<SystemTime>,
    pub dns_fallback_active: bool,
    #[serde(default)]
    pub tunnel_pid: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ForwardedPort {
    Known(String),
    Unsupported,
    Unavailable,
}

/// Once 900 seconds have passed since the most recent correction the
/// guardian backs off to its low-alert polling interval.
pub const HIGH_ALERT_WINDOW: Duration = Duration::from_secs(900);

impl Session {
    pub fn new(location: String, original_public_ip: String, expected_public_ip: String, internal_ip: String) -> Self {
        Self {
            location,
            original_public_ip,
            expected_public_ip,
            internal_ip,
            forwarded_port: ForwardedPort::Unavailable,
            started_at: SystemTime::now(),
            reconnections: 0,
            corrections: 0,
            correction_timestamps: Vec::new(),
            dns_fallback_active: false,
            tunnel_pid: 0,
        }
    }

    pub fn uptime(&self, now: SystemTime) -> Duration {
        now.duration_since(self.started_at).unwrap_or_default()
    }

    pub fn record_correction(&mut self, at: SystemTime) {
        self.corrections += 1;
        self.correction_timestamps.push(at);
    }

    pub fn record_reconnection(&mut self) {
        self.reconnections += 1;
        self.corrections = 0;
        self.correction_timestamps.clear();
    }

    /// True once recent correction activity warrants the guardian's
    /// tighter polling interval.
    pub fn guardian_high_alert(&self, now: SystemTime) -> bool {
        self.correction_timestamps
            .last()
            .map(|last| now.duration_since(*last).unwrap_or_default() < HIGH_ALERT_WINDOW)
            .unwrap_or(false)
    }

    /// Reports the dominant interval between corrections, when one exists,
    /// filtering echo events within three seconds of the previous one.
    /// Mirrors the cosmetic "pattern analysis" surfaced on the status view.
    pub fn correction_pattern(&self, now: SystemTime) -> Option<Duration> {
        let uptime = self.uptime(now);
        if uptime < Duration::from_secs(1800) || self.corrections < 4 {
            return None;
        }
        let hours = uptime.as_secs_f64() / 3600.0;
        if (self.corrections as f64) / hours <= 5.0 {
            return None;
        }

        let mut intervals = Vec::new();
        let mut prev: Option<SystemTime> = None;
        for ts in &self.correction_timestamps {
            if let Some(p) = prev {
                let gap = ts.duration_since(p).unwrap_or_default();
                if gap >= Duration::from_secs(3) {
                    intervals.push(gap);
                }
            }
            prev = Some(*ts);
        }
        if intervals.is_empty() {
            return None;
        }

        let mut sorted = intervals.clone();
        sorted.sort();
        let median = sorted[sorted.len() / 2];

        let within_tolerance = intervals
            .iter()
            .filter(|gap| {
                let diff = gap.as_secs().abs_diff(median.as_secs());
                diff <= 30
            })
            .count();

        if within_tolerance * 2 >= intervals.len() { Some(median) } else { None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new("frankfurt".into(), "1.2.3.4".into(), "5.6.7.8".into(), "10.8.0.2".into())
    }

    #[test]
    fn new_session_starts_with_no_corrections() {
        let s = session();
        assert_eq!(s.corrections, 0);
        assert!(!s.guardian_high_alert(SystemTime::now()));
    }

    #[test]
    fn record_correction_increments_counter_and_enables_high_alert() {
        let mut s = session();
        let now = SystemTime::now();
        s.record_correction(now);
        assert_eq!(s.corrections, 1);
        assert!(s.guardian_high_alert(now));
    }

    #[test]
    fn record_reconnection_resets_correction_history() {
        let mut s = session();
        s.record_correction(SystemTime::now());
        s.record_reconnection();
        assert_eq!(s.reconnections, 1);
        assert_eq!(s.corrections, 0);
        assert!(s.correction_timestamps.is_empty());
    }

    #[test]
    fn correction_pattern_is_none_before_thresholds_are_met() {
        let s = session();
        assert_eq!(s.correction_pattern(SystemTime::now()), None);
    }
}
