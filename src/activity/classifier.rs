//! Hysteresis classifier for walking detection.
//!
//! The platform motion service reports walking/stationary observations with
//! a confidence grade. Only high-confidence observations move the two
//! hysteresis timestamps; a session decision fires once the newer timestamp
//! leads the older one by the configured trigger duration, and firing resets
//! both timestamps (debounce-on-fire), so one sustained transition produces
//! exactly one decision.

use chrono::{DateTime, Duration, Utc};

use crate::config::SharedSettings;

/// Confidence grade attached to a motion observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// One observation from the platform motion service.
///
/// `walking`/`stationary` are independent asserts; either may be unknown.
#[derive(Debug, Clone, Copy)]
pub struct MotionEvent {
    pub confidence: Confidence,
    pub walking: Option<bool>,
    pub stationary: Option<bool>,
}

impl MotionEvent {
    pub fn high(walking: bool) -> Self {
        Self {
            confidence: Confidence::High,
            walking: Some(walking),
            stationary: Some(!walking),
        }
    }
}

/// Walking hysteresis state: last-walking / last-stationary timestamps plus
/// the live trigger-duration setting.
pub struct ActivityClassifier {
    settings: SharedSettings,
    last_walking: DateTime<Utc>,
    last_stationary: DateTime<Utc>,
}

impl ActivityClassifier {
    pub fn new(settings: SharedSettings, now: DateTime<Utc>) -> Self {
        Self {
            settings,
            last_walking: now,
            last_stationary: now,
        }
    }

    /// Reset both timestamps to `now`.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.last_walking = now;
        self.last_stationary = now;
    }

    /// Feed one observation. Low/medium confidence and ambiguous asserts
    /// (both or neither) leave the hysteresis untouched.
    pub fn observe(&mut self, event: &MotionEvent, now: DateTime<Utc>) {
        if event.confidence != Confidence::High {
            return;
        }
        let walking = event.walking == Some(true);
        let stationary = event.stationary == Some(true);
        match (walking, stationary) {
            (true, false) => self.last_walking = now,
            (false, true) => self.last_stationary = now,
            _ => {}
        }
    }

    /// True once the user has been stationary for the trigger duration
    /// after walking. Fires at most once per sustained transition: a true
    /// result resets both timestamps to `now`.
    pub fn should_stop_session(&mut self, now: DateTime<Utc>) -> bool {
        if self.last_stationary - self.last_walking >= self.trigger() {
            self.reset(now);
            return true;
        }
        false
    }

    /// True once the user has been walking for the trigger duration after
    /// being stationary. Same debounce-on-fire reset as
    /// [`should_stop_session`](Self::should_stop_session).
    pub fn should_start_session(&mut self, now: DateTime<Utc>) -> bool {
        if self.last_walking - self.last_stationary >= self.trigger() {
            self.reset(now);
            return true;
        }
        false
    }

    /// Trigger duration, read fresh so sensitivity changes apply to the
    /// next event. Zero or negative makes every event decisive.
    fn trigger(&self) -> Duration {
        Duration::seconds(
            self.settings
                .snapshot()
                .walking_detection_sensitivity_seconds,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn classifier_with_trigger(secs: i64) -> ActivityClassifier {
        let settings = SharedSettings::default();
        settings.update(|s| s.walking_detection_sensitivity_seconds = secs);
        ActivityClassifier::new(settings, at(0))
    }

    #[test]
    fn test_start_fires_at_exact_trigger_duration() {
        let mut c = classifier_with_trigger(45);
        c.observe(&MotionEvent::high(true), at(0));

        // Walking keeps being observed; stationary stays at the epoch seed
        c.observe(&MotionEvent::high(true), at(44));
        assert!(!c.should_start_session(at(44)));

        c.observe(&MotionEvent::high(true), at(45));
        assert!(c.should_start_session(at(45)));
    }

    #[test]
    fn test_fire_resets_both_timestamps() {
        let mut c = classifier_with_trigger(45);
        c.observe(&MotionEvent::high(true), at(50));
        assert!(c.should_start_session(at(50)));

        // Immediately after firing the trigger must re-accumulate
        assert!(!c.should_start_session(at(50)));
        c.observe(&MotionEvent::high(true), at(51));
        assert!(!c.should_start_session(at(51)));
        c.observe(&MotionEvent::high(true), at(95));
        assert!(c.should_start_session(at(95)));
    }

    #[test]
    fn test_stop_fires_after_sustained_stationary() {
        let mut c = classifier_with_trigger(45);
        c.observe(&MotionEvent::high(true), at(0));
        for t in (5..=50).step_by(5) {
            c.observe(&MotionEvent::high(false), at(t));
        }
        // lastStationary(50) - lastWalking(0) >= 45
        assert!(c.should_stop_session(at(50)));
        assert!(!c.should_stop_session(at(50)));
    }

    #[test]
    fn test_stop_does_not_fire_below_trigger() {
        let mut c = classifier_with_trigger(45);
        c.observe(&MotionEvent::high(true), at(10));
        c.observe(&MotionEvent::high(false), at(54));
        assert!(!c.should_stop_session(at(54)));
    }

    #[test]
    fn test_low_confidence_events_are_ignored() {
        let mut c = classifier_with_trigger(45);
        let noisy = MotionEvent {
            confidence: Confidence::Medium,
            walking: Some(true),
            stationary: Some(false),
        };
        for t in 0..100 {
            c.observe(&noisy, at(t));
        }
        assert!(!c.should_start_session(at(100)));
    }

    #[test]
    fn test_ambiguous_asserts_are_ignored() {
        let mut c = classifier_with_trigger(45);
        let both = MotionEvent {
            confidence: Confidence::High,
            walking: Some(true),
            stationary: Some(true),
        };
        let neither = MotionEvent {
            confidence: Confidence::High,
            walking: None,
            stationary: None,
        };
        c.observe(&both, at(60));
        c.observe(&neither, at(70));
        assert!(!c.should_start_session(at(70)));
        assert!(!c.should_stop_session(at(70)));
    }

    #[test]
    fn test_zero_trigger_is_immediately_decisive() {
        let mut c = classifier_with_trigger(0);
        assert!(c.should_start_session(at(0)));
        // Reset re-arms it; both queries fire on equal timestamps
        assert!(c.should_stop_session(at(0)));
    }

    #[test]
    fn test_sensitivity_change_applies_to_next_query() {
        let settings = SharedSettings::default();
        settings.update(|s| s.walking_detection_sensitivity_seconds = 45);
        let mut c = ActivityClassifier::new(settings.clone(), at(0));

        c.observe(&MotionEvent::high(true), at(30));
        assert!(!c.should_start_session(at(30)));

        settings.update(|s| s.walking_detection_sensitivity_seconds = 20);
        assert!(c.should_start_session(at(30)));
    }
}
