//! Gating Layer (C7): debounce, rate limiting, circuit breaking, and scene
//! filtering. Owns every piece of process-global mutable state the
//! concurrency model (SPEC_FULL.md §5) requires to stay un-preempted —
//! realized here as a single `std::sync::Mutex` guarding one state struct,
//! never held across an `.await`.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use regex::Regex;
use scene_sentinel_config::{CircuitBreakerSettings, FilterConfig, RateLimitConfig, TimingConfig};
use scene_sentinel_resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use tracing::debug;

use crate::model::Scene;
use crate::scheduler::{Duration, Instant};

const RATE_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    BreakerOpen,
    Debounced,
    GlobalRateLimited,
    SceneRateLimited,
    Filtered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Accept,
    Reject(RejectReason),
}

struct GatingState {
    debounce: HashMap<String, Instant>,
    global_window: VecDeque<Instant>,
    scene_windows: HashMap<String, VecDeque<Instant>>,
    breaker: CircuitBreaker,
}

pub struct GatingLayer {
    state: Mutex<GatingState>,
    rate_limits: RateLimitConfig,
    debounce_window: Duration,
    include_labels: Vec<String>,
    exclude_labels: Vec<String>,
    exclude_uids: Vec<String>,
    name_patterns: Vec<Regex>,
}

impl GatingLayer {
    pub fn new(
        timing: &TimingConfig,
        rate_limits: RateLimitConfig,
        breaker_settings: CircuitBreakerSettings,
        filters: &FilterConfig,
    ) -> Result<Self, regex::Error> {
        let name_patterns = filters
            .name_patterns
            .iter()
            .map(|pattern| Regex::new(pattern))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            state: Mutex::new(GatingState {
                debounce: HashMap::new(),
                global_window: VecDeque::new(),
                scene_windows: HashMap::new(),
                breaker: CircuitBreaker::new(CircuitBreakerConfig {
                    name: Some("scene-validator".to_string()),
                    failure_threshold: breaker_settings.failure_threshold,
                    success_threshold: breaker_settings.success_threshold,
                    timeout: breaker_settings.timeout,
                }),
            }),
            rate_limits,
            debounce_window: timing.debounce_window,
            include_labels: filters.include_labels.clone(),
            exclude_labels: filters.exclude_labels.clone(),
            exclude_uids: filters.exclude_uids.clone(),
            name_patterns,
        })
    }

    /// Apply §4.6's gates in order, recording acceptance into every window
    /// on success.
    pub fn decide(&self, scene: &Scene, now: Instant) -> GateDecision {
        let mut state = self.state.lock().expect("gating state mutex poisoned");

        if !state.breaker.allow(now) {
            debug!(scene_id = %scene.id, "rejected: circuit breaker open");
            return GateDecision::Reject(RejectReason::BreakerOpen);
        }

        state
            .debounce
            .retain(|_, last| now.saturating_duration_since(*last) < self.debounce_window);
        if state.debounce.contains_key(scene.entity_id()) {
            debug!(scene_id = %scene.id, "rejected: debounced");
            return GateDecision::Reject(RejectReason::Debounced);
        }

        prune(&mut state.global_window, now);
        if state.global_window.len() as u32 >= self.rate_limits.max_global_per_min {
            debug!(scene_id = %scene.id, "rejected: global rate limit");
            return GateDecision::Reject(RejectReason::GlobalRateLimited);
        }

        let scene_key = scene.entity_id().to_string();
        {
            let scene_window = state.scene_windows.entry(scene_key.clone()).or_default();
            prune(scene_window, now);
            if scene_window.len() as u32 >= self.rate_limits.max_scene_per_min {
                debug!(scene_id = %scene.id, "rejected: per-scene rate limit");
                return GateDecision::Reject(RejectReason::SceneRateLimited);
            }
        }

        if !self.passes_filters(scene) {
            debug!(scene_id = %scene.id, "rejected: scene filter");
            return GateDecision::Reject(RejectReason::Filtered);
        }

        state.debounce.insert(scene_key.clone(), now);
        state.global_window.push_back(now);
        state.scene_windows.entry(scene_key).or_default().push_back(now);
        GateDecision::Accept
    }

    fn passes_filters(&self, scene: &Scene) -> bool {
        if self.exclude_uids.iter().any(|uid| uid == &scene.id) {
            return false;
        }
        if self
            .exclude_labels
            .iter()
            .any(|label| scene.labels.contains(label))
        {
            return false;
        }
        if !self.include_labels.is_empty() {
            return self
                .include_labels
                .iter()
                .any(|label| scene.labels.contains(label));
        }
        if !self.name_patterns.is_empty() {
            return self
                .name_patterns
                .iter()
                .any(|pattern| pattern.is_match(&scene.name));
        }
        true
    }

    pub fn record_success(&self, now: Instant) {
        self.state
            .lock()
            .expect("gating state mutex poisoned")
            .breaker
            .record_success(now);
    }

    pub fn record_failure(&self, now: Instant) {
        self.state
            .lock()
            .expect("gating state mutex poisoned")
            .breaker
            .record_failure(now);
    }

    pub fn breaker_state(&self) -> CircuitState {
        self.state.lock().expect("gating state mutex poisoned").breaker.state()
    }
}

fn prune(window: &mut VecDeque<Instant>, now: Instant) {
    while let Some(&front) = window.front() {
        if now.saturating_duration_since(front) >= RATE_WINDOW {
            window.pop_front();
        } else {
            break;
        }
    }
}
