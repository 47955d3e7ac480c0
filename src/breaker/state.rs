//! Per-service circuit state machine

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CircuitState {
    Closed,
    HalfOpen,
    Open,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
    pub request_limit: u32,
    pub monitoring_window_secs: u64,
    pub minimum_requests: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        use crate::core::constants::*;
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout_secs: DEFAULT_RECOVERY_TIMEOUT_SECS,
            request_limit: DEFAULT_REQUEST_LIMIT,
            monitoring_window_secs: DEFAULT_MONITORING_WINDOW_SECS,
            minimum_requests: DEFAULT_MINIMUM_REQUESTS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(dead_code)]
pub enum Transition {
    None,
    Tripped,
    Recovered,
    Reopened,
}

#[allow(dead_code)]
struct WindowEvent {
    at: Instant,
    success: bool,
}

/// A single service's breaker bookkeeping. Transitions are serialized per
/// service by the caller holding this behind a per-entry lock.
pub struct BreakerRecord {
    pub config: BreakerConfig,
    pub state: CircuitState,
    #[allow(dead_code)]
    pub recovery_attempts: u32,
    #[allow(dead_code)]
    pub last_failure_at: Option<Instant>,
    #[allow(dead_code)]
    pub last_success_at: Option<Instant>,
    opened_at: Option<Instant>,
    half_open_probes_in_flight: u32,
    window: VecDeque<WindowEvent>,
}

impl BreakerRecord {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            recovery_attempts: 0,
            last_failure_at: None,
            last_success_at: None,
            opened_at: None,
            half_open_probes_in_flight: 0,
            window: VecDeque::new(),
        }
    }

    #[allow(dead_code)]
    fn prune_window(&mut self, now: Instant) {
        let bound = Duration::from_secs(self.config.monitoring_window_secs);
        while let Some(front) = self.window.front() {
            if now.duration_since(front.at) > bound {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }

    #[allow(dead_code)]
    fn failures_in_window(&self) -> u32 {
        self.window.iter().filter(|e| !e.success).count() as u32
    }

    #[allow(dead_code)]
    fn total_in_window(&self) -> u32 {
        self.window.len() as u32
    }

    /// Whether the caller is allowed to dispatch a request right now. Also
    /// performs the Open → Half-open transition if the recovery timeout has
    /// elapsed, since that transition is purely time-driven.
    pub fn allow_request(&mut self) -> bool {
        let now = Instant::now();
        if self.state == CircuitState::Open {
            let elapsed = self
                .opened_at
                .map(|t| now.duration_since(t))
                .unwrap_or_default();
            if elapsed >= Duration::from_secs(self.config.recovery_timeout_secs) {
                self.state = CircuitState::HalfOpen;
                self.half_open_probes_in_flight = 0;
            }
        }

        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                if self.half_open_probes_in_flight < self.config.request_limit {
                    self.half_open_probes_in_flight += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    #[allow(dead_code)]
    pub fn record_success(&mut self) -> Transition {
        let now = Instant::now();
        self.last_success_at = Some(now);

        match self.state {
            CircuitState::HalfOpen => {
                self.state = CircuitState::Closed;
                self.window.clear();
                self.half_open_probes_in_flight = 0;
                self.opened_at = None;
                Transition::Recovered
            }
            CircuitState::Closed => {
                self.window.push_back(WindowEvent { at: now, success: true });
                self.prune_window(now);
                Transition::None
            }
            CircuitState::Open => Transition::None,
        }
    }

    #[allow(dead_code)]
    pub fn record_failure(&mut self) -> Transition {
        let now = Instant::now();
        self.last_failure_at = Some(now);

        match self.state {
            CircuitState::HalfOpen => {
                self.recovery_attempts += 1;
                self.state = CircuitState::Open;
                self.opened_at = Some(now);
                self.half_open_probes_in_flight = 0;
                Transition::Reopened
            }
            CircuitState::Closed => {
                self.window.push_back(WindowEvent { at: now, success: false });
                self.prune_window(now);
                if self.failures_in_window() >= self.config.failure_threshold
                    && self.total_in_window() >= self.config.minimum_requests
                {
                    self.state = CircuitState::Open;
                    self.opened_at = Some(now);
                    Transition::Tripped
                } else {
                    Transition::None
                }
            }
            CircuitState::Open => Transition::None,
        }
    }

    pub fn manual_reset(&mut self) {
        self.state = CircuitState::Closed;
        self.window.clear();
        self.half_open_probes_in_flight = 0;
        self.opened_at = None;
    }
}
