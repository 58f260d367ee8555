//! Per-service circuit breakers for provider calls
//!
//! Classic three-state machine: Closed counts consecutive failures and
//! opens at a threshold; Open rejects immediately until the recovery
//! timeout; HalfOpen admits a bounded number of trial calls and closes
//! again after enough successes. Any HalfOpen failure reopens.
//!
//! The breaker is agnostic to what "failure" means: any `Err` from the
//! wrapped operation counts. Rejected or failed calls are routed to the
//! caller-supplied fallback, so a breaker decision never becomes an error
//! by itself.

use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// Breaker tuning, shared by every service
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Consecutive Closed-state failures before opening
    pub failure_threshold: u32,
    /// How long Open rejects before probing recovery
    pub recovery_timeout: Duration,
    /// HalfOpen successes required to close
    pub success_threshold: u32,
    /// Maximum concurrent HalfOpen trial calls
    pub max_half_open_requests: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
            max_half_open_requests: 2,
        }
    }
}

/// Breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerStatus {
    Closed,
    Open,
    HalfOpen,
}

/// Why the fallback is running
#[derive(Debug)]
pub enum CallFailure<E> {
    /// The breaker rejected the call; the operation was never started
    Rejected,
    /// The operation ran and failed
    Error(E),
}

/// Read-only view of one breaker, for operational monitoring
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub service: String,
    pub status: BreakerStatus,
    pub failure_count: u32,
    /// Milliseconds until an Open breaker starts probing, if Open
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_remaining_ms: Option<u64>,
}

#[derive(Debug)]
struct BreakerState {
    status: BreakerStatus,
    failure_count: u32,
    open_until: Option<Instant>,
    half_open_successes: u32,
    half_open_in_flight: u32,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            status: BreakerStatus::Closed,
            failure_count: 0,
            open_until: None,
            half_open_successes: 0,
            half_open_in_flight: 0,
        }
    }

    fn open(&mut self, recovery_timeout: Duration) {
        self.status = BreakerStatus::Open;
        self.open_until = Some(Instant::now() + recovery_timeout);
        self.failure_count = 0;
        self.half_open_successes = 0;
        self.half_open_in_flight = 0;
    }

    fn close(&mut self) {
        self.status = BreakerStatus::Closed;
        self.failure_count = 0;
        self.open_until = None;
        self.half_open_successes = 0;
        self.half_open_in_flight = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Admission {
    /// Closed-state pass-through
    Normal,
    /// HalfOpen trial call, holds one of the bounded trial slots
    Trial,
    Rejected,
}

type StateTable = Arc<Mutex<HashMap<String, BreakerState>>>;

/// Circuit breaker registry, one state machine per service name
pub struct CircuitBreaker {
    states: StateTable,
    config: BreakerConfig,
}

impl CircuitBreaker {
    /// Create the registry with a breaker per known service
    pub fn new(config: BreakerConfig, services: &[&str]) -> Self {
        let mut states = HashMap::new();
        for service in services {
            states.insert(service.to_string(), BreakerState::new());
        }
        Self {
            states: Arc::new(Mutex::new(states)),
            config,
        }
    }

    /// Execute `operation` under the breaker for `service`
    ///
    /// On Open (or HalfOpen at trial capacity) the operation future is
    /// dropped unpolled and only the fallback runs. On failure the error is
    /// recorded and handed to the fallback. The fallback's value is always
    /// returned; breaker decisions never surface as errors.
    pub async fn call<T, E, OpFut, Fb, FbFut>(
        &self,
        service: &str,
        operation: OpFut,
        fallback: Fb,
    ) -> T
    where
        OpFut: Future<Output = Result<T, E>>,
        Fb: FnOnce(CallFailure<E>) -> FbFut,
        FbFut: Future<Output = T>,
    {
        let admission = self.admit(service).await;
        if admission == Admission::Rejected {
            tracing::debug!(service, "Circuit open, rejecting call");
            return fallback(CallFailure::Rejected).await;
        }

        // Release the trial slot even if the caller abandons us mid-flight;
        // a leaked slot would wedge the breaker in HalfOpen.
        let guard = TrialGuard::new(&self.states, service, admission);
        match operation.await {
            Ok(value) => {
                guard.disarm();
                self.record_success(service, admission).await;
                value
            }
            Err(error) => {
                guard.disarm();
                self.record_failure(service, admission).await;
                fallback(CallFailure::Error(error)).await
            }
        }
    }

    /// Admission decision, including the Open to HalfOpen transition
    async fn admit(&self, service: &str) -> Admission {
        let now = Instant::now();
        let mut states = self.states.lock().await;
        let state = states
            .entry(service.to_string())
            .or_insert_with(BreakerState::new);

        match state.status {
            BreakerStatus::Closed => Admission::Normal,
            BreakerStatus::Open => {
                let expired = state.open_until.map_or(true, |until| now >= until);
                if expired {
                    tracing::info!(service, "Circuit breaker half-open, probing recovery");
                    state.status = BreakerStatus::HalfOpen;
                    state.open_until = None;
                    state.half_open_successes = 0;
                    state.half_open_in_flight = 1;
                    Admission::Trial
                } else {
                    Admission::Rejected
                }
            }
            BreakerStatus::HalfOpen => {
                if state.half_open_in_flight < self.config.max_half_open_requests {
                    state.half_open_in_flight += 1;
                    Admission::Trial
                } else {
                    Admission::Rejected
                }
            }
        }
    }

    async fn record_success(&self, service: &str, admission: Admission) {
        let mut states = self.states.lock().await;
        let Some(state) = states.get_mut(service) else {
            return;
        };

        match admission {
            Admission::Normal => {
                // A success in Closed ends any failure streak
                if state.status == BreakerStatus::Closed {
                    state.failure_count = 0;
                }
            }
            Admission::Trial => {
                state.half_open_in_flight = state.half_open_in_flight.saturating_sub(1);
                // A concurrent trial failure may have reopened the breaker;
                // a late success must not close it again.
                if state.status == BreakerStatus::HalfOpen {
                    state.half_open_successes += 1;
                    if state.half_open_successes >= self.config.success_threshold {
                        tracing::info!(service, "Circuit breaker closed after recovery");
                        state.close();
                    }
                }
            }
            Admission::Rejected => {}
        }
    }

    async fn record_failure(&self, service: &str, admission: Admission) {
        let mut states = self.states.lock().await;
        let Some(state) = states.get_mut(service) else {
            return;
        };

        match admission {
            Admission::Normal => {
                if state.status == BreakerStatus::Closed {
                    state.failure_count += 1;
                    if state.failure_count >= self.config.failure_threshold {
                        tracing::warn!(
                            service,
                            failures = state.failure_count,
                            "Circuit breaker opened"
                        );
                        state.open(self.config.recovery_timeout);
                    }
                }
            }
            Admission::Trial => {
                state.half_open_in_flight = state.half_open_in_flight.saturating_sub(1);
                if state.status == BreakerStatus::HalfOpen {
                    tracing::warn!(service, "Circuit breaker reopened, trial call failed");
                    state.open(self.config.recovery_timeout);
                }
            }
            Admission::Rejected => {}
        }
    }

    /// Side-effect-free view of every breaker
    ///
    /// Does not perform the Open to HalfOpen transition; it reports the
    /// stored state as-is.
    pub async fn snapshot(&self) -> Vec<BreakerSnapshot> {
        let now = Instant::now();
        let states = self.states.lock().await;
        let mut snapshots: Vec<BreakerSnapshot> = states
            .iter()
            .map(|(service, state)| BreakerSnapshot {
                service: service.clone(),
                status: state.status,
                failure_count: state.failure_count,
                open_remaining_ms: state
                    .open_until
                    .map(|until| until.saturating_duration_since(now).as_millis() as u64),
            })
            .collect();
        snapshots.sort_by(|a, b| a.service.cmp(&b.service));
        snapshots
    }
}

/// Releases a HalfOpen trial slot if the wrapped call is dropped unfinished
struct TrialGuard {
    states: Option<StateTable>,
    service: String,
}

impl TrialGuard {
    fn new(states: &StateTable, service: &str, admission: Admission) -> Self {
        Self {
            states: (admission == Admission::Trial).then(|| Arc::clone(states)),
            service: service.to_string(),
        }
    }

    fn disarm(mut self) {
        self.states = None;
    }
}

impl Drop for TrialGuard {
    fn drop(&mut self) {
        let Some(states) = self.states.take() else {
            return;
        };
        let service = std::mem::take(&mut self.service);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let mut states = states.lock().await;
                if let Some(state) = states.get_mut(&service) {
                    state.half_open_in_flight = state.half_open_in_flight.saturating_sub(1);
                }
            });
        }
    }
}
