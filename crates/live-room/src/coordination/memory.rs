//! In-process coordinator.
//!
//! Records every call, answers with scripted outcomes (success when nothing
//! is scripted), and can hold calls of a given kind until released so tests
//! can interleave commands with in-flight remote calls.

use super::{CallKind, Coordinator, Extras, SeatRequest};
use crate::errors::CoordinationError;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Semaphore};

/// A call received by the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub request: SeatRequest,
    /// Present for acceptances only.
    pub extras: Option<Extras>,
}

/// In-memory [`Coordinator`].
pub struct InMemoryCoordinator {
    calls: watch::Sender<Vec<RecordedCall>>,
    call_count: AtomicUsize,
    outcomes: Mutex<HashMap<CallKind, VecDeque<Result<(), CoordinationError>>>>,
    gates: Mutex<HashMap<CallKind, Arc<Semaphore>>>,
    latency: Duration,
}

impl Default for InMemoryCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCoordinator {
    /// Create a coordinator that accepts every call immediately.
    #[must_use]
    pub fn new() -> Self {
        let (calls, _) = watch::channel(Vec::new());
        Self {
            calls,
            call_count: AtomicUsize::new(0),
            outcomes: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
            latency: Duration::ZERO,
        }
    }

    /// Delay every answer by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queue the outcome of the next call of `kind`.
    pub async fn push_outcome(&self, kind: CallKind, outcome: Result<(), CoordinationError>) {
        self.outcomes
            .lock()
            .await
            .entry(kind)
            .or_default()
            .push_back(outcome);
    }

    /// Hold calls of `kind` until [`release`](Self::release) or [`open`](Self::open).
    pub async fn hold(&self, kind: CallKind) {
        self.gates
            .lock()
            .await
            .insert(kind, Arc::new(Semaphore::new(0)));
    }

    /// Let one held call of `kind` proceed.
    pub async fn release(&self, kind: CallKind) {
        if let Some(gate) = self.gates.lock().await.get(&kind) {
            gate.add_permits(1);
        }
    }

    /// Stop holding calls of `kind`, letting all waiting calls proceed.
    pub async fn open(&self, kind: CallKind) {
        if let Some(gate) = self.gates.lock().await.remove(&kind) {
            gate.close();
        }
    }

    /// All calls received so far, in arrival order.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.borrow().clone()
    }

    #[must_use]
    pub fn calls_of(&self, kind: CallKind) -> Vec<RecordedCall> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.kind == kind)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` calls of `kind` have arrived.
    pub async fn wait_for_calls(&self, kind: CallKind, count: usize) {
        let mut rx = self.calls.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx
            .wait_for(|calls| calls.iter().filter(|c| c.kind == kind).count() >= count)
            .await;
    }

    /// Wait until at least `count` calls of any kind have arrived.
    pub async fn wait_for_call_count(&self, count: usize) {
        let mut rx = self.calls.subscribe();
        let _ = rx.wait_for(|calls| calls.len() >= count).await;
    }

    async fn handle(
        &self,
        kind: CallKind,
        request: &SeatRequest,
        extras: Option<&Extras>,
    ) -> Result<(), CoordinationError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.calls.send_modify(|calls| {
            calls.push(RecordedCall {
                kind,
                request: request.clone(),
                extras: extras.cloned(),
            });
        });

        let gate = self.gates.lock().await.get(&kind).cloned();
        if let Some(gate) = gate {
            // A closed gate means the kind was opened; proceed either way.
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.outcomes
            .lock()
            .await
            .get_mut(&kind)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Ok(()))
    }
}

#[async_trait::async_trait]
impl Coordinator for InMemoryCoordinator {
    async fn send_invite(&self, request: &SeatRequest) -> Result<(), CoordinationError> {
        self.handle(CallKind::Invite, request, None).await
    }

    async fn send_acceptance(
        &self,
        request: &SeatRequest,
        extras: &Extras,
    ) -> Result<(), CoordinationError> {
        self.handle(CallKind::Acceptance, request, Some(extras))
            .await
    }

    async fn send_rejection(&self, request: &SeatRequest) -> Result<(), CoordinationError> {
        self.handle(CallKind::Rejection, request, None).await
    }

    async fn send_force_end(&self, request: &SeatRequest) -> Result<(), CoordinationError> {
        self.handle(CallKind::ForceEnd, request, None).await
    }

    async fn send_self_end(&self, request: &SeatRequest) -> Result<(), CoordinationError> {
        self.handle(CallKind::SelfEnd, request, None).await
    }
}
