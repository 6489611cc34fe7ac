//! Cross-pipeline rendezvous: synchronous request/response handoff between
//! an upstream and a downstream pipeline.
//!
//! The response path carries no buffering: the committer's await completes
//! only once the downstream side has fully produced the response, so
//! backpressure is never masked by an intermediate queue. Requests committed
//! to the same downstream pipeline are claimed in commit order.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{oneshot, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::RendezvousError;
use crate::task::{TaskError, TaskResultCode};

/// Caller-supplied data travelling with a cross-pipeline request/response.
pub type RequestData = HashMap<String, Value>;

/// A request handed from an upstream pipeline to a downstream pipeline.
///
/// Identity is immutable; the response channel is private to the request and
/// delivers at most one response. `close` is idempotent and safe against a
/// racing `respond`.
pub struct DownstreamRequest {
    upstream_pipeline_name: String,
    downstream_pipeline_name: String,
    data: RequestData,
    response_tx: Mutex<Option<oneshot::Sender<UpstreamResponse>>>,
    response_rx: Mutex<Option<oneshot::Receiver<UpstreamResponse>>>,
}

impl DownstreamRequest {
    pub fn new(
        upstream_pipeline_name: impl Into<String>,
        downstream_pipeline_name: impl Into<String>,
        data: RequestData,
    ) -> Self {
        // Single-slot channel: there is no queue on the response path
        // between the committer and the responder.
        let (tx, rx) = oneshot::channel();
        Self {
            upstream_pipeline_name: upstream_pipeline_name.into(),
            downstream_pipeline_name: downstream_pipeline_name.into(),
            data,
            response_tx: Mutex::new(Some(tx)),
            response_rx: Mutex::new(Some(rx)),
        }
    }

    pub fn upstream_pipeline_name(&self) -> &str {
        &self.upstream_pipeline_name
    }

    pub fn downstream_pipeline_name(&self) -> &str {
        &self.downstream_pipeline_name
    }

    pub fn data(&self) -> &RequestData {
        &self.data
    }

    /// Delivers the downstream pipeline's answer. Fails with
    /// [`RendezvousError::RequestClosed`] if the request was closed or
    /// already answered; a close racing with this call degrades to that
    /// error, never a fault.
    pub fn respond(&self, response: UpstreamResponse) -> Result<(), RendezvousError> {
        let sender = self
            .response_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(tx) => tx.send(response).map_err(|_| RendezvousError::RequestClosed {
                pipeline: self.downstream_pipeline_name.clone(),
            }),
            None => Err(RendezvousError::RequestClosed {
                pipeline: self.downstream_pipeline_name.clone(),
            }),
        }
    }

    /// Closes the response channel. Safe to call concurrently and more than
    /// once; exactly one logical close takes effect.
    pub fn close(&self) {
        let sender = self
            .response_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(sender);
    }

    pub fn is_closed(&self) -> bool {
        self.response_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn take_receiver(&self) -> Result<oneshot::Receiver<UpstreamResponse>, RendezvousError> {
        self.response_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(RendezvousError::ResponseTaken)
    }
}

/// The downstream pipeline's answer, produced exactly once per request that
/// is not cancelled.
#[derive(Clone, Debug)]
pub struct UpstreamResponse {
    pub upstream_pipeline_name: String,
    pub data: RequestData,
    pub task_error: Option<TaskError>,
    pub task_result_code: TaskResultCode,
}

struct QueueState {
    queue: VecDeque<Arc<DownstreamRequest>>,
    /// Committed-but-not-concluded requests per upstream pipeline name.
    /// A claimed request stays counted until its committer unblocks.
    wip: HashMap<String, usize>,
    closed: bool,
}

struct PipelineQueue {
    state: Mutex<QueueState>,
    available: Notify,
}

impl PipelineQueue {
    fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                wip: HashMap::new(),
                closed: false,
            }),
            available: Notify::new(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Process-wide rendezvous store, keyed by downstream pipeline name.
///
/// Each pipeline context receives an explicit handle at construction; there
/// is no global singleton. Every pipeline's queue carries its own lock and
/// wakeup, so unrelated pipelines never contend.
pub struct RendezvousStore {
    pipelines: DashMap<String, Arc<PipelineQueue>>,
}

impl RendezvousStore {
    pub fn new() -> Self {
        Self {
            pipelines: DashMap::new(),
        }
    }

    /// Registers a pipeline as a rendezvous participant. Idempotent.
    pub fn register(&self, pipeline_name: &str) {
        self.pipelines
            .entry(pipeline_name.to_string())
            .or_insert_with(|| Arc::new(PipelineQueue::new()));
        debug!(pipeline = pipeline_name, "registered rendezvous queue");
    }

    /// Removes a pipeline's queue. Pending requests are closed so their
    /// blocked committers observe a typed closed-request error; waiting
    /// claimants unblock with `None`.
    pub fn unregister(&self, pipeline_name: &str) {
        let Some((_, queue)) = self.pipelines.remove(pipeline_name) else {
            return;
        };

        let drained: Vec<Arc<DownstreamRequest>> = {
            let mut state = queue.lock_state();
            state.closed = true;
            state.queue.drain(..).collect()
        };
        if !drained.is_empty() {
            warn!(
                pipeline = pipeline_name,
                pending = drained.len(),
                "closing pending cross-pipeline requests on unregister"
            );
        }
        for request in drained {
            request.close();
        }
        queue.available.notify_waiters();
    }

    pub fn is_registered(&self, pipeline_name: &str) -> bool {
        self.pipelines.contains_key(pipeline_name)
    }

    /// Commits `request` to its downstream pipeline and blocks until the
    /// downstream has responded, the caller's `cancel` signal fires, or the
    /// request is closed out from under us (e.g. by pipeline shutdown).
    ///
    /// On cancellation the request is withdrawn if not yet claimed and
    /// closed either way, so a late response can never be delivered.
    pub async fn commit(
        &self,
        request: Arc<DownstreamRequest>,
        cancel: &CancellationToken,
    ) -> Result<UpstreamResponse, RendezvousError> {
        let downstream = request.downstream_pipeline_name().to_string();
        let queue = self
            .pipelines
            .get(&downstream)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RendezvousError::NoSuchPipeline {
                pipeline: downstream.clone(),
            })?;

        let receiver = request.take_receiver()?;
        let upstream = request.upstream_pipeline_name().to_string();

        {
            let mut state = queue.lock_state();
            if state.closed {
                return Err(RendezvousError::PipelineClosed {
                    pipeline: downstream,
                });
            }
            state.queue.push_back(request.clone());
            *state.wip.entry(upstream.clone()).or_insert(0) += 1;
        }
        queue.available.notify_one();

        let result = tokio::select! {
            received = receiver => received.map_err(|_| RendezvousError::RequestClosed {
                pipeline: downstream.clone(),
            }),
            _ = cancel.cancelled() => {
                let withdrawn = {
                    let mut state = queue.lock_state();
                    match state.queue.iter().position(|r| Arc::ptr_eq(r, &request)) {
                        Some(pos) => {
                            state.queue.remove(pos);
                            true
                        }
                        None => false,
                    }
                };
                // Closing here makes a racing responder fail typed instead
                // of answering into the void.
                request.close();
                debug!(
                    upstream = %upstream,
                    downstream = %downstream,
                    withdrawn,
                    "cross-pipeline commit cancelled"
                );
                Err(RendezvousError::Cancelled)
            }
        };

        {
            let mut state = queue.lock_state();
            if let Some(count) = state.wip.get_mut(&upstream) {
                *count -= 1;
                if *count == 0 {
                    state.wip.remove(&upstream);
                }
            }
        }

        result
    }

    /// Claims the oldest pending request for `pipeline_name`, blocking until
    /// one is available or `cancel` fires. Returns `None` on cancellation or
    /// once the pipeline's queue is closed/absent. Fair under concurrent
    /// claimants: each enqueued request wakes one waiter.
    pub async fn claim(
        &self,
        pipeline_name: &str,
        cancel: &CancellationToken,
    ) -> Option<Arc<DownstreamRequest>> {
        let queue = self
            .pipelines
            .get(pipeline_name)
            .map(|entry| entry.value().clone())?;

        loop {
            // Arm the wakeup before inspecting the queue so an enqueue
            // between check and await is never lost.
            let notified = queue.available.notified();
            {
                let mut state = queue.lock_state();
                if state.closed {
                    return None;
                }
                if let Some(request) = state.queue.pop_front() {
                    return Some(request);
                }
            }
            tokio::select! {
                _ = notified => {}
                _ = cancel.cancelled() => return None,
            }
        }
    }

    /// Point-in-time count of requests from `upstream` committed to
    /// `downstream` and not yet concluded (responded or cancelled). Callers
    /// use this for backpressure decisions.
    pub fn pending_count(&self, downstream: &str, upstream: &str) -> usize {
        self.pipelines
            .get(downstream)
            .map(|entry| {
                entry
                    .value()
                    .lock_state()
                    .wip
                    .get(upstream)
                    .copied()
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }
}

impl Default for RendezvousStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn request_with_id(id: u64) -> Arc<DownstreamRequest> {
        let mut data = RequestData::new();
        data.insert("id".to_string(), json!(id));
        Arc::new(DownstreamRequest::new("up", "down", data))
    }

    fn success_response(data: RequestData) -> UpstreamResponse {
        UpstreamResponse {
            upstream_pipeline_name: "up".to_string(),
            data,
            task_error: None,
            task_result_code: TaskResultCode::Success,
        }
    }

    #[tokio::test]
    async fn test_claims_follow_commit_order() {
        let store = Arc::new(RendezvousStore::new());
        store.register("down");

        let mut committers = Vec::new();
        for id in 0..10u64 {
            let task_store = store.clone();
            let request = request_with_id(id);
            committers.push(tokio::spawn(async move {
                let cancel = CancellationToken::new();
                task_store.commit(request, &cancel).await
            }));
            // Serialize enqueue order; commits themselves stay blocked.
            loop {
                if store.pending_count("down", "up") as u64 == id + 1 {
                    break;
                }
                tokio::task::yield_now().await;
            }
        }

        let cancel = CancellationToken::new();
        for expected in 0..10u64 {
            let claimed = store.claim("down", &cancel).await.expect("request pending");
            assert_eq!(claimed.data()["id"], json!(expected));
            claimed.respond(success_response(RequestData::new())).unwrap();
        }

        for committer in committers {
            let response = committer.await.unwrap().unwrap();
            assert_eq!(response.task_result_code, TaskResultCode::Success);
        }
        assert_eq!(store.pending_count("down", "up"), 0);
    }

    #[tokio::test]
    async fn test_cancelled_commit_never_sees_late_response() {
        let store = Arc::new(RendezvousStore::new());
        store.register("down");

        let request = request_with_id(1);
        let cancel = CancellationToken::new();

        let committer = {
            let store = store.clone();
            let request = request.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { store.commit(request, &cancel).await })
        };

        while store.pending_count("down", "up") == 0 {
            tokio::task::yield_now().await;
        }
        cancel.cancel();

        let result = committer.await.unwrap();
        assert_eq!(result.unwrap_err(), RendezvousError::Cancelled);

        // The request was withdrawn; no claimant can pick it up.
        let claim_cancel = CancellationToken::new();
        claim_cancel.cancel();
        assert!(store.claim("down", &claim_cancel).await.is_none());

        // A responder arriving late fails typed instead of delivering.
        assert!(matches!(
            request.respond(success_response(RequestData::new())),
            Err(RendezvousError::RequestClosed { .. })
        ));
        assert_eq!(store.pending_count("down", "up"), 0);
    }

    #[tokio::test]
    async fn test_claim_unblocks_on_cancel() {
        let store = Arc::new(RendezvousStore::new());
        store.register("down");

        let cancel = CancellationToken::new();
        let claimer = {
            let store = store.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { store.claim("down", &cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        assert!(claimer.await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_close_is_race_free() {
        let request = request_with_id(1);

        let mut closers = Vec::new();
        for _ in 0..16 {
            let request = request.clone();
            closers.push(tokio::spawn(async move { request.close() }));
        }
        futures::future::join_all(closers).await;

        assert!(request.is_closed());
        assert!(matches!(
            request.respond(success_response(RequestData::new())),
            Err(RendezvousError::RequestClosed { .. })
        ));
    }

    #[tokio::test]
    async fn test_commit_to_closed_request_fails_typed() {
        let store = RendezvousStore::new();
        store.register("down");

        let request = request_with_id(1);
        request.close();

        let cancel = CancellationToken::new();
        let result = store.commit(request, &cancel).await;
        assert!(matches!(
            result,
            Err(RendezvousError::RequestClosed { .. })
        ));
    }

    #[tokio::test]
    async fn test_commit_to_unknown_pipeline_fails_typed() {
        let store = RendezvousStore::new();
        let request = request_with_id(1);
        let cancel = CancellationToken::new();

        let result = store.commit(request, &cancel).await;
        assert_eq!(
            result.unwrap_err(),
            RendezvousError::NoSuchPipeline {
                pipeline: "down".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_unregister_unblocks_committers_and_claimants() {
        let store = Arc::new(RendezvousStore::new());
        store.register("down");

        let commit_cancel = CancellationToken::new();
        let committer = {
            let store = store.clone();
            let cancel = commit_cancel.clone();
            tokio::spawn(async move { store.commit(request_with_id(1), &cancel).await })
        };
        while store.pending_count("down", "up") == 0 {
            tokio::task::yield_now().await;
        }

        store.unregister("down");

        let result = committer.await.unwrap();
        assert!(matches!(
            result,
            Err(RendezvousError::RequestClosed { .. })
        ));

        // Commits after unregister see no pipeline at all.
        let cancel = CancellationToken::new();
        assert!(matches!(
            store.commit(request_with_id(2), &cancel).await,
            Err(RendezvousError::NoSuchPipeline { .. })
        ));
    }

    #[tokio::test]
    async fn test_respond_twice_fails_second_time() {
        let store = Arc::new(RendezvousStore::new());
        store.register("down");

        let committer = {
            let store = store.clone();
            tokio::spawn(async move {
                let cancel = CancellationToken::new();
                store.commit(request_with_id(1), &cancel).await
            })
        };

        let cancel = CancellationToken::new();
        let claimed = store.claim("down", &cancel).await.unwrap();
        claimed.respond(success_response(RequestData::new())).unwrap();
        assert!(matches!(
            claimed.respond(success_response(RequestData::new())),
            Err(RendezvousError::RequestClosed { .. })
        ));

        assert!(committer.await.unwrap().is_ok());
    }
}
