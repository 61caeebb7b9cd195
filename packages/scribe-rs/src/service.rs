//! Request lifecycle management.
//!
//! `OcrService` owns every in-progress request, drives it through
//! validation, admission, recognition and aggregation, and enforces the
//! per-request deadline whether or not the engine ever answers.
//!
//! Lock order is always request table, then dispatcher, then flights.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use futures::future::{BoxFuture, FutureExt, Shared};
use scribe_ocr::{
    aggregate, decode_with_limits, DecodedImage, EnginePort, OcrOutput, Recognition,
    RecognitionEngine, RecognitionOptions,
};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::dispatcher::{Admission, Dispatcher};
use crate::error::{CancelError, FetchError, LifecycleError, ServiceError, SubmitError};
use crate::pool::WorkerPool;
use crate::request::{FailureReason, Fingerprint, Request, RequestId, RequestState};

/// Per-request overrides of the service defaults.
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    pub confidence_threshold: Option<f32>,
    pub timeout: Option<Duration>,
    pub recognition: RecognitionOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Submission {
    pub id: RequestId,
    pub admission: Admission,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServiceStats {
    pub in_flight: usize,
    pub queued: usize,
    pub tracked: usize,
    /// Shared engine calls currently running for coalesced requests.
    pub flights: usize,
}

#[derive(Debug, Clone)]
struct JobParams {
    threshold: f32,
    options: RecognitionOptions,
}

struct Tracked {
    request: Request,
    params: JobParams,
}

type Table = HashMap<RequestId, Tracked>;
type SharedRecognition = Shared<BoxFuture<'static, Recognition>>;

struct Flight {
    seq: u64,
    waiters: usize,
    future: SharedRecognition,
}

struct Inner {
    config: ServiceConfig,
    port: EnginePort,
    dispatcher: Dispatcher,
    pool: WorkerPool,
    runtime: Handle,
    requests: Mutex<Table>,
    flights: Mutex<HashMap<Fingerprint, Flight>>,
    flight_seq: AtomicU64,
}

/// Handle to the OCR request service. Cheap to clone.
#[derive(Clone)]
pub struct OcrService {
    inner: Arc<Inner>,
}

impl OcrService {
    /// Must be called from within a tokio runtime; background work is
    /// spawned onto that runtime.
    pub fn new(config: ServiceConfig, engine: Arc<dyn RecognitionEngine>) -> Result<Self, ServiceError> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| ServiceError::NoRuntime)?;
        info!(
            engine = engine.name(),
            max_in_flight = config.max_in_flight,
            max_queued = config.max_queued,
            worker_threads = config.worker_threads,
            coalesce = config.coalesce_duplicates,
            "starting OCR service"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                dispatcher: Dispatcher::new(config.max_in_flight, config.max_queued),
                pool: WorkerPool::new(config.worker_threads),
                port: EnginePort::new(engine),
                runtime,
                requests: Mutex::new(HashMap::new()),
                flights: Mutex::new(HashMap::new()),
                flight_seq: AtomicU64::new(0),
                config,
            }),
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.inner.config
    }

    /// Validates `bytes` and admits the request.
    ///
    /// Malformed input fails here with [`SubmitError::Decode`] without
    /// reaching the engine; a full queue fails with [`SubmitError::Rejected`].
    pub async fn submit(&self, bytes: Vec<u8>, options: SubmitOptions) -> Result<Submission, SubmitError> {
        let inner = &self.inner;
        inner.sweep();

        let timeout = options.timeout.unwrap_or_else(|| inner.config.request_timeout());
        let mut request = Request::new(Fingerprint::of(&bytes), deadline_after(timeout));
        let id = request.id();
        advance(&mut request, RequestState::Validating).map_err(SubmitError::Internal)?;

        let limits = inner.config.decoder_limits();
        let decoded = inner
            .pool
            .run(move || decode_with_limits(&bytes, limits))
            .await
            .map_err(SubmitError::Internal)?;
        let image = match decoded {
            Ok(image) => image,
            Err(err) => {
                let _ = request.fail(FailureReason::Decode(err.clone()));
                info!(request_id = %id, error = %err, "rejected undecodable input");
                return Err(SubmitError::Decode(err));
            }
        };
        advance(&mut request, RequestState::Queued).map_err(SubmitError::Internal)?;

        let params = JobParams {
            threshold: options
                .confidence_threshold
                .unwrap_or(inner.config.confidence_threshold as f32),
            options: options.recognition,
        };

        let mut table = inner.table();
        let admission = inner.dispatcher.admit(id).map_err(|err| {
            info!(request_id = %id, error = %err, "request rejected");
            SubmitError::Rejected(err)
        })?;
        request.image = Some(image);
        request.watchdog = Some(inner.arm_watchdog(id, request.deadline()));
        table.insert(id, Tracked { request, params });

        if admission == Admission::Dispatched && !inner.start_job(&mut table, id) {
            // Cannot happen: the request was inserted as Queued just above.
            inner.release_slot(&mut table);
        }
        debug!(request_id = %id, ?admission, "request admitted");
        Ok(Submission { id, admission })
    }

    /// Current state of a request. Never waits on work.
    pub fn poll(&self, id: RequestId) -> Result<RequestState, FetchError> {
        self.inner
            .table()
            .get(&id)
            .map(|t| t.request.state())
            .ok_or(FetchError::NotFound(id))
    }

    /// Takes the outcome of a finished request, releasing it.
    pub fn fetch_result(&self, id: RequestId) -> Result<Arc<OcrOutput>, FetchError> {
        let mut table = self.inner.table();
        let state = table
            .get(&id)
            .map(|t| t.request.state())
            .ok_or(FetchError::NotFound(id))?;
        if !state.is_terminal() {
            return Err(FetchError::NotReady(id, state));
        }
        let tracked = table.remove(&id).ok_or(FetchError::NotFound(id))?;
        let request = tracked.request;
        match state {
            RequestState::Completed => request
                .result()
                .cloned()
                .ok_or_else(|| FetchError::Failed(FailureReason::Internal("completed without result".into()))),
            RequestState::TimedOut => Err(LifecycleError::TimedOut { id }.into()),
            _ => Err(FetchError::Failed(
                request
                    .failure()
                    .cloned()
                    .unwrap_or_else(|| FailureReason::Internal("failed without reason".into())),
            )),
        }
    }

    /// Resolves once the request reaches a terminal state.
    pub async fn wait(&self, id: RequestId) -> Result<RequestState, FetchError> {
        let mut rx = self
            .inner
            .table()
            .get(&id)
            .map(|t| t.request.subscribe())
            .ok_or(FetchError::NotFound(id))?;
        let state = rx
            .wait_for(|state| state.is_terminal())
            .await
            .map_err(|_| FetchError::NotFound(id))?;
        Ok(*state)
    }

    /// Forces a pending request to `Failed(Cancelled)`.
    ///
    /// A dispatched engine call is abandoned best-effort; whatever it
    /// produces later is discarded.
    pub fn cancel(&self, id: RequestId) -> Result<(), CancelError> {
        let inner = &self.inner;
        let mut table = inner.table();
        let tracked = table.get_mut(&id).ok_or(CancelError::NotFound(id))?;
        let state = tracked.request.state();
        match state {
            RequestState::Queued => {
                inner.dispatcher.withdraw(id);
                let _ = tracked.request.fail(FailureReason::Cancelled);
            }
            RequestState::Dispatched => {
                let _ = tracked.request.fail(FailureReason::Cancelled);
                if let Some(job) = tracked.request.job.take() {
                    job.abort();
                }
                inner.release_slot(&mut table);
            }
            _ => return Err(CancelError::AlreadyTerminal(id, state)),
        }
        info!(request_id = %id, from = %state, "request cancelled");
        Ok(())
    }

    /// Submits, waits, and fetches in one call.
    pub async fn recognize(&self, bytes: Vec<u8>, options: SubmitOptions) -> Result<Arc<OcrOutput>, ServiceError> {
        let submission = self.submit(bytes, options).await?;
        self.wait(submission.id).await?;
        Ok(self.fetch_result(submission.id)?)
    }

    pub fn stats(&self) -> ServiceStats {
        let table = self.inner.table();
        ServiceStats {
            in_flight: self.inner.dispatcher.in_flight(),
            queued: self.inner.dispatcher.queued(),
            tracked: table.len(),
            flights: self.inner.flights().len(),
        }
    }
}

/// Roughly 30 years, the horizon tokio itself uses for "never".
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE)
}

fn advance(request: &mut Request, next: RequestState) -> Result<(), FailureReason> {
    request
        .advance(next)
        .map_err(|e| FailureReason::Internal(e.to_string()))
}

impl Inner {
    fn table(&self) -> MutexGuard<'_, Table> {
        // Every mutation leaves the table consistent, so a poisoned lock is
        // still usable.
        self.requests.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn flights(&self) -> MutexGuard<'_, HashMap<Fingerprint, Flight>> {
        self.flights.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Drops finished requests nobody collected.
    fn sweep(&self) {
        let ttl = self.config.result_ttl();
        let now = Instant::now();
        let mut table = self.table();
        let before = table.len();
        table.retain(|_, t| match t.request.settled_at {
            Some(at) => now.duration_since(at) < ttl,
            None => true,
        });
        let reclaimed = before - table.len();
        if reclaimed > 0 {
            debug!(reclaimed, "reclaimed uncollected requests");
        }
    }

    fn arm_watchdog(self: &Arc<Self>, id: RequestId, deadline: Instant) -> tokio::task::AbortHandle {
        let inner: Weak<Self> = Arc::downgrade(self);
        self.runtime
            .spawn(async move {
                tokio::time::sleep_until(deadline).await;
                if let Some(inner) = inner.upgrade() {
                    inner.expire(id);
                }
            })
            .abort_handle()
    }

    fn expire(self: &Arc<Self>, id: RequestId) {
        let mut table = self.table();
        let Some(tracked) = table.get_mut(&id) else {
            return;
        };
        let state = tracked.request.state();
        match state {
            RequestState::Queued => {
                self.dispatcher.withdraw(id);
                let _ = tracked.request.time_out();
            }
            RequestState::Dispatched => {
                let _ = tracked.request.time_out();
                if let Some(job) = tracked.request.job.take() {
                    job.abort();
                }
                self.release_slot(&mut table);
            }
            _ => return,
        }
        warn!(request_id = %id, from = %state, "request timed out");
    }

    /// Frees one engine slot, handing it to the next queued request.
    fn release_slot(self: &Arc<Self>, table: &mut Table) {
        while let Some(next) = self.dispatcher.release() {
            if self.start_job(table, next) {
                break;
            }
            // The slot passed to a request that can no longer run; free it again.
        }
    }

    /// Moves a queued request into the engine. The caller must already hold
    /// its dispatcher slot.
    fn start_job(self: &Arc<Self>, table: &mut Table, id: RequestId) -> bool {
        let Some(tracked) = table.get_mut(&id) else {
            return false;
        };
        if tracked.request.advance(RequestState::Dispatched).is_err() {
            return false;
        }
        let Some(image) = tracked.request.image.take() else {
            let _ = tracked
                .request
                .fail(FailureReason::Internal("image missing at dispatch".into()));
            return false;
        };
        let inner = Arc::clone(self);
        let params = tracked.params.clone();
        let fingerprint = tracked.request.fingerprint();
        let job = self
            .runtime
            .spawn(async move { inner.run_job(id, image, params, fingerprint).await });
        tracked.request.job = Some(job.abort_handle());
        debug!(request_id = %id, "request dispatched");
        true
    }

    async fn run_job(self: Arc<Self>, id: RequestId, image: DecodedImage, params: JobParams, fingerprint: Fingerprint) {
        let image = Arc::new(image);
        let recognition = if self.config.coalesce_duplicates {
            self.recognize_coalesced(fingerprint, image, params.options).await
        } else {
            self.recognize(image, params.options).await
        };

        let outcome = match recognition {
            Ok(observations) => {
                let reported = observations.len();
                let threshold = params.threshold;
                self.pool
                    .run(move || aggregate(observations, threshold))
                    .await
                    .map(|output| {
                        debug!(request_id = %id, reported, kept = output.observations.len(), "aggregated");
                        Arc::new(output)
                    })
            }
            Err(err) => Err(FailureReason::Engine(err)),
        };
        self.settle(id, outcome);
    }

    fn recognize(&self, image: Arc<DecodedImage>, options: RecognitionOptions) -> BoxFuture<'static, Recognition> {
        let port = self.port.clone();
        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.config.retry_backoff())
            .with_max_times(self.config.engine_retries)
            .with_jitter();
        async move {
            (|| port.invoke(Arc::clone(&image), options.clone()))
                .retry(backoff)
                .when(|err| err.is_retryable())
                .notify(|err, delay| {
                    warn!(engine = port.engine_name(), error = %err, ?delay, "retrying recognition");
                })
                .await
        }
        .boxed()
    }

    /// Joins an in-flight call for the same bytes, or starts one.
    async fn recognize_coalesced(
        self: &Arc<Self>,
        fingerprint: Fingerprint,
        image: Arc<DecodedImage>,
        options: RecognitionOptions,
    ) -> Recognition {
        let (future, guard) = {
            let mut flights = self.flights();
            let (seq, future) = match flights.get_mut(&fingerprint) {
                Some(flight) => {
                    flight.waiters += 1;
                    debug!(?fingerprint, waiters = flight.waiters, "joined in-flight recognition");
                    (flight.seq, flight.future.clone())
                }
                None => {
                    let seq = self.flight_seq.fetch_add(1, Ordering::Relaxed);
                    let future = self.recognize(image, options).shared();
                    flights.insert(
                        fingerprint,
                        Flight {
                            seq,
                            waiters: 1,
                            future: future.clone(),
                        },
                    );
                    (seq, future)
                }
            };
            let guard = FlightGuard {
                inner: Arc::clone(self),
                fingerprint,
                seq,
            };
            (future, guard)
        };
        let recognition = future.await;
        drop(guard);
        recognition
    }

    /// Records the job outcome unless the request already ended.
    fn settle(self: &Arc<Self>, id: RequestId, outcome: Result<Arc<OcrOutput>, FailureReason>) {
        let mut table = self.table();
        let Some(tracked) = table.get_mut(&id) else {
            debug!(request_id = %id, "discarding result for reclaimed request");
            return;
        };
        if tracked.request.state() != RequestState::Dispatched {
            debug!(request_id = %id, state = %tracked.request.state(), "discarding late result");
            return;
        }
        tracked.request.job = None;
        let settled = match outcome {
            Ok(output) => tracked.request.complete(output),
            Err(reason) => {
                warn!(request_id = %id, error = %reason, "request failed");
                tracked.request.fail(reason)
            }
        };
        if let Err(err) = settled {
            warn!(request_id = %id, error = %err, "could not settle request");
        }
        self.release_slot(&mut table);
    }
}

/// Leaves a coalesced flight; the last waiter out removes it, which drops
/// the shared engine call if it is still running.
struct FlightGuard {
    inner: Arc<Inner>,
    fingerprint: Fingerprint,
    seq: u64,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let removed = {
            let mut flights = self.inner.flights();
            match flights.get_mut(&self.fingerprint) {
                Some(flight) if flight.seq == self.seq => {
                    flight.waiters -= 1;
                    if flight.waiters == 0 {
                        flights.remove(&self.fingerprint)
                    } else {
                        None
                    }
                }
                _ => None,
            }
        };
        // dropped outside the lock
        drop(removed);
    }
}
