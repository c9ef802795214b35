//! Worker Pool (C3, spec §4.3): a bounded per-provider queue feeding `N`
//! long-lived worker tasks. `submit` never blocks — it uses `try_send` and
//! surfaces `queue_full` on a full queue, the backpressure signal the
//! orchestrator may translate to an HTTP 429.
//!
//! Generalized from a one-task-per-connection WebSocket handler to "N
//! long-lived tasks draining a shared bounded channel" (SPEC_FULL §4.3).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use gw_core::chunk::ChunkEvent;
use gw_core::error::ErrorKind;
use gw_core::key::Key;
use gw_core::provider_config::{NetworkConfig, PerformanceConfig};
use gw_core::{GatewayError, Request, Response};
use gw_providers::adapter::ProviderAdapter;
use rand::Rng;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};

use crate::cancellation::CancellationToken;
use crate::http_client::VendorHttpClient;

/// How the worker should deliver its result: once, for a non-streaming
/// call, or as a channel of chunks plus a one-shot "did we deliver any
/// bytes" signal the Fallback Controller needs (spec §4.6: "fallback is
/// only attempted if no bytes have yet been delivered to the client").
pub enum JobOutcome {
    NonStream(oneshot::Sender<Result<Response, GatewayError>>),
    Stream {
        chunks: mpsc::Sender<ChunkEvent>,
        first_byte: oneshot::Sender<Result<(), GatewayError>>,
    },
}

/// One unit of work submitted to a provider's worker pool.
pub struct Job {
    pub request_id: String,
    pub request: Request,
    pub key: Key,
    pub network: NetworkConfig,
    pub attach_raw: bool,
    pub adapter: Arc<dyn ProviderAdapter>,
    pub cancellation: CancellationToken,
    pub outcome: JobOutcome,
}

/// Observable in-flight-call counter, one per provider, for testable
/// property 4 ("the number of simultaneous in-flight adapter calls to p
/// never exceeds N").
#[derive(Clone, Default)]
pub struct InFlightGauge(Arc<AtomicUsize>);

impl InFlightGauge {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn guard(&self) -> InFlightGuard<'_> {
        self.0.fetch_add(1, Ordering::SeqCst);
        InFlightGuard(&self.0)
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Bounded queue (capacity `B`) plus `N` worker tasks for one provider.
/// `B > N` is enforced at construction (spec §4.3 invariant).
pub struct WorkerPool {
    provider: String,
    sender: mpsc::Sender<Job>,
    in_flight: InFlightGauge,
    concurrency: usize,
}

impl WorkerPool {
    pub fn spawn(provider: impl Into<String>, performance: PerformanceConfig, http: VendorHttpClient) -> Result<Self, GatewayError> {
        performance
            .validate()
            .map_err(GatewayError::internal)?;

        let provider = provider.into();
        let (tx, rx) = mpsc::channel::<Job>(performance.buffer_size);
        let rx = Arc::new(AsyncMutex::new(rx));
        let in_flight = InFlightGauge::default();

        for worker_id in 0..performance.concurrency {
            let rx = rx.clone();
            let http = http.clone();
            let in_flight = in_flight.clone();
            let provider_name = provider.clone();
            tokio::spawn(async move {
                loop {
                    let job = {
                        let mut guard = rx.lock().await;
                        guard.recv().await
                    };
                    let Some(job) = job else {
                        tracing::debug!(provider = %provider_name, worker_id, "worker pool channel closed, exiting");
                        break;
                    };
                    run_job(job, &http, &in_flight).await;
                }
            });
        }

        Ok(Self {
            provider,
            sender: tx,
            in_flight,
            concurrency: performance.concurrency,
        })
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn in_flight(&self) -> InFlightGauge {
        self.in_flight.clone()
    }

    /// Non-blocking submit; a full queue surfaces `queue_full` (spec
    /// §4.3: "this is the backpressure signal").
    pub fn submit(&self, job: Job) -> Result<(), GatewayError> {
        self.sender.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => GatewayError::queue_full(format!("provider '{}' worker queue is full", self.provider)),
            mpsc::error::TrySendError::Closed(_) => GatewayError::internal(format!("provider '{}' worker pool is shut down", self.provider)),
        })
    }
}

/// A named pool-of-pools, one per configured provider.
#[derive(Default)]
pub struct WorkerPoolRegistry {
    pools: HashMap<String, Arc<WorkerPool>>,
}

impl WorkerPoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pool: WorkerPool) {
        self.pools.insert(pool.provider().to_string(), Arc::new(pool));
    }

    pub fn get(&self, provider: &str) -> Option<Arc<WorkerPool>> {
        self.pools.get(provider).cloned()
    }
}

async fn run_job(job: Job, http: &VendorHttpClient, in_flight: &InFlightGauge) {
    match job.outcome {
        JobOutcome::NonStream(tx) => {
            let result = run_non_stream(&job.request_id, &job.request, &job.key, &job.network, job.attach_raw, job.adapter.as_ref(), &job.cancellation, http, in_flight).await;
            let _ = tx.send(result);
        }
        JobOutcome::Stream { chunks, first_byte } => {
            run_stream(&job.request_id, &job.request, &job.key, &job.network, job.adapter.as_ref(), &job.cancellation, http, in_flight, chunks, first_byte).await;
        }
    }
}

/// Worker-level retries (spec §4.3), distinct from the Fallback
/// Controller's cross-provider retries: transient errors, retryable 5xx,
/// and rate-limit-with-Retry-After are retried up to `max_retries` with
/// exponential backoff and +/-20% jitter.
fn next_backoff(attempt: u32, network: &NetworkConfig, retry_after_secs: Option<u64>) -> std::time::Duration {
    if let Some(secs) = retry_after_secs {
        return std::time::Duration::from_secs(secs);
    }
    let base = network.initial_backoff.as_millis() as u64 * 2u64.saturating_pow(attempt);
    let capped = base.min(network.max_backoff.as_millis() as u64);
    let jitter_frac = rand::thread_rng().gen_range(-0.2..=0.2);
    let jittered = (capped as f64 * (1.0 + jitter_frac)).max(0.0) as u64;
    std::time::Duration::from_millis(jittered)
}

fn is_worker_retryable(err: &GatewayError) -> bool {
    matches!(err.kind, ErrorKind::Upstream5xx | ErrorKind::UpstreamTimeout | ErrorKind::RateLimitedUpstream)
}

async fn run_non_stream(
    request_id: &str,
    request: &Request,
    key: &Key,
    network: &NetworkConfig,
    attach_raw: bool,
    adapter: &dyn ProviderAdapter,
    cancellation: &CancellationToken,
    http: &VendorHttpClient,
    in_flight: &InFlightGauge,
) -> Result<Response, GatewayError> {
    let vendor_request = match adapter.encode(request, &key.secret, network) {
        Ok(r) => r,
        Err(e) => return Err(e),
    };

    let mut retries = 0u32;
    loop {
        let _guard = in_flight.guard();
        let outcome = tokio::select! {
            _ = cancellation.cancelled() => Err(GatewayError::new(ErrorKind::Cancelled, "request cancelled")),
            res = http.execute(&vendor_request, network.timeout) => res,
        };
        drop(_guard);

        match outcome {
            Ok(vendor_response) => {
                let mut response = match adapter.decode(request, &vendor_response) {
                    Ok(r) => r,
                    Err(e) => return Err(e),
                };
                response.common.number_of_retries = retries;
                if attach_raw {
                    response.common.raw = Some(vendor_response.body.clone());
                }
                return Ok(response);
            }
            Err(err) => {
                if err.kind == ErrorKind::Cancelled || !is_worker_retryable(&err) || retries >= network.max_retries {
                    return Err(err);
                }
                let backoff = next_backoff(retries, network, err.retry_after_secs);
                tracing::warn!(request_id, provider = adapter.name(), retries, ?backoff, "worker retrying after transient error");
                retries += 1;
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_stream(
    request_id: &str,
    request: &Request,
    key: &Key,
    network: &NetworkConfig,
    adapter: &dyn ProviderAdapter,
    cancellation: &CancellationToken,
    http: &VendorHttpClient,
    in_flight: &InFlightGauge,
    chunks: mpsc::Sender<ChunkEvent>,
    first_byte: oneshot::Sender<Result<(), GatewayError>>,
) {
    let vendor_request = match adapter.encode(request, &key.secret, network) {
        Ok(r) => r,
        Err(e) => {
            let _ = first_byte.send(Err(e));
            return;
        }
    };

    let stream_attempt = {
        let _guard = in_flight.guard();
        tokio::select! {
            _ = cancellation.cancelled() => Err(GatewayError::new(ErrorKind::Cancelled, "request cancelled")),
            res = http.execute_stream(&vendor_request, network.timeout) => res,
        }
    };

    let (status, mut byte_stream) = match stream_attempt {
        Ok(pair) => pair,
        Err(e) => {
            let _ = first_byte.send(Err(e));
            return;
        }
    };
    let _ = status;

    let start = Instant::now();
    let chunk_index = AtomicU32::new(0);
    let mut buffer = Vec::new();
    let mut delivered_any = false;
    let mut first_byte = Some(first_byte);
    let mut finalized = false;

    loop {
        tokio::select! {
            _ = cancellation.cancelled() => {
                let event = ChunkEvent::error_chunk(request_id, chunk_index.load(Ordering::SeqCst), "request cancelled", start.elapsed().as_millis() as u64);
                let _ = chunks.send(event).await;
                finalized = true;
                break;
            }
            next = byte_stream.next() => {
                match next {
                    Some(Ok(bytes)) => {
                        buffer.extend_from_slice(&bytes);
                        while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                            let line: Vec<u8> = buffer.drain(..=pos).collect();
                            let line = trim_line(&line);
                            if line.is_empty() {
                                continue;
                            }
                            match adapter.decode_stream_chunk(request_id, chunk_index.load(Ordering::SeqCst), start.elapsed().as_millis() as u64, line) {
                                Ok(Some(event)) => {
                                    chunk_index.fetch_add(1, Ordering::SeqCst);
                                    if let Some(tx) = first_byte.take() {
                                        let _ = tx.send(Ok(()));
                                    }
                                    delivered_any = true;
                                    let is_final = event.stream_end;
                                    if chunks.send(event).await.is_err() {
                                        finalized = true;
                                        break;
                                    }
                                    if is_final {
                                        finalized = true;
                                    }
                                }
                                Ok(None) => {}
                                Err(e) => {
                                    tracing::warn!(request_id, error = %e, "failed to decode stream chunk, skipping frame");
                                }
                            }
                        }
                        if finalized {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        if let Some(tx) = first_byte.take() {
                            let _ = tx.send(Err(GatewayError::new(ErrorKind::Upstream5xx, e.to_string())));
                        } else {
                            let event = ChunkEvent::error_chunk(request_id, chunk_index.load(Ordering::SeqCst), e.to_string(), start.elapsed().as_millis() as u64);
                            let _ = chunks.send(event).await;
                        }
                        finalized = true;
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    if let Some(tx) = first_byte.take() {
        // Stream closed before any usable frame arrived.
        let _ = tx.send(Ok(()));
    }

    if !finalized {
        // Upstream closed without a final chunk (spec §4.2: "adapters must
        // emit exactly one final ChunkEvent ... even when the upstream
        // closes without one").
        let event = adapter.synthesize_final(request_id, chunk_index.load(Ordering::SeqCst), start.elapsed().as_millis() as u64);
        let _ = chunks.send(event).await;
    }

    let _ = delivered_any;
}

fn trim_line(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && (line[end - 1] == b'\n' || line[end - 1] == b'\r') {
        end -= 1;
    }
    &line[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_not_exceeding_concurrency_rejected_at_spawn() {
        let bad = PerformanceConfig {
            concurrency: 4,
            buffer_size: 4,
        };
        let result = WorkerPool::spawn("openai", bad, VendorHttpClient::new());
        assert!(result.is_err());
    }

    #[test]
    fn trim_line_strips_crlf() {
        assert_eq!(trim_line(b"data: hi\r\n"), b"data: hi");
        assert_eq!(trim_line(b"data: hi\n"), b"data: hi");
    }
}
