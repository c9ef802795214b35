//! Glues key selection (C1) to the Worker Pool (C3): resolves a
//! `(provider, model)` target to a selected key and a submitted job, the
//! single entry point both the non-streaming and streaming paths of the
//! Fallback Controller (C6) call into.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use gw_core::chunk::ChunkEvent;
use gw_core::provider_config::ProviderConfig;
use gw_core::request::ProviderModel;
use gw_core::selector::KeySelector;
use gw_core::{GatewayError, Request, Response};
use gw_providers::registry::ProviderRegistry;
use tokio::sync::{mpsc, oneshot};

use crate::cancellation::CancellationToken;
use crate::worker_pool::{Job, JobOutcome, WorkerPoolRegistry};

/// Copy-on-write provider configuration snapshot (spec §5): management-API
/// mutations swap a whole new `Arc` in; in-flight requests keep whatever
/// snapshot they already read.
#[derive(Default)]
pub struct ProviderSnapshot(RwLock<Arc<HashMap<String, ProviderConfig>>>);

impl ProviderSnapshot {
    pub fn new(configs: HashMap<String, ProviderConfig>) -> Self {
        Self(RwLock::new(Arc::new(configs)))
    }

    pub fn current(&self) -> Arc<HashMap<String, ProviderConfig>> {
        self.0.read().unwrap().clone()
    }

    pub fn swap(&self, configs: HashMap<String, ProviderConfig>) {
        *self.0.write().unwrap() = Arc::new(configs);
    }
}

pub struct Dispatcher {
    pub providers: Arc<ProviderSnapshot>,
    pub registry: Arc<ProviderRegistry>,
    pub pools: Arc<WorkerPoolRegistry>,
    pub selector: Arc<KeySelector>,
}

impl Dispatcher {
    /// Resolve `target`'s provider config/adapter/pool, select a key, and
    /// submit a non-streaming job. Returns the error unmapped (callers
    /// decide fallback eligibility).
    pub async fn dispatch_non_stream(
        &self,
        request_id: &str,
        target: &ProviderModel,
        request: &Request,
        virtual_key_scope: Option<&[String]>,
        cancellation: CancellationToken,
    ) -> Result<Response, GatewayError> {
        let (job, rx) = self.build_non_stream_job(request_id, target, request, virtual_key_scope, cancellation)?;
        self.submit(target, job)?;
        rx.await.map_err(|_| GatewayError::internal("worker dropped the response channel"))?
    }

    #[allow(clippy::type_complexity)]
    fn build_non_stream_job(
        &self,
        request_id: &str,
        target: &ProviderModel,
        request: &Request,
        virtual_key_scope: Option<&[String]>,
        cancellation: CancellationToken,
    ) -> Result<(Job, oneshot::Receiver<Result<Response, GatewayError>>), GatewayError> {
        let (provider_config, adapter, key) = self.resolve(target, virtual_key_scope)?;
        let (tx, rx) = oneshot::channel();
        let job = Job {
            request_id: request_id.to_string(),
            request: request.retarget(target),
            key,
            network: provider_config.network.clone(),
            attach_raw: provider_config.attach_raw_response,
            adapter,
            cancellation,
            outcome: JobOutcome::NonStream(tx),
        };
        Ok((job, rx))
    }

    /// Submit a streaming job. Returns the chunk receiver once the worker
    /// confirms it connected (spec §4.6's "no bytes have yet been
    /// delivered" fallback condition lives in the `first_byte` signal).
    pub async fn dispatch_stream(
        &self,
        request_id: &str,
        target: &ProviderModel,
        request: &Request,
        virtual_key_scope: Option<&[String]>,
        cancellation: CancellationToken,
    ) -> Result<mpsc::Receiver<ChunkEvent>, GatewayError> {
        let (provider_config, adapter, key) = self.resolve(target, virtual_key_scope)?;
        let (chunk_tx, chunk_rx) = mpsc::channel(provider_config.performance.buffer_size.min(256));
        let (first_byte_tx, first_byte_rx) = oneshot::channel();
        let job = Job {
            request_id: request_id.to_string(),
            request: request.retarget(target),
            key,
            network: provider_config.network.clone(),
            attach_raw: provider_config.attach_raw_response,
            adapter,
            cancellation,
            outcome: JobOutcome::Stream {
                chunks: chunk_tx,
                first_byte: first_byte_tx,
            },
        };
        self.submit(target, job)?;

        first_byte_rx
            .await
            .map_err(|_| GatewayError::internal("worker dropped the first-byte signal"))??;
        Ok(chunk_rx)
    }

    fn resolve(
        &self,
        target: &ProviderModel,
        virtual_key_scope: Option<&[String]>,
    ) -> Result<(ProviderConfig, Arc<dyn gw_providers::adapter::ProviderAdapter>, gw_core::Key), GatewayError> {
        let snapshot = self.providers.current();
        let provider_config = snapshot
            .get(&target.provider)
            .cloned()
            .ok_or_else(|| GatewayError::validation(format!("unknown provider: {}", target.provider)))?;

        let adapter = self
            .registry
            .get(&target.provider)
            .ok_or_else(|| GatewayError::validation(format!("no adapter registered for provider: {}", target.provider)))?;

        let (key, _meta) = self
            .selector
            .select(&target.provider, &target.model, &provider_config.keys, virtual_key_scope)
            .map_err(|_| GatewayError::no_suitable_key(format!("no suitable key for {target}")))?;

        Ok((provider_config, adapter, key))
    }

    fn submit(&self, target: &ProviderModel, job: Job) -> Result<(), GatewayError> {
        let pool = self
            .pools
            .get(&target.provider)
            .ok_or_else(|| GatewayError::validation(format!("no worker pool for provider: {}", target.provider)))?;
        pool.submit(job)
    }
}
