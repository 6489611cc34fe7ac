//! The per-pipeline runtime handle plugins receive.
//!
//! Composes the data bucket store, the statistics engine and participation
//! in the process-wide cross-pipeline rendezvous store behind one facade.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bucket::{BucketStore, DataBucket};
use crate::error::{ConfigError, GatewayError, Result};
use crate::rendezvous::{DownstreamRequest, RendezvousStore, UpstreamResponse};
use crate::statistics::PipelineStatistics;

/// Validated construction input for a pipeline context. The core treats a
/// config handed to [`PipelineContext::new`] as already validated.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub pipeline_name: String,
    /// Sequential plugin names.
    pub plugin_names: Vec<String>,
    /// Max concurrent task instances of this pipeline.
    pub parallelism: u16,
}

impl PipelineConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.pipeline_name.is_empty() {
            return Err(ConfigError::Validation(
                "pipeline name must not be empty".to_string(),
            ));
        }
        if self.plugin_names.is_empty() {
            return Err(ConfigError::Validation(format!(
                "pipeline {} has no plugins",
                self.pipeline_name
            )));
        }
        if self.parallelism == 0 {
            return Err(ConfigError::Validation(format!(
                "pipeline {} parallelism must be at least 1",
                self.pipeline_name
            )));
        }
        Ok(())
    }
}

/// Runtime handle of one pipeline. Lifetime matches the pipeline; `close`
/// releases the buckets, detaches statistics and withdraws the pipeline
/// from the rendezvous store.
pub struct PipelineContext {
    pipeline_name: String,
    plugin_names: Vec<String>,
    parallelism: u16,
    statistics: Arc<PipelineStatistics>,
    buckets: BucketStore,
    rendezvous: Arc<RendezvousStore>,
    closed: AtomicBool,
}

impl PipelineContext {
    /// Builds a context and registers the pipeline with the shared
    /// rendezvous store. The store handle is explicit: there is no global
    /// singleton behind this type.
    pub fn new(config: PipelineConfig, rendezvous: Arc<RendezvousStore>) -> Self {
        rendezvous.register(&config.pipeline_name);
        info!(pipeline = %config.pipeline_name, parallelism = config.parallelism, "pipeline context created");
        Self {
            statistics: Arc::new(PipelineStatistics::new(config.pipeline_name.clone())),
            pipeline_name: config.pipeline_name,
            plugin_names: config.plugin_names,
            parallelism: config.parallelism,
            buckets: BucketStore::new(),
            rendezvous,
            closed: AtomicBool::new(false),
        }
    }

    pub fn pipeline_name(&self) -> &str {
        &self.pipeline_name
    }

    pub fn plugin_names(&self) -> &[String] {
        &self.plugin_names
    }

    pub fn parallelism(&self) -> u16 {
        self.parallelism
    }

    pub fn statistics(&self) -> Arc<PipelineStatistics> {
        self.statistics.clone()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Returns (creating if necessary) the data bucket of
    /// `(plugin_name, instance_id)`. An instance-scoped bucket is expected
    /// to be deleted by that instance's cleanup; a bucket created under
    /// [`crate::bucket::DATA_BUCKET_FOR_ALL_PLUGIN_INSTANCES`] lives until
    /// the plugin itself is removed.
    pub fn data_bucket(&self, plugin_name: &str, instance_id: &str) -> Result<Arc<DataBucket>> {
        if self.is_closed() {
            return Err(GatewayError::ContextClosed);
        }
        Ok(self.buckets.bucket(plugin_name, instance_id))
    }

    /// Deletes and returns one data bucket (a no-op empty bucket if absent).
    pub fn delete_bucket(&self, plugin_name: &str, instance_id: &str) -> Arc<DataBucket> {
        self.buckets.delete_bucket(plugin_name, instance_id)
    }

    /// Removes a plugin from this context's bookkeeping: every data bucket
    /// of the plugin (shared sentinel bucket included) and all of its
    /// registered indicators. Called when the plugin is removed from the
    /// pipeline definition, not on instance cleanup.
    pub fn delete_plugin(&self, plugin_name: &str) {
        self.buckets.delete_plugin_buckets(plugin_name);
        self.statistics.unregister_all_plugin_indicators(plugin_name);
    }

    /// Commits a request to its downstream pipeline and blocks until that
    /// pipeline responds or `cancel` fires. Called by the upstream side.
    pub async fn commit_cross_pipeline_request(
        &self,
        request: Arc<DownstreamRequest>,
        cancel: &CancellationToken,
    ) -> Result<UpstreamResponse> {
        if self.is_closed() {
            return Err(GatewayError::ContextClosed);
        }
        if request.upstream_pipeline_name() != self.pipeline_name {
            warn!(
                pipeline = %self.pipeline_name,
                request_upstream = request.upstream_pipeline_name(),
                "committing a request whose upstream name differs from this pipeline"
            );
        }
        Ok(self.rendezvous.commit(request, cancel).await?)
    }

    /// Claims the next request addressed to this pipeline, blocking until
    /// one arrives or `cancel` fires. Called by the downstream side.
    pub async fn claim_cross_pipeline_request(
        &self,
        cancel: &CancellationToken,
    ) -> Option<Arc<DownstreamRequest>> {
        if self.is_closed() {
            return None;
        }
        self.rendezvous.claim(&self.pipeline_name, cancel).await
    }

    /// How many requests from `upstream_pipeline_name` are committed to this
    /// pipeline and not yet concluded.
    pub fn cross_pipeline_pending_count(&self, upstream_pipeline_name: &str) -> usize {
        self.rendezvous
            .pending_count(&self.pipeline_name, upstream_pipeline_name)
    }

    /// Ordered teardown: stop accepting commits/claims through this context,
    /// withdraw from the rendezvous store (pending requests are closed, so
    /// blocked committers unblock with a typed error), release all data
    /// buckets, then detach statistics. The final statistics snapshot stays
    /// queryable read-only.
    ///
    /// Idempotent and safe to call concurrently.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(pipeline = %self.pipeline_name, "closing pipeline context");
        self.rendezvous.unregister(&self.pipeline_name);
        self.buckets.close();
        self.statistics.detach();
    }
}

impl Drop for PipelineContext {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::DATA_BUCKET_FOR_ALL_PLUGIN_INSTANCES;
    use crate::error::RendezvousError;
    use crate::rendezvous::RequestData;
    use std::time::Duration;

    fn config(name: &str) -> PipelineConfig {
        PipelineConfig {
            pipeline_name: name.to_string(),
            plugin_names: vec!["head".to_string(), "tail".to_string()],
            parallelism: 4,
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(config("p").validate().is_ok());

        let mut bad = config("");
        assert!(bad.validate().is_err());

        bad = config("p");
        bad.plugin_names.clear();
        assert!(bad.validate().is_err());

        bad = config("p");
        bad.parallelism = 0;
        assert!(bad.validate().is_err());
    }

    #[tokio::test]
    async fn test_read_accessors() {
        let store = Arc::new(RendezvousStore::new());
        let ctx = PipelineContext::new(config("p"), store.clone());

        assert_eq!(ctx.pipeline_name(), "p");
        assert_eq!(ctx.plugin_names(), &["head", "tail"]);
        assert_eq!(ctx.parallelism(), 4);
        assert!(store.is_registered("p"));
    }

    #[tokio::test]
    async fn test_close_is_ordered_and_idempotent() {
        let store = Arc::new(RendezvousStore::new());
        let ctx = Arc::new(PipelineContext::new(config("p"), store.clone()));

        let bucket = ctx
            .data_bucket("head", DATA_BUCKET_FOR_ALL_PLUGIN_INSTANCES)
            .unwrap();
        bucket.bind("k", Arc::new(1u64)).unwrap();
        ctx.statistics()
            .record_plugin_execution("head", Duration::from_millis(3), true);

        ctx.close();
        ctx.close();

        // New work through the context is refused.
        assert!(matches!(
            ctx.data_bucket("head", "inst"),
            Err(GatewayError::ContextClosed)
        ));
        assert!(!store.is_registered("p"));
        let cancel = CancellationToken::new();
        assert!(ctx.claim_cross_pipeline_request(&cancel).await.is_none());

        // The final statistics snapshot stays readable.
        assert_eq!(
            ctx.statistics()
                .plugin_execution_count("head", crate::statistics::StatisticsKind::Success)
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_close_unblocks_committers() {
        let store = Arc::new(RendezvousStore::new());
        let upstream = Arc::new(PipelineContext::new(config("up"), store.clone()));
        let downstream = Arc::new(PipelineContext::new(config("down"), store.clone()));

        let committer = {
            let upstream = upstream.clone();
            tokio::spawn(async move {
                let request = Arc::new(DownstreamRequest::new("up", "down", RequestData::new()));
                let cancel = CancellationToken::new();
                upstream.commit_cross_pipeline_request(request, &cancel).await
            })
        };
        while downstream.cross_pipeline_pending_count("up") == 0 {
            tokio::task::yield_now().await;
        }

        downstream.close();

        let result = committer.await.unwrap();
        assert!(matches!(
            result,
            Err(GatewayError::Rendezvous(RendezvousError::RequestClosed { .. }))
        ));
    }

    #[tokio::test]
    async fn test_commit_through_closed_context_is_refused() {
        let store = Arc::new(RendezvousStore::new());
        let ctx = PipelineContext::new(config("up"), store);
        ctx.close();

        let request = Arc::new(DownstreamRequest::new("up", "down", RequestData::new()));
        let cancel = CancellationToken::new();
        assert!(matches!(
            ctx.commit_cross_pipeline_request(request, &cancel).await,
            Err(GatewayError::ContextClosed)
        ));
    }
}
