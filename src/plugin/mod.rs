//! Plugin boundary of the gateway.
//!
//! A plugin is one stage of a pipeline, addressed through a single
//! capability trait. New plugin kinds register a [`PluginConstructor`]
//! returning the capability plus a type tag; the core dispatches through
//! the trait object and never knows concrete plugin types.

pub mod http;

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::PipelineContext;
use crate::error::{ConfigError, GatewayError, PluginError};
use crate::task::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PluginType {
    #[default]
    Unknown,
    Source,
    Sink,
    Process,
}

/// The capability every plugin implements.
///
/// Contract:
///
/// 1. `run` returns an error only if (a) the plugin instance needs
///    reconstruction, e.g. a backend failure invalidated a local client
///    object, or (b) the task was cancelled because the running plugin was
///    updated dynamically and the task will re-run on the updated plugin.
///    Errors caused by user input are recorded on the task instead.
/// 2. Implementations are stateless and re-entrant on the same task: one
///    instance may serve different pipelines or parallel runs of the same
///    pipeline concurrently.
/// 3. `prepare` is called exactly once per (instance, pipeline context)
///    pair, before the first `run` on that pipeline.
/// 4. `clean_up` runs when an instance is retired from a context; `close`
///    when the plugin as a whole is.
#[async_trait]
pub trait Plugin: Send + Sync {
    async fn prepare(&self, ctx: &PipelineContext);

    async fn run(&self, ctx: &PipelineContext, task: &mut dyn Task) -> Result<(), PluginError>;

    fn name(&self) -> &str;

    async fn clean_up(&self, ctx: &PipelineContext);

    async fn close(&self);
}

/// External configuration entering the core; validated before the core
/// sees it.
pub trait PluginConfig: Send + Sync {
    fn plugin_name(&self) -> &str;

    /// Validates the config against the set of known pipeline names.
    fn prepare(&self, pipeline_names: &[String]) -> Result<(), ConfigError>;
}

/// Builds a plugin from validated config, returning the instance, its type
/// tag and whether it is stateful.
pub type PluginConstructor =
    fn(config: Arc<dyn PluginConfig>) -> Result<(Arc<dyn Plugin>, PluginType, bool), GatewayError>;

pub type PluginConfigConstructor = fn() -> Arc<dyn PluginConfig>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::PipelineConfig;
    use crate::rendezvous::RendezvousStore;
    use crate::task::{BasicTask, TaskResultCode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct EchoConfig;

    impl PluginConfig for EchoConfig {
        fn plugin_name(&self) -> &str {
            "echo"
        }

        fn prepare(&self, pipeline_names: &[String]) -> Result<(), ConfigError> {
            if pipeline_names.is_empty() {
                return Err(ConfigError::Validation("no pipelines".to_string()));
            }
            Ok(())
        }
    }

    struct EchoPlugin {
        prepared: AtomicUsize,
    }

    #[async_trait]
    impl Plugin for EchoPlugin {
        async fn prepare(&self, _ctx: &PipelineContext) {
            self.prepared.fetch_add(1, Ordering::SeqCst);
        }

        async fn run(
            &self,
            ctx: &PipelineContext,
            task: &mut dyn Task,
        ) -> Result<(), PluginError> {
            let start = std::time::Instant::now();
            task.set_result_code(TaskResultCode::Success);
            ctx.statistics()
                .record_plugin_execution(self.name(), start.elapsed(), true);
            Ok(())
        }

        fn name(&self) -> &str {
            "echo"
        }

        async fn clean_up(&self, _ctx: &PipelineContext) {}

        async fn close(&self) {}
    }

    fn echo_constructor(
        config: Arc<dyn PluginConfig>,
    ) -> Result<(Arc<dyn Plugin>, PluginType, bool), GatewayError> {
        assert_eq!(config.plugin_name(), "echo");
        Ok((
            Arc::new(EchoPlugin {
                prepared: AtomicUsize::new(0),
            }),
            PluginType::Process,
            false,
        ))
    }

    #[tokio::test]
    async fn test_constructor_and_lifecycle() {
        let config: Arc<dyn PluginConfig> = Arc::new(EchoConfig);
        config.prepare(&["p".to_string()]).unwrap();

        let constructor: PluginConstructor = echo_constructor;
        let (plugin, plugin_type, stateful) = constructor(config).unwrap();
        assert_eq!(plugin_type, PluginType::Process);
        assert!(!stateful);

        let store = Arc::new(RendezvousStore::new());
        let ctx = PipelineContext::new(
            PipelineConfig {
                pipeline_name: "p".to_string(),
                plugin_names: vec!["echo".to_string()],
                parallelism: 1,
            },
            store,
        );

        plugin.prepare(&ctx).await;
        let mut task = BasicTask::new();
        plugin.run(&ctx, &mut task).await.unwrap();
        assert_eq!(task.result_code(), TaskResultCode::Success);

        assert_eq!(
            ctx.statistics()
                .plugin_execution_count("echo", crate::statistics::StatisticsKind::Success)
                .unwrap(),
            1
        );
        assert!(
            ctx.statistics()
                .plugin_execution_time_max("echo", crate::statistics::StatisticsKind::Success)
                .unwrap()
                < Duration::from_secs(1)
        );

        plugin.clean_up(&ctx).await;
        plugin.close().await;
    }

    #[test]
    fn test_config_prepare_rejects_unknown_pipelines() {
        let config = EchoConfig;
        assert!(config.prepare(&[]).is_err());
        assert!(config.prepare(&["p".to_string()]).is_ok());
    }
}
