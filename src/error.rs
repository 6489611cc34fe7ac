use std::fmt;
use thiserror::Error;

use crate::bucket::BucketValue;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Rendezvous error: {0}")]
    Rendezvous(#[from] RendezvousError),

    #[error("Data bucket error: {0}")]
    Bucket(#[from] BucketError),

    #[error("Statistics error: {0}")]
    Statistics(#[from] StatisticsError),

    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Pipeline context is closed")]
    ContextClosed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RendezvousError {
    #[error("Request cancelled by caller")]
    Cancelled,

    #[error("Request for pipeline {pipeline} is closed")]
    RequestClosed { pipeline: String },

    #[error("Pipeline {pipeline} stopped accepting cross-pipeline requests")]
    PipelineClosed { pipeline: String },

    #[error("No pipeline registered under name {pipeline}")]
    NoSuchPipeline { pipeline: String },

    #[error("Response slot of the request was already consumed")]
    ResponseTaken,
}

#[derive(Error)]
pub enum BucketError {
    #[error("Key {key} is already bound")]
    AlreadyBound {
        key: String,
        /// The value that was already bound; the bucket is left unchanged.
        existing: BucketValue,
    },

    #[error("Data bucket has been deleted")]
    BucketClosed,
}

// Manual impl because `BucketValue` is a type-erased `Arc<dyn Any>`.
impl fmt::Debug for BucketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketError::AlreadyBound { key, .. } => f
                .debug_struct("AlreadyBound")
                .field("key", key)
                .finish_non_exhaustive(),
            BucketError::BucketClosed => f.write_str("BucketClosed"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatisticsError {
    #[error("Statistics not available for {dimension}")]
    NotAvailable { dimension: String },

    #[error("Indicator {indicator} is already registered for plugin {plugin}")]
    DuplicateIndicator { plugin: String, indicator: String },

    #[error("Unknown indicator: {indicator}")]
    UnknownIndicator { indicator: String },

    #[error("Percentile {percentile} out of range [0.0, 1.0]")]
    InvalidPercentile { percentile: f64 },

    #[error("Indicator evaluation failed: {0}")]
    Evaluation(String),
}

impl StatisticsError {
    pub(crate) fn not_available(dimension: impl Into<String>) -> Self {
        StatisticsError::NotAvailable {
            dimension: dimension.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PluginError {
    #[error("Plugin instance needs reconstruction: {reason}")]
    NeedsReconstruction { reason: String },

    #[error("Task was cancelled while the plugin was running")]
    TaskCancelled,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown pipeline: {0}")]
    UnknownPipeline(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;
