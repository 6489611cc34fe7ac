//! Per-pipeline statistics engine.
//!
//! Maintains rolling throughput rates and latency moments per pipeline and
//! per (plugin, kind), fires named update callbacks after every sample, and
//! hosts a registry of user-defined plugin indicators. Every accessor fails
//! with a typed [`StatisticsError::NotAvailable`] before the first sample of
//! the requested dimension instead of fabricating a zero.
//!
//! Rate windows are exponential-decay approximations (see [`meter`]);
//! percentiles come from a bounded sliding window (see [`sample`]).

mod meter;
mod sample;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use serde_json::json;
use tracing::debug;

use crate::error::StatisticsError;
use meter::Meter;
use sample::ExecutionSample;

/// Instance id marking an indicator registered on behalf of every instance
/// of a plugin.
pub const STATISTICS_INDICATOR_FOR_ALL_PLUGIN_INSTANCES: &str = "*";

/// Classification of a recorded sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum StatisticsKind {
    Success,
    Failure,
    All,
}

impl fmt::Display for StatisticsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatisticsKind::Success => "Success",
            StatisticsKind::Failure => "Failure",
            StatisticsKind::All => "All",
        };
        f.write_str(s)
    }
}

pub type IndicatorValue = serde_json::Value;

/// Evaluator of a user-registered indicator, invoked on demand with the
/// plugin name and indicator name.
pub type IndicatorEvaluator =
    Arc<dyn Fn(&str, &str) -> Result<IndicatorValue, StatisticsError> + Send + Sync>;

pub type PipelineThroughputRateUpdated = Arc<dyn Fn(&str, &PipelineStatistics) + Send + Sync>;
pub type PipelineExecutionSampleUpdated = Arc<dyn Fn(&str, &PipelineStatistics) + Send + Sync>;
pub type PluginThroughputRateUpdated =
    Arc<dyn Fn(&str, &PipelineStatistics, StatisticsKind) + Send + Sync>;
pub type PluginExecutionSampleUpdated =
    Arc<dyn Fn(&str, &PipelineStatistics, StatisticsKind) + Send + Sync>;

// Built-in pipeline-level indicators.
pub const PIPELINE_INDICATOR_THROUGHPUT_RATE_LAST_1MIN_ALL: &str = "THROUGHPUT_RATE_LAST_1MIN_ALL";
pub const PIPELINE_INDICATOR_EXECUTION_COUNT_ALL: &str = "EXECUTION_COUNT_ALL";
pub const PIPELINE_INDICATOR_EXECUTION_TIME_MAX_ALL: &str = "EXECUTION_TIME_MAX_ALL";
pub const PIPELINE_INDICATOR_EXECUTION_TIME_MIN_ALL: &str = "EXECUTION_TIME_MIN_ALL";
pub const PIPELINE_INDICATOR_EXECUTION_TIME_50TH_PERCENTILE_ALL: &str =
    "EXECUTION_TIME_50TH_PERCENTILE_ALL";
pub const PIPELINE_INDICATOR_EXECUTION_TIME_90TH_PERCENTILE_ALL: &str =
    "EXECUTION_TIME_90TH_PERCENTILE_ALL";

// Built-in task-level indicators.
pub const TASK_INDICATOR_EXECUTION_COUNT_ALL: &str = "EXECUTION_COUNT_ALL";
pub const TASK_INDICATOR_EXECUTION_COUNT_SUCCESS: &str = "EXECUTION_COUNT_SUCCESS";
pub const TASK_INDICATOR_EXECUTION_COUNT_FAILURE: &str = "EXECUTION_COUNT_FAILURE";

struct CallbackEntry<T> {
    callback: T,
    // Held while the callback runs so a callback never races itself.
    running: Mutex<()>,
}

struct CallbackRegistry<T> {
    entries: DashMap<String, Arc<CallbackEntry<T>>>,
}

impl<T: Clone> CallbackRegistry<T> {
    fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Registers `callback` under `name`. With `overwrite = false` a
    /// duplicate name keeps the first registration and returns it with
    /// `false`; otherwise returns the new callback with `true`.
    fn add(&self, name: &str, callback: T, overwrite: bool) -> (T, bool) {
        use dashmap::mapref::entry::Entry;
        match self.entries.entry(name.to_string()) {
            Entry::Occupied(mut occupied) => {
                if overwrite {
                    occupied.insert(Arc::new(CallbackEntry {
                        callback: callback.clone(),
                        running: Mutex::new(()),
                    }));
                    (callback, true)
                } else {
                    (occupied.get().callback.clone(), false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(CallbackEntry {
                    callback: callback.clone(),
                    running: Mutex::new(()),
                }));
                (callback, true)
            }
        }
    }

    fn delete(&self, name: &str) {
        self.entries.remove(name);
    }

    /// Fires every registered callback. The registry is snapshotted first so
    /// no map lock is held while user code runs; a per-entry mutex keeps
    /// each callback from overlapping with itself.
    fn fire(&self, invoke: impl Fn(&T)) {
        let snapshot: Vec<Arc<CallbackEntry<T>>> =
            self.entries.iter().map(|e| e.value().clone()).collect();
        for entry in snapshot {
            let _running = entry.running.lock().unwrap_or_else(PoisonError::into_inner);
            invoke(&entry.callback);
        }
    }
}

struct StatCell {
    meter: Meter,
    sample: Mutex<ExecutionSample>,
}

impl StatCell {
    fn new() -> Self {
        Self {
            meter: Meter::new(),
            sample: Mutex::new(ExecutionSample::new()),
        }
    }

    fn record(&self, duration: Duration) {
        self.meter.mark();
        self.sample
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .update(duration);
    }

    fn count(&self) -> u64 {
        self.meter.count()
    }

    fn with_sample<R>(&self, f: impl FnOnce(&ExecutionSample) -> R) -> R {
        let sample = self.sample.lock().unwrap_or_else(PoisonError::into_inner);
        f(&sample)
    }
}

struct PluginStats {
    success: StatCell,
    failure: StatCell,
    all: StatCell,
}

impl PluginStats {
    fn new() -> Self {
        Self {
            success: StatCell::new(),
            failure: StatCell::new(),
            all: StatCell::new(),
        }
    }

    fn cell(&self, kind: StatisticsKind) -> &StatCell {
        match kind {
            StatisticsKind::Success => &self.success,
            StatisticsKind::Failure => &self.failure,
            StatisticsKind::All => &self.all,
        }
    }
}

struct IndicatorEntry {
    desc: String,
    instance_id: String,
    evaluator: IndicatorEvaluator,
}

/// Statistics of one pipeline.
///
/// Every worker records into this concurrently; internal state is split into
/// per-plugin cells with short critical sections so recording never funnels
/// through one lock. Callbacks run after sample accounting, outside all
/// engine locks, and must not record samples themselves.
pub struct PipelineStatistics {
    pipeline_name: String,
    pipeline_cell: StatCell,
    plugin_stats: DashMap<String, Arc<PluginStats>>,
    task_success: AtomicU64,
    task_failure: AtomicU64,
    plugin_indicators: DashMap<String, HashMap<String, IndicatorEntry>>,
    pipeline_throughput_callbacks: CallbackRegistry<PipelineThroughputRateUpdated>,
    pipeline_sample_callbacks: CallbackRegistry<PipelineExecutionSampleUpdated>,
    plugin_throughput_callbacks: CallbackRegistry<PluginThroughputRateUpdated>,
    plugin_sample_callbacks: CallbackRegistry<PluginExecutionSampleUpdated>,
    closed: AtomicBool,
}

impl PipelineStatistics {
    pub fn new(pipeline_name: impl Into<String>) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            pipeline_cell: StatCell::new(),
            plugin_stats: DashMap::new(),
            task_success: AtomicU64::new(0),
            task_failure: AtomicU64::new(0),
            plugin_indicators: DashMap::new(),
            pipeline_throughput_callbacks: CallbackRegistry::new(),
            pipeline_sample_callbacks: CallbackRegistry::new(),
            plugin_throughput_callbacks: CallbackRegistry::new(),
            plugin_sample_callbacks: CallbackRegistry::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn pipeline_name(&self) -> &str {
        &self.pipeline_name
    }

    /// Stops accepting samples. The final snapshot stays queryable
    /// read-only; recording after detach is silently dropped.
    pub(crate) fn detach(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    // ---- write side -----------------------------------------------------

    /// Records one plugin invocation. Updates the plugin's Success-or-Failure
    /// aggregate and its All aggregate, then fires the plugin callbacks.
    pub fn record_plugin_execution(&self, plugin_name: &str, duration: Duration, success: bool) {
        if self.is_closed() {
            return;
        }
        let stats = self
            .plugin_stats
            .entry(plugin_name.to_string())
            .or_insert_with(|| Arc::new(PluginStats::new()))
            .clone();

        let kind = if success {
            StatisticsKind::Success
        } else {
            StatisticsKind::Failure
        };
        stats.cell(kind).record(duration);
        stats.cell(StatisticsKind::All).record(duration);

        self.plugin_throughput_callbacks
            .fire(|cb| cb(plugin_name, self, kind));
        self.plugin_sample_callbacks
            .fire(|cb| cb(plugin_name, self, kind));
    }

    /// Records one whole-pipeline pass and fires the pipeline callbacks.
    pub fn record_pipeline_execution(&self, duration: Duration) {
        if self.is_closed() {
            return;
        }
        self.pipeline_cell.record(duration);

        self.pipeline_throughput_callbacks
            .fire(|cb| cb(&self.pipeline_name, self));
        self.pipeline_sample_callbacks
            .fire(|cb| cb(&self.pipeline_name, self));
    }

    /// Records the final disposition of a task.
    pub fn record_task_completion(&self, success: bool) {
        if self.is_closed() {
            return;
        }
        if success {
            self.task_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.task_failure.fetch_add(1, Ordering::Relaxed);
        }
    }

    // ---- pipeline-level read side ---------------------------------------

    fn pipeline_cell_checked(&self) -> Result<&StatCell, StatisticsError> {
        if self.pipeline_cell.count() == 0 {
            Err(StatisticsError::not_available(format!(
                "pipeline {}",
                self.pipeline_name
            )))
        } else {
            Ok(&self.pipeline_cell)
        }
    }

    pub fn pipeline_throughput_rate1(&self) -> Result<f64, StatisticsError> {
        Ok(self.pipeline_cell_checked()?.meter.rate1())
    }

    pub fn pipeline_throughput_rate5(&self) -> Result<f64, StatisticsError> {
        Ok(self.pipeline_cell_checked()?.meter.rate5())
    }

    pub fn pipeline_throughput_rate15(&self) -> Result<f64, StatisticsError> {
        Ok(self.pipeline_cell_checked()?.meter.rate15())
    }

    pub fn pipeline_execution_count(&self) -> Result<u64, StatisticsError> {
        Ok(self.pipeline_cell_checked()?.count())
    }

    pub fn pipeline_execution_time_max(&self) -> Result<Duration, StatisticsError> {
        Ok(self.pipeline_cell_checked()?.with_sample(|s| s.max()))
    }

    pub fn pipeline_execution_time_min(&self) -> Result<Duration, StatisticsError> {
        Ok(self.pipeline_cell_checked()?.with_sample(|s| s.min()))
    }

    pub fn pipeline_execution_time_sum(&self) -> Result<Duration, StatisticsError> {
        Ok(self.pipeline_cell_checked()?.with_sample(|s| s.sum()))
    }

    /// `percentile` is a fraction in [0.0, 1.0].
    pub fn pipeline_execution_time_percentile(
        &self,
        percentile: f64,
    ) -> Result<Duration, StatisticsError> {
        validate_percentile(percentile)?;
        Ok(self
            .pipeline_cell_checked()?
            .with_sample(|s| s.percentile(percentile)))
    }

    /// Sample variance of execution time, in milliseconds squared.
    pub fn pipeline_execution_time_variance(&self) -> Result<f64, StatisticsError> {
        Ok(self.pipeline_cell_checked()?.with_sample(|s| s.variance()))
    }

    /// Sample standard deviation of execution time, in milliseconds.
    pub fn pipeline_execution_time_std_dev(&self) -> Result<f64, StatisticsError> {
        Ok(self.pipeline_cell_checked()?.with_sample(|s| s.std_dev()))
    }

    // ---- plugin-level read side -----------------------------------------

    fn plugin_cell(
        &self,
        plugin_name: &str,
        kind: StatisticsKind,
    ) -> Result<Arc<PluginStats>, StatisticsError> {
        let stats = self
            .plugin_stats
            .get(plugin_name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                StatisticsError::not_available(format!("plugin {plugin_name} ({kind})"))
            })?;
        if stats.cell(kind).count() == 0 {
            return Err(StatisticsError::not_available(format!(
                "plugin {plugin_name} ({kind})"
            )));
        }
        Ok(stats)
    }

    pub fn plugin_throughput_rate1(
        &self,
        plugin_name: &str,
        kind: StatisticsKind,
    ) -> Result<f64, StatisticsError> {
        Ok(self.plugin_cell(plugin_name, kind)?.cell(kind).meter.rate1())
    }

    pub fn plugin_throughput_rate5(
        &self,
        plugin_name: &str,
        kind: StatisticsKind,
    ) -> Result<f64, StatisticsError> {
        Ok(self.plugin_cell(plugin_name, kind)?.cell(kind).meter.rate5())
    }

    pub fn plugin_throughput_rate15(
        &self,
        plugin_name: &str,
        kind: StatisticsKind,
    ) -> Result<f64, StatisticsError> {
        Ok(self
            .plugin_cell(plugin_name, kind)?
            .cell(kind)
            .meter
            .rate15())
    }

    pub fn plugin_execution_count(
        &self,
        plugin_name: &str,
        kind: StatisticsKind,
    ) -> Result<u64, StatisticsError> {
        Ok(self.plugin_cell(plugin_name, kind)?.cell(kind).count())
    }

    pub fn plugin_execution_time_max(
        &self,
        plugin_name: &str,
        kind: StatisticsKind,
    ) -> Result<Duration, StatisticsError> {
        Ok(self
            .plugin_cell(plugin_name, kind)?
            .cell(kind)
            .with_sample(|s| s.max()))
    }

    pub fn plugin_execution_time_min(
        &self,
        plugin_name: &str,
        kind: StatisticsKind,
    ) -> Result<Duration, StatisticsError> {
        Ok(self
            .plugin_cell(plugin_name, kind)?
            .cell(kind)
            .with_sample(|s| s.min()))
    }

    pub fn plugin_execution_time_sum(
        &self,
        plugin_name: &str,
        kind: StatisticsKind,
    ) -> Result<Duration, StatisticsError> {
        Ok(self
            .plugin_cell(plugin_name, kind)?
            .cell(kind)
            .with_sample(|s| s.sum()))
    }

    /// `percentile` is a fraction in [0.0, 1.0].
    pub fn plugin_execution_time_percentile(
        &self,
        plugin_name: &str,
        kind: StatisticsKind,
        percentile: f64,
    ) -> Result<Duration, StatisticsError> {
        validate_percentile(percentile)?;
        Ok(self
            .plugin_cell(plugin_name, kind)?
            .cell(kind)
            .with_sample(|s| s.percentile(percentile)))
    }

    /// Sample variance of execution time, in milliseconds squared.
    pub fn plugin_execution_time_variance(
        &self,
        plugin_name: &str,
        kind: StatisticsKind,
    ) -> Result<f64, StatisticsError> {
        Ok(self
            .plugin_cell(plugin_name, kind)?
            .cell(kind)
            .with_sample(|s| s.variance()))
    }

    /// Sample standard deviation of execution time, in milliseconds.
    pub fn plugin_execution_time_std_dev(
        &self,
        plugin_name: &str,
        kind: StatisticsKind,
    ) -> Result<f64, StatisticsError> {
        Ok(self
            .plugin_cell(plugin_name, kind)?
            .cell(kind)
            .with_sample(|s| s.std_dev()))
    }

    // ---- task counters --------------------------------------------------

    pub fn task_execution_count(&self, kind: StatisticsKind) -> Result<u64, StatisticsError> {
        let success = self.task_success.load(Ordering::Relaxed);
        let failure = self.task_failure.load(Ordering::Relaxed);
        let count = match kind {
            StatisticsKind::Success => success,
            StatisticsKind::Failure => failure,
            StatisticsKind::All => success + failure,
        };
        if count == 0 {
            Err(StatisticsError::not_available(format!("task ({kind})")))
        } else {
            Ok(count)
        }
    }

    // ---- callbacks ------------------------------------------------------

    pub fn add_pipeline_throughput_rate_updated_callback(
        &self,
        name: &str,
        callback: PipelineThroughputRateUpdated,
        overwrite: bool,
    ) -> (PipelineThroughputRateUpdated, bool) {
        debug!(pipeline = %self.pipeline_name, callback = name, "adding pipeline throughput callback");
        self.pipeline_throughput_callbacks.add(name, callback, overwrite)
    }

    pub fn delete_pipeline_throughput_rate_updated_callback(&self, name: &str) {
        self.pipeline_throughput_callbacks.delete(name);
    }

    pub fn add_pipeline_execution_sample_updated_callback(
        &self,
        name: &str,
        callback: PipelineExecutionSampleUpdated,
        overwrite: bool,
    ) -> (PipelineExecutionSampleUpdated, bool) {
        self.pipeline_sample_callbacks.add(name, callback, overwrite)
    }

    pub fn delete_pipeline_execution_sample_updated_callback(&self, name: &str) {
        self.pipeline_sample_callbacks.delete(name);
    }

    pub fn add_plugin_throughput_rate_updated_callback(
        &self,
        name: &str,
        callback: PluginThroughputRateUpdated,
        overwrite: bool,
    ) -> (PluginThroughputRateUpdated, bool) {
        self.plugin_throughput_callbacks.add(name, callback, overwrite)
    }

    pub fn delete_plugin_throughput_rate_updated_callback(&self, name: &str) {
        self.plugin_throughput_callbacks.delete(name);
    }

    pub fn add_plugin_execution_sample_updated_callback(
        &self,
        name: &str,
        callback: PluginExecutionSampleUpdated,
        overwrite: bool,
    ) -> (PluginExecutionSampleUpdated, bool) {
        self.plugin_sample_callbacks.add(name, callback, overwrite)
    }

    pub fn delete_plugin_execution_sample_updated_callback(&self, name: &str) {
        self.plugin_sample_callbacks.delete(name);
    }

    // ---- indicators -----------------------------------------------------

    /// Registers a custom plugin indicator. Indicator names are unique per
    /// plugin; a duplicate name fails with `DuplicateIndicator` and has no
    /// effect.
    pub fn register_plugin_indicator(
        &self,
        plugin_name: &str,
        instance_id: &str,
        indicator_name: &str,
        desc: &str,
        evaluator: IndicatorEvaluator,
    ) -> Result<bool, StatisticsError> {
        let mut indicators = self
            .plugin_indicators
            .entry(plugin_name.to_string())
            .or_default();
        if indicators.contains_key(indicator_name) {
            return Err(StatisticsError::DuplicateIndicator {
                plugin: plugin_name.to_string(),
                indicator: indicator_name.to_string(),
            });
        }
        indicators.insert(
            indicator_name.to_string(),
            IndicatorEntry {
                desc: desc.to_string(),
                instance_id: instance_id.to_string(),
                evaluator,
            },
        );
        debug!(
            pipeline = %self.pipeline_name,
            plugin = plugin_name,
            indicator = indicator_name,
            "registered plugin indicator"
        );
        Ok(true)
    }

    /// Unregisters a plugin indicator. Idempotent; only the instance that
    /// registered the indicator (or the shared sentinel) may remove it.
    pub fn unregister_plugin_indicator(
        &self,
        plugin_name: &str,
        instance_id: &str,
        indicator_name: &str,
    ) {
        if let Some(mut indicators) = self.plugin_indicators.get_mut(plugin_name) {
            let owned = indicators
                .get(indicator_name)
                .map(|entry| entry.instance_id == instance_id)
                .unwrap_or(false);
            if owned {
                indicators.remove(indicator_name);
            }
        }
    }

    /// Drops every indicator of `plugin_name`. Used when the plugin itself
    /// is removed from the pipeline.
    pub fn unregister_all_plugin_indicators(&self, plugin_name: &str) {
        self.plugin_indicators.remove(plugin_name);
    }

    pub fn plugin_indicator_names(&self, plugin_name: &str) -> Vec<String> {
        self.plugin_indicators
            .get(plugin_name)
            .map(|indicators| indicators.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn plugin_indicator_description(
        &self,
        plugin_name: &str,
        indicator_name: &str,
    ) -> Option<String> {
        self.plugin_indicators
            .get(plugin_name)
            .and_then(|indicators| indicators.get(indicator_name).map(|e| e.desc.clone()))
    }

    pub fn plugin_indicator_value(
        &self,
        plugin_name: &str,
        indicator_name: &str,
    ) -> Result<IndicatorValue, StatisticsError> {
        // Clone the evaluator out so user code runs outside the map lock.
        let evaluator = self
            .plugin_indicators
            .get(plugin_name)
            .and_then(|indicators| {
                indicators
                    .get(indicator_name)
                    .map(|entry| entry.evaluator.clone())
            })
            .ok_or_else(|| StatisticsError::UnknownIndicator {
                indicator: indicator_name.to_string(),
            })?;
        evaluator(plugin_name, indicator_name)
    }

    pub fn pipeline_indicator_names(&self) -> Vec<String> {
        vec![
            PIPELINE_INDICATOR_THROUGHPUT_RATE_LAST_1MIN_ALL.to_string(),
            PIPELINE_INDICATOR_EXECUTION_COUNT_ALL.to_string(),
            PIPELINE_INDICATOR_EXECUTION_TIME_MAX_ALL.to_string(),
            PIPELINE_INDICATOR_EXECUTION_TIME_MIN_ALL.to_string(),
            PIPELINE_INDICATOR_EXECUTION_TIME_50TH_PERCENTILE_ALL.to_string(),
            PIPELINE_INDICATOR_EXECUTION_TIME_90TH_PERCENTILE_ALL.to_string(),
        ]
    }

    /// Built-in pipeline indicators, evaluated on demand from the live
    /// aggregates. Durations are reported as fractional milliseconds.
    pub fn pipeline_indicator_value(
        &self,
        indicator_name: &str,
    ) -> Result<IndicatorValue, StatisticsError> {
        match indicator_name {
            PIPELINE_INDICATOR_THROUGHPUT_RATE_LAST_1MIN_ALL => {
                Ok(json!(self.pipeline_throughput_rate1()?))
            }
            PIPELINE_INDICATOR_EXECUTION_COUNT_ALL => Ok(json!(self.pipeline_execution_count()?)),
            PIPELINE_INDICATOR_EXECUTION_TIME_MAX_ALL => {
                Ok(json!(duration_ms(self.pipeline_execution_time_max()?)))
            }
            PIPELINE_INDICATOR_EXECUTION_TIME_MIN_ALL => {
                Ok(json!(duration_ms(self.pipeline_execution_time_min()?)))
            }
            PIPELINE_INDICATOR_EXECUTION_TIME_50TH_PERCENTILE_ALL => Ok(json!(duration_ms(
                self.pipeline_execution_time_percentile(0.5)?
            ))),
            PIPELINE_INDICATOR_EXECUTION_TIME_90TH_PERCENTILE_ALL => Ok(json!(duration_ms(
                self.pipeline_execution_time_percentile(0.9)?
            ))),
            other => Err(StatisticsError::UnknownIndicator {
                indicator: other.to_string(),
            }),
        }
    }

    pub fn task_indicator_names(&self) -> Vec<String> {
        vec![
            TASK_INDICATOR_EXECUTION_COUNT_ALL.to_string(),
            TASK_INDICATOR_EXECUTION_COUNT_SUCCESS.to_string(),
            TASK_INDICATOR_EXECUTION_COUNT_FAILURE.to_string(),
        ]
    }

    pub fn task_indicator_value(
        &self,
        indicator_name: &str,
    ) -> Result<IndicatorValue, StatisticsError> {
        match indicator_name {
            TASK_INDICATOR_EXECUTION_COUNT_ALL => {
                Ok(json!(self.task_execution_count(StatisticsKind::All)?))
            }
            TASK_INDICATOR_EXECUTION_COUNT_SUCCESS => {
                Ok(json!(self.task_execution_count(StatisticsKind::Success)?))
            }
            TASK_INDICATOR_EXECUTION_COUNT_FAILURE => {
                Ok(json!(self.task_execution_count(StatisticsKind::Failure)?))
            }
            other => Err(StatisticsError::UnknownIndicator {
                indicator: other.to_string(),
            }),
        }
    }
}

fn validate_percentile(percentile: f64) -> Result<(), StatisticsError> {
    if !(0.0..=1.0).contains(&percentile) || percentile.is_nan() {
        return Err(StatisticsError::InvalidPercentile { percentile });
    }
    Ok(())
}

fn duration_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
