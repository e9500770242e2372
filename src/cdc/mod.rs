//! Oracle CDC lag lookup.
//!
//! The control plane does not expose CDC lag gauges itself, so this module
//! calls the hosting engine's REST API directly with the same credential
//! pair. Two generations of the Oracle CDC origin publish the value under
//! different gauge names and with different value types, so a lookup yields
//! an explicit variant rather than a raw string.

use crate::conf::Config;
use crate::controlhub::{self, ApiError};
use crate::controlhub::types::{Engine, Job, JobRun};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

/// Gauge key fragment published by the old Oracle CDC Client origin.
const LEGACY_GAUGE_MARKER: &str = "RedoLog Archives";

/// Gauge key fragment published by the current Oracle CDC origin.
const INSTANT_GAUGE_MARKER: &str = "Summary 02 - Latency.0.gauge";

const LEGACY_LAG_FIELD: &str = "Read lag (seconds)";
const INSTANT_LATENCY_FIELD: &str = "Server Instant Latency";

/// The single latency value a lookup produces. Which variant comes back
/// depends on which origin generation built the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CdcLatency {
    /// Read lag in whole seconds, from the old Oracle CDC Client origin.
    LegacySeconds(i64),

    /// Server instant latency from the current Oracle CDC origin. Kept as
    /// text; the engine reports strings like "4 minutes 2 seconds".
    ServerInstant(String),
}

/// Why a lookup produced no metric. None of these abort the caller's scan;
/// the record simply goes out without the extra field.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LagUnavailable {
    #[error("job has no engine assigned in its current status")]
    NoEngine,

    #[error("engine '{0}' is not registered with the control plane")]
    UnknownEngine(String),

    #[error("could not reach engine; {0}")]
    Transport(String),

    #[error("engine returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("no Oracle CDC gauge in the pipeline's metrics")]
    NoGauge,

    #[error("gauge carried an unusable value; {0}")]
    Malformed(String),
}

/// Seam between the run assembler and the network, so assembly is testable
/// without an engine to call.
#[async_trait]
pub trait LagProbe {
    async fn lag_metric(&self, job: &Job, run: &JobRun) -> Result<CdcLatency, LagUnavailable>;
}

/// Metrics document the engine serves for a pipeline. Only the gauges are
/// interesting; gauge values are free-shape JSON.
#[derive(Debug, Deserialize)]
struct PipelineMetrics {
    #[serde(default)]
    gauges: HashMap<String, Gauge>,
}

#[derive(Debug, Deserialize)]
struct Gauge {
    #[serde(default)]
    value: serde_json::Value,
}

/// Resolves CDC latency for a job run by asking the engine that currently
/// hosts the job. Holds one HTTP client with the credential headers baked
/// in, reused across lookups.
#[derive(Debug)]
pub struct CdcMetrics {
    http: reqwest::Client,
    engines: Vec<Engine>,
}

impl CdcMetrics {
    /// `engines` is the control plane's registered-engine snapshot; lookups
    /// resolve engine ids against it by linear search.
    pub fn new(conf: &Config, engines: Vec<Engine>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .default_headers(controlhub::auth_headers(conf)?)
            .build()
            .map_err(|e| ApiError::Connection(e.to_string()))?;

        Ok(Self { http, engines })
    }

    fn engine_url(&self, engine_id: &str) -> Option<&str> {
        self.engines
            .iter()
            .find(|engine| engine.id == engine_id)
            .map(|engine| engine.engine_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LagProbe for CdcMetrics {
    /// One authenticated GET against the hosting engine. Exactly one network
    /// call per lookup; no retry, no caching, transport-default timeout.
    async fn lag_metric(&self, job: &Job, run: &JobRun) -> Result<CdcLatency, LagUnavailable> {
        let engine_id = job
            .current_job_status
            .as_ref()
            .and_then(|status| status.sdc_ids.first())
            .ok_or(LagUnavailable::NoEngine)?;

        let engine_url = self
            .engine_url(engine_id)
            .ok_or_else(|| LagUnavailable::UnknownEngine(engine_id.clone()))?;

        let url = format!(
            "{}/rest/v1/pipeline/{}/metrics?rev=0",
            engine_url, run.engine_pipeline_id
        );

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| LagUnavailable::Transport(e.to_string()))?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(LagUnavailable::Status(response.status()));
        }

        let metrics: PipelineMetrics = response
            .json()
            .await
            .map_err(|e| LagUnavailable::Malformed(e.to_string()))?;

        extract_lag(&metrics.gauges)
    }
}

/// Picks the CDC latency out of an engine's gauge map. The legacy origin
/// wins if a pipeline somehow publishes both shapes.
fn extract_lag(gauges: &HashMap<String, Gauge>) -> Result<CdcLatency, LagUnavailable> {
    for (name, gauge) in gauges {
        if name.contains(LEGACY_GAUGE_MARKER) {
            let lag = gauge.value.get(LEGACY_LAG_FIELD).ok_or_else(|| {
                LagUnavailable::Malformed(format!("gauge '{name}' has no '{LEGACY_LAG_FIELD}' field"))
            })?;
            return Ok(CdcLatency::LegacySeconds(coerce_seconds(lag)?));
        }
    }

    for (name, gauge) in gauges {
        if name.contains(INSTANT_GAUGE_MARKER) {
            let latency = gauge.value.get(INSTANT_LATENCY_FIELD).ok_or_else(|| {
                LagUnavailable::Malformed(format!(
                    "gauge '{name}' has no '{INSTANT_LATENCY_FIELD}' field"
                ))
            })?;
            return Ok(CdcLatency::ServerInstant(stringify(latency)));
        }
    }

    Err(LagUnavailable::NoGauge)
}

/// The legacy origin reports lag sometimes as a JSON number and sometimes as
/// a numeric string.
fn coerce_seconds(value: &serde_json::Value) -> Result<i64, LagUnavailable> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    parsed.ok_or_else(|| LagUnavailable::Malformed(format!("'{value}' is not a number of seconds")))
}

fn stringify(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
