//! Window filtering and record assembly.
//!
//! Walks one job's run history, keeps the runs inside the lookback window,
//! joins each with its record counters, and attaches the Oracle CDC latency
//! where it applies. Diagnostics come back as typed notices; this module
//! never prints.

use crate::cdc::{CdcLatency, LagProbe, LagUnavailable};
use crate::controlhub::types::{Job, JobRun, RunMetrics, RunStatus};
use serde::Serialize;

/// Counter value substituted when a run has no matching metrics entry.
/// Either all three counters are real or all three carry this sentinel.
const MISSING_COUNTER: i64 = -1;

/// One flattened job-run row, shaped for the downstream loader. The field
/// names are the warehouse column names the file feeds, so they stay
/// uppercase on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputRecord {
    #[serde(rename = "ID")]
    pub id: String,

    #[serde(rename = "NAME")]
    pub name: String,

    #[serde(rename = "CREATETIME")]
    pub created_on: i64,

    #[serde(rename = "LASTMODIFIEDON")]
    pub last_modified_on: i64,

    #[serde(rename = "PIPELINENAME")]
    pub pipeline_name: String,

    #[serde(rename = "PIPELINECOMMITLABEL")]
    pub pipeline_commit_label: String,

    #[serde(rename = "RUNCOUNT")]
    pub run_count: u64,

    #[serde(rename = "STARTTIME")]
    pub start_time: i64,

    #[serde(rename = "FINISHTIME")]
    pub finish_time: Option<i64>,

    #[serde(rename = "ERRORMESSAGE")]
    pub error_message: Option<String>,

    #[serde(rename = "COLOR")]
    pub color: String,

    #[serde(rename = "STATUS")]
    pub status: RunStatus,

    #[serde(rename = "INPUTRECORDS")]
    pub input_records: i64,

    #[serde(rename = "OUTPUTRECORDS")]
    pub output_records: i64,

    #[serde(rename = "ERRORRECORDS")]
    pub error_records: i64,

    #[serde(
        rename = "ORACLE_CDC_LAG_TIME_SECONDS",
        skip_serializing_if = "Option::is_none"
    )]
    pub cdc_lag_seconds: Option<i64>,

    #[serde(
        rename = "ORACLE_CDC_SERVER_INSTANCE_LATENCY",
        skip_serializing_if = "Option::is_none"
    )]
    pub cdc_server_latency: Option<String>,
}

/// Non-fatal diagnostics produced during a scan. The orchestrator decides
/// how to surface them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// No metrics entry matched the run; sentinel counters were substituted.
    MetricsMissing { job_name: String, run_count: u64 },

    /// The CDC lag lookup produced no metric; the record went out without
    /// the extra field.
    CdcUnavailable {
        job_name: String,
        run_count: u64,
        reason: LagUnavailable,
    },
}

/// Everything one job's history walk produced.
#[derive(Debug, Default)]
pub struct WindowScan {
    pub records: Vec<OutputRecord>,
    pub notices: Vec<Notice>,
}

/// Walks `history` and assembles an output record for every run inside the
/// lookback window.
///
/// `history` must be ordered most-recent-first: the walk stops at the first
/// run outside the window, so an in-window entry sitting behind an
/// out-of-window one in a misordered history would be dropped. A run is in
/// the window when it started or finished at/after `window_start_millis`, or
/// is still active.
///
/// Jobs labeled `cdc_label` get the CDC latency lookup for their active
/// runs. A failed lookup becomes a notice, never an error; the record is
/// still emitted.
pub async fn collect_in_window_runs<P: LagProbe>(
    job: &Job,
    history: &[JobRun],
    metrics: &[RunMetrics],
    window_start_millis: i64,
    cdc_label: &str,
    probe: &P,
) -> WindowScan {
    let mut scan = WindowScan::default();

    for run in history {
        if !in_window(run, window_start_millis) {
            break;
        }

        let counters = metrics.iter().find(|m| m.run_count == run.run_count);
        if counters.is_none() {
            scan.notices.push(Notice::MetricsMissing {
                job_name: job.name.clone(),
                run_count: run.run_count,
            });
        }

        let mut record = assemble(job, run, counters);

        if job.labels.iter().any(|label| label == cdc_label) && run.status == RunStatus::Active {
            match probe.lag_metric(job, run).await {
                Ok(CdcLatency::LegacySeconds(seconds)) => record.cdc_lag_seconds = Some(seconds),
                Ok(CdcLatency::ServerInstant(latency)) => record.cdc_server_latency = Some(latency),
                Err(reason) => scan.notices.push(Notice::CdcUnavailable {
                    job_name: job.name.clone(),
                    run_count: run.run_count,
                    reason,
                }),
            }
        }

        scan.records.push(record);
    }

    scan
}

fn in_window(run: &JobRun, window_start_millis: i64) -> bool {
    run.start_time >= window_start_millis
        || run
            .finish_time
            .is_some_and(|finished| finished >= window_start_millis)
        || run.status == RunStatus::Active
}

fn assemble(job: &Job, run: &JobRun, counters: Option<&RunMetrics>) -> OutputRecord {
    OutputRecord {
        id: job.id.clone(),
        name: job.name.clone(),
        created_on: job.created_on,
        last_modified_on: job.last_modified_on,
        pipeline_name: job.pipeline_name.clone(),
        pipeline_commit_label: job.pipeline_commit_label.clone(),
        run_count: run.run_count,
        start_time: run.start_time,
        finish_time: run.finish_time,
        error_message: run.error_message.clone(),
        color: run.color.clone(),
        status: run.status,
        input_records: counters.map_or(MISSING_COUNTER, |c| c.input_count),
        output_records: counters.map_or(MISSING_COUNTER, |c| c.output_count),
        error_records: counters.map_or(MISSING_COUNTER, |c| c.error_count),
        cdc_lag_seconds: None,
        cdc_server_latency: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    const WINDOW_START: i64 = 1_700_000_000_000;
    const MINUTE: i64 = 60_000;

    /// Probe that answers every lookup with the same canned outcome.
    struct StaticProbe(Result<CdcLatency, LagUnavailable>);

    #[async_trait]
    impl LagProbe for StaticProbe {
        async fn lag_metric(
            &self,
            _job: &Job,
            _run: &JobRun,
        ) -> Result<CdcLatency, LagUnavailable> {
            self.0.clone()
        }
    }

    fn no_probe() -> StaticProbe {
        StaticProbe(Err(LagUnavailable::NoGauge))
    }

    fn job(name: &str, labels: &[&str]) -> Job {
        Job {
            id: format!("{name}-id"),
            name: name.to_string(),
            created_on: WINDOW_START - 500 * MINUTE,
            last_modified_on: WINDOW_START - 100 * MINUTE,
            pipeline_name: format!("{name} pipeline"),
            pipeline_commit_label: "v1".to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            ..Job::default()
        }
    }

    fn run(run_count: u64, start: i64, finish: Option<i64>, status: RunStatus) -> JobRun {
        JobRun {
            run_count,
            start_time: start,
            finish_time: finish,
            status,
            color: "GRAY".to_string(),
            ..JobRun::default()
        }
    }

    fn counters(run_count: u64, input: i64, output: i64, error: i64) -> RunMetrics {
        RunMetrics {
            run_count,
            input_count: input,
            output_count: output,
            error_count: error,
        }
    }

    #[tokio::test]
    async fn runs_qualify_by_start_finish_or_active_status() {
        let history = vec![
            run(4, WINDOW_START - 200 * MINUTE, None, RunStatus::Active),
            run(
                3,
                WINDOW_START + 30 * MINUTE,
                Some(WINDOW_START + 31 * MINUTE),
                RunStatus::Finished,
            ),
            run(
                2,
                WINDOW_START - 10 * MINUTE,
                Some(WINDOW_START + MINUTE),
                RunStatus::Finished,
            ),
            run(
                1,
                WINDOW_START - 300 * MINUTE,
                Some(WINDOW_START - 299 * MINUTE),
                RunStatus::Finished,
            ),
        ];

        let scan = collect_in_window_runs(
            &job("weblogs", &[]),
            &history,
            &[],
            WINDOW_START,
            "oracle-cdc",
            &no_probe(),
        )
        .await;

        let counts: Vec<u64> = scan.records.iter().map(|r| r.run_count).collect();
        assert_eq!(counts, vec![4, 3, 2]);
    }

    #[tokio::test]
    async fn scan_stops_at_the_first_out_of_window_run() {
        // The newest run finished well before the window opened, so the
        // walk must stop there even though the run behind it would qualify
        // on its start time.
        let history = vec![
            run(
                6,
                WINDOW_START - 95 * MINUTE,
                Some(WINDOW_START - 90 * MINUTE),
                RunStatus::Finished,
            ),
            run(
                5,
                WINDOW_START + 15 * MINUTE,
                Some(WINDOW_START + 20 * MINUTE),
                RunStatus::Finished,
            ),
        ];

        let scan = collect_in_window_runs(
            &job("weblogs", &[]),
            &history,
            &[],
            WINDOW_START,
            "oracle-cdc",
            &no_probe(),
        )
        .await;

        assert_eq!(scan.records, vec![]);
    }

    #[tokio::test]
    async fn matched_counters_are_copied_verbatim() {
        let history = vec![run(
            9,
            WINDOW_START + MINUTE,
            Some(WINDOW_START + 2 * MINUTE),
            RunStatus::Finished,
        )];
        let metrics = vec![counters(8, 1, 1, 1), counters(9, 120, 118, 2)];

        let scan = collect_in_window_runs(
            &job("weblogs", &[]),
            &history,
            &metrics,
            WINDOW_START,
            "oracle-cdc",
            &no_probe(),
        )
        .await;

        let record = &scan.records[0];
        assert_eq!(
            (
                record.input_records,
                record.output_records,
                record.error_records
            ),
            (120, 118, 2)
        );
        assert_eq!(scan.notices, vec![]);
    }

    #[tokio::test]
    async fn missing_counters_fall_back_to_the_sentinel_triple() {
        let history = vec![run(9, WINDOW_START + MINUTE, None, RunStatus::Active)];
        let metrics = vec![counters(8, 1, 1, 1)];

        let scan = collect_in_window_runs(
            &job("weblogs", &[]),
            &history,
            &metrics,
            WINDOW_START,
            "oracle-cdc",
            &no_probe(),
        )
        .await;

        let record = &scan.records[0];
        assert_eq!(
            (
                record.input_records,
                record.output_records,
                record.error_records
            ),
            (-1, -1, -1)
        );
        assert_eq!(
            scan.notices,
            vec![Notice::MetricsMissing {
                job_name: "weblogs".to_string(),
                run_count: 9,
            }]
        );
    }

    #[tokio::test]
    async fn cdc_lag_is_attached_only_for_labeled_jobs_with_active_runs() {
        let probe = StaticProbe(Ok(CdcLatency::LegacySeconds(42)));
        let active = vec![run(3, WINDOW_START + MINUTE, None, RunStatus::Active)];
        let finished = vec![run(
            3,
            WINDOW_START + MINUTE,
            Some(WINDOW_START + 2 * MINUTE),
            RunStatus::Finished,
        )];

        let labeled_active = collect_in_window_runs(
            &job("cdc-job", &["nightly", "oracle-cdc"]),
            &active,
            &[],
            WINDOW_START,
            "oracle-cdc",
            &probe,
        )
        .await;
        assert_eq!(labeled_active.records[0].cdc_lag_seconds, Some(42));
        assert_eq!(labeled_active.records[0].cdc_server_latency, None);

        let unlabeled_active = collect_in_window_runs(
            &job("plain-job", &["nightly"]),
            &active,
            &[],
            WINDOW_START,
            "oracle-cdc",
            &probe,
        )
        .await;
        assert_eq!(unlabeled_active.records[0].cdc_lag_seconds, None);

        let labeled_finished = collect_in_window_runs(
            &job("cdc-job", &["oracle-cdc"]),
            &finished,
            &[],
            WINDOW_START,
            "oracle-cdc",
            &probe,
        )
        .await;
        assert_eq!(labeled_finished.records[0].cdc_lag_seconds, None);
    }

    #[tokio::test]
    async fn failed_lag_lookup_still_emits_the_record() {
        let probe = StaticProbe(Err(LagUnavailable::Status(
            reqwest::StatusCode::NOT_FOUND,
        )));
        let history = vec![run(3, WINDOW_START + MINUTE, None, RunStatus::Active)];
        let metrics = vec![counters(3, 10, 10, 0)];

        let scan = collect_in_window_runs(
            &job("cdc-job", &["oracle-cdc"]),
            &history,
            &metrics,
            WINDOW_START,
            "oracle-cdc",
            &probe,
        )
        .await;

        assert_eq!(scan.records.len(), 1);
        assert_eq!(scan.records[0].cdc_lag_seconds, None);
        assert_eq!(scan.records[0].cdc_server_latency, None);
        assert_eq!(
            scan.notices,
            vec![Notice::CdcUnavailable {
                job_name: "cdc-job".to_string(),
                run_count: 3,
                reason: LagUnavailable::Status(reqwest::StatusCode::NOT_FOUND),
            }]
        );
    }

    #[tokio::test]
    async fn instant_latency_lands_in_its_own_field() {
        let probe = StaticProbe(Ok(CdcLatency::ServerInstant(
            "4 minutes 2 seconds".to_string(),
        )));
        let history = vec![run(3, WINDOW_START + MINUTE, None, RunStatus::Active)];

        let scan = collect_in_window_runs(
            &job("cdc-job", &["oracle-cdc"]),
            &history,
            &[],
            WINDOW_START,
            "oracle-cdc",
            &probe,
        )
        .await;

        assert_eq!(scan.records[0].cdc_lag_seconds, None);
        assert_eq!(
            scan.records[0].cdc_server_latency,
            Some("4 minutes 2 seconds".to_string())
        );
    }

    #[test]
    fn output_record_serializes_with_the_warehouse_column_names() {
        let mut record = assemble(
            &job("weblogs", &[]),
            &run(
                2,
                WINDOW_START,
                Some(WINDOW_START + MINUTE),
                RunStatus::Finished,
            ),
            Some(&counters(2, 5, 5, 0)),
        );

        let line = serde_json::to_string(&record).unwrap();
        for column in [
            "\"ID\":", "\"NAME\":", "\"CREATETIME\":", "\"LASTMODIFIEDON\":",
            "\"PIPELINENAME\":", "\"PIPELINECOMMITLABEL\":", "\"RUNCOUNT\":",
            "\"STARTTIME\":", "\"FINISHTIME\":", "\"ERRORMESSAGE\":", "\"COLOR\":",
            "\"STATUS\":", "\"INPUTRECORDS\":", "\"OUTPUTRECORDS\":", "\"ERRORRECORDS\":",
        ] {
            assert!(line.contains(column), "missing column {column} in {line}");
        }
        assert!(!line.contains("ORACLE_CDC"));

        let plain = serde_json::to_value(&record).unwrap();
        assert_eq!(plain["STATUS"], "FINISHED");

        record.cdc_lag_seconds = Some(42);
        let with_lag = serde_json::to_value(&record).unwrap();
        assert_eq!(with_lag["ORACLE_CDC_LAG_TIME_SECONDS"], 42);
        assert!(with_lag
            .as_object()
            .unwrap()
            .get("ORACLE_CDC_SERVER_INSTANCE_LATENCY")
            .is_none());
    }
}
