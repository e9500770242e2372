use crate::cdc::CdcMetrics;
use crate::collect::{self, Notice, OutputRecord};
use crate::conf::Config;
use crate::controlhub;
use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[clap(name = "skimmer")]
#[clap(about = "Skims recent job run history and metrics off a data-integration control plane.")]
#[clap(
    long_about = "Skims recent job run history and metrics off a data-integration control plane
and writes them to a file as JSON lines, one job run per line, ready for a warehouse loader
to pick up. Jobs labeled for Oracle CDC additionally get the origin's current read lag,
fetched straight from the engine running them."
)]
#[clap(version)]
struct Flags {
    /// File to write the collected run records to; overwritten if it already
    /// exists.
    output: PathBuf,

    /// How many minutes before now the collection window opens.
    lookback_minutes: i64,
}

pub struct Cli {
    flags: Flags,
    conf: Config,
}

impl Cli {
    /// Parses arguments and loads configuration. Usage problems (wrong
    /// argument count, non-integer lookback) and missing credentials are
    /// reported here, before any network or file work happens.
    pub fn new() -> Result<Self> {
        let flags = match Flags::try_parse() {
            Ok(flags) => flags,
            Err(err) => {
                // clap already renders good usage text; keep it, but leave
                // with exit code 1 like every other startup failure.
                let _ = err.print();
                std::process::exit(1);
            }
        };

        let conf =
            Config::from_env().context("Could not load configuration from the environment")?;

        Ok(Self { flags, conf })
    }

    pub async fn run(&self) -> Result<()> {
        let now = Local::now();
        let window_start = now - chrono::Duration::minutes(self.flags.lookback_minutes);
        let window_start_millis = window_start.timestamp_millis();

        println!("-------------------------------------");
        println!("Current time is {}", now.format("%Y-%m-%d %H:%M:%S"));
        println!("Lookback minutes is {}", self.flags.lookback_minutes);
        println!(
            "Will collect metrics for job runs started after {}",
            window_start.format("%Y-%m-%d %H:%M:%S")
        );
        println!(
            "Metrics will be written to {}",
            self.flags.output.display()
        );
        println!("-------------------------------------");

        let client =
            controlhub::Client::new(&self.conf).context("Could not build the control plane client")?;
        client
            .connect()
            .await
            .context("Could not connect to the control plane")?;
        println!("Connected to {}", self.conf.sch_url);
        println!("-------------------------------------");

        let engines = client
            .engines()
            .await
            .context("Could not list registered engines")?;
        let probe = CdcMetrics::new(&self.conf, engines)
            .context("Could not build the engine metrics client")?;

        let jobs = client
            .jobs()
            .await
            .context("Could not retrieve jobs from the control plane")?;

        let mut records: Vec<OutputRecord> = Vec::new();

        for job in jobs.iter().filter(|job| !job.job_template) {
            let history = match client.job_history(&job.id).await {
                Ok(history) => history,
                Err(err) => {
                    warn!("skipping job '{}'; could not retrieve run history; {err}", job.name);
                    continue;
                }
            };

            let metrics = match client.job_metrics(&job.id).await {
                Ok(metrics) => metrics,
                Err(err) => {
                    warn!("skipping job '{}'; could not retrieve run metrics; {err}", job.name);
                    continue;
                }
            };

            let scan = collect::collect_in_window_runs(
                job,
                &history,
                &metrics,
                window_start_millis,
                &self.conf.cdc_job_label,
                &probe,
            )
            .await;

            for notice in &scan.notices {
                match notice {
                    Notice::MetricsMissing { job_name, run_count } => {
                        warn!("no metrics entry for run #{run_count} of job '{job_name}'; substituting sentinel counters");
                    }
                    Notice::CdcUnavailable {
                        job_name,
                        run_count,
                        reason,
                    } => {
                        warn!("no CDC lag metric for run #{run_count} of job '{job_name}'; {reason}");
                    }
                }
            }

            if !scan.records.is_empty() {
                info!("collected {} in-window runs for job '{}'", scan.records.len(), job.name);
            }

            records.extend(scan.records);
        }

        println!(
            "Found {} job runs within the lookback window",
            records.len()
        );

        std::fs::write(&self.flags.output, render_ndjson(&records)?)
            .context("Could not write the metrics file")?;

        println!("Done");
        Ok(())
    }
}

/// One JSON object per line, newline-terminated, no envelope. Zero records
/// render to an empty string so the output file still gets truncated.
fn render_ndjson(records: &[OutputRecord]) -> Result<String> {
    let mut lines = String::new();
    for record in records {
        lines.push_str(&serde_json::to_string(record)?);
        lines.push('\n');
    }
    Ok(lines)
}
