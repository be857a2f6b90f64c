//! Vendor parser command

use anyhow::Result;
use colored::Colorize;
use monitor_lib::forwarder::{Forwarder, ForwarderConfig};
use monitor_lib::parser::{CsvSink, NdjsonSink, ParseSession, ParseSummary, Vendor};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::output::OutputFormat;
use crate::ParseArgs;

/// NDJSON target: explicit `--output`, else stdout unless the snapshots
/// already go to a CSV file or a forwarder
fn ndjson_target(args: &ParseArgs) -> Option<String> {
    match &args.output {
        Some(target) => Some(target.clone()),
        None if args.post_url.is_none() && args.csv.is_none() => Some("-".to_string()),
        None => None,
    }
}

fn forwarder_config(args: &ParseArgs, url: &str) -> ForwarderConfig {
    let mut config = ForwarderConfig::new(url);
    config.send_interval = args.send_interval;
    config.timeout = args.timeout;
    config.max_retries = args.retries;
    config.order = args.send_order;
    config
}

/// Run one vendor parser over `args.input`
pub async fn run(vendor: Vendor, args: ParseArgs, format: OutputFormat) -> Result<()> {
    let ndjson = ndjson_target(&args);
    let summary_to_stderr = ndjson.as_deref() == Some("-");

    let mut session = ParseSession::new(vendor.parser(args.source.clone()));
    if let Some(target) = &ndjson {
        session = session.with_ndjson(NdjsonSink::open(target)?);
    }
    if let Some(path) = &args.csv {
        session = session.with_csv(CsvSink::open(path)?);
    }
    if let Some(url) = &args.post_url {
        let config = forwarder_config(&args, url);
        info!(
            url = %config.url,
            order = %config.order,
            interval_ms = config.send_interval.as_millis() as u64,
            "Forwarding snapshots"
        );
        session = session.with_forwarder(Forwarder::new(config)?);
    }

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        let _ = shutdown_tx.send(());
    });

    let summary = session.run_file(&args.input, args.follow, shutdown_rx).await?;
    print_summary(&summary, format, summary_to_stderr)
}

fn print_summary(summary: &ParseSummary, format: OutputFormat, to_stderr: bool) -> Result<()> {
    let text = match format {
        OutputFormat::Json => serde_json::to_string_pretty(summary)?,
        OutputFormat::Table => {
            let c = &summary.counters;
            let mut text = format!(
                "{} {} lines, {} snapshots, {} ignored",
                "Parsed".bold(),
                c.lines,
                c.snapshots.to_string().green(),
                c.ignored
            );
            if let Some(forward) = &summary.forward {
                let errors = if forward.errors > 0 {
                    forward.errors.to_string().red()
                } else {
                    forward.errors.to_string().normal()
                };
                text.push_str(&format!(
                    "\n{} {} requests, {} snapshots, {} errors",
                    "Forwarded".bold(),
                    forward.posted_requests,
                    forward.posted_snapshots,
                    errors
                ));
            }
            text
        }
    };

    if to_stderr {
        eprintln!("{}", text);
    } else {
        println!("{}", text);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use monitor_lib::forwarder::SendOrder;
    use std::path::PathBuf;
    use std::time::Duration;

    fn args() -> ParseArgs {
        ParseArgs {
            input: PathBuf::from("gnb.log"),
            follow: false,
            post_url: None,
            output: None,
            csv: None,
            send_interval: Duration::from_secs(1),
            send_order: SendOrder::Latest,
            source: None,
            timeout: Duration::from_secs(5),
            retries: 3,
        }
    }

    #[test]
    fn test_ndjson_defaults_to_stdout() {
        assert_eq!(ndjson_target(&args()).as_deref(), Some("-"));
    }

    #[test]
    fn test_ndjson_off_when_forwarding() {
        let mut a = args();
        a.post_url = Some("http://localhost:8080/api/ingest".to_string());
        assert!(ndjson_target(&a).is_none());

        a.output = Some("out.ndjson".to_string());
        assert_eq!(ndjson_target(&a).as_deref(), Some("out.ndjson"));
    }

    #[test]
    fn test_forwarder_config_from_args() {
        let mut a = args();
        a.send_order = SendOrder::Batch;
        a.retries = 0;
        a.send_interval = Duration::from_millis(250);

        let config = forwarder_config(&a, "http://localhost:8080/api/ingest");

        assert_eq!(config.order, SendOrder::Batch);
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.send_interval, Duration::from_millis(250));
        assert_eq!(config.backoff_base, Duration::from_millis(500));
    }
}
