//! Replicate command handler

use anyhow::{Context, Result};
use colored::*;
use std::sync::Arc;
use std::time::Instant;

use super::ReplicateCommands;
use crate::api::{AuthProvider, Credentials};
use crate::config::{ReplicationConfig, ReplicationConfigBuilder};
use crate::replication::{
    JsonReportWriter, ReplicationOutcome, Replicator, RequestDescriptor, StopReason,
};

/// Replicate every requested resource and write the availability report
pub async fn handle_replicate_command(args: ReplicateCommands) -> Result<()> {
    let config = build_config(&args)?;
    let credentials = build_credentials(&args)?;
    let requests = build_requests(&args);

    config
        .strategy
        .ensure_supported()
        .context("Cannot replicate with the selected strategy")?;

    let http = config
        .build_http_client()
        .context("Failed to create HTTP client")?;

    let auth = AuthProvider::new(http.clone());
    auth.init(credentials)
        .await
        .context("Failed to authenticate with the RESO server")?;

    println!(
        "Replicating {} from {} using {}",
        args.resources.join(", ").bright_green().bold(),
        args.url.cyan(),
        config.strategy.to_string().bold()
    );

    let replicator = Replicator::new(http, Arc::new(auth), config);
    let report_path = JsonReportWriter::new(replicator.config().output_dir.clone()).report_path();

    let started = Instant::now();
    let outcome = replicator
        .run(&requests)
        .await
        .context("Replication failed")?;

    print_summary(&outcome, started.elapsed().as_secs_f64());
    println!(
        "Report written to: {}",
        report_path.display().to_string().bright_green()
    );

    let failed: Vec<&str> = outcome
        .summary
        .failed_descriptors()
        .map(|d| d.resource_name.as_str())
        .collect();
    if !failed.is_empty() {
        anyhow::bail!(
            "Replication gave up after repeated errors for: {}",
            failed.join(", ")
        );
    }

    Ok(())
}

/// Config file values overridden by command-line flags
fn build_config(args: &ReplicateCommands) -> Result<ReplicationConfig> {
    let base = ReplicationConfig::load(args.config.as_deref())?;
    let mut builder = ReplicationConfigBuilder::from_config(base);

    if let Some(strategy) = args.strategy {
        builder = builder.strategy(strategy);
    }
    if let Some(top) = args.top {
        builder = builder.page_size(top);
    }
    if let Some(limit) = args.limit {
        builder = builder.limit(limit);
    }
    if let Some(ref dir) = args.output_dir {
        builder = builder.output_dir(dir.clone());
    }
    if args.persist_pages {
        builder = builder.persist_pages(true);
    }

    Ok(builder.lookup_fields(&args.lookup_fields).build())
}

/// A bearer token wins over client credentials
fn build_credentials(args: &ReplicateCommands) -> Result<Credentials> {
    if let Some(ref token) = args.bearer_token {
        return Ok(Credentials::bearer(token.clone()));
    }

    match (&args.client_id, &args.client_secret, &args.token_uri) {
        (Some(id), Some(secret), Some(token_uri)) => Ok(Credentials::client_credentials(
            id.clone(),
            secret.clone(),
            token_uri.clone(),
            args.scope.clone(),
        )),
        (None, None, None) => anyhow::bail!(
            "No credentials provided. Use --bearer-token or --client-id, --client-secret and --token-uri"
        ),
        _ => anyhow::bail!(
            "Client credentials require --client-id, --client-secret and --token-uri together"
        ),
    }
}

fn build_requests(args: &ReplicateCommands) -> Vec<RequestDescriptor> {
    let expansions: Vec<&str> = args.expansions.iter().map(String::as_str).collect();

    args.resources
        .iter()
        .map(|resource| {
            let mut request =
                RequestDescriptor::new(args.url.trim_end_matches('/'), resource.as_str())
                    .expand(&expansions);
            if let Some(ref filter) = args.filter {
                request = request.filter(filter.clone());
            }
            if let Some(ref orderby) = args.orderby {
                request = request.orderby(orderby.clone());
            }
            request
        })
        .collect()
}

fn print_summary(outcome: &ReplicationOutcome, elapsed_secs: f64) {
    println!();
    for descriptor in &outcome.summary.descriptors {
        let status = match descriptor.stop_reason {
            StopReason::Completed => "done".bright_green(),
            StopReason::LimitReached => "limit reached".yellow(),
            StopReason::ErrorBudgetExhausted => "failed".bright_red(),
        };
        println!(
            "  {:<24} {:>10} records {:>6} pages {:>4} errors  {}",
            descriptor.resource_name.bold(),
            descriptor.records_fetched,
            descriptor.pages_fetched,
            descriptor.errors,
            status
        );
    }
    println!();

    let summary = &outcome.summary;
    println!(
        "Requests: {}  Average response time: {:.2}ms  Records: {}  Expanded records: {}",
        summary.total_requests(),
        summary.average_response_time_ms(),
        summary.total_records(),
        summary.expanded_records
    );
    println!("Total time: {:.2}s", elapsed_secs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::ReplicationStrategy;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: ReplicateCommands,
    }

    fn parse(argv: &[&str]) -> ReplicateCommands {
        let mut full = vec!["reso-cli"];
        full.extend_from_slice(argv);
        TestCli::try_parse_from(full).unwrap().args
    }

    #[test]
    fn test_bearer_token_wins() {
        let args = parse(&[
            "--url",
            "https://api.example.com",
            "-r",
            "Property",
            "--bearer-token",
            "abc",
            "--client-id",
            "id",
        ]);
        assert_eq!(build_credentials(&args).unwrap(), Credentials::bearer("abc"));
    }

    #[test]
    fn test_partial_client_credentials_rejected() {
        let args = parse(&[
            "--url",
            "https://api.example.com",
            "-r",
            "Property",
            "--client-id",
            "id",
            "--client-secret",
            "secret",
        ]);
        let err = build_credentials(&args).unwrap_err();
        assert!(err.to_string().contains("--token-uri"));
    }

    #[test]
    fn test_requests_share_query_options() {
        let args = parse(&[
            "--url",
            "https://api.example.com/",
            "-r",
            "Property",
            "-r",
            "Member",
            "-e",
            "Media",
            "--filter",
            "StandardStatus eq 'Active'",
        ]);
        let requests = build_requests(&args);

        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].resource_name, "Member");
        assert_eq!(requests[0].base_uri, "https://api.example.com");
        assert_eq!(requests[0].expansions, vec!["Media".to_string()]);
        assert_eq!(requests[1].filter.as_deref(), Some("StandardStatus eq 'Active'"));
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "strategy = \"TopAndSkip\"\nlimit = 10\n").unwrap();

        let args = parse(&[
            "--url",
            "https://api.example.com",
            "-r",
            "Property",
            "--config",
            path.to_str().unwrap(),
            "--strategy",
            "NextLink",
            "--top",
            "250",
            "--lookup-field",
            "StandardStatus",
            "--persist-pages",
        ]);
        let config = build_config(&args).unwrap();

        assert_eq!(config.strategy, ReplicationStrategy::NextLink);
        assert_eq!(config.page_size, Some(250));
        assert_eq!(config.limit, Some(10));
        assert!(config.persist_pages);
        assert!(config.scoring.lookup_fields.contains("StandardStatus"));
    }

    #[test]
    fn test_unknown_strategy_flag_rejected() {
        let result = TestCli::try_parse_from([
            "reso-cli",
            "--url",
            "https://api.example.com",
            "-r",
            "Property",
            "--strategy",
            "Cursor",
        ]);
        assert!(result.is_err());
    }
}
