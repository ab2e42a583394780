mod display;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use iamsecure_core::{
    create_instance, supported_checks, unsupported_checks, AuditConfig, Checker, DirectorySource,
};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_ENV: &str = "IAMSECURE_LOG";

#[derive(Parser)]
#[command(
    name = "iamsecure",
    version,
    about = "IAMSecure — identity provider security auditor",
    long_about = "Audit your identity provider's users for missing MFA and stale access keys.\n\nChecks run concurrently in bounded batches so the provider's rate limits are respected."
)]
struct Cli {
    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the security checks that can be requested
    SupportedChecks {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Run security checks and print a unified report
    Report {
        /// Checks to run, comma separated (e.g. MFA,StaleAccessKeys)
        #[arg(short, long, value_delimiter = ',', required = true)]
        checks: Vec<String>,

        /// Audit a directory snapshot JSON file instead of a live directory
        #[arg(long, conflicts_with = "endpoint")]
        snapshot: Option<PathBuf>,

        /// Base URL of the directory gateway
        #[arg(long)]
        endpoint: Option<String>,

        /// Configuration file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Days without use after which an access key is stale
        #[arg(long)]
        unused_days: Option<i64>,

        /// Number of checks run concurrently
        #[arg(long)]
        concurrency: Option<usize>,

        /// Number of users inspected concurrently within a check
        #[arg(long)]
        batch_size: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    match cli.command {
        Commands::SupportedChecks { format } => cmd_supported_checks(&format),
        Commands::Report {
            checks,
            snapshot,
            endpoint,
            config,
            unused_days,
            concurrency,
            batch_size,
            format,
        } => {
            let overrides = Overrides {
                snapshot,
                endpoint,
                unused_days,
                concurrency,
                batch_size,
            };
            cmd_report(&checks, config.as_deref(), overrides, &format).await
        }
    }
}

fn init_logging(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn cmd_supported_checks(format: &str) -> Result<ExitCode> {
    match format {
        "json" => {
            let payload = json!({ "supportedChecks": supported_checks() });
            let json = serde_json::to_string_pretty(&payload)?;
            println!("{}", json);
        }
        _ => display::print_supported_checks(),
    }
    Ok(ExitCode::SUCCESS)
}

/// Command-line values that take precedence over file and environment settings.
struct Overrides {
    snapshot: Option<PathBuf>,
    endpoint: Option<String>,
    unused_days: Option<i64>,
    concurrency: Option<usize>,
    batch_size: Option<usize>,
}

fn resolve_config(
    config_path: Option<&std::path::Path>,
    overrides: Overrides,
) -> Result<AuditConfig> {
    let base = match config_path {
        Some(path) => AuditConfig::load(path)?,
        None => AuditConfig::default(),
    };
    let mut config = base.with_env()?;

    if let Some(days) = overrides.unused_days {
        config.unused_days_limit = days;
    }
    if let Some(concurrency) = overrides.concurrency {
        config.check_concurrency = concurrency;
    }
    if let Some(batch_size) = overrides.batch_size {
        config.user_batch_size = batch_size;
    }
    if let Some(path) = overrides.snapshot {
        config.directory = Some(DirectorySource::Snapshot { path });
    } else if let Some(base_url) = overrides.endpoint {
        let token = match config.directory.take() {
            Some(DirectorySource::Http { token, .. }) => token,
            _ => None,
        };
        config.directory = Some(DirectorySource::Http { base_url, token });
    }

    config.validate()?;
    Ok(config)
}

async fn cmd_report(
    checks: &[String],
    config_path: Option<&std::path::Path>,
    overrides: Overrides,
    format: &str,
) -> Result<ExitCode> {
    let unsupported = unsupported_checks(checks);
    if !unsupported.is_empty() {
        eprintln!("Unsupported checks: {}", unsupported.join(", "));
        eprintln!("Supported checks: {}", supported_checks().join(", "));
        return Ok(ExitCode::from(2));
    }

    let config = resolve_config(config_path, overrides)?;
    let source = config
        .directory_source()
        .context("Use --snapshot, --endpoint or IAMSECURE_DIRECTORY_URL to select one.")?
        .clone();
    let directory = source.connect()?;
    let multi = create_instance(checks, directory, &config)?;

    let report = match multi.run_check().await {
        Ok(report) => report,
        Err(error) => {
            tracing::error!(error = %error, "security checks could not run");
            eprintln!("Could not run checks. Please try again later.");
            return Ok(ExitCode::FAILURE);
        }
    };

    match format {
        "json" => {
            let json = serde_json::to_string_pretty(&json!({ "report": report }))?;
            println!("{}", json);
        }
        _ => display::print_security_report(&report, &describe_source(&source)),
    }

    if report.status().requires_action() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn describe_source(source: &DirectorySource) -> String {
    match source {
        DirectorySource::Snapshot { path } => path.display().to_string(),
        DirectorySource::Http { base_url, .. } => base_url.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn no_overrides() -> Overrides {
        Overrides {
            snapshot: None,
            endpoint: None,
            unused_days: None,
            concurrency: None,
            batch_size: None,
        }
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_checks_are_comma_separated() {
        let cli = Cli::parse_from([
            "iamsecure",
            "report",
            "--checks",
            "MFA,StaleAccessKeys",
            "--snapshot",
            "users.json",
        ]);
        match cli.command {
            Commands::Report { checks, snapshot, .. } => {
                assert_eq!(checks, vec!["MFA", "StaleAccessKeys"]);
                assert_eq!(snapshot, Some(PathBuf::from("users.json")));
            }
            _ => panic!("expected report command"),
        }
    }

    #[test]
    fn test_flags_override_defaults() {
        let overrides = Overrides {
            snapshot: Some(PathBuf::from("users.json")),
            unused_days: Some(30),
            concurrency: Some(1),
            ..no_overrides()
        };
        let config = resolve_config(None, overrides).unwrap();
        assert_eq!(config.unused_days_limit, 30);
        assert_eq!(config.check_concurrency, 1);
        assert_eq!(
            config.directory,
            Some(DirectorySource::Snapshot {
                path: PathBuf::from("users.json")
            })
        );
    }

    #[test]
    fn test_zero_concurrency_flag_rejected() {
        let overrides = Overrides {
            concurrency: Some(0),
            ..no_overrides()
        };
        assert!(resolve_config(None, overrides).is_err());
    }
}
