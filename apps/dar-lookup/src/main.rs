mod config;
mod logging;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use config::{CliOverrides, LookupConfig};
use dar_client::{AddressCategory, CategorySelection, DarClient, LookupOptions};
use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use uuid::Uuid;

/// Look up addresses in the Danish Address Register
#[derive(Parser)]
#[command(name = "dar-lookup")]
#[command(version)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// DAR base URL (overrides config)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check DAR reachability; exits 1 when unreachable
    Health {
        /// Request timeout, e.g. "5s" (defaults to `health_timeout`)
        #[arg(long, value_parser = humantime::parse_duration)]
        timeout: Option<Duration>,
    },
    /// Look up one address, trying categories in order
    Get {
        id: Uuid,
        #[command(flatten)]
        categories: CategoryArgs,
    },
    /// Look up many addresses with batched requests
    Resolve {
        #[arg(required = true)]
        ids: Vec<Uuid>,
        #[command(flatten)]
        categories: CategoryArgs,
        /// Identifiers per request (overrides config)
        #[arg(long)]
        chunk_size: Option<usize>,
    },
    /// Print the effective configuration as YAML
    PrintConfig,
}

#[derive(Args)]
struct CategoryArgs {
    /// Category to search, repeatable: adresser, adgangsadresser,
    /// historik/adresser, historik/adgangsadresser
    #[arg(long = "category")]
    category: Vec<AddressCategory>,
}

impl CategoryArgs {
    fn selection(&self) -> CategorySelection {
        if self.category.is_empty() {
            CategorySelection::Default
        } else {
            CategorySelection::Only(self.category.clone())
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let chunk_size = match &cli.command {
        Commands::Resolve { chunk_size, .. } => *chunk_size,
        _ => None,
    };
    let overrides = CliOverrides {
        base_url: cli.base_url.clone(),
        chunk_size,
        json_logs: cli.json_logs.then_some(true),
    };
    let config = LookupConfig::load(cli.config.as_deref(), &overrides)?;

    logging::init(cli.verbose, config.logging.json);

    if matches!(cli.command, Commands::PrintConfig) {
        println!("{}", config.to_yaml()?);
        return Ok(ExitCode::SUCCESS);
    }

    let health_timeout = config.client.health_timeout;
    let client = DarClient::new(config.client).context("invalid DAR client configuration")?;
    client.open().context("failed to open DAR session")?;
    let outcome = run(&client, cli.command, health_timeout).await;
    client.close();
    outcome
}

async fn run(client: &DarClient, command: Commands, health_timeout: Duration) -> Result<ExitCode> {
    match command {
        Commands::Health { timeout } => {
            let reachable = client
                .health_check(timeout.unwrap_or(health_timeout))
                .await?;
            if reachable {
                println!("reachable");
                Ok(ExitCode::SUCCESS)
            } else {
                println!("unreachable");
                Ok(ExitCode::FAILURE)
            }
        }
        Commands::Get { id, categories } => {
            let record = client
                .resolve_one(id, &categories.selection())
                .await
                .with_context(|| format!("lookup of {id} failed"))?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Resolve {
            ids, categories, ..
        } => {
            let ids: HashSet<Uuid> = ids.into_iter().collect();
            let options = LookupOptions::default().categories(categories.selection());
            let resolution = client
                .resolve_many(&ids, &options)
                .await
                .context("batch lookup failed")?;
            tracing::info!(
                found = resolution.found.len(),
                missing = resolution.missing.len(),
                "lookup finished"
            );
            println!("{}", serde_json::to_string_pretty(&resolution)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::PrintConfig => Ok(ExitCode::SUCCESS),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_resolve_with_categories() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let cli = Cli::parse_from([
            "dar-lookup",
            "resolve",
            &a.to_string(),
            &b.to_string(),
            "--category",
            "historik/adresser",
            "--chunk-size",
            "20",
        ]);
        let Commands::Resolve {
            ids,
            categories,
            chunk_size,
        } = cli.command
        else {
            panic!("expected resolve");
        };
        assert_eq!(ids, vec![a, b]);
        assert_eq!(chunk_size, Some(20));
        assert_eq!(
            categories.selection().categories(),
            &[AddressCategory::HistoricAddress]
        );
    }

    #[test]
    fn no_category_means_default_order() {
        let cli = Cli::parse_from(["dar-lookup", "get", &Uuid::from_u128(1).to_string()]);
        let Commands::Get { categories, .. } = cli.command else {
            panic!("expected get");
        };
        assert_eq!(
            categories.selection().categories(),
            AddressCategory::ALL.as_slice()
        );
    }

    #[test]
    fn health_timeout_uses_humantime() {
        let cli = Cli::parse_from(["dar-lookup", "-vv", "health", "--timeout", "250ms"]);
        assert_eq!(cli.verbose, 2);
        let Commands::Health { timeout } = cli.command else {
            panic!("expected health");
        };
        assert_eq!(timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn unknown_category_is_rejected() {
        let result = Cli::try_parse_from([
            "dar-lookup",
            "get",
            &Uuid::from_u128(1).to_string(),
            "--category",
            "vejnavne",
        ]);
        assert!(result.is_err());
    }
}
