#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line entry point for neighbourhood lookups.
//!
//! `lookup` runs the same pipeline as the API server and prints the
//! response as JSON. `check-urls` probes every configured endpoint.
//!
//! Uses `indicatif-log-bridge` (via [`buurt_insight_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and spinners never fight for the terminal.

use std::sync::Arc;
use std::time::Duration;

use buurt_insight_cache::TtlCache;
use buurt_insight_cli_utils::MultiProgress;
use buurt_insight_pipeline::Pipeline;
use buurt_insight_server_models::{NeighbourhoodRequest, StreamEvent};
use buurt_insight_source::config::Endpoints;
use buurt_insight_source::{HttpFetcher, build_http_client};
use clap::{Parser, Subcommand};

/// Neighbourhood statistics for Dutch postal codes.
#[derive(Parser)]
#[command(name = "buurt-insight")]
#[command(about = "Neighbourhood statistics for Dutch postal codes")]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Look up the neighbourhood of a postal code.
    Lookup {
        /// Postal code, e.g. "1011 AB".
        zip_code: String,

        /// Street address of the listing.
        #[arg(long)]
        address: Option<String>,

        /// Include the diagnostic trail.
        #[arg(long)]
        debug: bool,

        /// Properties shown on the card (comma separated).
        #[arg(long, value_delimiter = ',')]
        select: Option<Vec<String>>,

        /// Wait for and print the late update.
        #[arg(long)]
        wait_late: bool,
    },

    /// Check that every configured endpoint answers.
    CheckUrls,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = buurt_insight_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Lookup {
            zip_code,
            address,
            debug,
            select,
            wait_late,
        } => {
            let request = NeighbourhoodRequest {
                zip_code,
                address_query: address,
                debug,
                selected_properties: select,
            };
            lookup(&multi, &request, wait_late).await?;
        }
        Commands::CheckUrls => check_urls(&multi).await?,
    }

    Ok(())
}

async fn lookup(
    multi: &MultiProgress,
    request: &NeighbourhoodRequest,
    wait_late: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let endpoints = Endpoints::load()?;
    let cache = TtlCache::open_default()?;
    let pipeline = Pipeline::from_endpoints(Arc::new(HttpFetcher::new()?), cache, &endpoints);

    let spinner = buurt_insight_cli_utils::spinner(multi, &format!("Looking up {}", request.zip_code));
    let lookup = pipeline.lookup(request).await;
    spinner.finish_and_clear();

    let failed = lookup.response.error.is_some();
    println!(
        "{}",
        serde_json::to_string_pretty(&StreamEvent::Response(lookup.response))?
    );

    match lookup.late_update {
        Some(late_update) if wait_late => {
            let spinner = buurt_insight_cli_utils::spinner(multi, "Waiting for late update");
            let update = late_update.await;
            spinner.finish_and_clear();
            match update {
                Ok(update) => println!(
                    "{}",
                    serde_json::to_string_pretty(&StreamEvent::LateUpdate(update))?
                ),
                Err(e) => log::warn!("Late update lost: {e}"),
            }
        }
        Some(_) => log::info!("A late update is pending; pass --wait-late to wait for it"),
        None => {}
    }

    if failed {
        return Err("lookup failed".into());
    }
    Ok(())
}

/// Requests every configured base URL. Any HTTP answer counts as
/// reachable; only transport failures are reported as unreachable.
async fn check_urls(multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    let endpoints = Endpoints::load()?;
    let client = build_http_client()?;
    let urls = endpoints.all_urls();

    let bar = buurt_insight_cli_utils::steps_bar(multi, "Checking endpoints", urls.len() as u64);
    let mut unreachable = 0_usize;
    let mut report = Vec::with_capacity(urls.len());
    for (label, url) in &urls {
        let result = client
            .get(url)
            .timeout(Duration::from_secs(10))
            .send()
            .await;
        match result {
            Ok(response) => report.push(format!("OK   {label:<14} {url} ({})", response.status())),
            Err(e) => {
                unreachable += 1;
                report.push(format!("FAIL {label:<14} {url} ({e})"));
            }
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    for line in &report {
        println!("{line}");
    }

    if unreachable > 0 {
        return Err(format!("{unreachable} of {} endpoints unreachable", urls.len()).into());
    }
    Ok(())
}
