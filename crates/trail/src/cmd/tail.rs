//! Tail command - Follow lines from a running Trail server
//!
//! Opens a `follow=true` request against `GET /` and copies the streamed
//! body to stdout until the server ends the stream or Ctrl+C.

use std::collections::BTreeMap;
use std::io::Write;

use anyhow::{Context, Result, bail};
use clap::Args;
use tokio::signal;
use tracing::{debug, info};

/// Tail command arguments
#[derive(Args, Debug)]
pub struct TailArgs {
    /// Server base URL
    #[arg(short, long, default_value = "http://127.0.0.1:8080")]
    server: String,

    /// Exact match filter as FIELD=VALUE (can be repeated)
    #[arg(short = 'm', long = "match", value_name = "FIELD=VALUE")]
    matches: Vec<String>,

    /// Prefix filter as FIELD=PREFIX (can be repeated)
    #[arg(short = 'p', long = "prefix", value_name = "FIELD=PREFIX")]
    prefixes: Vec<String>,

    /// Sort direction: asc or desc
    #[arg(short, long, default_value = "asc")]
    direction: String,

    /// Lines per source query
    #[arg(long)]
    fetch_size: Option<usize>,

    /// Output format: text or json
    #[arg(short = 'o', long = "output", default_value = "text")]
    format: String,

    /// Print what is available and exit instead of following
    #[arg(long)]
    no_follow: bool,
}

/// Run the tail command
pub async fn run(args: TailArgs) -> Result<()> {
    let params = build_params(&args)?;
    let url = format!("{}/", args.server.trim_end_matches('/'));

    info!(url = %url, follow = !args.no_follow, "connecting to server");

    let client = reqwest::Client::new();
    let mut response = client
        .get(&url)
        .query(&params)
        .send()
        .await
        .with_context(|| format!("failed to connect to {}", url))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("server returned {}: {}", status, body);
    }

    let mut stdout = std::io::stdout().lock();
    loop {
        tokio::select! {
            chunk = response.chunk() => {
                match chunk.context("stream interrupted")? {
                    Some(bytes) => {
                        stdout.write_all(&bytes)?;
                        stdout.flush()?;
                    }
                    None => {
                        debug!("server closed the stream");
                        break;
                    }
                }
            }
            _ = signal::ctrl_c() => {
                debug!("interrupted");
                break;
            }
        }
    }

    Ok(())
}

/// Query string for `GET /`
fn build_params(args: &TailArgs) -> Result<Vec<(&'static str, String)>> {
    let mut params = vec![
        ("direction", args.direction.clone()),
        ("format", args.format.clone()),
        ("follow", (!args.no_follow).to_string()),
    ];

    let matches = parse_filters(&args.matches)?;
    if !matches.is_empty() {
        params.push(("matchFilters", serde_json::to_string(&matches)?));
    }

    let prefixes = parse_filters(&args.prefixes)?;
    if !prefixes.is_empty() {
        params.push(("prefixFilters", serde_json::to_string(&prefixes)?));
    }

    if let Some(fetch_size) = args.fetch_size {
        params.push(("fetchSize", fetch_size.to_string()));
    }

    Ok(params)
}

/// Group `FIELD=VALUE` pairs by field
fn parse_filters(raw: &[String]) -> Result<BTreeMap<String, Vec<String>>> {
    let mut filters: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for pair in raw {
        let Some((field, value)) = pair.split_once('=') else {
            bail!("invalid filter '{}', expected FIELD=VALUE", pair);
        };
        if field.is_empty() {
            bail!("invalid filter '{}', field is empty", pair);
        }
        filters
            .entry(field.to_string())
            .or_default()
            .push(value.to_string());
    }
    Ok(filters)
}
