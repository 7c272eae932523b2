//! # Overlord CLI Entry Point
//!
//! A runner for your scripts so you don't have to deploy them. 🚀
//!
//! ## Usage
//!
//! ```bash
//! # Serve every script under ./scripts at its request path
//! overlord -r ./scripts
//!
//! # Map request paths to script locations explicitly
//! overlord -u routes.json
//!
//! # Tighter budget: 2 second timeout, at most 8 concurrent minions
//! overlord -r ./scripts -t 2000 -s 8
//! ```
//!
//! Exactly one of `--root-path` or `--url-map` must be given.

use anyhow::Result;
use argh::FromArgs;
use overlord_server::{Overlord, OverlordOptions, ScriptRoute};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// a runner for your scripts so you don't have to deploy them
#[derive(FromArgs)]
struct Cli {
    /// the port to run the server on
    #[argh(option, short = 'p', default = "8080")]
    port: u16,

    /// maximum time allowed for a single minion to handle a request, in
    /// milliseconds
    #[argh(option, short = 't', default = "10000")]
    timeout: u64,

    /// minimum log level for the overlord logger (overridable via RUST_LOG)
    #[argh(option, short = 'l', default = "\"info\".into()")]
    log_level: String,

    /// the maximum number of minions to be spawned in parallel; unbounded
    /// when omitted
    #[argh(option, short = 's')]
    pool_size: Option<usize>,

    /// the path of the root directory in which overlord can find the
    /// runnable scripts
    #[argh(option, short = 'r')]
    root_path: Option<String>,

    /// path to a JSON file mapping request paths to script locations
    #[argh(option, short = 'u')]
    url_map: Option<PathBuf>,

    /// file extension appended to request paths under --root-path; use an
    /// empty string to append nothing
    #[argh(option, short = 'e', default = "\".js\".into()")]
    extension: String,
}

fn build_options(cli: &Cli) -> Result<OverlordOptions> {
    if cli.pool_size == Some(0) {
        return Err(anyhow::anyhow!("--pool-size has to be at least 1."));
    }
    let route = build_route(cli)?;
    Ok(OverlordOptions::new(route)
        .with_port(cli.port)
        .with_timeout(Duration::from_millis(cli.timeout))
        .with_pool_size(cli.pool_size))
}

fn build_route(cli: &Cli) -> Result<ScriptRoute> {
    match (&cli.root_path, &cli.url_map) {
        (Some(root), None) => Ok(ScriptRoute::RootPath {
            root: root.clone(),
            extension: cli.extension.clone(),
        }),
        (None, Some(map_path)) => {
            let source = std::fs::read_to_string(map_path)?;
            let map: HashMap<String, String> = serde_json::from_str(&source)?;
            Ok(ScriptRoute::UrlMap(map))
        }
        _ => Err(anyhow::anyhow!(
            "Exactly one of --root-path or --url-map has to be specified."
        )),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Default to the configured level, but allow RUST_LOG to override.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let options = build_options(&cli)?;
    let overlord = Arc::new(Overlord::new(options));

    let stopper = overlord.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received ctrl-c, stopping");
            stopper.stop();
        }
    });

    overlord.start().await?;
    Ok(())
}

/// CLI argument parsing tests.
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_root_path() {
        let cli = Cli::from_args(&["overlord"], &["-r", "./scripts"]).unwrap();
        assert_eq!(cli.port, 8080);
        assert_eq!(cli.timeout, 10000);
        assert_eq!(cli.log_level, "info");
        assert!(cli.pool_size.is_none());
        assert_eq!(cli.root_path.as_deref(), Some("./scripts"));
        assert!(cli.url_map.is_none());
        assert_eq!(cli.extension, ".js");
    }

    #[test]
    fn test_cli_parse_all_flags() {
        let cli = Cli::from_args(
            &["overlord"],
            &[
                "-p", "3000", "-t", "2000", "-l", "debug", "-s", "8", "-r", "./scripts", "-e", "",
            ],
        )
        .unwrap();
        assert_eq!(cli.port, 3000);
        assert_eq!(cli.timeout, 2000);
        assert_eq!(cli.log_level, "debug");
        assert_eq!(cli.pool_size, Some(8));
        assert_eq!(cli.extension, "");
    }

    #[test]
    fn test_cli_parse_url_map() {
        let cli = Cli::from_args(&["overlord"], &["-u", "routes.json"]).unwrap();
        assert_eq!(cli.url_map, Some(PathBuf::from("routes.json")));
    }

    #[test]
    fn test_route_requires_exactly_one_strategy() {
        let neither = Cli::from_args(&["overlord"], &[]).unwrap();
        assert!(build_route(&neither).is_err());

        let both = Cli::from_args(&["overlord"], &["-r", "./scripts", "-u", "routes.json"]).unwrap();
        assert!(build_route(&both).is_err());
    }

    #[test]
    fn test_pool_size_zero_is_rejected() {
        let cli = Cli::from_args(&["overlord"], &["-r", "./scripts", "-s", "0"]).unwrap();
        assert!(build_options(&cli).is_err());

        let cli = Cli::from_args(&["overlord"], &["-r", "./scripts", "-s", "1"]).unwrap();
        assert!(build_options(&cli).is_ok());
    }

    #[test]
    fn test_route_from_root_path() {
        let cli = Cli::from_args(&["overlord"], &["-r", "./mocks"]).unwrap();
        let route = build_route(&cli).unwrap();
        assert_eq!(route.resolve("/hello"), Some("./mocks/hello.js".into()));
    }
}
