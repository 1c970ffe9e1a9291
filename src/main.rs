//!
//! skeletonkey server binary
//! -------------------------
//! Command-line entry point for the skeleton key HTTP server. Supports configuration via
//! CLI flags, environment variables and an optional JSON config file.

use std::env;
use std::path::PathBuf;

use anyhow::Result;
use skeletonkey::config::SkeletonKeyConfig;
use skeletonkey::server::{self, ServerSettings};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

fn parse_port_env(name: &str) -> Option<u16> {
    match env::var(name) {
        Ok(val) => val.parse::<u16>().ok(),
        Err(_) => None,
    }
}

fn parse_port_arg(args: &[String], flag: &str) -> Option<u16> {
    arg_value(args, flag).and_then(|v| v.parse::<u16>().ok())
}

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag {
            return args.get(i + 1).cloned();
        }
        i += 1;
    }
    None
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    let _ = fmt().with_env_filter(filter).try_init();

    let args: Vec<String> = env::args().collect();

    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        println!("skeletonkey Server\n\nUSAGE:\n  skeletonkey_server [--http-port N] [--data-dir PATH] [--directory PATH] [--config PATH]\n\nOPTIONS:\n  --http-port N       HTTP port (env: SKELETONKEY_HTTP_PORT, default 7878)\n  --data-dir PATH     Credential store folder (env: SKELETONKEY_DATA_DIR, default data)\n  --directory PATH    JSON identity directory (env: SKELETONKEY_DIRECTORY, default <data-dir>/identities.json)\n  --config PATH       JSON config file (env: SKELETONKEY_CONFIG). SKELETONKEY_* variables override it.\n");
        return Ok(());
    }

    // Defaults
    let default_http: u16 = 7878;
    let default_data: &str = "data";

    // CLI arguments override environment
    let http_port = parse_port_arg(&args, "--http-port").or(parse_port_env("SKELETONKEY_HTTP_PORT")).unwrap_or(default_http);
    let data_dir = arg_value(&args, "--data-dir")
        .or_else(|| env::var("SKELETONKEY_DATA_DIR").ok())
        .unwrap_or_else(|| default_data.to_string());
    let directory_path = arg_value(&args, "--directory").or_else(|| env::var("SKELETONKEY_DIRECTORY").ok());
    let config_path = arg_value(&args, "--config").or_else(|| env::var("SKELETONKEY_CONFIG").ok());

    let config = SkeletonKeyConfig::load(config_path.as_deref().map(std::path::Path::new))?;

    info!(
        target: "startup",
        "skeletonkey: RUST_LOG='{}', http_port={}, data_dir='{}', config={:?}",
        env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string()), http_port, data_dir, config_path
    );

    server::run(ServerSettings {
        http_port,
        data_dir: PathBuf::from(data_dir),
        directory_path: directory_path.map(PathBuf::from),
        config,
    })
    .await
}
