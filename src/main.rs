use std::process;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use poolctl::cli::{format_dry_run, Args};
use poolctl::client::HttpPoolConnector;
use poolctl::cluster::ClusterSession;
use poolctl::config::{load_config, PipelineConfig};
use poolctl::launcher::IpclusterLauncher;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    let filter = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    // Load .env file if specified
    if let Some(ref env_file) = args.env_file {
        if let Err(e) = dotenvy::from_path(env_file) {
            error!("Failed to load env file {}: {}", env_file.display(), e);
            process::exit(1);
        }
    }

    let loaded = match args.config_file {
        Some(ref path) => load_config(path)
            .with_context(|| format!("Failed to load config file {}", path.display())),
        None => Ok(PipelineConfig::default()),
    };
    let mut config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!("{:#}", e);
            process::exit(1);
        }
    };

    args.apply_overrides(&mut config);
    if let Err(e) = config.cluster.validate() {
        error!("{}", e);
        process::exit(1);
    }

    // Dry-run mode: print cluster info and exit
    if args.dry_run {
        println!("{}", format_dry_run(&config, &args));
        return;
    }

    if let Err(e) = run(&args, &config).await {
        error!("{:#}", e);
        process::exit(1);
    }
}

async fn run(args: &Args, config: &PipelineConfig) -> anyhow::Result<()> {
    let launcher = Arc::new(IpclusterLauncher::new(&args.ipcluster));
    let connector = Arc::new(
        HttpPoolConnector::new(args.controller_url.clone())
            .context("Failed to create pool client")?,
    );

    info!(
        "Launching {} engines with profile '{}' (timeout {}s)",
        config.cluster.cores, config.cluster.profile, config.cluster.timeout
    );

    // Listen for Ctrl-C from the start so an interrupted startup still stops the pool
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut session = ClusterSession::new(launcher, connector);
    let started = session
        .start_until(config, &mut ctrl_c)
        .await
        .context("Cluster session failed")?;
    if !started {
        bail!("Interrupted during cluster startup");
    }

    info!("Cluster up. Press Ctrl-C to stop.");
    let interrupted = (&mut ctrl_c).await;
    session.stop().await;
    interrupted.context("Failed to wait for Ctrl-C")?;

    info!("Cluster stopped.");
    Ok(())
}
