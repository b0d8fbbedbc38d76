//! CLI module for poolctl
//!
//! Argument parsing and config overrides live here; dry-run formatting is in
//! `display`.

use clap::{ArgAction, Parser};
use std::path::PathBuf;

mod display;

pub use display::*;

use crate::client::http::DEFAULT_CONTROLLER_URL;
use crate::config::PipelineConfig;
use crate::launcher::ipcluster::DEFAULT_PROGRAM;

#[derive(Parser, Debug)]
#[command(name = "poolctl")]
#[command(about = "Launch an engine pool, wait for it to come up, and tear it down on exit")]
#[command(version)]
pub struct Args {
    /// Path to a YAML pipeline config (built-in defaults when omitted)
    pub config_file: Option<PathBuf>,

    /// Enable verbose logging output (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Dry-run mode: resolve the config and show the launch commands without running
    #[arg(long)]
    pub dry_run: bool,

    /// Controller endpoint used to query engines and submit work
    #[arg(long, env = "POOLCTL_CONTROLLER_URL", default_value = DEFAULT_CONTROLLER_URL)]
    pub controller_url: String,

    /// Program used to start and stop the pool
    #[arg(long, env = "POOLCTL_IPCLUSTER", default_value = DEFAULT_PROGRAM)]
    pub ipcluster: String,

    /// Override cluster.profile
    #[arg(long)]
    pub profile: Option<String>,

    /// Override cluster.cores
    #[arg(short = 'n', long)]
    pub cores: Option<u32>,

    /// Override cluster.timeout (seconds)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Path to a .env file loaded before anything else
    #[arg(long, value_name = "FILE")]
    pub env_file: Option<PathBuf>,
}

impl Args {
    /// Apply command-line overrides to the `cluster` section
    pub fn apply_overrides(&self, config: &mut PipelineConfig) {
        if let Some(ref profile) = self.profile {
            config.cluster.profile = profile.clone();
        }
        if let Some(cores) = self.cores {
            config.cluster.cores = cores;
        }
        if let Some(timeout) = self.timeout {
            config.cluster.timeout = timeout;
        }
    }
}
