//! Display formatting for CLI output
//!
//! SBIO pattern: Pure functions that format data for display

use uuid::Uuid;

use super::Args;
use crate::config::PipelineConfig;
use crate::launcher::{generate_command, generate_start_args, generate_stop_args};

const CLUSTER_ID_PLACEHOLDER: &str = "<cluster-id>";

/// Format a dry-run report of the resolved cluster config and commands.
/// Pure function - returns a formatted string.
pub fn format_dry_run(config: &PipelineConfig, args: &Args) -> String {
    let cluster = &config.cluster;
    let mut output = String::new();

    output.push_str(&format!(
        "poolctl v{} - Dry Run Mode\n\n",
        env!("CARGO_PKG_VERSION")
    ));
    match &args.config_file {
        Some(path) => output.push_str(&format!("Config: {}\n\n", path.display())),
        None => output.push_str("Config: (built-in defaults)\n\n"),
    }

    output.push_str("Cluster:\n");
    output.push_str(&format!("  Profile:    {}\n", cluster.profile));
    output.push_str(&format!("  Engines:    {}\n", cluster.cores));
    output.push_str(&format!("  Delay:      {}s\n", cluster.delay));
    output.push_str(&format!("  Log level:  {}\n", cluster.log_level));
    output.push_str(&format!("  Timeout:    {}s\n", cluster.timeout));
    output.push_str(&format!("  Controller: {}\n", args.controller_url));

    let mut sections: Vec<String> = config
        .document
        .keys()
        .filter_map(|k| k.as_str())
        .filter(|k| *k != "cluster")
        .map(str::to_string)
        .collect();
    sections.sort();
    if !sections.is_empty() {
        output.push_str(&format!("\nOther sections: {}\n", sections.join(", ")));
    }

    let nil = Uuid::nil().to_string();
    let start = generate_command(
        &args.ipcluster,
        &generate_start_args(&cluster.launch_request(Uuid::nil())),
    );
    let stop = generate_command(
        &args.ipcluster,
        &generate_stop_args(&cluster.stop_request(Uuid::nil())),
    );

    output.push_str("\nCommands:\n");
    output.push_str(&format!(
        "  start: {}\n",
        start.replace(&nil, CLUSTER_ID_PLACEHOLDER)
    ));
    output.push_str(&format!(
        "  stop:  {}\n",
        stop.replace(&nil, CLUSTER_ID_PLACEHOLDER)
    ));

    output.push_str("\nReady to start the cluster. Remove --dry-run to execute.\n");

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use clap::Parser;

    fn create_test_args() -> Args {
        Args::parse_from(["poolctl", "--dry-run", "pipeline.yaml"])
    }

    #[test]
    fn test_format_dry_run_basic() {
        let config = parse_config("cluster:\n  profile: lsf\n  cores: 12\n").unwrap();
        let output = format_dry_run(&config, &create_test_args());

        assert!(output.contains("Config: pipeline.yaml"));
        assert!(output.contains("Profile:    lsf"));
        assert!(output.contains("Engines:    12"));
        assert!(output.contains("Other sections: dir"));
        assert!(output.contains(
            "start: ipcluster start --daemonize=True --delay=1 --cluster-id=<cluster-id>"
        ));
        assert!(output.contains("stop:  ipcluster stop --profile=lsf --cluster-id=<cluster-id>"));
    }

    #[test]
    fn test_format_dry_run_defaults() {
        let args = Args::parse_from(["poolctl", "--dry-run"]);
        let output = format_dry_run(&PipelineConfig::default(), &args);
        assert!(output.contains("Config: (built-in defaults)"));
        assert!(output.contains("--n=4"));
    }
}
