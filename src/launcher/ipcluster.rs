//! `ipcluster` command-line generation and execution
//!
//! Builds the argument vectors for starting and stopping a daemonized pool and
//! runs them with `tokio::process`. Argument generation is kept pure so the
//! command lines can be inspected (and shown in dry-run mode) without spawning.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{LaunchError, LaunchRequest, ProcessLauncher, StopRequest};

/// Default launcher program
pub const DEFAULT_PROGRAM: &str = "ipcluster";

// ============================================================================
// SBIO: Pure business logic (no I/O)
// ============================================================================

/// Generate `ipcluster start` arguments
///
/// The pool is always daemonized so the call returns without waiting for
/// engines to register.
pub fn generate_start_args(request: &LaunchRequest) -> Vec<String> {
    vec![
        "start".to_string(),
        "--daemonize=True".to_string(),
        format!("--delay={}", request.delay_secs),
        format!("--cluster-id={}", request.cluster_id),
        format!("--log-level={}", request.log_level),
        format!("--n={}", request.engines),
        format!("--profile={}", request.profile),
    ]
}

/// Generate `ipcluster stop` arguments
pub fn generate_stop_args(request: &StopRequest) -> Vec<String> {
    vec![
        "stop".to_string(),
        format!("--profile={}", request.profile),
        format!("--cluster-id={}", request.cluster_id),
    ]
}

/// Render a command line for display
pub fn generate_command(program: &str, args: &[String]) -> String {
    format!("{} {}", program, args.join(" "))
}

// ============================================================================
// SBIO: I/O implementation (real subprocess)
// ============================================================================

/// Launches pools by shelling out to `ipcluster`
#[derive(Debug, Clone)]
pub struct IpclusterLauncher {
    program: String,
}

impl Default for IpclusterLauncher {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

impl IpclusterLauncher {
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: shellexpand::tilde(program.as_ref()).into_owned(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    async fn run(&self, args: Vec<String>) -> Result<(), LaunchError> {
        let command = generate_command(&self.program, &args);
        debug!("Running {}", command);

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .await
            .map_err(|source| LaunchError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(LaunchError::ExitStatus {
                command,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl ProcessLauncher for IpclusterLauncher {
    async fn start(&self, request: &LaunchRequest) -> Result<(), LaunchError> {
        self.run(generate_start_args(request)).await
    }

    async fn stop(&self, request: &StopRequest) -> Result<(), LaunchError> {
        self.run(generate_stop_args(request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn launch_request() -> LaunchRequest {
        LaunchRequest {
            profile: "lsf".to_string(),
            engines: 8,
            delay_secs: 1.0,
            cluster_id: Uuid::nil(),
            log_level: 30,
        }
    }

    #[test]
    fn test_generate_start_args() {
        let args = generate_start_args(&launch_request());
        assert_eq!(
            args,
            vec![
                "start",
                "--daemonize=True",
                "--delay=1",
                "--cluster-id=00000000-0000-0000-0000-000000000000",
                "--log-level=30",
                "--n=8",
                "--profile=lsf",
            ]
        );
    }

    #[test]
    fn test_generate_start_args_fractional_delay() {
        let request = LaunchRequest {
            delay_secs: 0.5,
            ..launch_request()
        };
        let args = generate_start_args(&request);
        assert!(args.contains(&"--delay=0.5".to_string()));
    }

    #[test]
    fn test_generate_stop_args() {
        let request = StopRequest {
            profile: "default".to_string(),
            cluster_id: Uuid::nil(),
        };
        assert_eq!(
            generate_stop_args(&request),
            vec![
                "stop",
                "--profile=default",
                "--cluster-id=00000000-0000-0000-0000-000000000000",
            ]
        );
    }

    #[test]
    fn test_generate_command() {
        let cmd = generate_command("ipcluster", &["stop".to_string(), "--profile=x".to_string()]);
        assert_eq!(cmd, "ipcluster stop --profile=x");
    }

    #[test]
    fn test_default_program() {
        assert_eq!(IpclusterLauncher::default().program(), "ipcluster");
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let launcher = IpclusterLauncher::new("/nonexistent/bin/ipcluster");
        let result = launcher.start(&launch_request()).await;
        assert!(matches!(result, Err(LaunchError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_exit_status_error() {
        let launcher = IpclusterLauncher::new("false");
        let result = launcher.start(&launch_request()).await;
        assert!(matches!(
            result,
            Err(LaunchError::ExitStatus { code: Some(1), .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_zero_exit_is_success() {
        let launcher = IpclusterLauncher::new("true");
        let request = StopRequest {
            profile: "default".to_string(),
            cluster_id: Uuid::nil(),
        };
        assert!(launcher.stop(&request).await.is_ok());
    }
}
