//! CLI command definitions using clap.

use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::controller::ControllerConfig;

/// Kubernetes operator for Flussonic streamer fleets.
#[derive(Parser, Debug)]
#[command(name = "media-server-operator")]
#[command(version)]
#[command(about = "Runs one Flussonic streamer per eligible node for every MediaServer resource")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Watch MediaServers and reconcile their dependents
    Run(RunArgs),

    /// Print the MediaServer CustomResourceDefinition as YAML
    Crd,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct RunArgs {
    /// Only watch MediaServers in this namespace (all namespaces if unset)
    #[arg(short, long, env = "MSO_NAMESPACE")]
    pub namespace: Option<String>,

    /// Delay before the follow-up pass after an object was created
    #[arg(long, env = "MSO_REQUEUE_DELAY_MS", default_value_t = 500)]
    pub requeue_delay_ms: u64,

    /// Delay before retrying a failed pass
    #[arg(long, env = "MSO_ERROR_BACKOFF_SECS", default_value_t = 5)]
    pub error_backoff_secs: u64,

    /// Interval at which converged MediaServers are checked again for drift
    #[arg(long, env = "MSO_RESYNC_SECS", default_value_t = 300)]
    pub resync_secs: u64,

    /// Log filter directives, e.g. `info,mso_reconciler=debug`
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_filter: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "MSO_LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

impl From<&RunArgs> for ControllerConfig {
    fn from(args: &RunArgs) -> Self {
        Self {
            namespace: args.namespace.clone(),
            requeue_delay: Duration::from_millis(args.requeue_delay_ms),
            error_backoff: Duration::from_secs(args.error_backoff_secs),
            resync_interval: Duration::from_secs(args.resync_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]

    use super::*;

    #[test]
    fn run_defaults() {
        let cli = Cli::try_parse_from(["media-server-operator", "run"]).unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };

        let config = ControllerConfig::from(&args);
        assert_eq!(config.namespace, None);
        assert_eq!(config.requeue_delay, Duration::from_millis(500));
        assert_eq!(config.error_backoff, Duration::from_secs(5));
        assert_eq!(config.resync_interval, Duration::from_secs(300));
    }

    #[test]
    fn run_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "media-server-operator",
            "run",
            "--namespace",
            "streaming",
            "--requeue-delay-ms",
            "50",
            "--error-backoff-secs",
            "1",
            "--log-json",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };

        assert!(args.log_json);
        let config = ControllerConfig::from(&args);
        assert_eq!(config.namespace.as_deref(), Some("streaming"));
        assert_eq!(config.requeue_delay, Duration::from_millis(50));
        assert_eq!(config.error_backoff, Duration::from_secs(1));
    }

    #[test]
    fn crd_takes_no_arguments() {
        let cli = Cli::try_parse_from(["media-server-operator", "crd"]).unwrap();
        assert!(matches!(cli.command, Command::Crd));
        assert!(Cli::try_parse_from(["media-server-operator", "crd", "extra"]).is_err());
    }
}
