//! CLI definition and dispatch.

use std::path::PathBuf;

use clap::{ArgAction, Parser};
use vethpeer_common::config::{ReadFailurePolicy, ResolverConfig};
use vethpeer_common::constants::{
    BIN_NAME, DEFAULT_IP_COMMAND, DEFAULT_PROC_ROOT, ENV_IP_COMMAND, ENV_PROC_ROOT,
};
use vethpeer_common::types::NamespaceHandle;
use vethpeer_core::Resolver;

use crate::output;

/// Find the network namespace holding the other end of a veth pair.
#[derive(Parser, Debug)]
#[command(name = BIN_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Interface in the current network namespace, or in `--netns`.
    #[arg(value_name = "VETH_NAME")]
    pub interface: String,

    /// Resolve from this network namespace instead of the current one,
    /// e.g. `/run/netns/<name>` or `/proc/<pid>/ns/net`.
    #[arg(long, value_name = "PATH")]
    pub netns: Option<PathBuf>,

    /// Mount point of the proc filesystem to enumerate namespaces from.
    #[arg(long, env = ENV_PROC_ROOT, default_value = DEFAULT_PROC_ROOT)]
    pub proc_root: PathBuf,

    /// iproute2 `ip` binary used to read the link-netnsid.
    #[arg(long, env = ENV_IP_COMMAND, default_value = DEFAULT_IP_COMMAND)]
    pub ip_bin: PathBuf,

    /// Fail on the first process whose namespace cannot be read.
    #[arg(long)]
    pub strict: bool,

    /// Print the full resolution as JSON.
    #[arg(long)]
    pub json: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Builds the resolver configuration from the parsed flags.
    pub fn config(&self) -> ResolverConfig {
        ResolverConfig {
            proc_root: self.proc_root.clone(),
            ip_command: self.ip_bin.clone(),
            read_failure_policy: if self.strict {
                ReadFailurePolicy::Abort
            } else {
                ReadFailurePolicy::Skip
            },
        }
    }
}

/// Resolves the peer namespace of the requested interface and prints it.
///
/// Runs on the calling thread, which `--netns` moves into another network
/// namespace for the duration of the resolution; the binary never spawns
/// another thread.
///
/// # Errors
///
/// Returns an error if the resolution fails.
#[allow(clippy::print_stdout)]
pub fn execute(cli: &Cli) -> anyhow::Result<()> {
    let config = cli.config();
    tracing::debug!(config = ?config, interface = %cli.interface, "resolving veth peer");

    let resolver = Resolver::from_config(&config);
    let resolution = match &cli.netns {
        Some(path) => {
            resolver.find_peer_namespace_in(&NamespaceHandle::new(path), &cli.interface)?
        }
        None => resolver.find_peer_namespace(&cli.interface)?,
    };

    if cli.json {
        println!("{}", output::format_json(&resolution)?);
    } else {
        println!("{}", output::format_resolution(&resolution));
    }
    Ok(())
}
