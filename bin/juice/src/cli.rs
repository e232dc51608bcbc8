use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "juice")]
#[command(
    author,
    version,
    about = "Compile and deploy the JuiceBox contract to a configured network"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, global = true, env = "JUICE_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to a Juice.toml configuration file, or a directory containing one.
    ///
    /// If not provided, ./Juice.toml is used when it exists and the built-in
    /// configuration otherwise.
    #[arg(long, alias = "conf", global = true, env = "JUICE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,

    /// Deployment options, used when no subcommand is given.
    #[command(flatten)]
    pub deploy: DeployArgs,
}

#[derive(Debug, Clone, Subcommand, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Command {
    /// Compile and deploy the contract (default).
    Deploy(DeployArgs),
    /// List the declared networks and whether they are deployable.
    Networks,
    /// List the compiler versions in resolution order.
    Compilers,
    /// Print the effective configuration as TOML.
    Config,
}

#[derive(Debug, Clone, Default, Args)]
pub struct DeployArgs {
    /// Target network. Defaults to the configured default network.
    #[arg(short, long, env = "JUICE_NETWORK")]
    pub network: Option<String>,

    /// Contract to deploy, by name or as `path/To.sol:Name`.
    #[arg(short, long, env = "JUICE_CONTRACT")]
    pub contract: Option<String>,

    /// Fixed gas price in wei.
    #[arg(long, env = "JUICE_GAS_PRICE", allow_hyphen_values = true)]
    pub gas_price: Option<i64>,

    /// Directory holding the Solidity sources.
    #[arg(long, env = "JUICE_CONTRACTS_DIR")]
    pub contracts_dir: Option<PathBuf>,

    /// Seconds to wait for the deployment to be mined before giving up.
    #[arg(long, env = "JUICE_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Use this solc executable for every compiler version instead of `solc-<version>`.
    #[arg(long, env = "JUICE_SOLC")]
    pub solc: Option<String>,
}
