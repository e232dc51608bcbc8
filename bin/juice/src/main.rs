//! juice compiles the JuiceBox contract and deploys it to a configured network.

mod cli;

use std::{path::Path, process::ExitCode, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::Table;

use cli::{Cli, Command, DeployArgs};
use juice_deploy::{
    CONFIG_FILENAME, DeployConfig, Deployer, DeploymentRequest, Environment, JsonRpcClient,
    ResolvedConfig, SolcCompiler,
};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .with_writer(std::io::stderr)
        .init();

    // Secrets may come from a local .env file; real environment variables win.
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env file"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %describe_dotenv_error(&e), "Failed to load .env file"),
    }

    let config = load_config(cli.config.as_deref())?;
    let env = Environment::from_process();

    match cli.command.unwrap_or(Command::Deploy(cli.deploy)) {
        Command::Deploy(args) => deploy(config, &env, args).await,
        Command::Networks => {
            println!("{}", networks_table(&config.resolve(&env)?));
            Ok(ExitCode::SUCCESS)
        }
        Command::Compilers => {
            println!("{}", compilers_table(&config.resolve(&env)?));
            Ok(ExitCode::SUCCESS)
        }
        Command::Config => {
            print!("{}", config.to_toml()?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Describe a `.env` failure without the offending line, which may hold a secret.
fn describe_dotenv_error(err: &dotenvy::Error) -> String {
    match err {
        dotenvy::Error::LineParse(_, index) => {
            format!("malformed line (parse error at position {})", index)
        }
        dotenvy::Error::Io(e) => format!("I/O error: {}", e.kind()),
        dotenvy::Error::EnvVar(_) => "invalid environment variable".to_string(),
        _ => "unrecognized error".to_string(),
    }
}

fn load_config(path: Option<&Path>) -> Result<DeployConfig> {
    if let Some(path) = path {
        return Ok(DeployConfig::load_from_file(path)?);
    }

    let local = Path::new(CONFIG_FILENAME);
    if local.exists() {
        return Ok(DeployConfig::load_from_file(local)?);
    }

    tracing::debug!("No configuration file found, using built-in configuration");
    Ok(DeployConfig::default())
}

async fn deploy(mut config: DeployConfig, env: &Environment, args: DeployArgs) -> Result<ExitCode> {
    if let Some(contract) = args.contract {
        config.contract = contract;
    }
    if let Some(gas_price) = args.gas_price {
        config.gas_price = gas_price;
    }
    if let Some(dir) = args.contracts_dir {
        config.contracts_dir = dir;
    }
    if let Some(timeout) = args.timeout {
        config.confirmation_timeout_secs = Some(timeout);
    }

    let resolved = match config.resolve(env) {
        Ok(resolved) => resolved,
        Err(e) => {
            eprintln!("{}: {}", e.kind(), e);
            return Ok(ExitCode::FAILURE);
        }
    };
    let network = match resolved.network(args.network.as_deref()) {
        Ok(network) => network,
        Err(e) => {
            eprintln!("{}: {}", e.kind(), e);
            return Ok(ExitCode::FAILURE);
        }
    };

    tracing::info!(
        contract = %config.contract,
        network = %network.name,
        contracts_dir = %config.contracts_dir.display(),
        "Starting deployment..."
    );

    let compiler = match args.solc {
        Some(executable) => SolcCompiler::with_executable(executable),
        None => SolcCompiler::new(),
    };
    let client = JsonRpcClient::new().context("Failed to create JSON-RPC client")?;

    let deployer = Deployer::new(compiler, client, resolved.compilers.clone())
        .contracts_dir(&config.contracts_dir)
        .confirmation_timeout(config.confirmation_timeout_secs.map(Duration::from_secs))
        .gas_reporter(resolved.gas_reporter.clone());

    let result = deployer
        .deploy(DeploymentRequest::new(
            config.contract.clone(),
            network,
            config.gas_price,
        ))
        .await;

    if result.is_success() {
        println!("{}", result.status_line());
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("{}", result.status_line());
        Ok(ExitCode::FAILURE)
    }
}

/// Declared networks. Only the endpoint host and signer address are shown, never secrets.
fn networks_table(config: &ResolvedConfig) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Network", "Default", "Endpoint", "Credential", "Sender"]);

    for (name, profile) in &config.networks {
        let endpoint = if profile.url.is_empty() {
            "-".to_string()
        } else {
            url::Url::parse(&profile.url)
                .ok()
                .and_then(|url| url.host_str().map(str::to_string))
                .unwrap_or_else(|| "<invalid>".to_string())
        };
        let (credential, sender) = if profile.credential.is_empty() {
            ("missing", "-".to_string())
        } else {
            match profile.credential.address() {
                Ok(address) => ("set", address.to_string()),
                Err(_) => ("malformed", "-".to_string()),
            }
        };
        let default = if *name == config.default_network { "*" } else { "" };

        table.add_row(vec![
            name.clone(),
            default.to_string(),
            endpoint,
            credential.to_string(),
            sender,
        ]);
    }

    table
}

fn compilers_table(config: &ResolvedConfig) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Priority", "Version", "Optimizer", "Runs"]);

    for (i, profile) in config.compilers.iter().enumerate() {
        table.add_row(vec![
            (i + 1).to_string(),
            profile.version.to_string(),
            if profile.optimizer.enabled { "on" } else { "off" }.to_string(),
            profile.optimizer.runs.to_string(),
        ]);
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    const KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_networks_table_hides_secrets() {
        let env: Environment = [
            ("STAGING_ALCHEMY_API_URL", "https://eth-rinkeby.alchemyapi.io/v2/secret-api-key"),
            ("STAGING_PRIVATE_KEY", KEY),
        ]
        .into_iter()
        .collect();
        let resolved = DeployConfig::default().resolve(&env).unwrap();

        let rendered = networks_table(&resolved).to_string();
        assert!(!rendered.contains(KEY));
        assert!(!rendered.contains("secret-api-key"));
        assert!(rendered.contains("eth-rinkeby.alchemyapi.io"));
        assert!(rendered.contains("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"));
        assert!(rendered.contains("missing"));
    }

    #[test]
    fn test_dotenv_parse_error_hides_line() {
        let dir = TempDir::new("juice-cli").unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "STAGING_PRIVATE_KEY=ac0974bec39a17e3 6ba4a6b4d238ff944\n").unwrap();

        let err = dotenvy::from_path_iter(&path)
            .unwrap()
            .find_map(Result::err)
            .unwrap();
        assert!(matches!(err, dotenvy::Error::LineParse(..)));
        assert!(err.to_string().contains("ac0974bec39a17e3"));

        let described = describe_dotenv_error(&err);
        assert!(described.starts_with("malformed line"));
        assert!(!described.contains("ac0974bec39a17e3"));
        assert!(!described.contains("6ba4a6b4d238ff944"));
    }

    #[test]
    fn test_compilers_table_in_priority_order() {
        let resolved = DeployConfig::default()
            .resolve(&Environment::default())
            .unwrap();
        let rendered = compilers_table(&resolved).to_string();

        let first = rendered.find("0.8.7").unwrap();
        let last = rendered.find("0.6.2").unwrap();
        assert!(first < last);
    }

    #[test]
    fn test_load_config_from_directory() {
        let dir = TempDir::new("juice-cli").unwrap();
        std::fs::write(dir.path().join(CONFIG_FILENAME), "contract = \"Token\"\n").unwrap();

        let config = load_config(Some(dir.path())).unwrap();
        assert_eq!(config.contract, "Token");
        assert_eq!(config.default_network, "rinkeby");
    }
}
