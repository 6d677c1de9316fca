use std::path::PathBuf;
use std::process::ExitCode;

use autha_ldap::config::Configuration;
use autha_ldap::error::{Error, Result};
use autha_ldap::ldap::DirectoryAuthenticator;
use autha_ldap::telemetry;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to `config.yaml`.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Check the directory is reachable with the search identity.
    Test,
    /// Authenticate a login.
    Login {
        login: String,
        /// Password, read from the environment to keep it out of history.
        #[arg(long, env = "LDAP_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(err) = telemetry::setup_logging(&args.log_level) {
        eprintln!("cannot initialize logging: {err}");
    }
    telemetry::describe_metrics();

    match run(args).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(kind = ?err.kind(), "{err}");
            ExitCode::FAILURE
        },
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let config = Configuration::default()
        .path(args.config.unwrap_or_default())
        .read()?;
    let Some(ldap) = config.ldap else {
        return Err(Error::Configuration(
            "missing `ldap` entry on `config.yaml` file".into(),
        ));
    };

    let ldap = DirectoryAuthenticator::new(ldap)?;

    match args.cmd {
        Commands::Test => {
            ldap.test_connection().await?;
            println!(
                "{} connection to {} succeeded",
                ldap.auth_method_name(),
                ldap.config().host
            );
            Ok(ExitCode::SUCCESS)
        },
        Commands::Login { login, password } => {
            match ldap.authenticate(&login, &password).await? {
                Some(identity) => {
                    match serde_json::to_string_pretty(&identity) {
                        Ok(body) => println!("{body}"),
                        Err(_) => println!("{identity:?}"),
                    }
                    Ok(ExitCode::SUCCESS)
                },
                None => {
                    println!("authentication failed");
                    Ok(ExitCode::from(2))
                },
            }
        },
    }
}
