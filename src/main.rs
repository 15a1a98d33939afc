use approle_assigner::cmd::assign::{AppRoleAssigner, Outcome, TerminalPrompter};
use approle_assigner::config::{AuthMethod, ConfigManager};
use approle_assigner::error;
use approle_assigner::graph::GraphClient;
use approle_assigner::graph::auth::GraphAuth;
use approle_assigner::graph::directory::CachedDirectory;
use approle_assigner::tui::prompts;
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(
    name = "approle-assigner",
    about = "Assign Entra ID app roles to applications and managed identities",
    version,
    long_about = "Interactively pick a resource application, a target application or managed\n\
                  identity, and an app role; then create the app role assignment via Microsoft Graph.\n\n\
                  Type to filter long lists, Enter to confirm, Esc to cancel."
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Credential strategy (prompted when neither this nor the config file sets it)
    #[arg(long, value_enum)]
    auth: Option<AuthMethod>,

    /// Number of matches shown by the type-to-filter prompts
    #[arg(long)]
    limit: Option<usize>,

    /// Config file to read instead of the platform default
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(()) => {}
        Err(e) if e.is_cancelled() => {
            println!("{}", "Operation was canceled by the user.".yellow());
        }
        Err(e) => {
            prompts::error(&format!("Error: {}", e));
            std::process::exit(1);
        }
    }
}

async fn run() -> error::Result<()> {
    let cli = Cli::parse();

    let config_manager = match &cli.config {
        Some(path) => ConfigManager::with_file(path),
        None => ConfigManager::new()?,
    };
    let mut config = config_manager.load_config()?;
    if let Some(auth) = cli.auth {
        config.auth_method = Some(auth);
    }
    if let Some(limit) = cli.limit {
        config.fuzzy_limit = limit;
    }
    config.validate()?;

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(config.log_filter.as_str())
            .with_writer(std::io::stderr)
            .init();
        tracing::debug!("Config file: {}", config_manager.config_file().display());
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("Ctrl+C received");
            on_signal.cancel();
        }
    });

    let method = match config.auth_method {
        Some(method) => method,
        None => AuthMethod::ALL[prompts::select("Select the authentication method:", &AuthMethod::ALL, 0)?],
    };

    let access_token = GraphAuth::new(&config)
        .access_token(method, &cancel)
        .await?;

    let client = GraphClient::with_base_url(access_token, &config.graph_base_url)?;
    tracing::debug!("Graph endpoint: {}", client.base_url());
    let directory = CachedDirectory::new(client);
    let prompter = TerminalPrompter::new(config.fuzzy_limit);
    prompts::section_header("App role assignment");

    let outcome = AppRoleAssigner::new(directory, prompter, cancel)
        .assign()
        .await?;
    tracing::debug!("assignment finished: {:?}", outcome);

    if let Outcome::Assigned(assignment) = &outcome {
        if let Some(id) = &assignment.id {
            prompts::info(&format!("Assignment id: {}", id));
        }
    }

    Ok(())
}
