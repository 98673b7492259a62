use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use foreman_agent::AgentDirectory;
use foreman_core::ForemanError;
use foreman_delegate::{Classifier, DelegationMachine};
use foreman_gateway::{AppState, AuthConfig, GatewayServer};
use foreman_llm::{GenerationGateway, HttpGateway, NullRetriever};
use foreman_store::{
    AgentStore, DelegationStore, SqliteStore, SuggestionStore, TaskStore, WorkflowRunStore,
};
use foreman_suggest::{SuggestionCycle, SuggestionService};
use foreman_workflow::{WorkflowRunner, WorkflowScheduler};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;

use config::ForemanConfig;

#[derive(Parser)]
#[command(name = "foreman", about = "Foreman — delegate tasks to a team of agents")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "foreman.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Preview how a task would be routed, without recording anything
    Classify {
        /// Task title
        title: String,
        /// Task description
        #[arg(default_value = "")]
        description: String,
    },
    /// Manage workflow definitions
    Workflow {
        #[command(subcommand)]
        action: WorkflowAction,
    },
}

#[derive(Subcommand)]
enum WorkflowAction {
    /// Parse and validate a workflow file
    Validate {
        /// File to check (overrides config)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();

    let raw = tokio::fs::read_to_string(&cli.config).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to read config file '{}': {}",
            cli.config.display(),
            e
        )
    })?;
    let config = ForemanConfig::parse(&raw)?;

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            serve(config, &host, port).await
        }
        Commands::Classify { title, description } => classify(config, &title, &description).await,
        Commands::Workflow { action } => match action {
            WorkflowAction::Validate { path } => {
                let path = path.unwrap_or_else(|| config.workflow.path.clone());
                validate_workflows(&path)
            }
        },
    }
}

/// Wires every service over one store and serves the HTTP surface.
async fn serve(config: ForemanConfig, host: &str, port: u16) -> anyhow::Result<()> {
    let store = Arc::new(SqliteStore::open(&config.storage.db_path)?);
    info!(db = %config.storage.db_path, "Storage ready");

    let directory = AgentDirectory::new(store.clone() as Arc<dyn AgentStore>);
    directory.bootstrap().await?;

    let gateway: Arc<dyn GenerationGateway> = Arc::new(HttpGateway::new(config.model.clone()));
    let machine = DelegationMachine::new(
        store.clone() as Arc<dyn TaskStore>,
        store.clone() as Arc<dyn DelegationStore>,
        directory.clone(),
        gateway.clone(),
        Arc::new(NullRetriever),
        config.classifier.llm_timeout(),
    );

    let suggestions = Arc::new(SuggestionService::new(
        store.clone() as Arc<dyn SuggestionStore>,
        store.clone() as Arc<dyn TaskStore>,
        store.clone() as Arc<dyn DelegationStore>,
        directory.clone(),
        gateway,
        machine.clone(),
        config.suggestions.settings(),
        config.credentials.clone(),
    ));
    SuggestionCycle::new(suggestions.clone()).start();

    start_workflows(&config, store.clone(), machine.clone()).await?;

    let auth = AuthConfig::new(config.server.api_keys.clone());
    if auth.is_enabled() {
        info!(keys = config.server.api_keys.len(), "API key auth enabled");
    }

    let state = Arc::new(AppState {
        machine,
        suggestions,
        directory,
        tasks: store.clone() as Arc<dyn TaskStore>,
        delegations: store.clone() as Arc<dyn DelegationStore>,
        runs: store as Arc<dyn WorkflowRunStore>,
    });
    let app = GatewayServer::build_with_auth(state, auth);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Foreman listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Loads workflow definitions, dispatches startup workflows, and hands
/// cron workflows to the scheduler. A missing file just means no
/// workflows are configured.
async fn start_workflows(
    config: &ForemanConfig,
    store: Arc<SqliteStore>,
    machine: DelegationMachine,
) -> anyhow::Result<()> {
    let workflows = match foreman_workflow::load_path(&config.workflow.path) {
        Ok(defs) => defs,
        Err(ForemanError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(
                path = %config.workflow.path.display(),
                "No workflow file; skipping workflows"
            );
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    if workflows.is_empty() {
        return Ok(());
    }

    let runner = Arc::new(
        WorkflowRunner::new(
            store.clone() as Arc<dyn TaskStore>,
            store as Arc<dyn WorkflowRunStore>,
            machine,
        )
        .with_pool_size(config.workflow.pool_size)
        .with_retries(config.workflow.retries),
    );

    let queued = runner.run_startup(&workflows).await?;
    info!(
        workflows = workflows.len(),
        steps = queued,
        "Startup workflows dispatched"
    );

    let scheduler = WorkflowScheduler::new(runner, workflows);
    if !scheduler.cron_workflows().is_empty() {
        scheduler.start();
    }
    Ok(())
}

/// Runs the classifier against the registered agents and prints the
/// decision.
async fn classify(config: ForemanConfig, title: &str, description: &str) -> anyhow::Result<()> {
    let store = Arc::new(SqliteStore::open(&config.storage.db_path)?);
    let directory = AgentDirectory::new(store as Arc<dyn AgentStore>);
    directory.bootstrap().await?;

    let gateway = Arc::new(HttpGateway::new(config.model.clone()));
    let classifier = Classifier::new(gateway, config.classifier.llm_timeout());
    let decision = classifier.classify(title, description, &directory).await;

    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}

/// Parses the workflow file and prints what it found.
fn validate_workflows(path: &Path) -> anyhow::Result<()> {
    let workflows = foreman_workflow::load_path(path)?;
    println!("{} valid workflow(s) in {}", workflows.len(), path.display());
    for def in &workflows {
        println!(
            "  {}: agent {}, schedule \"{}\", {} step(s){}",
            def.name,
            def.agent,
            def.schedule,
            def.steps.len(),
            if def.auto { "" } else { " (manual)" }
        );
    }
    Ok(())
}
