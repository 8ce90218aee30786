use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use taskpilot_agents::{tools, AgentRuntime, LlmProvider, OpenAiProvider};
use taskpilot_config::{AppConfig, ConfigLoader};
use taskpilot_db::{ChatStore, TaskStore, UserStore};
use taskpilot_gateway::{AppState, GatewayServer};
use tokio::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "taskpilot")]
#[command(about = "Task management service with a conversational agent", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to a TOML config file. Environment variables override it.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP gateway (the default).
    Serve,
    /// Load the config and probe the LLM endpoint, then exit.
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::new(cli.config.clone())
        .load()
        .context("failed to load configuration")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Check => check(config).await,
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    if config.llm.api_key.is_empty() {
        warn!("no LLM API key configured; chat turns will return a configuration error");
    }

    let db_path = config.database.path.clone();
    let users = UserStore::open(&db_path).context("failed to open user store")?;
    let tasks = Arc::new(Mutex::new(
        TaskStore::open(&db_path).context("failed to open task store")?,
    ));
    let chats = Arc::new(Mutex::new(
        ChatStore::open(&db_path).context("failed to open chat store")?,
    ));

    let runtime = build_runtime(&config, tasks.clone(), chats.clone())?;

    let state = Arc::new(
        AppState::new(config, users, tasks, chats, runtime)
            .context("failed to build application state")?,
    );

    GatewayServer::new(state)
        .run()
        .await
        .context("gateway exited with an error")?;
    Ok(())
}

async fn check(config: AppConfig) -> anyhow::Result<()> {
    info!(
        "config ok: db={} model={} endpoint={}",
        config.database.path.display(),
        config.llm.model,
        config.llm.base_url.as_deref().unwrap_or("default"),
    );

    let provider = OpenAiProvider::new(config.llm.api_key.clone(), config.llm.base_url.clone());
    let healthy = provider.health_check().await.unwrap_or(false);
    if healthy {
        info!("LLM endpoint reachable");
        Ok(())
    } else {
        anyhow::bail!("LLM endpoint is not reachable or the key is invalid")
    }
}

fn build_runtime(
    config: &AppConfig,
    tasks: Arc<Mutex<TaskStore>>,
    chats: Arc<Mutex<ChatStore>>,
) -> anyhow::Result<AgentRuntime> {
    let provider = OpenAiProvider::new(config.llm.api_key.clone(), config.llm.base_url.clone());
    let mut runtime = AgentRuntime::new(
        Arc::new(provider),
        config.llm.api_key.clone(),
        config.llm.model.clone(),
    );

    runtime.register_tool(Arc::new(tools::AddTask::new(tasks.clone())))?;
    runtime.register_tool(Arc::new(tools::ListTasks::new(tasks.clone())))?;
    runtime.register_tool(Arc::new(tools::ListAllTasks::new(tasks.clone())))?;
    runtime.register_tool(Arc::new(tools::CompleteTask::new(tasks.clone())))?;
    runtime.register_tool(Arc::new(tools::UpdateTask::new(tasks.clone())))?;
    runtime.register_tool(Arc::new(tools::DeleteTask::new(tasks.clone())))?;
    runtime.register_tool(Arc::new(tools::DeleteAllTasks::new(tasks)))?;
    runtime.register_tool(Arc::new(tools::ClearChatHistory::new(chats)))?;

    taskpilot_agents::validate_tool_schemas(&runtime.tool_definitions())?;
    info!(
        "agent runtime ready with {} tools",
        runtime.tool_definitions().len()
    );

    Ok(runtime)
}
