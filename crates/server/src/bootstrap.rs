use std::sync::Arc;

use pesto_agent::{AgentRuntime, LlmError};
use pesto_core::config::{AppConfig, ConfigError, LoadOptions};
use pesto_core::suggestions::{CooldownStore, SuggestionEngine};
use pesto_db::{connect_with_config, migrations, DbPool, SqlTopicGraph};
use pesto_slack::commands::CommandRouter;
use pesto_slack::events::{ChannelMessageHandler, EventDispatcher, SlashCommandHandler};
use pesto_slack::socket::{ReconnectPolicy, SlackSocketTransport, SocketModeRunner};
use pesto_slack::web::{SlackApiError, SlackWebClient};
use thiserror::Error;
use tracing::info;

use crate::pipeline::{MessagePipeline, SuggestionSettings};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub cooldowns: Arc<CooldownStore>,
    pub pipeline: Arc<MessagePipeline>,
    pub slack_runner: SocketModeRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("llm client setup failed: {0}")]
    Llm(#[from] LlmError),
    #[error("slack client setup failed: {0}")]
    Slack(#[from] SlackApiError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let cooldowns = Arc::new(CooldownStore::new());
    let graph = Arc::new(SqlTopicGraph::new(db_pool.clone()));
    let engine = SuggestionEngine::new(graph.clone(), cooldowns.clone());
    let agent = AgentRuntime::from_config(&config.llm, &config.tagging)?;
    let web = SlackWebClient::from_config(&config.slack)?;

    let pipeline = Arc::new(MessagePipeline::new(
        agent,
        graph,
        engine,
        Arc::new(web.clone()),
        SuggestionSettings::from(&config.tagging),
    ));

    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(ChannelMessageHandler::new(pipeline.clone()));
    dispatcher.register(SlashCommandHandler::new(CommandRouter::new(
        cooldowns.clone(),
        config.slack.admin_user_ids.clone(),
    )));

    let slack_runner = SocketModeRunner::new(
        Arc::new(SlackSocketTransport::new(web)),
        dispatcher,
        ReconnectPolicy::default(),
    );
    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        llm_provider = ?config.llm.provider,
        cooldown_secs = config.tagging.cooldown_secs,
        max_suggestions = config.tagging.max_suggestions,
        "application wired"
    );

    Ok(Application { config, db_pool, cooldowns, pipeline, slack_runner })
}
