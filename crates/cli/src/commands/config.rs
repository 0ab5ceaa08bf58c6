use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use pesto_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

struct ConfigField {
    key: &'static str,
    env_key: &'static str,
    value: String,
}

impl ConfigField {
    fn new(key: &'static str, env_key: &'static str, value: impl Into<String>) -> Self {
        Self { key, env_key, value: value.into() }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(
            field.key,
            field.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }

    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<ConfigField> {
    let admins = if config.slack.admin_user_ids.is_empty() {
        "<none>".to_string()
    } else {
        config.slack.admin_user_ids.join(",")
    };
    let llm_api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };

    vec![
        ConfigField::new("database.url", "PESTO_DATABASE_URL", &config.database.url),
        ConfigField::new(
            "database.max_connections",
            "PESTO_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        ConfigField::new(
            "slack.app_token",
            "PESTO_SLACK_APP_TOKEN",
            redact_token(config.slack.app_token.expose_secret()),
        ),
        ConfigField::new(
            "slack.bot_token",
            "PESTO_SLACK_BOT_TOKEN",
            redact_token(config.slack.bot_token.expose_secret()),
        ),
        ConfigField::new("slack.admin_user_ids", "PESTO_SLACK_ADMIN_USER_IDS", admins),
        ConfigField::new("slack.api_base", "PESTO_SLACK_API_BASE", &config.slack.api_base),
        ConfigField::new(
            "llm.provider",
            "PESTO_LLM_PROVIDER",
            format!("{:?}", config.llm.provider),
        ),
        ConfigField::new("llm.model", "PESTO_LLM_MODEL", &config.llm.model),
        ConfigField::new(
            "llm.reply_model",
            "PESTO_LLM_REPLY_MODEL",
            config.llm.effective_reply_model(),
        ),
        ConfigField::new("llm.base_url", "PESTO_LLM_BASE_URL", config.llm.effective_base_url()),
        ConfigField::new("llm.api_key", "PESTO_LLM_API_KEY", llm_api_key),
        ConfigField::new(
            "tagging.max_suggestions",
            "PESTO_TAGGING_MAX_SUGGESTIONS",
            config.tagging.max_suggestions.to_string(),
        ),
        ConfigField::new(
            "tagging.oversample_factor",
            "PESTO_TAGGING_OVERSAMPLE_FACTOR",
            config.tagging.oversample_factor.to_string(),
        ),
        ConfigField::new(
            "tagging.cooldown_secs",
            "PESTO_TAGGING_COOLDOWN_SECS",
            config.tagging.cooldown_secs.to_string(),
        ),
        ConfigField::new(
            "tagging.sweep_interval_secs",
            "PESTO_TAGGING_SWEEP_INTERVAL_SECS",
            config.tagging.sweep_interval_secs.to_string(),
        ),
        ConfigField::new(
            "server.health_check_port",
            "PESTO_SERVER_HEALTH_CHECK_PORT",
            config.server.health_check_port.to_string(),
        ),
        ConfigField::new("logging.level", "PESTO_LOGGING_LEVEL", &config.logging.level),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("pesto.toml"), PathBuf::from("config/pesto.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    let in_file = config_file_doc.is_some_and(|doc| {
        key_path.split('.').try_fold(doc, |current, key| current.get(key)).is_some()
    });
    if in_file {
        let file_path = config_file_path
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "config file".to_string());
        return format!("file ({file_path})");
    }

    "default".to_string()
}

/// Keeps the token family prefix (`xapp`, `xoxb`) and hides the rest.
pub fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.split_once('-') {
        Some((prefix, _)) => format!("{prefix}-***"),
        None => "<redacted>".to_string(),
    }
}
