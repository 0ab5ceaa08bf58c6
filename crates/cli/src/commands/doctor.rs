use pesto_core::config::{AppConfig, LoadOptions};
use pesto_db::{connect_with_config, GraphStatsRepository, SqlTopicGraph};
use secrecy::ExposeSecret;
use serde::Serialize;

use crate::commands::{block_on, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
pub struct DoctorCheck {
    pub name: &'static str,
    pub status: CheckStatus,
    pub details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str) -> Self {
        Self {
            name,
            status: CheckStatus::Skipped,
            details: "skipped because configuration did not load".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorReport {
    pub overall_status: CheckStatus,
    pub summary: String,
    pub checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

pub fn build_report() -> DoctorReport {
    let checks = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => vec![
            DoctorCheck::pass("config_validation", "configuration loaded and validated"),
            check_slack_tokens(&config),
            check_admins(&config),
            check_database(&config),
        ],
        Err(error) => vec![
            DoctorCheck::fail("config_validation", error.to_string()),
            DoctorCheck::skipped("slack_token_readiness"),
            DoctorCheck::skipped("admin_roster"),
            DoctorCheck::skipped("database_connectivity"),
        ],
    };

    // An empty admin roster is only a warning, never a failure.
    let all_pass = checks
        .iter()
        .all(|check| check.status == CheckStatus::Pass || check.name == "admin_roster");
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_slack_tokens(config: &AppConfig) -> DoctorCheck {
    let app = config.slack.app_token.expose_secret().trim();
    let bot = config.slack.bot_token.expose_secret().trim();
    if app.starts_with("xapp-") && bot.starts_with("xoxb-") {
        DoctorCheck::pass("slack_token_readiness", "app and bot token prefixes look valid")
    } else {
        DoctorCheck::fail("slack_token_readiness", "expected xapp- app token and xoxb- bot token")
    }
}

fn check_admins(config: &AppConfig) -> DoctorCheck {
    let admins = &config.slack.admin_user_ids;
    if admins.is_empty() {
        DoctorCheck {
            name: "admin_roster",
            status: CheckStatus::Skipped,
            details: "no admin user ids configured; /pesto commands will be refused".to_string(),
        }
    } else {
        DoctorCheck::pass("admin_roster", format!("{} admin(s) configured", admins.len()))
    }
}

fn check_database(config: &AppConfig) -> DoctorCheck {
    let result = block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| format!("failed to connect to database: {error}"))?;
        pesto_db::ping(&pool).await.map_err(|error| format!("database ping failed: {error}"))?;

        let stats = SqlTopicGraph::new(pool.clone()).stats().await;
        pool.close().await;

        Ok::<_, String>(match stats {
            Ok(stats) => format!(
                "connected using `{}`; graph holds {} members, {} topics, {} relationships",
                config.database.url, stats.members, stats.topics, stats.relationships
            ),
            Err(_) => format!(
                "connected using `{}`; topic graph not migrated yet (run `pesto migrate`)",
                config.database.url
            ),
        })
    });

    match result {
        Ok(Ok(details)) => DoctorCheck::pass("database_connectivity", details),
        Ok(Err(error)) => DoctorCheck::fail("database_connectivity", error),
        Err(error) => DoctorCheck::fail(
            "database_connectivity",
            format!("failed to initialize async runtime: {error}"),
        ),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
