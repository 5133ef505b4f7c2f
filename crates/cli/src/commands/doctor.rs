use serde::Serialize;
use slackdify_core::config::{AppConfig, LoadOptions};
use slackdify_slack::web::SlackWebClient;

use crate::commands::{CommandResult, EXIT_CHECK_FAILED, EXIT_OK};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code =
        if report.overall_status == CheckStatus::Pass { EXIT_OK } else { EXIT_CHECK_FAILED };

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return CommandResult::raw(exit_code, output);
    }

    CommandResult::raw(exit_code, render_human(&report))
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: format!(
                    "configuration loaded and validated (mode `{}`)",
                    config.bot.mode.as_str()
                ),
            });
            checks.push(check_answer_service(&config));
            checks.push(check_slack_identity(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["answer_service_config", "slack_identity"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    // Skipped checks are neutral; only failures flip the overall status.
    let any_failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_answer_service(config: &AppConfig) -> DoctorCheck {
    if !config.bot.mode.requires_answer_service() {
        return DoctorCheck {
            name: "answer_service_config",
            status: CheckStatus::Skipped,
            details: format!(
                "mode `{}` does not call the answer service",
                config.bot.mode.as_str()
            ),
        };
    }

    DoctorCheck {
        name: "answer_service_config",
        status: CheckStatus::Pass,
        details: format!(
            "dify endpoint `{}` configured",
            config.dify.api_url.as_deref().unwrap_or("<unset>")
        ),
    }
}

fn check_slack_identity(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "slack_identity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let web = SlackWebClient::from_config(&config.slack);
    match runtime.block_on(web.auth_test()) {
        Ok(auth) => DoctorCheck {
            name: "slack_identity",
            status: CheckStatus::Pass,
            details: format!(
                "auth.test accepted the bot token as <@{}> in {}",
                auth.user_id,
                auth.team.as_deref().unwrap_or("unknown team")
            ),
        },
        Err(error) => DoctorCheck {
            name: "slack_identity",
            status: CheckStatus::Fail,
            details: format!("auth.test failed: {error}"),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

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

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
