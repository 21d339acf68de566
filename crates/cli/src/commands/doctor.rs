use agrivision_core::agronomy::crop_model::CropModel;
use agrivision_core::agronomy::fertilizer::FertilizerTable;
use agrivision_core::config::{AppConfig, LlmProvider, LoadOptions};
use secrecy::ExposeSecret;
use serde::Serialize;

use super::{load_crop_model, load_reference_table, CommandResult};

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

const CHECKS_AFTER_CONFIG: [&str; 4] =
    ["fertilizer_reference_table", "crop_model", "llm_provider", "weather_provider"];

pub fn run(json_output: bool) -> CommandResult {
    let report = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => build_report(Some(&config), None),
        Err(error) => build_report(None, Some(error.to_string())),
    };
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report(config: Option<&AppConfig>, config_error: Option<String>) -> DoctorReport {
    let mut checks = Vec::new();

    match config {
        Some(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_reference_table(config));
            checks.push(check_crop_model(config));
            checks.push(check_llm_provider(config));
            checks.push(check_weather_provider(config));
        }
        None => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: config_error.unwrap_or_else(|| "configuration did not load".to_string()),
            });
            checks.extend(CHECKS_AFTER_CONFIG.into_iter().map(|name| DoctorCheck {
                name,
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            }));
        }
    }

    // Skipped checks are advisory; only failures fail the report.
    let any_failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_reference_table(config: &AppConfig) -> DoctorCheck {
    let name = "fertilizer_reference_table";
    match load_reference_table(config) {
        Ok(table) => DoctorCheck {
            name,
            status: CheckStatus::Pass,
            details: format!("{} crops loaded", table.len()),
        },
        Err(error) => DoctorCheck { name, status: CheckStatus::Fail, details: error.to_string() },
    }
}

fn check_crop_model(config: &AppConfig) -> DoctorCheck {
    let name = "crop_model";
    match load_crop_model(config) {
        Ok(model) => DoctorCheck {
            name,
            status: CheckStatus::Pass,
            details: format!("{} crop classes loaded", model.classes()),
        },
        Err(error) => DoctorCheck { name, status: CheckStatus::Fail, details: error.to_string() },
    }
}

fn check_llm_provider(config: &AppConfig) -> DoctorCheck {
    let name = "llm_provider";
    match config.llm.provider {
        LlmProvider::Offline => DoctorCheck {
            name,
            status: CheckStatus::Skipped,
            details: "offline provider: replies use deterministic fallbacks".to_string(),
        },
        provider => DoctorCheck {
            name,
            status: CheckStatus::Pass,
            details: format!("{} provider with model `{}`", provider.as_str(), config.llm.model),
        },
    }
}

fn check_weather_provider(config: &AppConfig) -> DoctorCheck {
    let configured = config
        .weather
        .api_key
        .as_ref()
        .map(|key| !key.expose_secret().trim().is_empty())
        .unwrap_or(false);

    if configured {
        DoctorCheck {
            name: "weather_provider",
            status: CheckStatus::Pass,
            details: format!("api key present for `{}`", config.weather.base_url),
        }
    } else {
        DoctorCheck {
            name: "weather_provider",
            status: CheckStatus::Skipped,
            details: "weather.api_key is unset; weather requests will fail".to_string(),
        }
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
