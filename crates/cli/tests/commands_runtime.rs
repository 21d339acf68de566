use std::env;
use std::sync::{Mutex, OnceLock};

use agrivision_cli::commands::{doctor, fertilizer};
use serde_json::Value;

#[test]
fn fertilizer_reports_largest_deficiency() {
    with_env(&[("AGRIVISION_LLM_PROVIDER", "offline")], || {
        let result = fertilizer::run("rice", 60.0, 40.0, 40.0);
        assert_eq!(result.exit_code, 0, "expected fertilizer advice");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "fertilizer");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["data"]["type"], "Nitrogen");
        assert_eq!(payload["data"]["deficiency"], 20.0);
    });
}

#[test]
fn fertilizer_reports_balanced_soil() {
    with_env(&[("AGRIVISION_LLM_PROVIDER", "offline")], || {
        let result = fertilizer::run("rice", 80.0, 40.0, 40.0);
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["type"], "balanced");
    });
}

#[test]
fn fertilizer_rejects_unknown_crop() {
    with_env(&[("AGRIVISION_LLM_PROVIDER", "offline")], || {
        let result = fertilizer::run("Tomato", 10.0, 10.0, 10.0);
        assert_eq!(result.exit_code, 4, "expected unknown crop code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "unknown_crop");
    });
}

#[test]
fn fertilizer_returns_config_failure_without_llm_key() {
    with_env(&[("AGRIVISION_LLM_PROVIDER", "openai")], || {
        let result = fertilizer::run("rice", 60.0, 40.0, 40.0);
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn doctor_json_passes_for_offline_setup() {
    with_env(&[("AGRIVISION_LLM_PROVIDER", "offline")], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "pass");
        assert_eq!(payload["checks"][0]["name"], "config_validation");
    });
}

#[test]
fn doctor_fails_when_reference_path_is_missing() {
    with_env(
        &[
            ("AGRIVISION_LLM_PROVIDER", "offline"),
            ("AGRIVISION_DATA_FERTILIZER_TABLE_PATH", "/nonexistent/fertilizer.csv"),
        ],
        || {
            let result = doctor::run(false);
            assert_eq!(result.exit_code, 1);
            assert!(result.output.starts_with("doctor: one or more readiness checks failed"));
        },
    );
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "AGRIVISION_LLM_PROVIDER",
        "AGRIVISION_LLM_API_KEY",
        "AGRIVISION_LLM_BASE_URL",
        "AGRIVISION_LLM_MODEL",
        "AGRIVISION_LLM_TIMEOUT_SECS",
        "AGRIVISION_WEATHER_API_KEY",
        "AGRIVISION_WEATHER_BASE_URL",
        "AGRIVISION_WEATHER_TIMEOUT_SECS",
        "AGRIVISION_DATA_FERTILIZER_TABLE_PATH",
        "AGRIVISION_DATA_CROP_MODEL_PATH",
        "AGRIVISION_LOGGING_LEVEL",
        "AGRIVISION_LOGGING_FORMAT",
        "GEMINI_API_KEY",
        "OPENWEATHER_API_KEY",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
