use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use agrivision_core::config::{detect_config_path, AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

/// One reported setting: dotted key, its env override, and the display value.
struct Setting {
    key: &'static str,
    env_key: &'static str,
    value: String,
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    render(&config, detect_config_path())
}

fn render(config: &AppConfig, config_file_path: Option<PathBuf>) -> String {
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for setting in settings(config) {
        let source = field_source(
            setting.key,
            setting.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(format!("- {} = {} (source: {source})", setting.key, setting.value));
    }
    lines.join("\n")
}

fn settings(config: &AppConfig) -> Vec<Setting> {
    let path_or_embedded = |path: &Option<PathBuf>| {
        path.as_ref().map(|path| path.display().to_string()).unwrap_or_else(|| "<embedded>".into())
    };

    vec![
        setting("llm.provider", "AGRIVISION_LLM_PROVIDER", config.llm.provider.as_str()),
        setting("llm.model", "AGRIVISION_LLM_MODEL", &config.llm.model),
        setting(
            "llm.base_url",
            "AGRIVISION_LLM_BASE_URL",
            config.llm.base_url.as_deref().unwrap_or("<unset>"),
        ),
        setting("llm.api_key", "AGRIVISION_LLM_API_KEY", &redact(config.llm.api_key.as_ref())),
        setting(
            "llm.timeout_secs",
            "AGRIVISION_LLM_TIMEOUT_SECS",
            &config.llm.timeout_secs.to_string(),
        ),
        setting("weather.base_url", "AGRIVISION_WEATHER_BASE_URL", &config.weather.base_url),
        setting(
            "weather.api_key",
            "AGRIVISION_WEATHER_API_KEY",
            &redact(config.weather.api_key.as_ref()),
        ),
        setting(
            "weather.timeout_secs",
            "AGRIVISION_WEATHER_TIMEOUT_SECS",
            &config.weather.timeout_secs.to_string(),
        ),
        setting(
            "session.capacity",
            "AGRIVISION_SESSION_CAPACITY",
            &config.session.capacity.to_string(),
        ),
        setting(
            "session.ttl_secs",
            "AGRIVISION_SESSION_TTL_SECS",
            &config.session.ttl_secs.to_string(),
        ),
        setting(
            "session.max_history_turns",
            "AGRIVISION_SESSION_MAX_HISTORY_TURNS",
            &config.session.max_history_turns.to_string(),
        ),
        setting(
            "server.bind_address",
            "AGRIVISION_SERVER_BIND_ADDRESS",
            &config.server.bind_address,
        ),
        setting("server.port", "AGRIVISION_SERVER_PORT", &config.server.port.to_string()),
        setting(
            "data.fertilizer_table_path",
            "AGRIVISION_DATA_FERTILIZER_TABLE_PATH",
            &path_or_embedded(&config.data.fertilizer_table_path),
        ),
        setting(
            "data.crop_model_path",
            "AGRIVISION_DATA_CROP_MODEL_PATH",
            &path_or_embedded(&config.data.crop_model_path),
        ),
        setting("logging.level", "AGRIVISION_LOGGING_LEVEL", &config.logging.level),
        setting(
            "logging.format",
            "AGRIVISION_LOGGING_FORMAT",
            &format!("{:?}", config.logging.format).to_ascii_lowercase(),
        ),
    ]
}

fn setting(key: &'static str, env_key: &'static str, value: &str) -> Setting {
    Setting { key, env_key, value: value.to_string() }
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
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

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn redact(secret: Option<&SecretString>) -> String {
    match secret.map(|secret| secret.expose_secret().trim()) {
        None => "<unset>".to_string(),
        Some("") => "<empty>".to_string(),
        Some(_) => "<redacted>".to_string(),
    }
}
