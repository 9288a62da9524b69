use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use cartwright_core::config::{AppConfig, DEFAULT_CONFIG_FILE};
use toml::Value;

pub fn run(config: &AppConfig) -> String {
    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let lines = [
        "effective config (source precedence: env > file > default):".to_string(),
        render_line(
            "engine.currency",
            &config.engine.currency,
            source("engine.currency", &["CARTWRIGHT_ENGINE_CURRENCY"]),
        ),
        render_line(
            "engine.minor_unit_scale",
            &config.engine.minor_unit_scale.to_string(),
            source("engine.minor_unit_scale", &["CARTWRIGHT_ENGINE_MINOR_UNIT_SCALE"]),
        ),
        render_line(
            "engine.rounding",
            &format!("{:?}", config.engine.rounding),
            source("engine.rounding", &["CARTWRIGHT_ENGINE_ROUNDING"]),
        ),
        render_line(
            "engine.empty_bogo_allow_list",
            &format!("{:?}", config.engine.empty_bogo_allow_list),
            source("engine.empty_bogo_allow_list", &["CARTWRIGHT_ENGINE_EMPTY_BOGO_ALLOW_LIST"]),
        ),
        render_line(
            "logging.level",
            &config.logging.level,
            source("logging.level", &["CARTWRIGHT_LOGGING_LEVEL", "CARTWRIGHT_LOG_LEVEL"]),
        ),
        render_line(
            "logging.format",
            &format!("{:?}", config.logging.format),
            source("logging.format", &["CARTWRIGHT_LOGGING_FORMAT", "CARTWRIGHT_LOG_FORMAT"]),
        ),
    ];

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from(DEFAULT_CONFIG_FILE);
    if root.exists() {
        return Some(root);
    }

    let nested = Path::new("config").join(DEFAULT_CONFIG_FILE);
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
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

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
