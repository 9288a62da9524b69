use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::discount::eligibility::EmptyAllowListPolicy;
use crate::discount::{EngineSettings, RoundingPolicy};

pub const DEFAULT_CONFIG_FILE: &str = "cartwright.toml";
const MAX_MINOR_UNIT_SCALE: u32 = 4;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EngineConfig {
    /// ISO 4217 code reported on every quote.
    pub currency: String,
    pub minor_unit_scale: u32,
    pub rounding: RoundingPolicy,
    pub empty_bogo_allow_list: EmptyAllowListPolicy,
}

impl EngineConfig {
    pub fn settings(&self) -> EngineSettings {
        EngineSettings {
            minor_unit_scale: self.minor_unit_scale,
            rounding: self.rounding,
            empty_bogo_allow_list: self.empty_bogo_allow_list,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub currency: Option<String>,
    pub minor_unit_scale: Option<u32>,
    pub rounding: Option<RoundingPolicy>,
    pub empty_bogo_allow_list: Option<EmptyAllowListPolicy>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        let settings = EngineSettings::default();
        Self {
            engine: EngineConfig {
                currency: "USD".to_string(),
                minor_unit_scale: settings.minor_unit_scale,
                rounding: settings.rounding,
                empty_bogo_allow_list: settings.empty_bogo_allow_list,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl std::str::FromStr for RoundingPolicy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "half_up" => Ok(Self::HalfUp),
            "half_even" | "bankers" => Ok(Self::HalfEven),
            other => Err(ConfigError::Validation(format!(
                "unsupported rounding policy `{other}` (expected half_up|half_even)"
            ))),
        }
    }
}

impl std::str::FromStr for EmptyAllowListPolicy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "all_lines" => Ok(Self::AllLines),
            "no_lines" => Ok(Self::NoLines),
            other => Err(ConfigError::Validation(format!(
                "unsupported empty allow-list policy `{other}` (expected all_lines|no_lines)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(engine) = patch.engine {
            if let Some(currency) = engine.currency {
                self.engine.currency = currency.trim().to_owned();
            }
            if let Some(minor_unit_scale) = engine.minor_unit_scale {
                self.engine.minor_unit_scale = minor_unit_scale;
            }
            if let Some(rounding) = engine.rounding {
                self.engine.rounding = rounding;
            }
            if let Some(policy) = engine.empty_bogo_allow_list {
                self.engine.empty_bogo_allow_list = policy;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("CARTWRIGHT_ENGINE_CURRENCY") {
            self.engine.currency = value.trim().to_owned();
        }
        if let Some(value) = read_env("CARTWRIGHT_ENGINE_MINOR_UNIT_SCALE") {
            self.engine.minor_unit_scale =
                parse_u32("CARTWRIGHT_ENGINE_MINOR_UNIT_SCALE", &value)?;
        }
        if let Some(value) = read_env("CARTWRIGHT_ENGINE_ROUNDING") {
            self.engine.rounding = value.parse()?;
        }
        if let Some(value) = read_env("CARTWRIGHT_ENGINE_EMPTY_BOGO_ALLOW_LIST") {
            self.engine.empty_bogo_allow_list = value.parse()?;
        }

        let log_level =
            read_env("CARTWRIGHT_LOGGING_LEVEL").or_else(|| read_env("CARTWRIGHT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CARTWRIGHT_LOGGING_FORMAT").or_else(|| read_env("CARTWRIGHT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(currency) = overrides.currency {
            self.engine.currency = currency.trim().to_owned();
        }
        if let Some(minor_unit_scale) = overrides.minor_unit_scale {
            self.engine.minor_unit_scale = minor_unit_scale;
        }
        if let Some(rounding) = overrides.rounding {
            self.engine.rounding = rounding;
        }
        if let Some(policy) = overrides.empty_bogo_allow_list {
            self.engine.empty_bogo_allow_list = policy;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_engine(&self.engine)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), Path::new("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_engine(engine: &EngineConfig) -> Result<(), ConfigError> {
    let currency = engine.currency.as_str();
    if currency.len() != 3 || !currency.chars().all(|ch| ch.is_ascii_uppercase()) {
        return Err(ConfigError::Validation(format!(
            "engine.currency must be a three-letter uppercase ISO 4217 code, got `{currency}`"
        )));
    }

    if engine.minor_unit_scale > MAX_MINOR_UNIT_SCALE {
        return Err(ConfigError::Validation(format!(
            "engine.minor_unit_scale must be in range 0..={MAX_MINOR_UNIT_SCALE}"
        )));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    engine: Option<EnginePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct EnginePatch {
    currency: Option<String>,
    minor_unit_scale: Option<u32>,
    rounding: Option<RoundingPolicy>,
    empty_bogo_allow_list: Option<EmptyAllowListPolicy>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
