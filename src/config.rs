//! Configuration for the checker pipeline.
//!
//! Configuration is an explicit struct handed to the pipeline entry point
//! rather than ambient state. Values can be constructed from defaults, loaded
//! from environment variables (with optional `.env` support), or adjusted
//! field by field before the run starts.

use std::env;
use std::fmt;
use std::num::ParseIntError;
use std::path::PathBuf;
use std::sync::Arc;

use dotenvy::dotenv;
use serde::de::{Deserialize, Deserializer, Error as DeError};
use serde::ser::{Serialize, Serializer};
use serde::{Deserialize as DeriveDeserialize, Serialize as DeriveSerialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use thiserror::Error;

type JsonObject = JsonMap<String, JsonValue>;

/// Model used for descriptiveness judgments unless overridden.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Shared logger callback signature used by the configuration.
pub type LoggerCallback = Arc<dyn Fn(&str) + Send + Sync + 'static>;

/// Verbosity level for checker logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Minimal,
    Medium,
    Detailed,
}

impl Verbosity {
    fn as_u8(self) -> u8 {
        match self {
            Verbosity::Minimal => 0,
            Verbosity::Medium => 1,
            Verbosity::Detailed => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Verbosity::Minimal),
            1 => Some(Verbosity::Medium),
            2 => Some(Verbosity::Detailed),
            _ => None,
        }
    }
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::Medium
    }
}

impl Serialize for Verbosity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for Verbosity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = u8::deserialize(deserializer)?;
        Verbosity::from_u8(value).ok_or_else(|| {
            DeError::custom(format!(
                "invalid verbosity value {value}; expected 0, 1, or 2"
            ))
        })
    }
}

/// Configuration values for a checker run.
#[derive(DeriveSerialize, DeriveDeserialize, Clone)]
#[serde(default)]
pub struct CheckerConfig {
    /// API key used to authenticate classification calls.
    #[serde(alias = "modelApiKey")]
    pub model_api_key: Option<String>,
    /// Model name sent with each classification request.
    #[serde(alias = "modelName")]
    pub model_name: String,
    /// Extra client options (api_base, organization, ...) for the provider.
    #[serde(alias = "modelClientOptions")]
    pub model_client_options: Option<JsonObject>,
    /// Path to the Chrome/Chromium executable to launch.
    #[serde(alias = "chromeExecutable")]
    pub chrome_executable: Option<PathBuf>,
    /// Attach to an already-running browser over CDP instead of launching.
    #[serde(alias = "cdpUrl")]
    pub cdp_url: Option<String>,
    pub headless: bool,
    /// Dedicated user-data directory for the launched browser.
    #[serde(alias = "userDataDir")]
    pub user_data_dir: Option<PathBuf>,
    /// Upper bound on waiting for the DOM to settle after navigation.
    #[serde(alias = "domSettleTimeoutMs")]
    pub dom_settle_timeout_ms: u64,
    /// Upper bound on the whole navigation, including the settle wait.
    #[serde(alias = "loadTimeoutMs")]
    pub load_timeout_ms: u64,
    /// Upper bound on a single classification round trip.
    #[serde(alias = "classifyTimeoutMs")]
    pub classify_timeout_ms: u64,
    pub verbose: Verbosity,
    #[serde(skip_serializing, skip_deserializing)]
    pub logger: Option<LoggerCallback>,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        CheckerConfig {
            model_api_key: None,
            model_name: DEFAULT_MODEL.to_string(),
            model_client_options: None,
            chrome_executable: None,
            cdp_url: None,
            headless: true,
            user_data_dir: None,
            dom_settle_timeout_ms: 3_000,
            load_timeout_ms: 30_000,
            classify_timeout_ms: 60_000,
            verbose: Verbosity::default(),
            logger: None,
        }
    }
}

impl CheckerConfig {
    /// Construct a configuration by reading relevant environment variables,
    /// after loading a `.env` file if present.
    pub fn from_env() -> Result<Self, CheckerConfigError> {
        let _ = dotenv();
        let mut config = CheckerConfig::default();

        config.model_api_key = env_var("WCAG_CHECKER_API_KEY")
            .or_else(|| env_var("MODEL_API_KEY"))
            .or_else(|| env_var("ANTHROPIC_API_KEY"))
            .or_else(|| env_var("OPENAI_API_KEY"));

        if let Some(value) = env_var("WCAG_CHECKER_MODEL") {
            config.model_name = value;
        }

        if let Some(value) = env_var("WCAG_CHECKER_MODEL_CLIENT_OPTIONS") {
            config.model_client_options = Some(parse_json_object(
                "WCAG_CHECKER_MODEL_CLIENT_OPTIONS",
                &value,
            )?);
        }

        if let Some(value) = env_var("WCAG_CHECKER_CHROME_BIN") {
            config.chrome_executable = Some(PathBuf::from(value));
        }

        if let Some(value) = env_var("WCAG_CHECKER_CDP_URL") {
            config.cdp_url = Some(value);
        }

        if let Some(value) = env_var("WCAG_CHECKER_HEADLESS") {
            config.headless = parse_bool("WCAG_CHECKER_HEADLESS", &value)?;
        }

        if let Some(value) = env_var("WCAG_CHECKER_USER_DATA_DIR") {
            config.user_data_dir = Some(PathBuf::from(value));
        }

        if let Some(value) = env_var("WCAG_CHECKER_DOM_SETTLE_TIMEOUT_MS") {
            config.dom_settle_timeout_ms = parse_u64("WCAG_CHECKER_DOM_SETTLE_TIMEOUT_MS", &value)?;
        }

        if let Some(value) = env_var("WCAG_CHECKER_LOAD_TIMEOUT_MS") {
            config.load_timeout_ms = parse_u64("WCAG_CHECKER_LOAD_TIMEOUT_MS", &value)?;
        }

        if let Some(value) = env_var("WCAG_CHECKER_CLASSIFY_TIMEOUT_MS") {
            config.classify_timeout_ms = parse_u64("WCAG_CHECKER_CLASSIFY_TIMEOUT_MS", &value)?;
        }

        if let Some(value) = env_var("WCAG_CHECKER_VERBOSE") {
            let parsed = parse_u8("WCAG_CHECKER_VERBOSE", &value)?;
            config.verbose =
                Verbosity::from_u8(parsed).ok_or(CheckerConfigError::InvalidEnumVariant {
                    field: "WCAG_CHECKER_VERBOSE",
                    value: value.clone(),
                })?;
        }

        Ok(config)
    }
}

impl fmt::Debug for CheckerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckerConfig")
            .field("model_api_key", &self.model_api_key.as_ref().map(|_| "***"))
            .field("model_name", &self.model_name)
            .field("model_client_options", &self.model_client_options)
            .field("chrome_executable", &self.chrome_executable)
            .field("cdp_url", &self.cdp_url)
            .field("headless", &self.headless)
            .field("user_data_dir", &self.user_data_dir)
            .field("dom_settle_timeout_ms", &self.dom_settle_timeout_ms)
            .field("load_timeout_ms", &self.load_timeout_ms)
            .field("classify_timeout_ms", &self.classify_timeout_ms)
            .field("verbose", &self.verbose)
            .field("logger_present", &self.logger.is_some())
            .finish()
    }
}

/// Errors that can arise while constructing a [`CheckerConfig`].
#[derive(Debug, Error)]
pub enum CheckerConfigError {
    #[error("invalid value '{value}' for {field}")]
    InvalidEnumVariant { field: &'static str, value: String },
    #[error("invalid boolean '{value}' for {field}")]
    InvalidBool { field: &'static str, value: String },
    #[error("invalid number '{value}' for {field}: {source}")]
    InvalidNumber {
        field: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("{field} must be a JSON object")]
    InvalidJsonType { field: &'static str },
    #[error("invalid JSON for {field}: {source}")]
    InvalidJson {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

fn env_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_bool(field: &'static str, value: &str) -> Result<bool, CheckerConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(CheckerConfigError::InvalidBool {
            field,
            value: value.to_string(),
        }),
    }
}

fn parse_u8(field: &'static str, value: &str) -> Result<u8, CheckerConfigError> {
    value
        .trim()
        .parse::<u8>()
        .map_err(|source| CheckerConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}

fn parse_u64(field: &'static str, value: &str) -> Result<u64, CheckerConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|source| CheckerConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}

fn parse_json_object(field: &'static str, value: &str) -> Result<JsonObject, CheckerConfigError> {
    let parsed: JsonValue = serde_json::from_str(value)
        .map_err(|source| CheckerConfigError::InvalidJson { field, source })?;
    match parsed {
        JsonValue::Object(map) => Ok(map),
        _ => Err(CheckerConfigError::InvalidJsonType { field }),
    }
}
