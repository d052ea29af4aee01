//! Process-wide configuration, loaded once at startup from environment
//! variables with a handful of CLI overrides, validated eagerly so an
//! invalid deployment fails before the router is ever built.

use clap::Parser;
use proxy_types::domain::effort::ReasoningEffort;
use std::collections::HashSet;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Override PORT.
    #[arg(long)]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" => Ok(Environment::Development),
            "production" => Ok(Environment::Production),
            "test" => Ok(Environment::Test),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct RouteEntry {
    pub provider: proxy_types::domain::dialect::Provider,
    pub backend_model: String,
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub environment: Environment,
    pub proxy_api_key: String,
    pub primary: BackendConfig,
    pub secondary: Option<BackendConfig>,
    pub upstream_timeout: Duration,
    pub upstream_max_retries: u8,
    pub default_reasoning_effort: ReasoningEffort,
    pub enable_content_security_validation: bool,
    pub max_request_size: usize,
    pub max_response_size: usize,
    pub max_completion_length: usize,
    pub max_choices_count: usize,
    pub max_conversation_age: Duration,
    pub max_stored_conversations: usize,
    pub max_history_length: usize,
    pub max_history_age: Duration,
    pub max_concurrent_conversations: usize,
    pub breaker_failure_threshold: u32,
    pub breaker_recovery_timeout: Duration,
    pub breaker_max_backoff: Duration,
    pub routing_table: Vec<RouteEntry>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

fn env_var(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn env_var_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_range_usize(
    field: &'static str,
    raw: Option<String>,
    default: usize,
    min: usize,
    max: usize,
) -> Result<usize, ConfigError> {
    let value = match raw {
        Some(v) => v.parse::<usize>().map_err(|_| ConfigError::Invalid {
            field,
            message: format!("'{v}' is not a number"),
        })?,
        None => default,
    };
    if value < min || value > max {
        return Err(ConfigError::Invalid {
            field,
            message: format!("{value} is out of range [{min}, {max}]"),
        });
    }
    Ok(value)
}

fn validate_secret_len(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.len() < 32 || value.len() > 256 {
        return Err(ConfigError::Invalid {
            field,
            message: "must be 32-256 characters".to_string(),
        });
    }
    Ok(())
}

fn validate_model_name(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty()
        || value.len() > 100
        || !value.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Invalid {
            field,
            message: "must be 1-100 alphanumeric/-/_ characters".to_string(),
        });
    }
    Ok(())
}

impl Config {
    /// Builds configuration from the process environment, applying any CLI
    /// overrides, and fails closed on the first invalid value.
    pub fn from_env(args: &Args) -> Result<Self, ConfigError> {
        let proxy_api_key = env_var("PROXY_API_KEY")?;
        validate_secret_len("proxyApiKey", &proxy_api_key)?;

        let upstream_endpoint = env_var("UPSTREAM_ENDPOINT")?;
        if !upstream_endpoint.starts_with("https://") {
            return Err(ConfigError::Invalid {
                field: "upstreamEndpoint",
                message: "must be an HTTPS URL".to_string(),
            });
        }
        let upstream_api_key = env_var("UPSTREAM_API_KEY")?;
        validate_secret_len("upstreamApiKey", &upstream_api_key)?;
        let upstream_model = env_var("UPSTREAM_MODEL")?;
        validate_model_name("upstreamModel", &upstream_model)?;

        let primary = BackendConfig {
            endpoint: upstream_endpoint,
            api_key: upstream_api_key,
            model: upstream_model.clone(),
        };

        let secondary = match (
            env_var_opt("UPSTREAM_SECONDARY_ENDPOINT"),
            env_var_opt("UPSTREAM_SECONDARY_API_KEY"),
            env_var_opt("UPSTREAM_SECONDARY_MODEL"),
        ) {
            (Some(endpoint), Some(api_key), Some(model)) => {
                validate_secret_len("upstreamSecondaryApiKey", &api_key)?;
                validate_model_name("upstreamSecondaryModel", &model)?;
                Some(BackendConfig { endpoint, api_key, model })
            }
            _ => None,
        };

        let port = args
            .port
            .map(Ok)
            .unwrap_or_else(|| parse_range_usize("port", env_var_opt("PORT"), 8080, 1024, 65535).map(|v| v as u16))?;

        let environment = env_var_opt("ENVIRONMENT")
            .map(|v| v.parse::<Environment>().map_err(|message| ConfigError::Invalid { field: "environment", message }))
            .transpose()?
            .unwrap_or(Environment::Production);

        let upstream_timeout_ms = parse_range_usize(
            "upstreamTimeoutMs",
            env_var_opt("UPSTREAM_TIMEOUT_MS"),
            120_000,
            5_000,
            300_000,
        )?;
        let upstream_max_retries = parse_range_usize(
            "upstreamMaxRetries",
            env_var_opt("UPSTREAM_MAX_RETRIES"),
            3,
            0,
            10,
        )? as u8;

        let default_reasoning_effort = env_var_opt("DEFAULT_REASONING_EFFORT")
            .map(|v| {
                v.parse::<ReasoningEffort>().map_err(|_| ConfigError::Invalid {
                    field: "defaultReasoningEffort",
                    message: format!("'{v}' is not a valid reasoning effort"),
                })
            })
            .transpose()?
            .unwrap_or(ReasoningEffort::Medium);

        let enable_content_security_validation = env_var_opt("ENABLE_CONTENT_SECURITY_VALIDATION")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(environment != Environment::Development);

        let max_request_size = parse_range_usize(
            "maxRequestSize",
            env_var_opt("MAX_REQUEST_SIZE"),
            10 * 1024 * 1024,
            1,
            usize::MAX,
        )?;
        let max_response_size = parse_range_usize(
            "maxResponseSize",
            env_var_opt("MAX_RESPONSE_SIZE"),
            5 * 1024 * 1024,
            1,
            usize::MAX,
        )?;
        let max_completion_length = parse_range_usize(
            "maxCompletionLength",
            env_var_opt("MAX_COMPLETION_LENGTH"),
            1_000_000,
            1,
            usize::MAX,
        )?;
        let max_choices_count = parse_range_usize(
            "maxChoicesCount",
            env_var_opt("MAX_CHOICES_COUNT"),
            16,
            1,
            usize::MAX,
        )?;

        let max_conversation_age_secs =
            parse_range_usize("maxConversationAge", env_var_opt("MAX_CONVERSATION_AGE_SECS"), 300, 1, usize::MAX)?;
        let max_stored_conversations =
            parse_range_usize("maxStoredConversations", env_var_opt("MAX_STORED_CONVERSATIONS"), 10_000, 1, usize::MAX)?;
        let max_history_length =
            parse_range_usize("maxHistoryLength", env_var_opt("MAX_HISTORY_LENGTH"), 50, 1, usize::MAX)?;
        let max_history_age_secs =
            parse_range_usize("maxHistoryAge", env_var_opt("MAX_HISTORY_AGE_SECS"), 300, 1, usize::MAX)?;
        let max_concurrent_conversations = parse_range_usize(
            "maxConcurrentConversations",
            env_var_opt("MAX_CONCURRENT_CONVERSATIONS"),
            1_000,
            1,
            usize::MAX,
        )?;

        let breaker_failure_threshold = parse_range_usize(
            "failureThreshold",
            env_var_opt("BREAKER_FAILURE_THRESHOLD"),
            3,
            1,
            1000,
        )? as u32;
        let breaker_recovery_timeout_ms = parse_range_usize(
            "recoveryTimeout",
            env_var_opt("BREAKER_RECOVERY_TIMEOUT_MS"),
            1_000,
            1,
            60_000,
        )?;

        let routing_table = build_routing_table(&primary, secondary.as_ref());

        Ok(Config {
            port,
            environment,
            proxy_api_key,
            primary,
            secondary,
            upstream_timeout: Duration::from_millis(upstream_timeout_ms as u64),
            upstream_max_retries,
            default_reasoning_effort,
            enable_content_security_validation,
            max_request_size,
            max_response_size,
            max_completion_length,
            max_choices_count,
            max_conversation_age: Duration::from_secs(max_conversation_age_secs as u64),
            max_stored_conversations,
            max_history_length,
            max_history_age: Duration::from_secs(max_history_age_secs as u64),
            max_concurrent_conversations,
            breaker_failure_threshold,
            breaker_recovery_timeout: Duration::from_millis(breaker_recovery_timeout_ms as u64),
            breaker_max_backoff: Duration::from_secs(60),
            routing_table,
        })
    }

    /// The default expected-error-kind set for the circuit breaker.
    pub fn default_expected_error_kinds() -> HashSet<&'static str> {
        ["NetworkError", "NetworkTimeout", "UpstreamServerError"].into_iter().collect()
    }
}

fn build_routing_table(primary: &BackendConfig, secondary: Option<&BackendConfig>) -> Vec<RouteEntry> {
    let mut table = vec![RouteEntry {
        provider: proxy_types::domain::dialect::Provider::Primary,
        backend_model: primary.model.clone(),
        aliases: vec![primary.model.clone()],
    }];
    if let Some(secondary) = secondary {
        table.push(RouteEntry {
            provider: proxy_types::domain::dialect::Provider::Secondary,
            backend_model: secondary.model.clone(),
            aliases: vec![secondary.model.clone()],
        });
    }
    table
}
