//! Operator configuration
//!
//! Every setting is a flag with an environment fallback. [`OperatorArgs`] is the
//! raw clap surface; [`OperatorArgs::into_config`] validates it into an
//! [`OperatorConfig`] the rest of the operator consumes.

use std::time::Duration;

use clap::{ArgAction, Args};
use thiserror::Error;

use kyma_common::backoff::BackoffConfig;
use kyma_common::telemetry::LogFormat;

use crate::dependents::{DependentsConfig, ServerlessSettings};
use crate::dispatch::{DispatchConfig, DEFAULT_RECONCILE_TIMEOUT, DEFAULT_WORKERS};
use crate::watch::{DEFAULT_WATCH_TIMEOUT, MAX_WATCH_TIMEOUT};

/// Largest accepted retry ceiling; redelivery timers beyond it are not useful
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Invalid operator configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A numeric setting that must be positive was zero
    #[error("{setting} must be greater than zero")]
    Zero {
        /// Flag name
        setting: &'static str,
    },

    /// The retry ceiling is below the first retry delay
    #[error("retry max delay ({max:?}) is shorter than the initial delay ({initial:?})")]
    RetryBounds {
        /// Initial delay
        initial: Duration,
        /// Maximum delay
        max: Duration,
    },

    /// The retry ceiling is above [`MAX_RETRY_DELAY`]
    #[error("--retry-max-delay-secs must be at most {limit:?}, got {max:?}")]
    RetryCeilingTooLong {
        /// Requested ceiling
        max: Duration,
        /// Largest accepted ceiling
        limit: Duration,
    },

    /// The watch timeout exceeds what the API server accepts
    #[error("--watch-timeout-secs must be at most {max:?}, got {value:?}")]
    WatchTimeoutTooLong {
        /// Requested timeout
        value: Duration,
        /// Largest accepted timeout
        max: Duration,
    },

    /// Serverless is enabled without repository settings
    #[error("{setting} is required when ServerlessConfiguration is enabled")]
    MissingServerlessSetting {
        /// Flag name
        setting: &'static str,
    },
}

/// Runtime flags of the controller
#[derive(Args, Debug, Clone)]
pub struct OperatorArgs {
    /// Namespace to watch for Kyma resources (all namespaces when unset)
    #[arg(long, env = "WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,

    /// Number of Kyma resources reconciled concurrently
    #[arg(long, env = "RECONCILE_WORKERS", default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,

    /// Deadline for a single reconciliation, in seconds
    #[arg(long, env = "RECONCILE_TIMEOUT_SECS", default_value_t = DEFAULT_RECONCILE_TIMEOUT.as_secs())]
    pub reconcile_timeout_secs: u64,

    /// Server-side watch timeout, in seconds
    #[arg(long, env = "WATCH_TIMEOUT_SECS", default_value_t = DEFAULT_WATCH_TIMEOUT.as_secs())]
    pub watch_timeout_secs: u64,

    /// Delay before the first retry of a failed reconciliation, in milliseconds
    #[arg(long, env = "RETRY_INITIAL_DELAY_MS", default_value_t = 500)]
    pub retry_initial_delay_ms: u64,

    /// Upper bound on the retry delay, in seconds
    #[arg(long, env = "RETRY_MAX_DELAY_SECS", default_value_t = 300)]
    pub retry_max_delay_secs: u64,

    /// Create an IstioConfiguration for every Kyma
    #[arg(
        long,
        env = "ENABLE_ISTIO_CONFIGURATION",
        default_value_t = false,
        action = ArgAction::Set
    )]
    pub enable_istio_configuration: bool,

    /// Create a ServerlessConfiguration for every Kyma
    #[arg(
        long,
        env = "ENABLE_SERVERLESS_CONFIGURATION",
        default_value_t = true,
        action = ArgAction::Set
    )]
    pub enable_serverless_configuration: bool,

    /// Function source repository written into ServerlessConfiguration
    #[arg(long, env = "SERVERLESS_REPOSITORY_URL")]
    pub serverless_repository_url: Option<String>,

    /// Auth key for the function source repository
    #[arg(long, env = "SERVERLESS_REPOSITORY_AUTH_KEY", hide_env_values = true)]
    pub serverless_repository_auth_key: Option<String>,

    /// Log output format (json or text)
    #[arg(long, env = "LOG_FORMAT", default_value = "json")]
    pub log_format: LogFormat,
}

/// Validated operator configuration
#[derive(Clone, Debug)]
pub struct OperatorConfig {
    /// Namespace to watch; `None` watches all namespaces
    pub watch_namespace: Option<String>,
    /// Server-side watch timeout
    pub watch_timeout: Duration,
    /// Dispatcher tuning
    pub dispatch: DispatchConfig,
    /// Dependent kinds and their parameters
    pub dependents: DependentsConfig,
    /// Log output format
    pub log_format: LogFormat,
}

fn positive(value: u64, setting: &'static str) -> Result<u64, ConfigError> {
    if value == 0 {
        Err(ConfigError::Zero { setting })
    } else {
        Ok(value)
    }
}

fn required(
    value: Option<String>,
    setting: &'static str,
) -> Result<String, ConfigError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::MissingServerlessSetting { setting })
}

impl OperatorArgs {
    /// Validate the flags
    pub fn into_config(self) -> Result<OperatorConfig, ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Zero {
                setting: "--workers",
            });
        }
        let reconcile_timeout = Duration::from_secs(positive(
            self.reconcile_timeout_secs,
            "--reconcile-timeout-secs",
        )?);
        let watch_timeout =
            Duration::from_secs(positive(self.watch_timeout_secs, "--watch-timeout-secs")?);
        if watch_timeout > MAX_WATCH_TIMEOUT {
            return Err(ConfigError::WatchTimeoutTooLong {
                value: watch_timeout,
                max: MAX_WATCH_TIMEOUT,
            });
        }
        let initial = Duration::from_millis(positive(
            self.retry_initial_delay_ms,
            "--retry-initial-delay-ms",
        )?);
        let max = Duration::from_secs(positive(
            self.retry_max_delay_secs,
            "--retry-max-delay-secs",
        )?);
        if max > MAX_RETRY_DELAY {
            return Err(ConfigError::RetryCeilingTooLong {
                max,
                limit: MAX_RETRY_DELAY,
            });
        }
        if max < initial {
            return Err(ConfigError::RetryBounds { initial, max });
        }

        // Settings are only demanded when the kind is enabled; deletion of a
        // disabled kind never reads them.
        let serverless = if self.enable_serverless_configuration {
            ServerlessSettings::new(
                required(self.serverless_repository_url, "--serverless-repository-url")?,
                required(
                    self.serverless_repository_auth_key,
                    "--serverless-repository-auth-key",
                )?,
            )
        } else {
            ServerlessSettings::new(
                self.serverless_repository_url.unwrap_or_default(),
                self.serverless_repository_auth_key.unwrap_or_default(),
            )
        };

        Ok(OperatorConfig {
            watch_namespace: self.watch_namespace.filter(|ns| !ns.is_empty()),
            watch_timeout,
            dispatch: DispatchConfig {
                workers: self.workers,
                reconcile_timeout,
                backoff: BackoffConfig::new(initial, max),
            },
            dependents: DependentsConfig {
                istio_enabled: self.enable_istio_configuration,
                serverless_enabled: self.enable_serverless_configuration,
                serverless,
            },
            log_format: self.log_format,
        })
    }
}
