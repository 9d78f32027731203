use alloy::primitives::{Address, FixedBytes};
use alloy::signers::local::{LocalSignerError, PrivateKeySigner};
use clap::Parser;
use serde::Deserialize;
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;
use url::Url;

use crate::cctp::{AttestationPolling, CIRCLE_SANDBOX_API_BASE, CctpError, CircleClient};
use crate::chain::{Chain, ChainContracts};
use crate::relayer::BalanceWait;
use crate::telemetry::{TelemetryConfig, TelemetryCtx, TelemetrySecrets};

#[derive(Parser, Debug)]
pub struct Env {
    /// Path to plaintext TOML configuration file
    #[clap(long)]
    pub config: PathBuf,
    /// Path to TOML secrets file
    #[clap(long)]
    pub secrets: PathBuf,
}

/// Non-secret settings deserialized from the plaintext config TOML.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Config {
    database_url: String,
    log_level: Option<LogLevel>,
    server_port: Option<u16>,
    destination_chain: Option<Chain>,
    circle_api_base: Option<String>,
    attestation_poll_interval_secs: Option<u64>,
    attestation_max_attempts: Option<usize>,
    worker_interval_secs: Option<u64>,
    required_confirmations: Option<u64>,
    relayer_url: Option<Url>,
    top_up: Option<bool>,
    #[serde(default)]
    chains: HashMap<Chain, ChainConfig>,
    telemetry: Option<TelemetryConfig>,
}

/// `[chains.<label>]`: RPC endpoint plus optional contract overrides.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ChainConfig {
    rpc_url: Url,
    usdc: Option<Address>,
    token_messenger: Option<Address>,
    message_transmitter: Option<Address>,
    hook_executor: Option<Address>,
}

/// Secret credentials deserialized from the secrets TOML.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Secrets {
    relayer_private_key: Option<FixedBytes<32>>,
    buyer_private_key: Option<FixedBytes<32>>,
    telemetry: Option<TelemetrySecrets>,
}

// ===== Runtime types (assembled from Config + Secrets) =====

#[derive(Debug, Clone)]
pub struct ChainCtx {
    pub(crate) rpc_url: Url,
    pub(crate) contracts: ChainContracts,
}

/// Combined runtime context for the server and CLI.
#[derive(Debug, Clone)]
pub struct Ctx {
    pub(crate) database_url: String,
    pub log_level: LogLevel,
    pub(crate) server_port: u16,
    pub(crate) destination_chain: Chain,
    pub(crate) circle_api_base: String,
    pub(crate) attestation: AttestationPolling,
    pub(crate) worker_interval: Duration,
    pub(crate) required_confirmations: u64,
    pub(crate) relayer_url: Option<Url>,
    pub(crate) top_up: bool,
    pub(crate) chains: HashMap<Chain, ChainCtx>,
    pub(crate) relayer_signer: Option<PrivateKeySigner>,
    pub(crate) buyer_signer: Option<PrivateKeySigner>,
    pub(crate) telemetry: Option<TelemetryCtx>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(log_level: LogLevel) -> Self {
        match log_level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

pub(crate) async fn configure_sqlite_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await?;

    // WAL lets the CLI read settlements while the server's worker writes.
    // Only one writer at a time is still allowed.
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    // Wait up to 10 seconds for a competing writer instead of failing with
    // "database is locked".
    sqlx::query("PRAGMA busy_timeout = 10000")
        .execute(&pool)
        .await?;

    Ok(pool)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    #[error("failed to parse TOML")]
    Toml(#[from] toml::de::Error),
    #[error("invalid {role} private key")]
    InvalidPrivateKey {
        role: &'static str,
        #[source]
        source: LocalSignerError,
    },
    #[error("{0} private key not configured")]
    MissingPrivateKey(&'static str),
    #[error("no [chains.{0}] section with an rpc_url")]
    ChainNotConfigured(Chain),
    #[error("attestation_max_attempts must be at least 1")]
    InvalidAttestationAttempts,
    #[error("telemetry config present in config but telemetry secrets missing")]
    TelemetrySecretsMissing,
    #[error("telemetry secrets present but telemetry config missing in config")]
    TelemetryConfigMissing,
}

fn signer(
    role: &'static str,
    key: Option<FixedBytes<32>>,
) -> Result<Option<PrivateKeySigner>, ConfigError> {
    key.map(|key| {
        PrivateKeySigner::from_bytes(&key).map_err(|err| ConfigError::InvalidPrivateKey {
            role,
            source: LocalSignerError::from(err),
        })
    })
    .transpose()
}

fn assemble_chains(chains: HashMap<Chain, ChainConfig>) -> HashMap<Chain, ChainCtx> {
    chains
        .into_iter()
        .map(|(chain, config)| {
            let defaults = chain.default_contracts();
            let contracts = ChainContracts {
                usdc: config.usdc.unwrap_or(defaults.usdc),
                token_messenger: config.token_messenger.unwrap_or(defaults.token_messenger),
                message_transmitter: config
                    .message_transmitter
                    .unwrap_or(defaults.message_transmitter),
                hook_executor: config.hook_executor.or(defaults.hook_executor),
            };

            (
                chain,
                ChainCtx {
                    rpc_url: config.rpc_url,
                    contracts,
                },
            )
        })
        .collect()
}

fn assemble_telemetry(
    config: Option<TelemetryConfig>,
    secrets: Option<TelemetrySecrets>,
    log_level: LogLevel,
) -> Result<Option<TelemetryCtx>, ConfigError> {
    match (config, secrets) {
        (Some(config), Some(secrets)) => Ok(Some(TelemetryCtx::new(config, secrets, log_level.into()))),
        (Some(_), None) => Err(ConfigError::TelemetrySecretsMissing),
        (None, Some(_)) => Err(ConfigError::TelemetryConfigMissing),
        (None, None) => Ok(None),
    }
}

impl Ctx {
    pub fn load_files(config: &Path, secrets: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(config)?;
        let secrets_str = std::fs::read_to_string(secrets)?;
        Self::from_toml(&config_str, &secrets_str)
    }

    pub fn from_toml(config_toml: &str, secrets_toml: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(config_toml)?;
        let secrets: Secrets = toml::from_str(secrets_toml)?;

        let log_level = config.log_level.unwrap_or(LogLevel::Debug);
        let telemetry = assemble_telemetry(config.telemetry, secrets.telemetry, log_level)?;

        let max_attempts = config.attestation_max_attempts.unwrap_or(600);
        if max_attempts == 0 {
            return Err(ConfigError::InvalidAttestationAttempts);
        }

        Ok(Self {
            database_url: config.database_url,
            log_level,
            server_port: config.server_port.unwrap_or(8080),
            destination_chain: config.destination_chain.unwrap_or(Chain::BaseSepolia),
            circle_api_base: config
                .circle_api_base
                .unwrap_or_else(|| CIRCLE_SANDBOX_API_BASE.to_string()),
            attestation: AttestationPolling {
                interval: Duration::from_secs(config.attestation_poll_interval_secs.unwrap_or(3)),
                max_attempts,
            },
            worker_interval: Duration::from_secs(config.worker_interval_secs.unwrap_or(30)),
            required_confirmations: config.required_confirmations.unwrap_or(1),
            relayer_url: config.relayer_url,
            top_up: config.top_up.unwrap_or(false),
            chains: assemble_chains(config.chains),
            relayer_signer: signer("relayer", secrets.relayer_private_key)?,
            buyer_signer: signer("buyer", secrets.buyer_private_key)?,
            telemetry,
        })
    }

    pub async fn get_sqlite_pool(&self) -> Result<SqlitePool, sqlx::Error> {
        configure_sqlite_pool(&self.database_url).await
    }

    pub fn telemetry(&self) -> Option<&TelemetryCtx> {
        self.telemetry.as_ref()
    }

    pub(crate) fn chain(&self, chain: Chain) -> Result<&ChainCtx, ConfigError> {
        self.chains
            .get(&chain)
            .ok_or(ConfigError::ChainNotConfigured(chain))
    }

    /// Contract addresses for every supported chain, overrides applied.
    pub(crate) fn contracts(&self) -> HashMap<Chain, ChainContracts> {
        Chain::ALL
            .into_iter()
            .map(|chain| {
                let contracts = self
                    .chains
                    .get(&chain)
                    .map_or_else(|| chain.default_contracts(), |ctx| ctx.contracts);
                (chain, contracts)
            })
            .collect()
    }

    pub(crate) fn circle_client(&self) -> Result<CircleClient, CctpError> {
        CircleClient::new(self.circle_api_base.clone(), self.attestation)
    }

    pub(crate) fn relayer_signer(&self) -> Result<&PrivateKeySigner, ConfigError> {
        self.relayer_signer
            .as_ref()
            .ok_or(ConfigError::MissingPrivateKey("relayer"))
    }

    pub(crate) fn buyer_signer(&self) -> Result<&PrivateKeySigner, ConfigError> {
        self.buyer_signer
            .as_ref()
            .ok_or(ConfigError::MissingPrivateKey("buyer"))
    }

    pub(crate) fn balance_wait(&self) -> BalanceWait {
        BalanceWait::default()
    }
}

pub fn setup_tracing(log_level: LogLevel) {
    let level: Level = log_level.into();
    let default_filter = format!("cartfree={level}");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}
