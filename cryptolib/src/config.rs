//! Configuration loader. The pepper itself is never stored in the config
//! file; the file only says where to find it.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::crypto::cascade::LegacyCascade;
use crate::crypto::digest::AlgorithmPair;
use crate::crypto::passwords::{HashError, KeyedHasher, DEFAULT_ITERATIONS};
use crate::crypto::pepper::{self, Pepper, PepperError};
use crate::crypto::random::SALT_LENGTH;
use crate::crypto::secrets::AuthenticatedCipher;

/// Environment variable consulted by [`RuntimeConfig::from_env`].
pub const PEPPER_ENV: &str = "CRYPTOLIB_PEPPER";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file unreadable: {0}")]
    Io(String),
    #[error("config parse failed: {0}")]
    Parse(String),
    #[error("no usable pepper source configured")]
    MissingPepperSource,
    #[error("pepper source unreadable: {0}")]
    PepperSource(String),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error(transparent)]
    Pepper(#[from] PepperError),
    #[error(transparent)]
    Algorithm(#[from] HashError),
}

#[derive(Debug, Deserialize)]
pub struct PepperConfig {
    /// Environment variable holding the pepper.
    pub env: Option<String>,
    /// File whose trimmed contents are the pepper.
    pub path: Option<PathBuf>,
}

impl PepperConfig {
    fn resolve(&self) -> Result<Pepper, ConfigError> {
        if let Some(var) = &self.env {
            let value = std::env::var(var)
                .map_err(|e| ConfigError::PepperSource(format!("{var}: {e}")))?;
            return Ok(Pepper::new(value)?);
        }
        if let Some(path) = &self.path {
            let value = fs::read_to_string(path)
                .map_err(|e| ConfigError::PepperSource(format!("{}: {e}", path.display())))?;
            return Ok(Pepper::new(value.trim())?);
        }
        Err(ConfigError::MissingPepperSource)
    }
}

#[derive(Debug, Deserialize)]
pub struct RawCryptoConfig {
    pub pepper: PepperConfig,
    pub iterations: Option<u32>,
    #[serde(rename = "saltLength")]
    pub salt_length: Option<usize>,
    pub algorithms: Option<[String; 2]>,
    #[serde(rename = "logLevel")]
    pub log_level: Option<String>,
}

#[derive(Debug)]
pub struct RuntimeConfig {
    pub pepper: Arc<Pepper>,
    pub iterations: u32,
    pub salt_length: usize,
    pub algorithms: AlgorithmPair,
    pub log_level: Option<String>,
}

impl RuntimeConfig {
    /// Configuration with default parameters. The pepper comes from
    /// `CRYPTOLIB_PEPPER` when it is set, otherwise the process-wide pepper
    /// is shared.
    pub fn from_env() -> Result<Self, ConfigError> {
        let pepper = match std::env::var(PEPPER_ENV) {
            Ok(value) if !value.is_empty() => Arc::new(Pepper::new(value)?),
            _ => pepper::global(),
        };
        Ok(Self {
            pepper,
            iterations: DEFAULT_ITERATIONS,
            salt_length: SALT_LENGTH,
            algorithms: AlgorithmPair::default(),
            log_level: None,
        })
    }

    pub fn keyed_hasher(&self) -> KeyedHasher {
        KeyedHasher::new(Arc::clone(&self.pepper))
            .with_iterations(self.iterations)
            .with_salt_length(self.salt_length)
            .with_algorithms(self.algorithms)
    }

    pub fn cipher(&self) -> AuthenticatedCipher {
        AuthenticatedCipher::new(self.keyed_hasher())
    }

    pub fn cascade(&self) -> LegacyCascade {
        LegacyCascade::new(self.keyed_hasher())
    }

    /// Copies the configured pepper into the process-wide cell used by the
    /// free functions.
    pub fn install_global_pepper(&self) -> Result<(), ConfigError> {
        pepper::set_pepper(self.pepper.get().as_str())?;
        Ok(())
    }
}

/// Loads the JSON configuration file and resolves the pepper. The pepper
/// value never leaves the returned [`Pepper`] cell.
pub fn load_config(path: impl AsRef<Path>) -> Result<RuntimeConfig, ConfigError> {
    let raw_json = fs::read_to_string(&path).map_err(|e| ConfigError::Io(format!("{e}")))?;
    let raw_config: RawCryptoConfig =
        serde_json::from_str(&raw_json).map_err(|e| ConfigError::Parse(format!("{e}")))?;

    let iterations = raw_config.iterations.unwrap_or(DEFAULT_ITERATIONS);
    if iterations == 0 {
        return Err(ConfigError::Invalid("iterations must be at least 1".to_string()));
    }
    let salt_length = raw_config.salt_length.unwrap_or(SALT_LENGTH);
    if salt_length == 0 {
        return Err(ConfigError::Invalid("saltLength must be at least 1".to_string()));
    }
    let algorithms = match &raw_config.algorithms {
        Some([primary, secondary]) => AlgorithmPair::from_names(primary, secondary)?,
        None => AlgorithmPair::default(),
    };

    let pepper = raw_config.pepper.resolve()?;
    tracing::debug!(iterations, salt_length, "loaded crypto config");

    Ok(RuntimeConfig {
        pepper: Arc::new(pepper),
        iterations,
        salt_length,
        algorithms,
        log_level: raw_config.log_level,
    })
}
