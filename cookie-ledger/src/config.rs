//! Configuration for the ledger

use crate::crypto::{KeyHolder, DEFAULT_KEY_BITS};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Default tracing filter when `RUST_LOG` is unset
    pub log_filter: String,

    /// Key configuration
    pub keys: KeyConfig,

    /// Actor configuration
    pub actor: ActorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "cookie-ledger".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_filter: "info".to_string(),
            keys: KeyConfig::default(),
            actor: ActorConfig::default(),
        }
    }
}

/// Key configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    /// RSA modulus size for generated keys
    pub bits: usize,

    /// Public key file (base64 DER); set together with `private_key_path`
    pub public_key_path: Option<PathBuf>,

    /// Private key file (base64 DER)
    pub private_key_path: Option<PathBuf>,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            bits: DEFAULT_KEY_BITS,
            public_key_path: None,
            private_key_path: None,
        }
    }
}

impl KeyConfig {
    /// Load the configured key pair, generating and storing it on first use
    ///
    /// Without key paths a fresh, unsaved pair is generated.
    pub fn key_holder(&self) -> crate::Result<KeyHolder> {
        match (&self.public_key_path, &self.private_key_path) {
            (Some(public), Some(private)) if public.exists() && private.exists() => {
                tracing::debug!(path = %public.display(), "Loading key pair");
                KeyHolder::load(public, private)
            }
            (Some(public), Some(private)) => {
                let holder = KeyHolder::generate(self.bits)?;
                holder.save(public, private)?;
                Ok(holder)
            }
            (None, None) => KeyHolder::generate(self.bits),
            _ => Err(crate::Error::Config(
                "public_key_path and private_key_path must be set together".to_string(),
            )),
        }
    }
}

/// Actor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorConfig {
    /// Bounded mailbox capacity (messages)
    pub mailbox_capacity: usize,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1024,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(filter) = std::env::var("COOKIE_LEDGER_LOG") {
            config.log_filter = filter;
        }

        if let Ok(bits) = std::env::var("COOKIE_LEDGER_KEY_BITS") {
            config.keys.bits = parse_var("COOKIE_LEDGER_KEY_BITS", &bits)?;
        }

        if let Ok(path) = std::env::var("COOKIE_LEDGER_PUBLIC_KEY") {
            config.keys.public_key_path = Some(PathBuf::from(path));
        }

        if let Ok(path) = std::env::var("COOKIE_LEDGER_PRIVATE_KEY") {
            config.keys.private_key_path = Some(PathBuf::from(path));
        }

        if let Ok(capacity) = std::env::var("COOKIE_LEDGER_MAILBOX") {
            config.actor.mailbox_capacity = parse_var("COOKIE_LEDGER_MAILBOX", &capacity)?;
        }

        Ok(config)
    }
}

fn parse_var(name: &str, value: &str) -> crate::Result<usize> {
    value
        .parse()
        .map_err(|e| crate::Error::Config(format!("{}={:?}: {}", name, value, e)))
}
