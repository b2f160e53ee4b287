use std::sync::{PoisonError, RwLock};

use anyhow::{Context, Result};
use keyring::Entry;
use tracing::debug;

const SERVICE_NAME: &str = "leadboard";

/// Keychain account the session token is stored under
const TOKEN_ACCOUNT: &str = "session-token";

/// Source of the persisted bearer token.
///
/// `token` is read synchronously before every request.
pub trait CredentialSource: Send + Sync {
    fn token(&self) -> Option<String>;

    fn store_token(&self, token: &str) -> Result<()>;

    fn clear_token(&self) -> Result<()>;
}

/// Token held in process memory only.
#[derive(Debug, Default)]
pub struct MemoryCredentials {
    token: RwLock<Option<String>>,
}

impl MemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }
}

impl CredentialSource for MemoryCredentials {
    fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn store_token(&self, token: &str) -> Result<()> {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
        Ok(())
    }

    fn clear_token(&self) -> Result<()> {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Token persisted in the OS keychain, so it survives restarts.
#[derive(Debug, Clone)]
pub struct KeyringCredentials {
    account: String,
}

impl Default for KeyringCredentials {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyringCredentials {
    pub fn new() -> Self {
        Self::for_account(TOKEN_ACCOUNT)
    }

    pub fn for_account(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(SERVICE_NAME, &self.account).context("Failed to create keyring entry")
    }
}

impl CredentialSource for KeyringCredentials {
    fn token(&self) -> Option<String> {
        let entry = match self.entry() {
            Ok(entry) => entry,
            Err(e) => {
                debug!(error = %e, "Keychain unavailable, treating as signed out");
                return None;
            }
        };
        match entry.get_password() {
            Ok(token) if !token.is_empty() => Some(token),
            Ok(_) | Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                debug!(error = %e, "Failed to read token from keychain");
                None
            }
        }
    }

    fn store_token(&self, token: &str) -> Result<()> {
        self.entry()?
            .set_password(token)
            .context("Failed to store token in keychain")
    }

    fn clear_token(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete token from keychain"),
        }
    }
}
