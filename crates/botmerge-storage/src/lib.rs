//! Secure credential storage for provider tokens.
//!
//! Tokens are stored in the operating system's native keychain/credential
//! manager:
//!
//! - **macOS**: Keychain Services
//! - **Windows**: Credential Manager
//! - **Linux**: Secret Service (GNOME Keyring / KWallet)
//!
//! Keys follow the convention `{provider}/{credential_name}`, e.g.
//! `github/token`, `bitbucket/app_password`.

use std::collections::HashMap;
use std::sync::Mutex;

use botmerge_core::{Error, Result};
use keyring::Entry;
use tracing::debug;

/// Service name used in the OS keychain.
const SERVICE_NAME: &str = "botmerge-tools";

/// Credential storage trait.
///
/// Implementations can use the OS keychain or in-memory storage (for
/// testing).
pub trait CredentialStore: Send + Sync {
    /// Store a credential securely.
    fn store(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a stored credential.
    ///
    /// Returns `Ok(None)` if the credential doesn't exist.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Delete a stored credential.
    ///
    /// Returns `Ok(())` even if the credential didn't exist.
    fn delete(&self, key: &str) -> Result<()>;

    /// Check if a credential exists.
    fn exists(&self, key: &str) -> bool {
        matches!(self.get(key), Ok(Some(_)))
    }
}

/// OS keychain-backed credential store.
#[derive(Debug, Default)]
pub struct KeychainStore;

impl KeychainStore {
    pub fn new() -> Self {
        Self
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(SERVICE_NAME, key)
            .map_err(|e| Error::Storage(format!("Failed to access keychain: {e}")))
    }
}

impl CredentialStore for KeychainStore {
    fn store(&self, key: &str, value: &str) -> Result<()> {
        self.entry(key)?
            .set_password(value)
            .map_err(|e| Error::Storage(format!("Failed to store credential '{key}': {e}")))?;
        debug!(key, "Credential stored");
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => {
                debug!(key, "Credential not found");
                Ok(None)
            }
            Err(e) => Err(Error::Storage(format!(
                "Failed to read credential '{key}': {e}"
            ))),
        }
    }

    fn delete(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(Error::Storage(format!(
                "Failed to delete credential '{key}': {e}"
            ))),
        }
    }
}

/// In-memory credential store for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    credentials: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryStore {
    fn store(&self, key: &str, value: &str) -> Result<()> {
        self.credentials
            .lock()
            .expect("credential lock poisoned")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .credentials
            .lock()
            .expect("credential lock poisoned")
            .get(key)
            .cloned())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.credentials
            .lock()
            .expect("credential lock poisoned")
            .remove(key);
        Ok(())
    }
}
