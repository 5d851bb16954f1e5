use crate::error::StoreError;
use crate::token::TokenRecord;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default token file name
pub const DEFAULT_TOKEN_FILE: &str = "tiktok_tokens.json";

/// Account name used when none is given
pub const DEFAULT_ACCOUNT: &str = "default";

/// Keyed storage for token records.
///
/// The flat JSON file is the only implementation today; anything that can
/// load and save a record per account (a keychain, a secret manager) fits.
pub trait TokenStore {
    /// Load the record for `account`, or [`StoreError::NotFound`].
    fn load(&self, account: &str) -> Result<TokenRecord, StoreError>;

    /// Store `record` for `account`, replacing any previous one.
    fn save(&self, account: &str, record: &TokenRecord) -> Result<(), StoreError>;

    /// Every stored record, keyed by account.
    fn accounts(&self) -> Result<BTreeMap<String, TokenRecord>, StoreError>;
}

/// Token records persisted as a pretty-printed JSON object `{ account: record }`
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn display_path(&self) -> String {
        self.path.display().to_string()
    }

    fn read_all(&self) -> Result<Option<BTreeMap<String, TokenRecord>>, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.display_path(),
                    source,
                });
            }
        };

        let records = serde_json::from_str(&content).map_err(|source| StoreError::Parse {
            path: self.display_path(),
            source,
        })?;
        Ok(Some(records))
    }

    fn write_all(&self, records: &BTreeMap<String, TokenRecord>) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(records).map_err(|source| StoreError::Parse {
            path: self.display_path(),
            source,
        })?;

        std::fs::write(&self.path, content).map_err(|source| StoreError::Io {
            path: self.display_path(),
            source,
        })?;

        // Owner read/write only on Unix-like systems
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.path, permissions).map_err(|source| {
                StoreError::Io {
                    path: self.display_path(),
                    source,
                }
            })?;
        }

        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self, account: &str) -> Result<TokenRecord, StoreError> {
        self.read_all()?
            .and_then(|mut records| records.remove(account))
            .ok_or_else(|| StoreError::NotFound(account.to_string()))
    }

    fn save(&self, account: &str, record: &TokenRecord) -> Result<(), StoreError> {
        let mut records = self.read_all()?.unwrap_or_default();
        records.insert(account.to_string(), record.clone());
        self.write_all(&records)?;
        tracing::debug!(account, path = %self.path.display(), "saved OAuth token");
        Ok(())
    }

    fn accounts(&self) -> Result<BTreeMap<String, TokenRecord>, StoreError> {
        Ok(self.read_all()?.unwrap_or_default())
    }
}
