//! Grants from a users file
//!
//! The file is re-read whenever its modification time or size changes, so
//! edited grants apply to the next query without a restart.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;

use super::GrantError;
use crate::domain::access::GrantSource;
use crate::domain::schema::Field;

/// `{users: {<name>: {access: {<datasource>: {<dimension>: [values]}}}}}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UsersFile {
    #[serde(default)]
    pub users: BTreeMap<String, UserEntry>,
}

/// One user's grants. Admin status comes from the token only; an `admin`
/// key in the file is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserEntry {
    #[serde(default)]
    pub access: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

impl FileStamp {
    fn of(metadata: &std::fs::Metadata) -> Self {
        Self {
            modified: metadata.modified().ok(),
            len: metadata.len(),
        }
    }
}

struct Loaded {
    users: Arc<UsersFile>,
    stamp: Option<FileStamp>,
}

pub struct FileGrantSource {
    path: Option<PathBuf>,
    loaded: RwLock<Loaded>,
}

impl FileGrantSource {
    /// Fixed grants that never reload
    pub fn new(users: UsersFile) -> Self {
        Self {
            path: None,
            loaded: RwLock::new(Loaded {
                users: Arc::new(users),
                stamp: None,
            }),
        }
    }

    pub fn load(path: &Path) -> Result<Self, GrantError> {
        let stamp = FileStamp::of(&std::fs::metadata(path)?);
        let users = parse_users(&std::fs::read_to_string(path)?)?;
        tracing::debug!(path = %path.display(), users = users.users.len(), "Loaded users file");
        Ok(Self {
            path: Some(path.to_path_buf()),
            loaded: RwLock::new(Loaded {
                users: Arc::new(users),
                stamp: Some(stamp),
            }),
        })
    }

    /// Current grants, re-reading the file if it changed on disk. A file
    /// that disappears or no longer parses is an error, never "no grants".
    async fn current(&self) -> Result<Arc<UsersFile>, GrantError> {
        let Some(path) = &self.path else {
            return Ok(Arc::clone(&self.loaded.read().users));
        };

        let stamp = FileStamp::of(&tokio::fs::metadata(path).await?);
        {
            let loaded = self.loaded.read();
            if loaded.stamp == Some(stamp) {
                return Ok(Arc::clone(&loaded.users));
            }
        }

        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "Failed to read users file");
            GrantError::Io(e)
        })?;
        let users = Arc::new(parse_users(&content).map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "Invalid users file");
            e
        })?);

        *self.loaded.write() = Loaded {
            users: Arc::clone(&users),
            stamp: Some(stamp),
        };
        tracing::info!(path = %path.display(), users = users.users.len(), "Users file reloaded");
        Ok(users)
    }
}

fn parse_users(content: &str) -> Result<UsersFile, GrantError> {
    Ok(serde_json::from_str(content)?)
}

#[async_trait]
impl GrantSource for FileGrantSource {
    async fn allowed_values(
        &self,
        username: &str,
        datasource: &str,
        dimension: &str,
        _field: &Field,
    ) -> Result<Vec<String>, GrantError> {
        Ok(self
            .current()
            .await?
            .users
            .get(username)
            .and_then(|u| u.access.get(datasource))
            .and_then(|dims| dims.get(dimension))
            .cloned()
            .unwrap_or_default())
    }
}
