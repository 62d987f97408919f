use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::identity::exchange_slug;
use crate::models::Transaction;

/// Signed-in user as reported by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
}

impl Identity {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.trim().to_string(),
        }
    }
}

/// Wire shape of every remote call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> RemoteResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }

    pub fn into_result(self) -> Result<T> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (true, None) => Err(LedgerError::Remote("response carried no data".to_string())),
            (false, _) => Err(LedgerError::Remote(
                self.error.unwrap_or_else(|| "unknown remote failure".to_string()),
            )),
        }
    }
}

/// Remote synced store. Only the response contract is assumed; transport is
/// the implementor's business.
pub trait RemoteStore {
    fn fetch_transactions(&self, user: &Identity) -> RemoteResponse<Vec<Transaction>>;
    /// Replace the user's whole remote collection, echoing what was stored.
    fn replace_transactions(
        &self,
        user: &Identity,
        transactions: &[Transaction],
    ) -> RemoteResponse<Vec<Transaction>>;
    fn clear_transactions(&self, user: &Identity) -> RemoteResponse<()>;
}

// ---------------------------------------------------------------------------
// Synced folder
// ---------------------------------------------------------------------------

/// Remote store backed by a folder that some sync client (Syncthing, iCloud
/// Drive, ...) replicates. The folder must already exist; a missing folder
/// counts as unreachable.
pub struct FolderRemote {
    root: Option<PathBuf>,
}

impl FolderRemote {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    fn user_file(&self, user: &Identity) -> Result<PathBuf> {
        let root = self
            .root
            .as_deref()
            .ok_or_else(|| LedgerError::Remote("no remote folder configured".to_string()))?;
        if !root.is_dir() {
            return Err(LedgerError::Remote(format!(
                "remote folder {} is not reachable",
                root.display()
            )));
        }
        let name = exchange_slug(&user.user_id);
        if name.is_empty() || name.contains(['/', '\\', '.']) {
            return Err(LedgerError::Remote(format!("invalid user id: {}", user.user_id)));
        }
        Ok(root.join(format!("{name}.json")))
    }

    fn read(&self, user: &Identity) -> Result<Vec<Transaction>> {
        let path = self.user_file(user)?;
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write(&self, user: &Identity, transactions: &[Transaction]) -> Result<()> {
        let path = self.user_file(user)?;
        write_atomic(&path, &serde_json::to_string_pretty(transactions)?)
    }
}

fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, format!("{content}\n"))?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

impl RemoteStore for FolderRemote {
    fn fetch_transactions(&self, user: &Identity) -> RemoteResponse<Vec<Transaction>> {
        match self.read(user) {
            Ok(txns) => RemoteResponse::ok(txns),
            Err(e) => RemoteResponse::err(e.to_string()),
        }
    }

    fn replace_transactions(
        &self,
        user: &Identity,
        transactions: &[Transaction],
    ) -> RemoteResponse<Vec<Transaction>> {
        match self.write(user, transactions) {
            Ok(()) => RemoteResponse::ok(transactions.to_vec()),
            Err(e) => RemoteResponse::err(e.to_string()),
        }
    }

    fn clear_transactions(&self, user: &Identity) -> RemoteResponse<()> {
        let result = self.user_file(user).and_then(|path| {
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
            Ok(())
        });
        match result {
            Ok(()) => RemoteResponse::ok(()),
            Err(e) => RemoteResponse::err(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{date, txn};

    #[test]
    fn test_into_result() {
        assert_eq!(RemoteResponse::ok(3).into_result().unwrap(), 3);
        let err = RemoteResponse::<u8>::err("offline").into_result().unwrap_err();
        assert!(err.to_string().contains("offline"));
        let empty = RemoteResponse::<u8> {
            success: true,
            data: None,
            error: None,
        };
        assert!(empty.into_result().is_err());
    }

    #[test]
    fn test_response_wire_shape() {
        let json = serde_json::to_value(RemoteResponse::<u8>::err("nope")).unwrap();
        assert_eq!(json, serde_json::json!({"success": false, "error": "nope"}));
        let parsed: RemoteResponse<Vec<u8>> =
            serde_json::from_str(r#"{"success": true, "data": [1, 2]}"#).unwrap();
        assert_eq!(parsed.into_result().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_unconfigured_is_unreachable() {
        let remote = FolderRemote::new(None);
        let resp = remote.fetch_transactions(&Identity::new("alice"));
        assert!(!resp.success);
    }

    #[test]
    fn test_missing_folder_is_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let remote = FolderRemote::new(Some(dir.path().join("not-mounted")));
        assert!(!remote.fetch_transactions(&Identity::new("alice")).success);
        assert!(!remote.replace_transactions(&Identity::new("alice"), &[]).success);
    }

    #[test]
    fn test_roundtrip_per_user() {
        let dir = tempfile::tempdir().unwrap();
        let remote = FolderRemote::new(Some(dir.path().to_path_buf()));
        let alice = Identity::new("alice");
        let bob = Identity::new("bob");
        assert!(remote.fetch_transactions(&alice).into_result().unwrap().is_empty());

        let rows = vec![txn("strike-1", date(2024, 1, 1, 0, 0, 0))];
        remote.replace_transactions(&alice, &rows).into_result().unwrap();
        assert_eq!(remote.fetch_transactions(&alice).into_result().unwrap(), rows);
        assert!(remote.fetch_transactions(&bob).into_result().unwrap().is_empty());

        remote.clear_transactions(&alice).into_result().unwrap();
        assert!(remote.fetch_transactions(&alice).into_result().unwrap().is_empty());
    }

    #[test]
    fn test_rejects_path_like_user_ids() {
        let dir = tempfile::tempdir().unwrap();
        let remote = FolderRemote::new(Some(dir.path().to_path_buf()));
        assert!(!remote.fetch_transactions(&Identity::new("../etc")).success);
    }
}
