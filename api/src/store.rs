use std::path::{Path, PathBuf};

use mailout_types::User;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store version moved, write not applied")]
    Conflict,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// Everything the service persists: the admin credential hash and the
/// ordered user records with their accounts, recipients and counters.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreData {
    pub admin_hash: String,
    #[serde(default)]
    pub users: Vec<User>,
}

/// The store content at a point in time. The version moves forward on
/// every accepted write and gates compare-and-swap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u64,
    pub data: StoreData,
}

/// Persistence seam for the counter/state store.
pub trait StateStore {
    async fn snapshot(&self) -> Result<Snapshot, StoreError>;

    /// Applies `data` only if the caller saw the latest version, returning
    /// the new version. A stale writer gets `Conflict` and nothing changes.
    async fn compare_and_swap(
        &self,
        expected_version: u64,
        data: StoreData,
    ) -> Result<u64, StoreError>;
}

/// Read-modify-write with reload on conflict, so two concurrent writers
/// never silently lose each other's counter updates.
pub async fn update<S, F>(store: &S, mut apply: F) -> Result<Snapshot, StoreError>
where
    S: StateStore,
    F: FnMut(&mut StoreData),
{
    loop {
        let snapshot = store.snapshot().await?;
        let mut data = snapshot.data.clone();
        apply(&mut data);
        match store.compare_and_swap(snapshot.version, data.clone()).await {
            Ok(version) => return Ok(Snapshot { version, data }),
            Err(StoreError::Conflict) => continue,
            Err(e) => return Err(e),
        }
    }
}

/// JSON document on disk, one file for the whole store. The in-memory copy
/// is authoritative between writes; the file is rewritten whole on every
/// accepted swap.
pub struct FileStore {
    path: PathBuf,
    state: Mutex<Snapshot>,
}

impl FileStore {
    /// Loads the store from `path`, seeding the file with `initial` when it
    /// does not exist yet.
    pub async fn open(path: impl Into<PathBuf>, initial: StoreData) -> Result<Self, StoreError> {
        let path = path.into();
        let snapshot = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let snapshot = Snapshot {
                    version: 0,
                    data: initial,
                };
                write_file(&path, &snapshot).await?;
                snapshot
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            state: Mutex::new(snapshot),
        })
    }
}

async fn write_file(path: &Path, snapshot: &Snapshot) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(snapshot)?;
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

impl StateStore for FileStore {
    async fn snapshot(&self) -> Result<Snapshot, StoreError> {
        Ok(self.state.lock().await.clone())
    }

    async fn compare_and_swap(
        &self,
        expected_version: u64,
        data: StoreData,
    ) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        if state.version != expected_version {
            return Err(StoreError::Conflict);
        }
        let next = Snapshot {
            version: state.version + 1,
            data,
        };
        write_file(&self.path, &next).await?;
        *state = next;
        Ok(state.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailout_types::{SenderAccount, User};
    use uuid::Uuid;

    fn temp_store_path() -> PathBuf {
        std::env::temp_dir().join(format!("mailout-store-{}.json", Uuid::new_v4()))
    }

    fn seeded_data() -> StoreData {
        let mut user = User::new("admin", "hash", 500);
        user.accounts.push(SenderAccount::new("a@gmail.com", "pw"));
        StoreData {
            admin_hash: "hash".to_string(),
            users: vec![user],
        }
    }

    #[tokio::test]
    async fn stale_writer_gets_a_conflict() {
        let store = FileStore::open(temp_store_path(), seeded_data()).await.unwrap();
        let before = store.snapshot().await.unwrap();

        let mut first = before.data.clone();
        first.users[0].stats.total_sent = 5;
        store
            .compare_and_swap(before.version, first)
            .await
            .unwrap();

        let mut second = before.data.clone();
        second.users[0].stats.total_failed = 9;
        let result = store.compare_and_swap(before.version, second).await;
        assert!(matches!(result, Err(StoreError::Conflict)));

        // The losing write was not applied.
        let after = store.snapshot().await.unwrap();
        assert_eq!(after.data.users[0].stats.total_sent, 5);
        assert_eq!(after.data.users[0].stats.total_failed, 0);
    }

    #[tokio::test]
    async fn update_reloads_and_keeps_both_writes() {
        let store = FileStore::open(temp_store_path(), seeded_data()).await.unwrap();
        let before = store.snapshot().await.unwrap();

        let mut other = before.data.clone();
        other.users[0].stats.total_sent = 3;
        store
            .compare_and_swap(before.version, other)
            .await
            .unwrap();

        // This writer starts from the moved version and still lands.
        update(&store, |data| data.users[0].stats.total_failed += 1)
            .await
            .unwrap();

        let after = store.snapshot().await.unwrap();
        assert_eq!(after.data.users[0].stats.total_sent, 3);
        assert_eq!(after.data.users[0].stats.total_failed, 1);
    }

    #[tokio::test]
    async fn reopen_reads_back_persisted_state() {
        let path = temp_store_path();
        {
            let store = FileStore::open(&path, seeded_data()).await.unwrap();
            update(&store, |data| data.users[0].accounts[0].record_sent())
                .await
                .unwrap();
        }

        let reopened = FileStore::open(&path, StoreData::default()).await.unwrap();
        let snapshot = reopened.snapshot().await.unwrap();
        assert_eq!(snapshot.version, 1);
        assert_eq!(snapshot.data.users[0].accounts[0].sent_count, 1);
    }
}
