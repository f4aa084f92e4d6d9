//! The persistence boundary: an opaque record store queried by exact-match
//! predicates on named fields.
//!
//! The core never sees a schema beyond "accounts have a stable integer id, a
//! display tag, and credentials". Production deployments put a database
//! behind [`RecordStore`]; tests and the demo use [`MemoryStore`].

use std::collections::HashMap;
use std::sync::Mutex;

/// An account record as the platform persists it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    /// Stable integer id; becomes the low qword of the account's entity id.
    pub id: u64,
    pub email: String,
    pub web_credential: String,
    /// Display tag, formatted as `Name#1234`.
    pub battle_tag: String,
    pub flags: i64,
}

/// An exact-match predicate on one account field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountField {
    Id(u64),
    Email(String),
    WebCredential(String),
    BattleTag(String),
}

impl AccountField {
    fn matches(&self, record: &AccountRecord) -> bool {
        match self {
            Self::Id(id) => record.id == *id,
            Self::Email(email) => record.email == *email,
            Self::WebCredential(cred) => record.web_credential == *cred,
            Self::BattleTag(tag) => record.battle_tag == *tag,
        }
    }
}

/// Errors from record-store mutations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("an account with id {0} already exists")]
    Duplicate(u64),

    #[error("no account with id {0}")]
    NotFound(u64),
}

/// A record store queried by exact-match predicates.
pub trait RecordStore: Send + Sync {
    /// First record matching every predicate, if any.
    fn find_first(&self, predicates: &[AccountField]) -> Option<AccountRecord>;

    /// All records matching every predicate.
    fn find_all(&self, predicates: &[AccountField]) -> Vec<AccountRecord>;

    fn insert(&self, record: AccountRecord) -> Result<(), StoreError>;

    fn update(&self, record: AccountRecord) -> Result<(), StoreError>;

    fn delete(&self, id: u64) -> Result<(), StoreError>;
}

/// In-memory [`RecordStore`] for tests and the demo.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<u64, AccountRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor seeding the store with accounts.
    pub fn with_accounts(accounts: impl IntoIterator<Item = AccountRecord>) -> Self {
        let store = Self::new();
        {
            let mut records = store.records.lock().unwrap();
            for record in accounts {
                records.insert(record.id, record);
            }
        }
        store
    }
}

impl RecordStore for MemoryStore {
    fn find_first(&self, predicates: &[AccountField]) -> Option<AccountRecord> {
        // Iteration order is arbitrary; exact-match predicate sets are
        // expected to identify at most one record.
        self.records
            .lock()
            .unwrap()
            .values()
            .find(|record| predicates.iter().all(|p| p.matches(record)))
            .cloned()
    }

    fn find_all(&self, predicates: &[AccountField]) -> Vec<AccountRecord> {
        self.records
            .lock()
            .unwrap()
            .values()
            .filter(|record| predicates.iter().all(|p| p.matches(record)))
            .cloned()
            .collect()
    }

    fn insert(&self, record: AccountRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap();
        if records.contains_key(&record.id) {
            return Err(StoreError::Duplicate(record.id));
        }
        records.insert(record.id, record);
        Ok(())
    }

    fn update(&self, record: AccountRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap();
        match records.get_mut(&record.id) {
            Some(existing) => {
                *existing = record;
                Ok(())
            }
            None => Err(StoreError::NotFound(record.id)),
        }
    }

    fn delete(&self, id: u64) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap();
        records.remove(&id).map(|_| ()).ok_or(StoreError::NotFound(id))
    }
}
