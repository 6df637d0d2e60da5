// Credential store - a flat list of records kept under one storage key
use crate::credential::{domain_of, Credential, Identity};
use crate::storage::{KeyValueStore, StorageError};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const CREDENTIALS_KEY: &str = "credentials";
pub const TEMP_PASSWORD_KEY: &str = "tempPassword";
pub const TEMP_TIMESTAMP_KEY: &str = "tempTimestamp";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Invalid credential index {index} (store holds {len})")]
    InvalidIndex { index: usize, len: usize },
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Storage(StorageError::Encode(e))
    }
}

/// View orders for listing. Sorting never changes stored order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
    #[default]
    Default,
    DateDesc,
    DateAsc,
    DomainAsc,
    DomainDesc,
}

impl SortOrder {
    pub fn name(&self) -> &'static str {
        match self {
            SortOrder::Default => "default",
            SortOrder::DateDesc => "date-desc",
            SortOrder::DateAsc => "date-asc",
            SortOrder::DomainAsc => "domain-asc",
            SortOrder::DomainDesc => "domain-desc",
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "default" | "none" => Ok(SortOrder::Default),
            "date-desc" | "newest" => Ok(SortOrder::DateDesc),
            "date-asc" | "oldest" => Ok(SortOrder::DateAsc),
            "domain-asc" => Ok(SortOrder::DomainAsc),
            "domain-desc" => Ok(SortOrder::DomainDesc),
            _ => Err(format!(
                "Unknown sort order: {}. Supported: default, date-desc, date-asc, domain-asc, domain-desc",
                s
            )),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A record together with its position in stored order.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub index: usize,
    pub credential: Credential,
}

/// Whether an upsert added a record or replaced one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(usize),
    Updated(usize),
}

/// The password generated for the page most recently, awaiting a save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPassword {
    pub password: String,
    pub created: DateTime<Utc>,
}

/// One slot of the stored list. Unreadable slots keep their raw JSON.
enum Record {
    Parsed(Credential),
    Unreadable(Value),
}

impl Record {
    fn credential(&self) -> Option<&Credential> {
        match self {
            Record::Parsed(cred) => Some(cred),
            Record::Unreadable(_) => None,
        }
    }
}

/// Position of `slot` among the parsed records.
fn visible_index(records: &[Record], slot: usize) -> usize {
    records[..slot]
        .iter()
        .filter(|r| r.credential().is_some())
        .count()
}

pub struct CredentialStore<S: KeyValueStore> {
    backend: S,
}

impl<S: KeyValueStore> CredentialStore<S> {
    pub fn new(backend: S) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    pub fn into_backend(self) -> S {
        self.backend
    }

    /// Stored records in insertion order. A missing or malformed collection
    /// reads as empty; individual malformed records are skipped.
    pub fn list_all(&self) -> Vec<Credential> {
        self.load()
            .into_iter()
            .filter_map(|record| match record {
                Record::Parsed(cred) => Some(cred),
                Record::Unreadable(_) => None,
            })
            .collect()
    }

    /// Every stored slot, including the ones that do not parse. Writers go
    /// through this so unreadable records survive unrelated mutations.
    fn load(&self) -> Vec<Record> {
        let Some(value) = self.backend.get(CREDENTIALS_KEY) else {
            return Vec::new();
        };
        let Value::Array(items) = value else {
            warn!("Stored credentials are not a list; treating as empty");
            return Vec::new();
        };

        items
            .iter()
            .enumerate()
            .map(|(i, item)| match Credential::deserialize(item) {
                Ok(cred) => Record::Parsed(cred),
                Err(e) => {
                    warn!("Skipping malformed credential #{}: {}", i, e);
                    Record::Unreadable(item.clone())
                }
            })
            .collect()
    }

    fn save_all(&mut self, records: &[Record]) -> Result<(), StoreError> {
        let items = records
            .iter()
            .map(|record| match record {
                Record::Parsed(cred) => serde_json::to_value(cred),
                Record::Unreadable(raw) => Ok(raw.clone()),
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.backend.set(CREDENTIALS_KEY, Value::Array(items))?;
        Ok(())
    }

    /// Insert `credential`, or replace the record with the same identity.
    /// Either way the stored `date` is refreshed.
    pub fn upsert(&mut self, credential: Credential) -> Result<UpsertOutcome, StoreError> {
        let mut records = self.load();
        let identity = credential.identity();
        let record = Credential {
            date: Utc::now(),
            ..credential
        };

        let existing = records
            .iter()
            .position(|r| r.credential().is_some_and(|c| c.identity() == identity));
        let outcome = match existing {
            Some(slot) => {
                records[slot] = Record::Parsed(record);
                UpsertOutcome::Updated(visible_index(&records, slot))
            }
            None => {
                records.push(Record::Parsed(record));
                UpsertOutcome::Inserted(visible_index(&records, records.len() - 1))
            }
        };

        self.save_all(&records)?;
        info!(
            "Saved credentials for {} ({})",
            identity.domain,
            match outcome {
                UpsertOutcome::Inserted(_) => "new",
                UpsertOutcome::Updated(_) => "updated",
            }
        );
        Ok(outcome)
    }

    /// Records whose derived domain equals that of `url_or_domain`.
    pub fn list_for_domain(&self, url_or_domain: &str) -> Vec<Entry> {
        let domain = domain_of(url_or_domain);
        self.entries()
            .into_iter()
            .filter(|e| e.credential.domain() == domain)
            .collect()
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.list_all()
            .into_iter()
            .enumerate()
            .map(|(index, credential)| Entry { index, credential })
            .collect()
    }

    /// Remove the record at `index` (stored order) and return it.
    pub fn delete_at(&mut self, index: usize) -> Result<Credential, StoreError> {
        let mut records = self.load();
        let len = records.iter().filter(|r| r.credential().is_some()).count();
        let slot = records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.credential().is_some())
            .nth(index)
            .map(|(slot, _)| slot);

        let removed = match slot.map(|slot| records.remove(slot)) {
            Some(Record::Parsed(cred)) => cred,
            _ => return Err(StoreError::InvalidIndex { index, len }),
        };
        self.save_all(&records)?;
        debug!("Deleted credential #{} for {}", index, removed.domain());
        Ok(removed)
    }

    /// Keep the first record of every identity, drop the rest. Returns how
    /// many records were removed; storage is untouched when none were.
    pub fn deduplicate(&mut self) -> Result<usize, StoreError> {
        let records = self.load();
        let before = records.len();

        let mut seen: HashSet<Identity> = HashSet::new();
        let unique: Vec<Record> = records
            .into_iter()
            .filter(|r| r.credential().map_or(true, |c| seen.insert(c.identity())))
            .collect();

        let removed = before - unique.len();
        if removed > 0 {
            self.save_all(&unique)?;
            info!("{} duplicate(s) removed", removed);
        } else {
            debug!("No duplicates found");
        }
        Ok(removed)
    }

    pub fn clear(&mut self) -> Result<(), StoreError> {
        self.backend.remove(&[CREDENTIALS_KEY])?;
        info!("Cleared all stored credentials");
        Ok(())
    }

    /// Case-insensitive filter over domain, username, email and phone.
    pub fn search(&self, term: &str) -> Vec<Entry> {
        self.entries()
            .into_iter()
            .filter(|e| e.credential.matches(term))
            .collect()
    }

    /// A reordered copy of every record.
    pub fn sorted(&self, order: SortOrder) -> Vec<Entry> {
        sort_entries(self.entries(), order)
    }

    pub fn stash_pending(&mut self, password: &str) -> Result<(), StoreError> {
        self.backend
            .set(TEMP_PASSWORD_KEY, Value::String(password.to_string()))?;
        self.backend.set(
            TEMP_TIMESTAMP_KEY,
            Value::from(Utc::now().timestamp_millis()),
        )?;
        Ok(())
    }

    pub fn pending(&self) -> Option<PendingPassword> {
        let password = self.backend.get(TEMP_PASSWORD_KEY)?.as_str()?.to_string();
        let created = self
            .backend
            .get(TEMP_TIMESTAMP_KEY)
            .and_then(Value::as_i64)
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(Utc::now);
        Some(PendingPassword { password, created })
    }

    pub fn clear_pending(&mut self) -> Result<(), StoreError> {
        self.backend
            .remove(&[TEMP_PASSWORD_KEY, TEMP_TIMESTAMP_KEY])?;
        Ok(())
    }
}

/// Reorder `entries` for display; `Default` keeps stored order.
pub fn sort_entries(mut entries: Vec<Entry>, order: SortOrder) -> Vec<Entry> {
    match order {
        SortOrder::Default => {}
        SortOrder::DateDesc => entries.sort_by(|a, b| b.credential.date.cmp(&a.credential.date)),
        SortOrder::DateAsc => entries.sort_by(|a, b| a.credential.date.cmp(&b.credential.date)),
        SortOrder::DomainAsc => entries.sort_by_cached_key(|e| e.credential.domain().to_lowercase()),
        SortOrder::DomainDesc => {
            entries.sort_by_cached_key(|e| std::cmp::Reverse(e.credential.domain().to_lowercase()))
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{JsonFileStore, MemoryStore};
    use chrono::TimeZone;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn store() -> CredentialStore<MemoryStore> {
        CredentialStore::new(MemoryStore::new())
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()
    }

    fn seeded(records: &[Credential]) -> CredentialStore<MemoryStore> {
        let mut backend = MemoryStore::new();
        backend
            .set(CREDENTIALS_KEY, serde_json::to_value(records).unwrap())
            .unwrap();
        CredentialStore::new(backend)
    }

    #[test]
    fn test_upsert_replaces_same_identity() {
        let mut store = store();
        let first = store
            .upsert(Credential::new("https://a.com/login", "p1").with_username("bob"))
            .unwrap();
        let second = store
            .upsert(Credential::new("https://a.com/x", "p2").with_username("bob"))
            .unwrap();

        assert_eq!(first, UpsertOutcome::Inserted(0));
        assert_eq!(second, UpsertOutcome::Updated(0));
        let all = store.list_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].password, "p2");
        assert_eq!(all[0].url, "https://a.com/x");
        assert_eq!(store.list_for_domain("a.com").len(), 1);
    }

    #[test]
    fn test_upsert_distinguishes_identifiers_and_domains() {
        let mut store = store();
        store
            .upsert(Credential::new("https://a.com", "p").with_username("bob"))
            .unwrap();
        store
            .upsert(Credential::new("https://a.com", "p").with_email("bob@a.com"))
            .unwrap();
        store
            .upsert(Credential::new("https://b.com", "p").with_username("bob"))
            .unwrap();
        assert_eq!(store.list_all().len(), 3);
    }

    #[test]
    fn test_upsert_refreshes_date() {
        let mut store = seeded(&[Credential::new("https://a.com", "old")
            .with_username("bob")
            .with_date(at(1))]);
        store
            .upsert(
                Credential::new("https://a.com", "new")
                    .with_username("bob")
                    .with_date(at(2)),
            )
            .unwrap();
        assert!(store.list_all()[0].date > at(2));
    }

    #[test]
    fn test_deduplicate_keeps_first_seen() {
        let bob = |pw: &str| Credential::new("https://a.com/login", pw).with_username("bob");
        let mut store = seeded(&[
            bob("first"),
            Credential::new("https://b.com", "x").with_username("bob"),
            bob("second"),
            Credential::new("https://a.com", "y").with_email("alice@a.com"),
            bob("third"),
        ]);

        assert_eq!(store.deduplicate().unwrap(), 2);
        let all = store.list_all();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].password, "first");

        assert_eq!(store.deduplicate().unwrap(), 0);
    }

    #[test]
    fn test_delete_at_out_of_range() {
        let mut store = store();
        assert!(matches!(
            store.delete_at(0),
            Err(StoreError::InvalidIndex { index: 0, len: 0 })
        ));

        store
            .upsert(Credential::new("https://a.com", "p").with_username("bob"))
            .unwrap();
        assert!(matches!(
            store.delete_at(1),
            Err(StoreError::InvalidIndex { index: 1, len: 1 })
        ));
        assert_eq!(store.list_all().len(), 1);

        let removed = store.delete_at(0).unwrap();
        assert_eq!(removed.username.as_deref(), Some("bob"));
        assert!(store.list_all().is_empty());
    }

    #[test]
    fn test_malformed_storage_reads_as_empty() {
        let mut backend = MemoryStore::new();
        backend.set(CREDENTIALS_KEY, json!({"oops": true})).unwrap();
        let store = CredentialStore::new(backend);
        assert!(store.list_all().is_empty());

        let mut backend = MemoryStore::new();
        backend
            .set(
                CREDENTIALS_KEY,
                json!([42, {"url": "https://a.com", "password": "p", "date": "2024-01-01T00:00:00Z"}]),
            )
            .unwrap();
        let store = CredentialStore::new(backend);
        assert_eq!(store.list_all().len(), 1);
    }

    #[test]
    fn test_unreadable_records_survive_writes() {
        let unreadable = json!({"url": "https://a.com", "username": "bob", "password": null});
        let mut backend = MemoryStore::new();
        backend
            .set(
                CREDENTIALS_KEY,
                json!([
                    unreadable.clone(),
                    {"url": "https://b.com", "username": "amy", "password": "p", "date": "2024-01-01T00:00:00Z"},
                    {"url": "https://b.com", "username": "amy", "password": "dup", "date": "2024-01-02T00:00:00Z"}
                ]),
            )
            .unwrap();
        let mut store = CredentialStore::new(backend);
        assert_eq!(store.list_all().len(), 2);

        let outcome = store
            .upsert(Credential::new("https://c.com", "p").with_username("cat"))
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted(2));
        assert_eq!(store.deduplicate().unwrap(), 1);

        let removed = store.delete_at(0).unwrap();
        assert_eq!(removed.domain(), "b.com");

        let raw = store.backend().get(CREDENTIALS_KEY).unwrap().as_array().unwrap();
        assert_eq!(raw.len(), 2);
        assert_eq!(raw[0], unreadable);
        let visible = store.list_all();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].domain(), "c.com");
        assert!(matches!(
            store.delete_at(1),
            Err(StoreError::InvalidIndex { index: 1, len: 1 })
        ));
    }

    #[test]
    fn test_storage_failure_leaves_records_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("storage.json");
        let mut store = CredentialStore::new(JsonFileStore::open(&path).unwrap());
        store
            .upsert(Credential::new("https://a.com", "p").with_username("bob"))
            .unwrap();
        let before = store.list_all();

        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();

        assert!(matches!(
            store.upsert(Credential::new("https://b.com", "p").with_username("amy")),
            Err(StoreError::Storage(_))
        ));
        assert_eq!(store.list_all(), before);
        assert!(matches!(store.delete_at(0), Err(StoreError::Storage(_))));
        assert_eq!(store.list_all(), before);
    }

    #[test]
    fn test_sorted_views_leave_storage_alone() {
        let store = seeded(&[
            Credential::new("https://b.com", "p").with_date(at(2)),
            Credential::new("https://C.com", "p").with_date(at(3)),
            Credential::new("https://a.com", "p").with_date(at(1)),
        ]);

        let domains = |order| {
            store
                .sorted(order)
                .into_iter()
                .map(|e| e.credential.domain())
                .collect::<Vec<_>>()
        };
        assert_eq!(domains(SortOrder::DateDesc), ["c.com", "b.com", "a.com"]);
        assert_eq!(domains(SortOrder::DateAsc), ["a.com", "b.com", "c.com"]);
        assert_eq!(domains(SortOrder::DomainAsc), ["a.com", "b.com", "c.com"]);
        assert_eq!(domains(SortOrder::DomainDesc), ["c.com", "b.com", "a.com"]);
        assert_eq!(domains(SortOrder::Default), ["b.com", "c.com", "a.com"]);

        let sorted = store.sorted(SortOrder::DomainAsc);
        assert_eq!(sorted[0].index, 2);
    }

    #[test]
    fn test_search_and_clear() {
        let mut store = seeded(&[
            Credential::new("https://a.com", "p").with_username("bob"),
            Credential::new("https://b.com", "p").with_phone("555-0100"),
        ]);
        let hits = store.search("555");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].index, 1);

        store.clear().unwrap();
        assert!(store.list_all().is_empty());
    }

    #[test]
    fn test_pending_password_lifecycle() {
        let mut store = store();
        assert_eq!(store.pending(), None);

        store.stash_pending("Xk9!aT2pQw").unwrap();
        assert_eq!(store.pending().unwrap().password, "Xk9!aT2pQw");

        store.clear_pending().unwrap();
        assert_eq!(store.pending(), None);
    }

    #[test]
    fn test_sort_order_parsing() {
        assert_eq!("date-desc".parse::<SortOrder>().unwrap(), SortOrder::DateDesc);
        assert_eq!("Domain-Asc".parse::<SortOrder>().unwrap(), SortOrder::DomainAsc);
        assert!("sideways".parse::<SortOrder>().is_err());
    }
}
