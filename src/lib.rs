//! Password generation, form auto-fill heuristics and a local credential store.
//!
//! Pages are modelled as [`dom::Document`] snapshots. The [`controller`]
//! plays the extension controller (context menu, saving), the [`content`]
//! script plays the page side (filling, watching for submission).

pub mod autofill;
pub mod classifier;
pub mod config;
pub mod content;
pub mod controller;
pub mod credential;
pub mod dom;
pub mod generator;
pub mod messages;
pub mod storage;
pub mod store;

pub use autofill::{AutoFiller, FillOutcome, SubmissionWatcher, Subscription};
pub use classifier::{CapturedCredentials, FieldClassifier};
pub use config::Config;
pub use controller::Controller;
pub use credential::{domain_of, Credential, Identity};
pub use dom::{Document, ElementSnapshot, PageSnapshot};
pub use generator::{CharClasses, PasswordGenerator};
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore};
pub use store::{CredentialStore, SortOrder, StoreError};
