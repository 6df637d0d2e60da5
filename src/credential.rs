// Credential records and the (domain, identifier) identity they are matched by
use crate::classifier::CapturedCredentials;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

/// Hostname of `url`, or the raw string when it does not parse as a URL
/// with a host.
pub fn domain_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

/// The de-duplication key of a credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    pub domain: String,
    pub identifier: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    Username,
    Email,
    Phone,
}

impl IdentifierKind {
    pub fn label(&self) -> &'static str {
        match self {
            IdentifierKind::Username => "Username",
            IdentifierKind::Email => "Email",
            IdentifierKind::Phone => "Phone",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub url: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "non_empty"
    )]
    pub username: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "non_empty"
    )]
    pub email: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "non_empty"
    )]
    pub phone: Option<String>,
    #[serde(default)]
    pub password: String,
    #[serde(default = "Utc::now")]
    pub date: DateTime<Utc>,
}

fn non_empty<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

impl Credential {
    pub fn new(url: &str, password: &str) -> Self {
        Self {
            url: url.to_string(),
            username: None,
            email: None,
            phone: None,
            password: password.to_string(),
            date: Utc::now(),
        }
    }

    pub fn with_username(mut self, username: &str) -> Self {
        self.username = Some(username.to_string()).filter(|s| !s.is_empty());
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string()).filter(|s| !s.is_empty());
        self
    }

    pub fn with_phone(mut self, phone: &str) -> Self {
        self.phone = Some(phone.to_string()).filter(|s| !s.is_empty());
        self
    }

    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = date;
        self
    }

    pub fn domain(&self) -> String {
        domain_of(&self.url)
    }

    /// Username, email or phone (first present, in that order), or "".
    pub fn identifier(&self) -> &str {
        self.identifier_kind()
            .and_then(|kind| self.field(kind))
            .unwrap_or("")
    }

    pub fn identifier_kind(&self) -> Option<IdentifierKind> {
        [
            IdentifierKind::Username,
            IdentifierKind::Email,
            IdentifierKind::Phone,
        ]
        .into_iter()
        .find(|&kind| self.field(kind).is_some_and(|v| !v.is_empty()))
    }

    pub fn field(&self, kind: IdentifierKind) -> Option<&str> {
        match kind {
            IdentifierKind::Username => self.username.as_deref(),
            IdentifierKind::Email => self.email.as_deref(),
            IdentifierKind::Phone => self.phone.as_deref(),
        }
    }

    pub fn identity(&self) -> Identity {
        Identity {
            domain: self.domain(),
            identifier: self.identifier().to_string(),
        }
    }

    /// Case-insensitive match of `term` against domain and identity fields.
    pub fn matches(&self, term: &str) -> bool {
        let term = term.to_lowercase();
        if term.is_empty() {
            return true;
        }
        std::iter::once(Some(self.domain()))
            .chain([
                self.username.clone(),
                self.email.clone(),
                self.phone.clone(),
            ])
            .flatten()
            .any(|value| value.to_lowercase().contains(&term))
    }
}

impl From<CapturedCredentials> for Credential {
    fn from(captured: CapturedCredentials) -> Self {
        Self {
            url: captured.url,
            username: captured.username.filter(|s| !s.is_empty()),
            email: captured.email.filter(|s| !s.is_empty()),
            phone: captured.phone.filter(|s| !s.is_empty()),
            password: captured.password.unwrap_or_default(),
            date: Utc::now(),
        }
    }
}
