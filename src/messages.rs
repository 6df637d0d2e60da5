// Message protocol between the controller and page scripts
use crate::classifier::CapturedCredentials;
use serde::{Deserialize, Serialize};

/// Messages are tagged records: `{"action": "...", ...payload}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Message {
    /// Controller to page: fill the focused field with this password.
    FillPassword { password: String },
    /// Page to controller: persist what was captured on submit.
    SaveCredentials { data: CapturedCredentials },
    /// Page to controller: show the credentials manager.
    OpenCredentialsPage,
}

impl Message {
    pub fn action(&self) -> &'static str {
        match self {
            Message::FillPassword { .. } => "fillPassword",
            Message::SaveCredentials { .. } => "saveCredentials",
            Message::OpenCredentialsPage => "openCredentialsPage",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn with_tab(tab_id: u32) -> Self {
        Self {
            success: true,
            tab_id: Some(tab_id),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            tab_id: None,
            error: Some(error.into()),
        }
    }
}
