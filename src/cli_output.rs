// Mode-aware CLI output: colored for terminals, plain for pipes, JSON for scripts
use colored::Colorize;
use comfy_table::presets::{ASCII_FULL, UTF8_FULL};
use comfy_table::Table;
use passfill::credential::Credential;
use passfill::store::Entry;
use serde::Serialize;
use std::io::{self, IsTerminal};

/// Output mode for CLI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-friendly output with colors
    Human,
    /// Machine-readable JSON output
    Json,
    /// Plain text without colors (for pipes/logs)
    Plain,
}

impl OutputMode {
    /// Auto-detect output mode based on environment
    pub fn auto() -> Self {
        Self::detect(
            std::env::var_os("PASSFILL_JSON").is_some(),
            io::stdout().is_terminal(),
        )
    }

    fn detect(json_requested: bool, is_terminal: bool) -> Self {
        if json_requested {
            Self::Json
        } else if !is_terminal {
            Self::Plain
        } else {
            Self::Human
        }
    }
}

#[derive(Debug, Serialize)]
struct Notice<'a> {
    level: &'a str,
    message: &'a str,
}

#[derive(Debug, Serialize)]
struct CredentialRow<'a> {
    index: usize,
    domain: String,
    #[serde(flatten)]
    credential: &'a Credential,
}

pub struct OutputWriter {
    mode: OutputMode,
}

impl OutputWriter {
    pub fn new(mode: OutputMode) -> Self {
        Self { mode }
    }

    pub fn auto() -> Self {
        Self::new(OutputMode::auto())
    }

    pub fn is_json(&self) -> bool {
        matches!(self.mode, OutputMode::Json)
    }

    /// Print a section header
    pub fn section(&self, title: &str) {
        match self.mode {
            OutputMode::Human => {
                println!();
                println!("{}", title.cyan().bold());
                println!("{}", "═".repeat(title.chars().count()).cyan());
            }
            OutputMode::Plain => {
                println!();
                println!("{}", title);
                println!("{}", "=".repeat(title.chars().count()));
            }
            OutputMode::Json => {}
        }
    }

    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Human => println!("  {} {}", "✓".green(), message),
            OutputMode::Plain => println!("  [OK] {}", message),
            OutputMode::Json => self.notice("ok", message),
        }
    }

    pub fn warning(&self, message: &str) {
        match self.mode {
            OutputMode::Human => println!("  {} {}", "⚠".yellow(), message),
            OutputMode::Plain => println!("  [WARN] {}", message),
            OutputMode::Json => self.notice("warning", message),
        }
    }

    pub fn info(&self, message: &str) {
        match self.mode {
            OutputMode::Human | OutputMode::Plain => println!("  {}", message),
            OutputMode::Json => self.notice("info", message),
        }
    }

    fn notice(&self, level: &str, message: &str) {
        if let Ok(json) = serde_json::to_string(&Notice { level, message }) {
            println!("{}", json);
        }
    }

    /// Emit a structured value (JSON mode only)
    pub fn emit<T: Serialize>(&self, value: &T) {
        if self.is_json() {
            if let Ok(json) = serde_json::to_string_pretty(value) {
                println!("{}", json);
            }
        }
    }

    /// Print a key-value table
    pub fn table(&self, rows: &[(&str, String)]) {
        let max_key_len = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        match self.mode {
            OutputMode::Human => {
                for (key, value) in rows {
                    println!("  {:width$} │ {}", key.yellow(), value, width = max_key_len);
                }
            }
            OutputMode::Plain => {
                for (key, value) in rows {
                    println!("  {:width$} : {}", key, value, width = max_key_len);
                }
            }
            OutputMode::Json => {
                let map: serde_json::Map<String, serde_json::Value> = rows
                    .iter()
                    .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.clone())))
                    .collect();
                self.emit(&map);
            }
        }
    }

    /// Print stored credentials. Passwords stay masked outside JSON mode.
    pub fn credentials(&self, entries: &[Entry]) {
        if self.is_json() {
            let rows: Vec<CredentialRow> = entries
                .iter()
                .map(|e| CredentialRow {
                    index: e.index,
                    domain: e.credential.domain(),
                    credential: &e.credential,
                })
                .collect();
            self.emit(&rows);
            return;
        }

        if entries.is_empty() {
            self.info("No credentials found.");
            return;
        }

        let mut table = Table::new();
        table
            .load_preset(if self.mode == OutputMode::Human {
                UTF8_FULL
            } else {
                ASCII_FULL
            })
            .set_header(vec!["#", "Site", "Username", "Email", "Phone", "Password", "Saved"]);

        for entry in entries {
            let cred = &entry.credential;
            table.add_row(vec![
                entry.index.to_string(),
                cred.domain(),
                cred.username.clone().unwrap_or_default(),
                cred.email.clone().unwrap_or_default(),
                cred.phone.clone().unwrap_or_default(),
                "••••••••••••".to_string(),
                format_date(cred),
            ]);
        }

        println!("{table}");
    }
}

fn format_date(cred: &Credential) -> String {
    cred.date
        .with_timezone(&chrono::Local)
        .format("%b %-d, %Y %H:%M")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_mode() {
        assert_eq!(OutputMode::detect(true, true), OutputMode::Json);
        assert_eq!(OutputMode::detect(true, false), OutputMode::Json);
        assert_eq!(OutputMode::detect(false, false), OutputMode::Plain);
        assert_eq!(OutputMode::detect(false, true), OutputMode::Human);
    }

    #[test]
    fn test_credential_row_flattens_record() {
        let cred = Credential::new("https://a.com/login", "p").with_username("bob");
        let row = CredentialRow {
            index: 4,
            domain: cred.domain(),
            credential: &cred,
        };
        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value["index"], 4);
        assert_eq!(value["domain"], "a.com");
        assert_eq!(value["username"], "bob");
    }
}
