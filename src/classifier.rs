// Field classifier - keyword heuristics for confirm-password and identity fields
use crate::dom::{Document, NodeId};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How far (in pixels, above or below) free-standing text may sit from a
/// password field and still be taken as its label.
pub const NEARBY_LABEL_THRESHOLD_PX: f64 = 50.0;

pub const CONFIRM_KEYWORDS: &[&str] = &[
    "confirm", "verify", "repeat", "reenter", "re-enter", "re enter",
];

const NEARBY_TEXT_TAGS: &[&str] = &[
    "h1", "h2", "h3", "h4", "h5", "h6", "div", "span", "p", "label",
];

lazy_static! {
    static ref CONFIRM_PATTERN: Regex = keyword_pattern(CONFIRM_KEYWORDS);
    static ref EMAIL_PATTERN: Regex = keyword_pattern(&["email"]);
    static ref PHONE_PATTERN: Regex = keyword_pattern(&["phone", "mobile"]);
    static ref USERNAME_PATTERN: Regex = keyword_pattern(&["user", "login"]);
}

fn keyword_pattern(keywords: &[&str]) -> Regex {
    let alternatives = keywords
        .iter()
        .map(|k| regex::escape(k))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!("(?i){}", alternatives)).expect("keyword list is a valid pattern")
}

/// What was typed into a form at submission time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedCredentials {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl CapturedCredentials {
    pub fn has_identifier(&self) -> bool {
        self.username.is_some() || self.email.is_some() || self.phone.is_some()
    }
}

/// Identity category an input was classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    Password,
    Email,
    Phone,
    Username,
}

#[derive(Debug, Clone)]
pub struct FieldClassifier {
    nearby_threshold_px: f64,
}

impl Default for FieldClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldClassifier {
    pub fn new() -> Self {
        Self {
            nearby_threshold_px: NEARBY_LABEL_THRESHOLD_PX,
        }
    }

    pub fn with_threshold(mut self, px: f64) -> Self {
        self.nearby_threshold_px = px;
        self
    }

    /// Find the password field that asks the user to repeat `reference`.
    ///
    /// Candidates are the other password inputs of the reference's form, or
    /// of the whole page when it has no form. The first candidate (document
    /// order) whose id, name or label mentions a confirm keyword wins.
    pub fn find_confirm_field(&self, doc: &Document, reference: NodeId) -> Option<NodeId> {
        let scope = doc.form_of(reference).unwrap_or_else(|| doc.root());

        let found = doc
            .password_inputs_in(scope)
            .into_iter()
            .filter(|&candidate| candidate != reference)
            .find(|&candidate| self.is_confirm_field(doc, candidate));

        match found {
            Some(field) => debug!("Confirm field found: #{}", doc.element(field).id()),
            None => debug!("No confirm field found"),
        }
        found
    }

    fn is_confirm_field(&self, doc: &Document, candidate: NodeId) -> bool {
        let el = doc.element(candidate);
        CONFIRM_PATTERN.is_match(el.id())
            || CONFIRM_PATTERN.is_match(el.name())
            || self
                .resolve_label(doc, candidate)
                .is_some_and(|label| CONFIRM_PATTERN.is_match(&label))
    }

    /// Resolve the human-visible label of a field.
    ///
    /// Priority: `<label for=...>` or an enclosing `<label>`, then the
    /// preceding sibling's text, then the closest text element within the
    /// vertical threshold.
    pub fn resolve_label(&self, doc: &Document, field: NodeId) -> Option<String> {
        explicit_label(doc, field)
            .or_else(|| preceding_sibling_text(doc, field))
            .or_else(|| self.nearby_text(doc, field))
    }

    fn nearby_text(&self, doc: &Document, field: NodeId) -> Option<String> {
        let field_top = doc.element(field).top()?;

        let mut best: Option<(f64, NodeId)> = None;
        for node in doc.all() {
            let el = doc.element(node);
            if !NEARBY_TEXT_TAGS.contains(&el.tag()) || doc.contains(node, field) {
                continue;
            }
            let Some(top) = el.top() else { continue };
            let distance = (top - field_top).abs();
            if distance > self.nearby_threshold_px {
                continue;
            }
            if best.map_or(true, |(d, _)| distance < d) && !doc.text_content(node).is_empty() {
                best = Some((distance, node));
            }
        }

        best.map(|(_, node)| doc.text_content(node))
    }

    /// Classify a single input by type, then name/id keywords.
    pub fn classify_input(&self, doc: &Document, input: NodeId) -> Option<FieldRole> {
        let el = doc.element(input);
        let input_type = el.input_type();
        let mentions = |pattern: &Regex| pattern.is_match(el.name()) || pattern.is_match(el.id());

        if input_type == "password" {
            Some(FieldRole::Password)
        } else if input_type == "email" || mentions(&EMAIL_PATTERN) {
            Some(FieldRole::Email)
        } else if input_type == "tel" || mentions(&PHONE_PATTERN) {
            Some(FieldRole::Phone)
        } else if mentions(&USERNAME_PATTERN) {
            Some(FieldRole::Username)
        } else {
            None
        }
    }

    /// Collect username, email, phone and password from a form's inputs.
    ///
    /// Empty inputs are skipped. When several inputs land in the same
    /// category the last one in document order overwrites the others.
    pub fn capture_identity(&self, doc: &Document, form: NodeId) -> CapturedCredentials {
        let mut captured = CapturedCredentials {
            url: doc.url().to_string(),
            ..Default::default()
        };

        for input in doc.inputs_in(form) {
            let value = doc.element(input).value();
            if value.is_empty() {
                continue;
            }
            let slot = match self.classify_input(doc, input) {
                Some(FieldRole::Password) => &mut captured.password,
                Some(FieldRole::Email) => &mut captured.email,
                Some(FieldRole::Phone) => &mut captured.phone,
                Some(FieldRole::Username) => &mut captured.username,
                None => continue,
            };
            *slot = Some(value.to_string());
        }

        captured
    }
}

fn explicit_label(doc: &Document, field: NodeId) -> Option<String> {
    let id = doc.element(field).id();
    let label_text = |label: NodeId| Some(doc.text_content(label)).filter(|text| !text.is_empty());

    let by_for = (!id.is_empty())
        .then(|| {
            doc.all().find(|&n| {
                let el = doc.element(n);
                el.tag() == "label" && el.attr("for") == Some(id)
            })
        })
        .flatten()
        .and_then(label_text);

    by_for.or_else(|| {
        doc.ancestors(field)
            .find(|&n| doc.element(n).tag() == "label")
            .and_then(label_text)
    })
}

fn preceding_sibling_text(doc: &Document, field: NodeId) -> Option<String> {
    doc.previous_element_sibling(field)
        .map(|sibling| doc.text_content(sibling))
        .filter(|text| !text.is_empty())
}
