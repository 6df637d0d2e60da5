// Auto-fill - write a password into the focused field and its confirm twin,
// then watch the form so the credentials can be captured on submit
use crate::classifier::{CapturedCredentials, FieldClassifier};
use crate::dom::{Document, EventKind, NodeId};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    /// Nothing focused, or the focused element cannot take text.
    NoActiveField,
    /// A content-editable element received the text.
    ContentEditable { target: NodeId },
    /// An input received the value; `confirm` is the repeat field, if found.
    Input {
        target: NodeId,
        confirm: Option<NodeId>,
    },
}

impl FillOutcome {
    pub fn filled(&self) -> bool {
        !matches!(self, FillOutcome::NoActiveField)
    }

    pub fn confirm_field(&self) -> Option<NodeId> {
        match self {
            FillOutcome::Input { confirm, .. } => *confirm,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AutoFiller {
    classifier: FieldClassifier,
}

impl AutoFiller {
    pub fn new(classifier: FieldClassifier) -> Self {
        Self { classifier }
    }

    pub fn classifier(&self) -> &FieldClassifier {
        &self.classifier
    }

    /// Fill `password` into `focused`. Inputs get their value set with
    /// `input`/`change` notifications and the confirm field, when one is
    /// found, gets the same treatment.
    pub fn fill_password(
        &self,
        doc: &mut Document,
        focused: Option<NodeId>,
        password: &str,
    ) -> FillOutcome {
        let Some(target) = focused.filter(|&id| doc.get(id).is_some()) else {
            debug!("No active field to fill");
            return FillOutcome::NoActiveField;
        };

        let el = doc.element(target);
        if el.is_input() {
            doc.set_value(target, password);
            let confirm = self.classifier.find_confirm_field(doc, target);
            if let Some(field) = confirm {
                doc.set_value(field, password);
            }
            info!(
                "Password generated and filled in the field{}",
                if confirm.is_some() { " (confirm field too)" } else { "" }
            );
            FillOutcome::Input { target, confirm }
        } else if el.is_content_editable() {
            doc.set_text(target, password);
            info!("Password generated and filled in the editable element");
            FillOutcome::ContentEditable { target }
        } else {
            debug!("Focused <{}> cannot take a password", el.tag());
            FillOutcome::NoActiveField
        }
    }
}

/// Handle for a registered submission listener. Pass it back to
/// [`SubmissionWatcher::dispose`] to stop listening.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping a subscription leaves the listener registered"]
pub struct Subscription {
    id: u64,
}

#[derive(Debug, Clone, Copy)]
struct Listener {
    id: u64,
    target: NodeId,
    kind: EventKind,
}

/// Listens for form submission (and submit-button clicks as a fallback)
/// and captures the identity fields of the submitted form.
#[derive(Debug, Default)]
pub struct SubmissionWatcher {
    listeners: Vec<Listener>,
    next_id: u64,
}

impl SubmissionWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, target: NodeId, kind: EventKind) -> Subscription {
        self.next_id += 1;
        self.listeners.push(Listener {
            id: self.next_id,
            target,
            kind,
        });
        Subscription { id: self.next_id }
    }

    /// Watch the form owning `field` plus every submit control on the page.
    pub fn watch(&mut self, doc: &Document, field: NodeId) -> Vec<Subscription> {
        let mut subscriptions = Vec::new();
        if let Some(form) = doc.form_of(field) {
            subscriptions.push(self.subscribe(form, EventKind::Submit));
        }
        for control in doc.submit_controls() {
            subscriptions.push(self.subscribe(control, EventKind::Click));
        }
        debug!("Watching {} submission target(s)", subscriptions.len());
        subscriptions
    }

    pub fn dispose(&mut self, subscription: Subscription) {
        self.listeners.retain(|l| l.id != subscription.id);
    }

    pub fn dispose_all(&mut self) {
        self.listeners.clear();
    }

    pub fn is_watching(&self) -> bool {
        !self.listeners.is_empty()
    }

    /// Deliver an event. When a listener matches, the form enclosing the
    /// target is scanned; events outside any form capture nothing.
    pub fn handle_event(
        &self,
        doc: &Document,
        target: NodeId,
        kind: EventKind,
        classifier: &FieldClassifier,
    ) -> Option<CapturedCredentials> {
        if !self
            .listeners
            .iter()
            .any(|l| l.target == target && l.kind == kind)
        {
            return None;
        }
        let form = doc.closest(target, "form")?;
        Some(classifier.capture_identity(doc, form))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::ElementSnapshot as El;

    fn signup(confirm_label: &str) -> Document {
        let root = El::new("body").child(
            El::new("form")
                .attr("id", "signup")
                .child(El::input("text").attr("name", "username").value("bob"))
                .child(El::input("password").attr("id", "pwd"))
                .child(El::new("label").attr("for", "confirm-pwd").text(confirm_label))
                .child(El::input("password").attr("id", "confirm-pwd"))
                .child(El::new("button").attr("type", "submit").attr("id", "go")),
        );
        Document::new("https://a.com/register", &root)
    }

    #[test]
    fn test_fill_copies_into_confirm_field() {
        let mut doc = signup("Confirm Password");
        let pwd = doc.find_by_id("pwd");
        let outcome = AutoFiller::default().fill_password(&mut doc, pwd, "Xk9!aT2pQw");

        let confirm = doc.find_by_id("confirm-pwd").unwrap();
        assert_eq!(outcome.confirm_field(), Some(confirm));
        assert_eq!(doc.element(pwd.unwrap()).value(), "Xk9!aT2pQw");
        assert_eq!(doc.element(confirm).value(), "Xk9!aT2pQw");
        assert_eq!(doc.events().len(), 4);
    }

    #[test]
    fn test_fill_without_confirm_field_leaves_rest_untouched() {
        let root = El::new("form")
            .child(El::input("text").attr("id", "user").value("bob"))
            .child(El::input("password").attr("id", "pwd"));
        let mut doc = Document::new("https://a.com", &root);
        let pwd = doc.find_by_id("pwd");

        let outcome = AutoFiller::default().fill_password(&mut doc, pwd, "secret");

        assert_eq!(
            outcome,
            FillOutcome::Input {
                target: pwd.unwrap(),
                confirm: None
            }
        );
        assert_eq!(doc.element(doc.find_by_id("user").unwrap()).value(), "bob");
    }

    #[test]
    fn test_fill_no_active_field_is_noop() {
        let mut doc = signup("Confirm Password");
        let outcome = AutoFiller::default().fill_password(&mut doc, None, "secret");
        assert_eq!(outcome, FillOutcome::NoActiveField);
        assert!(doc.events().is_empty());

        let label = doc.all().find(|&n| doc.element(n).tag() == "label");
        let outcome = AutoFiller::default().fill_password(&mut doc, label, "secret");
        assert!(!outcome.filled());
    }

    #[test]
    fn test_fill_content_editable() {
        let root = El::new("body").child(El::new("div").attr("id", "ed").editable());
        let mut doc = Document::new("https://a.com", &root);
        let ed = doc.find_by_id("ed");
        let outcome = AutoFiller::default().fill_password(&mut doc, ed, "secret");
        assert!(matches!(outcome, FillOutcome::ContentEditable { .. }));
        assert_eq!(doc.element(ed.unwrap()).own_text(), "secret");
    }

    #[test]
    fn test_watcher_captures_on_submit_and_click() {
        let mut doc = signup("Repeat");
        let pwd = doc.find_by_id("pwd").unwrap();
        let filler = AutoFiller::default();
        filler.fill_password(&mut doc, Some(pwd), "s3cret!");

        let mut watcher = SubmissionWatcher::new();
        let subs = watcher.watch(&doc, pwd);
        assert_eq!(subs.len(), 2);

        let form = doc.find_by_id("signup").unwrap();
        let go = doc.find_by_id("go").unwrap();
        let captured = watcher
            .handle_event(&doc, form, EventKind::Submit, filler.classifier())
            .unwrap();
        assert_eq!(captured.username.as_deref(), Some("bob"));
        assert_eq!(captured.password.as_deref(), Some("s3cret!"));

        assert!(watcher
            .handle_event(&doc, go, EventKind::Click, filler.classifier())
            .is_some());
        assert!(watcher
            .handle_event(&doc, pwd, EventKind::Click, filler.classifier())
            .is_none());
    }

    #[test]
    fn test_submit_control_outside_form_captures_nothing() {
        let root = El::new("body")
            .child(El::input("text").attr("name", "username").value("bob"))
            .child(El::input("password").attr("id", "pwd").value("s3cret!"))
            .child(El::new("button").attr("type", "submit").attr("id", "go"));
        let doc = Document::new("https://a.com/login", &root);
        let pwd = doc.find_by_id("pwd").unwrap();
        let go = doc.find_by_id("go").unwrap();
        let classifier = FieldClassifier::new();

        let mut watcher = SubmissionWatcher::new();
        let subs = watcher.watch(&doc, pwd);
        assert_eq!(subs.len(), 1);

        assert!(watcher
            .handle_event(&doc, go, EventKind::Click, &classifier)
            .is_none());
    }

    #[test]
    fn test_disposed_subscription_stops_capture() {
        let doc = signup("Repeat");
        let pwd = doc.find_by_id("pwd").unwrap();
        let form = doc.find_by_id("signup").unwrap();
        let classifier = FieldClassifier::new();

        let mut watcher = SubmissionWatcher::new();
        let mut subs = watcher.watch(&doc, pwd);
        watcher.dispose(subs.remove(0));

        assert!(watcher
            .handle_event(&doc, form, EventKind::Submit, &classifier)
            .is_none());
        assert!(watcher.is_watching());
        watcher.dispose_all();
        assert!(!watcher.is_watching());
    }
}
