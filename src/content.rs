// Page-side script - answers fill requests and reports submitted credentials
use crate::autofill::{AutoFiller, FillOutcome, SubmissionWatcher, Subscription};
use crate::dom::{Document, EventKind, NodeId};
use crate::messages::{Message, Response};
use tracing::debug;

pub struct ContentScript {
    filler: AutoFiller,
    watcher: SubmissionWatcher,
    subscriptions: Vec<Subscription>,
    last_fill: Option<FillOutcome>,
}

impl ContentScript {
    pub fn new(filler: AutoFiller) -> Self {
        Self {
            filler,
            watcher: SubmissionWatcher::new(),
            subscriptions: Vec::new(),
            last_fill: None,
        }
    }

    /// Outcome of the most recent `fillPassword`.
    pub fn last_fill(&self) -> Option<FillOutcome> {
        self.last_fill
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.is_watching()
    }

    /// Handle a message addressed to the page. Only `fillPassword` is meant
    /// for this side.
    pub fn handle(&mut self, doc: &mut Document, focused: Option<NodeId>, message: &Message) -> Response {
        match message {
            Message::FillPassword { password } => {
                let outcome = self.filler.fill_password(doc, focused, password);
                self.last_fill = Some(outcome);
                if let FillOutcome::Input { target, .. } = outcome {
                    self.rearm(doc, target);
                }
                Response::ok()
            }
            other => Response::failed(format!("Unsupported action on page: {}", other.action())),
        }
    }

    fn rearm(&mut self, doc: &Document, field: NodeId) {
        for subscription in self.subscriptions.drain(..) {
            self.watcher.dispose(subscription);
        }
        self.subscriptions = self.watcher.watch(doc, field);
    }

    /// Feed a page event. A watched submit produces the `saveCredentials`
    /// message to send to the controller.
    pub fn on_event(&self, doc: &Document, target: NodeId, kind: EventKind) -> Option<Message> {
        let data = self
            .watcher
            .handle_event(doc, target, kind, self.filler.classifier())?;
        debug!("Captured credentials on {:?}", kind);
        Some(Message::SaveCredentials { data })
    }

    /// Stop watching the page.
    pub fn detach(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            self.watcher.dispose(subscription);
        }
    }
}
