// Extension controller - context-menu trigger, password generation, credential saving
use crate::autofill::{AutoFiller, FillOutcome};
use crate::classifier::FieldClassifier;
use crate::config::Config;
use crate::content::ContentScript;
use crate::credential::Credential;
use crate::dom::{Document, NodeId};
use crate::generator::{CharClasses, GeneratorError, PasswordGenerator};
use crate::messages::{Message, Response};
use crate::storage::KeyValueStore;
use crate::store::{CredentialStore, StoreError, UpsertOutcome};
use rand::rngs::ThreadRng;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const GENERATE_MENU_ID: &str = "generate-password";

/// A contextual trigger registered with the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItem {
    pub id: &'static str,
    pub title: &'static str,
    pub contexts: &'static [&'static str],
}

pub const MENU_ITEMS: &[MenuItem] = &[MenuItem {
    id: GENERATE_MENU_ID,
    title: "Generate Strong Password",
    contexts: &["editable"],
}];

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error(transparent)]
    Generator(#[from] GeneratorError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of a context-menu click.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFill {
    pub password: String,
    pub fill: FillOutcome,
}

pub struct Controller<S: KeyValueStore, R: Rng = ThreadRng> {
    store: CredentialStore<S>,
    generator: PasswordGenerator<R>,
    length: usize,
    classes: CharClasses,
    next_tab_id: u32,
}

impl<S: KeyValueStore> Controller<S, ThreadRng> {
    pub fn new(store: CredentialStore<S>, config: &Config) -> Self {
        Self::with_generator(store, PasswordGenerator::new(), config)
    }
}

impl<S: KeyValueStore, R: Rng> Controller<S, R> {
    pub fn with_generator(
        store: CredentialStore<S>,
        generator: PasswordGenerator<R>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            generator,
            length: config.password_length,
            classes: config.classes,
            next_tab_id: 1,
        }
    }

    pub fn store(&self) -> &CredentialStore<S> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut CredentialStore<S> {
        &mut self.store
    }

    pub fn menu_items(&self) -> &'static [MenuItem] {
        MENU_ITEMS
    }

    /// Generate a password with the configured length and classes.
    pub fn generate(&mut self) -> Result<String, GeneratorError> {
        self.generator.generate(self.length, self.classes)
    }

    /// React to a context-menu click on the page: generate a password, send
    /// it to the page script for filling and remember it until a save.
    /// Clicks on other menu items are ignored.
    pub fn on_menu_click(
        &mut self,
        menu_id: &str,
        script: &mut ContentScript,
        doc: &mut Document,
        focused: Option<NodeId>,
    ) -> Result<Option<GeneratedFill>, ControllerError> {
        if menu_id != GENERATE_MENU_ID {
            debug!("Ignoring menu item {}", menu_id);
            return Ok(None);
        }

        let password = self.generate()?;
        let message = Message::FillPassword {
            password: password.clone(),
        };
        let response = script.handle(doc, focused, &message);
        if !response.success {
            warn!(
                "Page did not accept the password: {}",
                response.error.as_deref().unwrap_or("unknown error")
            );
        }
        self.store.stash_pending(&password)?;

        let fill = script.last_fill().unwrap_or(FillOutcome::NoActiveField);
        Ok(Some(GeneratedFill { password, fill }))
    }

    /// Persist captured credentials, then drop the pending password.
    pub fn save_credentials(&mut self, credential: Credential) -> Result<UpsertOutcome, StoreError> {
        let outcome = self.store.upsert(credential)?;
        self.store.clear_pending()?;
        Ok(outcome)
    }

    /// Handle a message from a page script.
    pub fn handle(&mut self, message: Message) -> Response {
        match message {
            Message::SaveCredentials { data } => match self.save_credentials(data.into()) {
                Ok(_) => Response::ok(),
                Err(e) => Response::failed(e.to_string()),
            },
            Message::OpenCredentialsPage => {
                let tab_id = self.next_tab_id;
                self.next_tab_id += 1;
                info!("Opening credentials page in tab {}", tab_id);
                Response::with_tab(tab_id)
            }
            other => Response::failed(format!(
                "Unsupported action for controller: {}",
                other.action()
            )),
        }
    }
}

/// Page script wired to the configured heuristics.
pub fn content_script(config: &Config) -> ContentScript {
    let classifier = FieldClassifier::new().with_threshold(config.nearby_label_threshold_px);
    ContentScript::new(AutoFiller::new(classifier))
}
