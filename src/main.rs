use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use passfill::autofill::FillOutcome;
use passfill::config::Config;
use passfill::controller::{content_script, Controller, GENERATE_MENU_ID};
use passfill::credential::{Credential, IdentifierKind};
use passfill::dom::{Document, EventKind, PageSnapshot};
use passfill::generator::{CharClasses, PasswordGenerator};
use passfill::messages::Message;
use passfill::storage::JsonFileStore;
use passfill::store::{sort_entries, CredentialStore, SortOrder};
use passfill::FieldClassifier;
use serde_json::json;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod cli_output;

use cli_output::OutputWriter;

#[derive(Parser)]
#[command(name = "passfill")]
#[command(about = "Generate passwords, fill them into page forms and keep site credentials", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Credential storage file (default: platform data dir)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Config file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate passwords
    Generate {
        /// Password length (default from config, 16)
        #[arg(short, long)]
        length: Option<usize>,

        /// How many passwords to print
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,

        /// Leave out uppercase letters
        #[arg(long)]
        no_upper: bool,

        /// Leave out lowercase letters
        #[arg(long)]
        no_lower: bool,

        /// Leave out digits
        #[arg(long)]
        no_digits: bool,

        /// Leave out symbols
        #[arg(long)]
        no_symbols: bool,
    },

    /// Generate a password and fill it into a page snapshot's focused field
    Fill {
        /// Page snapshot (JSON)
        #[arg(short, long)]
        page: PathBuf,

        /// Id of the field to fill (default: the snapshot's focused element)
        #[arg(short, long)]
        focus: Option<String>,

        /// Write the filled snapshot here
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Submit the form afterwards and save the captured credentials
        #[arg(long)]
        submit: bool,
    },

    /// Read username/email/phone/password out of a form in a page snapshot
    Capture {
        /// Page snapshot (JSON)
        #[arg(short, long)]
        page: PathBuf,

        /// Id of the form (default: the focused element's form, else the first form)
        #[arg(long)]
        form: Option<String>,

        /// Save what was captured
        #[arg(long)]
        save: bool,
    },

    /// Save a credential by hand
    Save {
        #[arg(long)]
        url: String,

        #[arg(long)]
        password: String,

        #[arg(long)]
        username: Option<String>,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        phone: Option<String>,
    },

    /// List saved credentials
    List {
        /// Only this site (URL or host)
        #[arg(short, long)]
        domain: Option<String>,

        /// Filter by site, username, email or phone
        #[arg(short, long)]
        search: Option<String>,

        /// default, date-desc, date-asc, domain-asc, domain-desc
        #[arg(long)]
        sort: Option<SortOrder>,
    },

    /// Print one field of a saved credential
    Show {
        /// Index as shown by `list`
        index: usize,

        /// password, username, email, phone or identifier
        #[arg(short, long, default_value = "password")]
        field: String,
    },

    /// Delete a saved credential
    Delete {
        /// Index as shown by `list`
        index: usize,
    },

    /// Remove duplicate credentials (same site and identifier)
    Dedupe,

    /// Delete every saved credential
    Clear {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Show the password generated last that has not been saved yet
    Pending,

    /// Send a raw JSON message to the controller ("-" reads stdin)
    Message { json: String },

    /// Manage configuration (show, path, get, set, reset)
    Config {
        #[arg(default_value = "show")]
        action: String,

        key: Option<String>,

        value: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::config_file_path()?,
    };
    let config = Config::load_from(&config_path)?;
    let store_path = cli.store.clone().unwrap_or_else(|| config.store_path());
    let out = OutputWriter::auto();

    match cli.command {
        Commands::Generate {
            length,
            count,
            no_upper,
            no_lower,
            no_digits,
            no_symbols,
        } => {
            let classes = CharClasses {
                upper: config.classes.upper && !no_upper,
                lower: config.classes.lower && !no_lower,
                digit: config.classes.digit && !no_digits,
                symbol: config.classes.symbol && !no_symbols,
            };
            let length = length.unwrap_or(config.password_length);

            let mut generator = PasswordGenerator::new();
            let passwords = (0..count)
                .map(|_| generator.generate(length, classes))
                .collect::<Result<Vec<_>, _>>()?;

            if out.is_json() {
                out.emit(&json!({ "passwords": passwords }));
            } else {
                for password in passwords {
                    println!("{}", password);
                }
            }
            Ok(())
        }

        Commands::Fill {
            page,
            focus,
            output,
            submit,
        } => {
            let snapshot = PageSnapshot::from_file(&page)?;
            let (mut doc, snapshot_focus) = Document::from_snapshot(&snapshot);
            let focused = match focus {
                Some(id) => Some(
                    doc.find_by_id(&id)
                        .ok_or_else(|| anyhow!("No element with id \"{}\" in {}", id, page.display()))?,
                ),
                None => snapshot_focus,
            };

            let mut controller = Controller::new(open_store(&store_path)?, &config);
            let mut script = content_script(&config);
            let generated = controller
                .on_menu_click(GENERATE_MENU_ID, &mut script, &mut doc, focused)?
                .ok_or_else(|| anyhow!("Password generation menu is not registered"))?;

            let confirm_id = generated
                .fill
                .confirm_field()
                .map(|id| doc.element(id).id().to_string());

            let mut saved = false;
            if submit && generated.fill.filled() {
                if let Some(form) = focused.and_then(|f| doc.form_of(f)) {
                    doc.dispatch(form, EventKind::Submit);
                    if let Some(message) = script.on_event(&doc, form, EventKind::Submit) {
                        let response = controller.handle(message);
                        if let Some(error) = response.error {
                            bail!("Saving credentials failed: {}", error);
                        }
                        saved = response.success;
                    }
                } else {
                    out.warning("Focused field is not inside a form; nothing submitted");
                }
            }

            if let Some(path) = &output {
                let json = serde_json::to_string_pretty(&doc.to_snapshot(focused))?;
                fs::write(path, json)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }

            if out.is_json() {
                out.emit(&json!({
                    "password": generated.password,
                    "filled": generated.fill.filled(),
                    "confirmField": confirm_id,
                    "saved": saved,
                }));
                return Ok(());
            }

            match generated.fill {
                FillOutcome::NoActiveField => {
                    out.warning("No active field to fill; password kept as pending")
                }
                _ => out.success("Password generated and filled in the field."),
            }
            match &confirm_id {
                Some(id) if !id.is_empty() => out.success(&format!("Confirm field #{} filled too", id)),
                Some(_) => out.success("Confirm field filled too"),
                None => out.info("No confirm field found"),
            }
            if saved {
                out.success("Credentials saved");
            }
            if let Some(path) = &output {
                out.info(&format!("Filled page written to {}", path.display()));
            }
            println!("{}", generated.password);
            Ok(())
        }

        Commands::Capture { page, form, save } => {
            let snapshot = PageSnapshot::from_file(&page)?;
            let (doc, focused) = Document::from_snapshot(&snapshot);

            let form_id = match form {
                Some(id) => Some(
                    doc.find_by_id(&id)
                        .filter(|&n| doc.element(n).tag() == "form")
                        .ok_or_else(|| anyhow!("No form with id \"{}\"", id))?,
                ),
                None => focused
                    .and_then(|f| doc.form_of(f))
                    .or_else(|| doc.all().find(|&n| doc.element(n).tag() == "form")),
            };
            let Some(form_id) = form_id else {
                out.warning("No form on the page; nothing captured");
                return Ok(());
            };

            let classifier = FieldClassifier::new().with_threshold(config.nearby_label_threshold_px);
            let captured = classifier.capture_identity(&doc, form_id);
            debug!("Captured from form #{}", doc.element(form_id).id());

            if out.is_json() {
                out.emit(&captured);
            } else {
                out.section("Captured");
                out.table(&[
                    ("URL", captured.url.clone()),
                    ("Username", captured.username.clone().unwrap_or_default()),
                    ("Email", captured.email.clone().unwrap_or_default()),
                    ("Phone", captured.phone.clone().unwrap_or_default()),
                    (
                        "Password",
                        if captured.password.is_some() { "(captured)" } else { "" }.to_string(),
                    ),
                ]);
            }

            if save {
                let mut controller = Controller::new(open_store(&store_path)?, &config);
                controller.save_credentials(captured.into())?;
                out.success("Credentials saved");
            }
            Ok(())
        }

        Commands::Save {
            url,
            password,
            username,
            email,
            phone,
        } => {
            let mut credential = Credential::new(&url, &password);
            if let Some(username) = username {
                credential = credential.with_username(&username);
            }
            if let Some(email) = email {
                credential = credential.with_email(&email);
            }
            if let Some(phone) = phone {
                credential = credential.with_phone(&phone);
            }

            let mut controller = Controller::new(open_store(&store_path)?, &config);
            let outcome = controller.save_credentials(credential)?;
            out.success(&format!("Credentials saved ({:?})", outcome));
            Ok(())
        }

        Commands::List {
            domain,
            search,
            sort,
        } => {
            let store = open_store(&store_path)?;
            let mut entries = match &domain {
                Some(domain) => store.list_for_domain(domain),
                None => store.entries(),
            };
            if let Some(term) = &search {
                entries.retain(|e| e.credential.matches(term));
            }
            let entries = sort_entries(entries, sort.unwrap_or(config.sort_order));

            out.section(&format!("Saved credentials ({})", entries.len()));
            out.credentials(&entries);
            Ok(())
        }

        Commands::Show { index, field } => {
            let store = open_store(&store_path)?;
            let all = store.list_all();
            let credential = all.get(index).ok_or_else(|| {
                anyhow!("Invalid credential index {} (store holds {})", index, all.len())
            })?;

            let value = match field.to_lowercase().as_str() {
                "password" => Some(credential.password.as_str()),
                "username" => credential.field(IdentifierKind::Username),
                "email" => credential.field(IdentifierKind::Email),
                "phone" => credential.field(IdentifierKind::Phone),
                "identifier" | "id" => Some(credential.identifier()).filter(|s| !s.is_empty()),
                other => bail!("Unknown field: {}. Use password, username, email, phone or identifier", other),
            };
            match value {
                Some(value) => println!("{}", value),
                None => bail!("Credential #{} has no {}", index, field),
            }
            Ok(())
        }

        Commands::Delete { index } => {
            let mut store = open_store(&store_path)?;
            let removed = store.delete_at(index)?;
            out.success(&format!(
                "Credential deleted ({} {})",
                removed.domain(),
                removed.identifier()
            ));
            Ok(())
        }

        Commands::Dedupe => {
            let mut store = open_store(&store_path)?;
            let removed = store.deduplicate()?;
            if removed > 0 {
                out.success(&format!("{} duplicate(s) removed", removed));
            } else {
                out.info("No duplicates found");
            }
            Ok(())
        }

        Commands::Clear { yes } => {
            if !yes && !confirm("Delete all saved credentials?")? {
                out.info("Nothing deleted");
                return Ok(());
            }
            let mut store = open_store(&store_path)?;
            store.clear()?;
            out.success("All credentials deleted");
            Ok(())
        }

        Commands::Pending => {
            let store = open_store(&store_path)?;
            match store.pending() {
                Some(pending) => {
                    out.table(&[
                        ("Password", pending.password),
                        ("Generated", pending.created.to_rfc3339()),
                    ]);
                }
                None => out.info("No pending password"),
            }
            Ok(())
        }

        Commands::Message { json } => {
            let raw = if json == "-" {
                let mut buf = String::new();
                std::io::stdin().read_to_string(&mut buf)?;
                buf
            } else {
                json
            };
            let message: Message = serde_json::from_str(&raw).context("Malformed message")?;

            let mut controller = Controller::new(open_store(&store_path)?, &config);
            let response = controller.handle(message);
            println!("{}", serde_json::to_string(&response)?);
            if response.success {
                Ok(())
            } else {
                Err(anyhow!(response.error.unwrap_or_else(|| "Request failed".to_string())))
            }
        }

        Commands::Config { action, key, value } => {
            handle_config(&out, &config_path, config, &action, key, value)
        }
    }
}

fn open_store(path: &Path) -> Result<CredentialStore<JsonFileStore>> {
    let backend = JsonFileStore::open(path)?;
    Ok(CredentialStore::new(backend))
}

fn confirm(prompt: &str) -> Result<bool> {
    use std::io::Write;

    print!("{} [y/N] ", prompt);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn handle_config(
    out: &OutputWriter,
    path: &Path,
    mut config: Config,
    action: &str,
    key: Option<String>,
    value: Option<String>,
) -> Result<()> {
    match action {
        "show" => {
            out.section("Configuration");
            let rows: Vec<(&str, String)> = Config::KEYS
                .iter()
                .map(|k| (*k, config.get(k).unwrap_or_default()))
                .collect();
            out.table(&rows);
            out.info(&format!("Config file: {}", path.display()));
        }
        "path" => println!("{}", path.display()),
        "get" => {
            let key = key.ok_or_else(|| anyhow!("Usage: passfill config get <key>"))?;
            let value = config
                .get(&key)
                .ok_or_else(|| anyhow!("Unknown config key: {}", key))?;
            println!("{}", value);
        }
        "set" => {
            let (Some(key), Some(value)) = (key, value) else {
                bail!("Usage: passfill config set <key> <value>");
            };
            config.set(&key, &value)?;
            config.save_to(path)?;
            out.success(&format!("{} = {}", key, value));
        }
        "reset" => {
            Config::default().save_to(path)?;
            out.success("Configuration reset to defaults");
        }
        other => bail!("Unknown config action: {}. Use show, path, get, set or reset", other),
    }
    Ok(())
}
