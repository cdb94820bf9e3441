//! CLI binary for tastecheq.
//!
//! A thin shim over the library crate: `serve` runs the HTTP service, `scan`
//! extracts candidates from a menu photo (and optionally reconciles them
//! against a catalog), `account` manages local accounts and sessions.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tastecheq::server::{self, state::AppState};
use tastecheq::store::{AccountStore, MenuItemStore};
use tastecheq::{
    apply_reconciliation, reconcile, Classification, DirectAiExtractor, ExtractionMode, ExtractionStrategy,
    LlmVisionModel, LocalOcrExtractor, MenuItem, Normalization, ProgressCallback, Reconciliation,
    RemoteAiExtractor, ScanConfig, ScanProgressCallback, ServerConfig, SqliteStore,
};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner while the scan runs; switches to a percentage bar when the OCR
/// engine or a batch write reports fractional progress.
struct CliProgressCallback {
    bar: ProgressBar,
    recognizing: AtomicBool,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(100);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Normalizing image…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            recognizing: AtomicBool::new(false),
        })
    }

    fn activate_bar(&self, prefix: &'static str, len: u64) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len}  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        self.bar.set_style(style);
        self.bar.set_length(len);
        self.bar.set_prefix(prefix);
    }
}

impl ScanProgressCallback for CliProgressCallback {
    fn on_scan_start(&self, mode: ExtractionMode) {
        self.bar.set_prefix("Scanning");
        self.bar.set_message(match mode {
            ExtractionMode::Ocr => "recognizing text…",
            ExtractionMode::Ai => "asking the vision model…",
        });
    }

    fn on_recognition_progress(&self, fraction: f32) {
        if !self.recognizing.swap(true, Ordering::SeqCst) {
            self.activate_bar("Recognizing", 100);
        }
        self.bar.set_position((fraction * 100.0).round() as u64);
    }

    fn on_scan_complete(&self, item_count: usize) {
        self.bar.finish_and_clear();
        eprintln!("{} {} candidates found", green("✔"), bold(&item_count.to_string()));
    }

    fn on_scan_error(&self, error: &str) {
        self.bar.finish_and_clear();
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        eprintln!("{} {}", red("✗"), red(&msg));
    }

    fn on_batch_progress(&self, done: usize, total: usize) {
        if done <= 1 {
            self.activate_bar("Saving", total as u64);
            self.bar.reset();
        }
        self.bar.set_position(done as u64);
        if done == total {
            self.bar.finish_and_clear();
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Local OCR (requires a build with --features tesseract)
  tastecheq scan menu.jpg

  # Vision model in-process, with your own key
  GEMINI_API_KEY=... tastecheq scan --mode ai menu.jpg --json

  # Through a running server, spending the account's monthly quota
  tastecheq scan --mode ai --server http://localhost:3000 --session TOKEN menu.jpg

  # Reconcile against a restaurant's catalog and save the result
  tastecheq scan menu.jpg --database menu.db --restaurant r-42 --apply --user-id u-1

  # Run the service
  tastecheq serve --bind 127.0.0.1:3000 --database menu.db

  # Create an admin and print a session token
  tastecheq account create alice --admin --database menu.db

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (default provider)
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
  RUST_LOG                Log filter (e.g. tastecheq=debug)
"#;

/// Scan restaurant menus into structured menu items.
#[derive(Parser, Debug)]
#[command(
    name = "tastecheq",
    version,
    about = "Scan restaurant menus into structured menu items",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "TASTECHEQ_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "TASTECHEQ_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service.
    Serve(ServeArgs),
    /// Extract menu item candidates from a photo.
    Scan(ScanArgs),
    /// Manage accounts.
    #[command(subcommand)]
    Account(AccountCommand),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Socket address to bind.
    #[arg(long, env = "TASTECHEQ_BIND", default_value = "0.0.0.0:3000")]
    bind: String,

    /// SQLite database file; in-memory when omitted.
    #[arg(long, env = "TASTECHEQ_DATABASE")]
    database: Option<PathBuf>,

    /// Monthly AI extractions for free accounts.
    #[arg(long, env = "TASTECHEQ_FREE_LIMIT", default_value_t = tastecheq::config::FREE_TIER_LIMIT)]
    free_limit: u32,

    #[command(flatten)]
    model: ModelArgs,
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// Vision model ID (e.g. gemini-2.0-flash, gpt-4.1-mini).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Vision provider: gemini, openai, anthropic, ollama.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,
}

#[derive(Args, Debug)]
struct ScanArgs {
    /// Local image path or HTTP/HTTPS URL.
    input: String,

    /// Extraction strategy.
    #[arg(long, value_enum, default_value = "ocr")]
    mode: ModeArg,

    /// Image normalizer.
    #[arg(long, value_enum, default_value = "refined")]
    normalize: NormalizeArg,

    /// Send the image to this tastecheq server instead of calling the model directly.
    #[arg(long, env = "TASTECHEQ_SERVER")]
    server: Option<String>,

    /// Session token for --server.
    #[arg(long, env = "TASTECHEQ_SESSION")]
    session: Option<String>,

    /// Tesseract language code.
    #[arg(long, default_value = "eng")]
    lang: String,

    /// JSON file holding the catalog (array of menu items) to reconcile against.
    #[arg(long, conflicts_with = "database")]
    existing: Option<PathBuf>,

    /// SQLite database holding the catalog to reconcile against.
    #[arg(long, requires = "restaurant")]
    database: Option<PathBuf>,

    /// Restaurant whose catalog is used with --database.
    #[arg(long)]
    restaurant: Option<String>,

    /// Write new items and updates to --database.
    #[arg(long, requires = "database")]
    apply: bool,

    /// Account recorded as creator of applied items.
    #[arg(long)]
    user_id: Option<String>,

    /// Output structured JSON instead of a table.
    #[arg(long)]
    json: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, default_value_t = 120)]
    download_timeout: u64,

    #[command(flatten)]
    model: ModelArgs,
}

#[derive(Subcommand, Debug)]
enum AccountCommand {
    /// Create an account and print a session token for it.
    Create {
        name: String,
        /// Grant admin rights (unmetered, may reset counters).
        #[arg(long)]
        admin: bool,
        /// Activate a subscription (unmetered).
        #[arg(long)]
        paid: bool,
        #[arg(long, env = "TASTECHEQ_DATABASE")]
        database: PathBuf,
    },
    /// Issue a new session token for an existing account.
    Login {
        user_id: String,
        #[arg(long, env = "TASTECHEQ_DATABASE")]
        database: PathBuf,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Ocr,
    Ai,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum NormalizeArg {
    Basic,
    Refined,
}

impl From<NormalizeArg> for Normalization {
    fn from(v: NormalizeArg) -> Self {
        match v {
            NormalizeArg::Basic => Normalization::Basic,
            NormalizeArg::Refined => Normalization::Refined,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The progress bar covers interactive scans; keep library logs quiet then.
    let interactive_scan = matches!(&cli.command, Command::Scan(args) if !args.json);
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || interactive_scan {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Serve(args) => run_serve(args).await,
        Command::Scan(args) => run_scan(args, cli.quiet).await,
        Command::Account(cmd) => run_account(cmd),
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let server_config = ServerConfig {
        bind: args.bind,
        database: args.database,
        ..ServerConfig::default()
    };
    let scan_config = model_builder(&args.model)
        .free_tier_limit(args.free_limit)
        .build()
        .context("Invalid configuration")?;

    let state = AppState::from_config(&server_config, scan_config).context("Failed to initialise state")?;
    server::serve(state, &server_config).await.context("Server failed")
}

fn model_builder(args: &ModelArgs) -> tastecheq::ScanConfigBuilder {
    let mut builder = ScanConfig::builder();
    if let Some(model) = &args.model {
        builder = builder.model(model.clone());
    }
    if let Some(provider) = &args.provider {
        builder = builder.provider_name(provider.clone());
    }
    builder
}

async fn run_scan(args: ScanArgs, quiet: bool) -> Result<()> {
    if args.apply && args.user_id.is_none() {
        anyhow::bail!("--apply needs --user-id");
    }
    let show_progress = !quiet && !args.json;
    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ScanProgressCallback>)
    } else {
        None
    };

    let mut builder = model_builder(&args.model)
        .normalization(args.normalize.into())
        .ocr_language(args.lang.clone())
        .download_timeout_secs(args.download_timeout);
    if let Some(cb) = progress.clone() {
        builder = builder.progress_callback(cb);
    }
    let config = Arc::new(builder.build().context("Invalid configuration")?);

    let strategy: Box<dyn ExtractionStrategy> = match (args.mode, &args.server) {
        (ModeArg::Ocr, _) => Box::new(LocalOcrExtractor::from_config(&config).context("OCR unavailable")?),
        (ModeArg::Ai, Some(url)) => Box::new(RemoteAiExtractor::new(url.clone(), args.session.clone())),
        (ModeArg::Ai, None) => {
            let model = LlmVisionModel::from_config(&config).context("No vision provider configured")?;
            Box::new(DirectAiExtractor::new(Arc::new(model), config.clone()))
        }
    };

    let output = tastecheq::scan_menu(&args.input, strategy.as_ref(), &config)
        .await
        .context("Scan failed")?;

    let store = match &args.database {
        Some(path) => Some(SqliteStore::open(path).with_context(|| format!("Failed to open {:?}", path))?),
        None => None,
    };
    let existing = load_catalog(&args, store.as_ref()).await?;
    let reconciliation = existing.as_ref().map(|items| reconcile(&output.candidates, items));

    if args.json {
        let value = serde_json::json!({
            "scan": output,
            "reconciliation": reconciliation,
        });
        println!("{}", serde_json::to_string_pretty(&value).context("Failed to serialise output")?);
    } else {
        match &reconciliation {
            Some(rec) => print_reconciliation(rec),
            None => print_candidates(&output.candidates),
        }
        if !quiet {
            eprintln!(
                "{}  {} → {}  {}ms",
                dim(&output.image.name),
                dim(&format_bytes(output.image.original_bytes)),
                dim(&format_bytes(output.image.normalized_bytes)),
                output.duration_ms
            );
        }
    }

    if args.apply {
        let (Some(store), Some(rec), Some(restaurant), Some(user)) =
            (store.as_ref(), reconciliation.as_ref(), args.restaurant.as_deref(), args.user_id.as_deref())
        else {
            anyhow::bail!("--apply needs --database, --restaurant and --user-id");
        };
        let report = apply_reconciliation(store, restaurant, user, rec, progress.as_ref())
            .context("Failed to save menu items")?;
        if !quiet {
            eprintln!(
                "{} {} added, {} updated, {} skipped",
                green("✔"),
                bold(&report.added.to_string()),
                bold(&report.updated.to_string()),
                report.skipped
            );
        }
    }

    Ok(())
}

async fn load_catalog(args: &ScanArgs, store: Option<&SqliteStore>) -> Result<Option<Vec<MenuItem>>> {
    if let Some(path) = &args.existing {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read catalog from {:?}", path))?;
        let items: Vec<MenuItem> = serde_json::from_str(&raw).context("Catalog is not a JSON array of menu items")?;
        return Ok(Some(items));
    }
    match (store, args.restaurant.as_deref()) {
        (Some(store), Some(restaurant)) => Ok(Some(
            store.list_menu_items(restaurant).context("Failed to list menu items")?,
        )),
        _ => Ok(None),
    }
}

fn print_candidates(items: &[tastecheq::MenuItemCandidate]) {
    for item in items {
        println!("{:<36} {:>8}", item.name, item.price.as_deref().unwrap_or(""));
        if let Some(desc) = &item.description {
            println!("  {}", dim(desc));
        }
    }
}

fn print_reconciliation(rec: &Reconciliation) {
    for entry in &rec.entries {
        let tag = match &entry.classification {
            Classification::New => green("new      "),
            Classification::Duplicate { .. } => dim("duplicate"),
            Classification::UpdateCandidate { .. } => cyan("update   "),
        };
        println!(
            "{}  {:<36} {:>8}",
            tag,
            entry.candidate.name,
            entry.candidate.price.as_deref().unwrap_or("")
        );
    }
}

fn format_bytes(n: usize) -> String {
    if n >= 1024 * 1024 {
        format!("{:.1} MiB", n as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.0} KiB", n as f64 / 1024.0)
    }
}

fn run_account(cmd: AccountCommand) -> Result<()> {
    match cmd {
        AccountCommand::Create {
            name,
            admin,
            paid,
            database,
        } => {
            let store = SqliteStore::open(&database).with_context(|| format!("Failed to open {:?}", database))?;
            let account = store.create_account(&name, admin).context("Failed to create account")?;
            if paid {
                store
                    .set_subscription(&account.id, true)
                    .context("Failed to activate subscription")?;
            }
            let token = store.create_session(&account.id).context("Failed to create session")?;
            eprintln!("{} account {} ({})", green("✔"), bold(&account.name), dim(&account.id));
            println!("{token}");
        }
        AccountCommand::Login { user_id, database } => {
            let store = SqliteStore::open(&database).with_context(|| format!("Failed to open {:?}", database))?;
            let account = store.get_account(&user_id).context("Unknown account")?;
            let token = store.create_session(&account.id).context("Failed to create session")?;
            println!("{token}");
        }
    }
    Ok(())
}
