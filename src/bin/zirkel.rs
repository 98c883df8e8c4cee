//! CLI binary for zirkel-inventory.
//!
//! A thin shim over the library crate: each subcommand maps its flags to one
//! library entry point and prints the result.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use zirkel_inventory::config::DEFAULT_IMAGE_BASE_URL;
use zirkel_inventory::inventory::providers;
use zirkel_inventory::{
    extract_file, write_records, CandidatePolicy, DeckConfig, ExtractedMediaRecord, ExtractionProgressCallback,
    GoogleDeckStore, GoogleSheetsStore, ImageStore, Inventory, InventoryConfig, InventoryRecord, PdfEngine,
    PipelineConfig, ProgressCallback, ProposalAssembler, RetryPolicy,
};

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
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

/// Terminal progress callback: a spinner while the document is structured,
/// then a bar over image selection with one log line per record. Records
/// settle out of order when selection runs concurrently.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-record wall-clock start times for elapsed reporting.
    start_times: Mutex<HashMap<usize, Instant>>,
    without_image: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner-only until the record count is known.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening document…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            without_image: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} records  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Selecting");
        self.bar.reset_eta();
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, page_count: usize) {
        self.bar.set_prefix("Structuring");
        self.bar.set_message(format!("{page_count} pages"));
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Structuring {page_count} pages…"))
        ));
    }

    fn on_records_structured(&self, record_count: usize) {
        self.activate_bar(record_count);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("{record_count} sites found, selecting images…"))
        ));
    }

    fn on_selection_start(&self, record: usize, _total: usize) {
        self.start_times.lock().unwrap().insert(record, Instant::now());
        self.bar.set_message(format!("record {record}"));
    }

    fn on_selection_complete(&self, record: usize, total: usize, has_image: bool) {
        let elapsed_ms = self
            .start_times
            .lock()
            .unwrap()
            .remove(&record)
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);

        let (mark, label) = if has_image {
            (green("✓"), "image".to_string())
        } else {
            self.without_image.fetch_add(1, Ordering::SeqCst);
            (yellow("·"), dim("no image"))
        };
        self.bar.println(format!(
            "  {mark} Record {record:>3}/{total:<3}  {label:<8}  {}",
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_extraction_complete(&self, record_count: usize, with_image: usize) {
        self.bar.finish_and_clear();
        let missing = self.without_image.load(Ordering::SeqCst);
        if missing == 0 {
            eprintln!(
                "{} {} records extracted, all with images",
                green("✔"),
                bold(&record_count.to_string())
            );
        } else {
            eprintln!(
                "{} {} records extracted  ({} with images, {} without)",
                cyan("⚠"),
                bold(&record_count.to_string()),
                with_image,
                yellow(&missing.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract a provider listing to JSON (stdout)
  zirkel extract catalogo.pdf

  # Upsert-ready records for a catalogued provider, images saved by key
  zirkel extract catalogo.pdf --proveedor "Vallas del Norte" --images-dir ./media -o vdn.json

  # Spreadsheet input, only the largest raster per page as a candidate
  zirkel extract tarifas.xlsx --policy largest --model gemini-2.0-flash --provider gemini

  # Write upsert-ready records into the inventory sheet
  zirkel reconcile vdn.json

  # Look up inventory items and build a proposal deck from them
  zirkel lookup ZMVDN001 ZMVDN014
  zirkel proposal ZMVDN001 ZMVDN014

  # Provider catalogue
  zirkel providers --json

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY                   OpenAI API key
  ANTHROPIC_API_KEY                Anthropic API key
  GEMINI_API_KEY                   Google Gemini API key
  EDGEQUAKE_PROVIDER               Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL                  Override model ID
  PDFIUM_LIB_PATH                  Directory holding libpdfium (default: system library)
  GOOGLE_SHEETS_ID                 Inventory spreadsheet id
  GOOGLE_ACCESS_TOKEN              OAuth bearer token (sheets, drive, presentations scopes)
  GOOGLE_SLIDES_PROPOSAL_TEMPLATE  Proposal template deck id
  GOOGLE_DRIVE_PROPOSAL_FOLDER     Drive folder receiving proposals
  IMAGES_PATH                      Directory for companion images
  PUBLIC_API_BASE_URL              Base URL serving /media/<key>.jpeg
"#;

/// Extract media-inventory records from provider listings and keep the
/// inventory spreadsheet in sync.
#[derive(Parser, Debug)]
#[command(
    name = "zirkel",
    version,
    about = "Extract media-inventory records with vision LLMs and reconcile them into a spreadsheet",
    long_about = "Extract out-of-home media sites from provider listings (PDF, Excel, CSV) with \
Vision Language Models, pick each site's photograph from the embedded images, upsert the \
records into the inventory spreadsheet and assemble proposal decks from inventory keys.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "ZIRKEL_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "ZIRKEL_QUIET")]
    quiet: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "ZIRKEL_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract records (with selected images) from a PDF, Excel or CSV listing.
    Extract(ExtractArgs),
    /// Upsert records from a JSON file into the inventory sheet.
    Reconcile(ReconcileArgs),
    /// Print inventory items for the given Zirkel keys.
    Lookup(LookupArgs),
    /// Print the provider catalogue.
    Providers(ProvidersArgs),
    /// Build a proposal deck from inventory keys.
    Proposal(ProposalArgs),
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Listing to extract (PDF, CSV, XLSX, XLS or ODS).
    input: PathBuf,

    /// MIME type of the input. Default: derived from the file extension.
    #[arg(long)]
    mime: Option<String>,

    /// Write JSON to this file instead of stdout.
    #[arg(short, long, env = "ZIRKEL_OUTPUT")]
    output: Option<PathBuf>,

    /// LLM model ID (e.g. gemini-2.0-flash, gpt-4.1-mini).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(
        long,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: openai, anthropic, gemini, azure, ollama, or any OpenAI-compatible URL."
    )]
    provider: Option<String>,

    /// Provider (name or code) whose listing this is; emits upsert-ready records.
    #[arg(
        long,
        long_help = "Name or code of the media provider the listing belongs to. The provider is \
          resolved against the catalogue sheet (needs GOOGLE_SHEETS_ID and GOOGLE_ACCESS_TOKEN) \
          and the output becomes upsert-ready inventory records keyed ZM<code><siteKey>."
    )]
    proveedor: Option<String>,

    /// With --proveedor, store each keyed record's selected image here as <key>.jpeg.
    #[arg(long, env = "IMAGES_PATH")]
    images_dir: Option<PathBuf>,

    /// Candidate images per page: all (model ranks them) or largest.
    #[arg(long, env = "ZIRKEL_POLICY", value_enum, default_value = "all")]
    policy: PolicyArg,

    /// Number of concurrent image-selection calls.
    #[arg(short, long, env = "ZIRKEL_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Path to a text file replacing the extraction prompt.
    #[arg(long, env = "ZIRKEL_PROMPT")]
    prompt: Option<PathBuf>,

    /// Max LLM output tokens for the structuring call.
    #[arg(long, env = "ZIRKEL_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "ZIRKEL_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Attempts per model call when rate-limited.
    #[arg(long, env = "ZIRKEL_MAX_ATTEMPTS", default_value_t = 5)]
    max_attempts: u32,

    /// Directory holding libpdfium. Default: the system library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
struct SheetArgs {
    /// Inventory spreadsheet id.
    #[arg(long, env = "GOOGLE_SHEETS_ID")]
    spreadsheet_id: String,

    /// OAuth bearer token.
    #[arg(long, env = "GOOGLE_ACCESS_TOKEN", hide_env_values = true)]
    access_token: String,

    /// Base URL under which companion images are served.
    #[arg(long, env = "PUBLIC_API_BASE_URL", default_value = DEFAULT_IMAGE_BASE_URL)]
    image_base_url: String,
}

impl SheetArgs {
    fn inventory(&self) -> Result<Inventory<GoogleSheetsStore>> {
        let mut config = InventoryConfig::new(&self.spreadsheet_id, &self.access_token);
        config.image_base_url = self.image_base_url.clone();
        let store = GoogleSheetsStore::from_config(&config).context("Failed to create Sheets client")?;
        Ok(Inventory::new(store, config))
    }
}

#[derive(Args, Debug)]
struct ReconcileArgs {
    /// JSON array of inventory records (e.g. `zirkel extract --proveedor` output).
    input: PathBuf,

    #[command(flatten)]
    sheet: SheetArgs,

    /// Print the report as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct LookupArgs {
    /// Zirkel keys to look up.
    #[arg(required = true)]
    keys: Vec<String>,

    #[command(flatten)]
    sheet: SheetArgs,
}

#[derive(Args, Debug)]
struct ProvidersArgs {
    #[command(flatten)]
    sheet: SheetArgs,

    /// Print the catalogue as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct ProposalArgs {
    /// Zirkel keys, one slide each, in this order.
    #[arg(required = true)]
    keys: Vec<String>,

    #[command(flatten)]
    sheet: SheetArgs,

    /// Proposal template deck id.
    #[arg(long, env = "GOOGLE_SLIDES_PROPOSAL_TEMPLATE")]
    template_id: String,

    /// Drive folder receiving the new deck.
    #[arg(long, env = "GOOGLE_DRIVE_PROPOSAL_FOLDER")]
    folder_id: String,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PolicyArg {
    All,
    Largest,
}

impl From<PolicyArg> for CandidatePolicy {
    fn from(v: PolicyArg) -> Self {
        match v {
            PolicyArg::All => CandidatePolicy::AllCandidates,
            PolicyArg::Largest => CandidatePolicy::LargestOnly,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs during extraction.
    let show_progress = !cli.quiet && !cli.no_progress && matches!(cli.command, Command::Extract(_));
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Extract(ref args) => run_extract(args, show_progress, cli.quiet).await,
        Command::Reconcile(ref args) => run_reconcile(args, cli.quiet).await,
        Command::Lookup(ref args) => run_lookup(args).await,
        Command::Providers(ref args) => run_providers(args).await,
        Command::Proposal(ref args) => run_proposal(args, cli.quiet).await,
    }
}

// ── Subcommands ──────────────────────────────────────────────────────────────

async fn run_extract(args: &ExtractArgs, show_progress: bool, quiet: bool) -> Result<()> {
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(args, progress_cb).await?;
    let engine = match &args.pdfium_dir {
        Some(dir) => PdfEngine::with_library_dir(dir),
        None => PdfEngine::system(),
    };

    let start = Instant::now();
    let records = extract_file(&args.input, args.mime.as_deref(), &engine, &config)
        .await
        .context("Extraction failed")?;

    let Some(proveedor) = &args.proveedor else {
        return emit_records(args, &records, start, quiet).await;
    };

    // ── Upsert-ready output ──────────────────────────────────────────────
    let inventory_config = InventoryConfig::from_env().context("--proveedor needs the inventory spreadsheet")?;
    let store = GoogleSheetsStore::from_config(&inventory_config).context("Failed to create Sheets client")?;
    let catalogue = Inventory::new(store, inventory_config)
        .providers()
        .await
        .context("Failed to read provider catalogue")?;
    let Some(provider) = providers::find(&catalogue, proveedor) else {
        bail!("Provider '{proveedor}' is not in the catalogue; add it to the provider sheet first");
    };

    let store = args.images_dir.as_ref().map(ImageStore::new);
    let mut upserts: Vec<InventoryRecord> = Vec::with_capacity(records.len());
    for record in records {
        let image = record.selected_image.clone();
        let upsert = record.into_inventory_record(&provider.proveedor, &provider.clave);
        if let (Some(store), Some(key), Some(image)) = (&store, &upsert.clave_zirkel, image) {
            let path = store
                .save_data_uri(key, &image)
                .await
                .with_context(|| format!("Failed to store image for {key}"))?;
            if !quiet {
                eprintln!("  {} {}", dim("image"), path.display());
            }
        }
        upserts.push(upsert);
    }

    let json = serde_json::to_string_pretty(&upserts).context("Failed to serialise records")?;
    match &args.output {
        Some(path) => tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{json}"),
    }
    if !quiet {
        let keyless = upserts.iter().filter(|r| r.clave_zirkel.is_none()).count();
        eprintln!(
            "{}  {} records for {}  ({} without site key)  {}ms",
            green("✔"),
            upserts.len(),
            bold(&provider.proveedor),
            keyless,
            start.elapsed().as_millis(),
        );
    }
    Ok(())
}

async fn emit_records(args: &ExtractArgs, records: &[ExtractedMediaRecord], start: Instant, quiet: bool) -> Result<()> {
    match &args.output {
        Some(path) => {
            write_records(path, records)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            if !quiet {
                eprintln!(
                    "{}  {} records  {}ms  →  {}",
                    green("✔"),
                    records.len(),
                    start.elapsed().as_millis(),
                    bold(&path.display().to_string()),
                );
            }
        }
        None => {
            let json = serde_json::to_string_pretty(records).context("Failed to serialise records")?;
            println!("{json}");
        }
    }
    Ok(())
}

async fn run_reconcile(args: &ReconcileArgs, quiet: bool) -> Result<()> {
    let raw = tokio::fs::read(&args.input)
        .await
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let records: Vec<InventoryRecord> =
        serde_json::from_slice(&raw).context("Input is not a JSON array of inventory records")?;

    let report = args
        .sheet
        .inventory()?
        .reconcile(records)
        .await
        .context("Reconciliation failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report).context("Failed to serialise report")?);
    } else if !quiet {
        eprintln!(
            "{}  {} updated  {} recycled  {} appended  {}",
            green("✔"),
            bold(&report.updated.len().to_string()),
            bold(&report.recycled.len().to_string()),
            bold(&report.appended.len().to_string()),
            dim(&format!("({} duplicates dropped)", report.duplicates_dropped)),
        );
        for key in report.appended.iter().chain(&report.recycled) {
            println!("{key}");
        }
    }
    Ok(())
}

async fn run_lookup(args: &LookupArgs) -> Result<()> {
    let items = args
        .sheet
        .inventory()?
        .media_by_keys(&args.keys)
        .await
        .context("Lookup failed")?;
    println!("{}", serde_json::to_string_pretty(&items).context("Failed to serialise items")?);
    Ok(())
}

async fn run_providers(args: &ProvidersArgs) -> Result<()> {
    let catalogue = args
        .sheet
        .inventory()?
        .providers()
        .await
        .context("Failed to read provider catalogue")?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&catalogue).context("Failed to serialise catalogue")?);
        return Ok(());
    }
    for p in &catalogue {
        println!("{:<8} {:<32} {}", bold(&p.clave), p.proveedor, dim(&p.media_types.join(", ")));
    }
    Ok(())
}

async fn run_proposal(args: &ProposalArgs, quiet: bool) -> Result<()> {
    let inventory = args.sheet.inventory()?;
    let config = DeckConfig {
        template_id: args.template_id.clone(),
        folder_id: args.folder_id.clone(),
        access_token: args.sheet.access_token.clone(),
        retry: RetryPolicy::default(),
    };
    let deck = GoogleDeckStore::from_config(&config).context("Failed to create Slides client")?;
    let handle = ProposalAssembler::new(deck, config)
        .build_proposal(&inventory, &args.keys)
        .await
        .context("Proposal failed")?;

    if !quiet {
        eprintln!("{}  {}", green("✔"), bold(&handle.name));
    }
    println!("{}", handle.url);
    Ok(())
}

/// Map `extract` flags to `PipelineConfig`.
async fn build_config(args: &ExtractArgs, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let retry = RetryPolicy {
        max_attempts: args.max_attempts,
        ..RetryPolicy::default()
    };
    let mut builder = PipelineConfig::builder()
        .candidate_policy(args.policy.into())
        .selection_concurrency(args.concurrency)
        .max_tokens(args.max_tokens)
        .temperature(args.temperature)
        .retry(retry);

    if let Some(model) = &args.model {
        builder = builder.model(model);
    }
    if let Some(provider) = &args.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(path) = &args.prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read extraction prompt from {:?}", path))?;
        builder = builder.extraction_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
