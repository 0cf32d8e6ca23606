//! CLI binary for edgequake-menu2xlsx.
//!
//! A thin shim over the library crate that maps CLI flags to `MenuConfig`,
//! drives one session and writes the spreadsheet.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_menu2xlsx::{
    load_document, save_spreadsheet, AzureSettings, DocumentKind, MenuConfig, MenuOutput,
    Pipeline, PipelineProgress, ProgressCallback, SessionState, Stage, EXPORT_FILE_NAME,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner plus one log line per finished stage.
struct CliProgress {
    bar: ProgressBar,
    stage_started: std::sync::Mutex<Option<Instant>>,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            stage_started: std::sync::Mutex::new(None),
        })
    }

    fn elapsed(&self) -> String {
        let secs = self
            .stage_started
            .lock()
            .ok()
            .and_then(|g| *g)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        format!("{secs:.1}s")
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl PipelineProgress for CliProgress {
    fn on_stage_start(&self, stage: Stage) {
        if let Ok(mut g) = self.stage_started.lock() {
            *g = Some(Instant::now());
        }
        let (prefix, msg) = match stage {
            Stage::Extract => ("Extracting", "reading menu text…"),
            Stage::Structure => ("Structuring", "waiting for the model…"),
            Stage::Parse => ("Parsing", "building table…"),
            Stage::Export => ("Exporting", "writing spreadsheet…"),
        };
        self.bar.set_prefix(prefix);
        self.bar.set_message(msg);
    }

    fn on_page_extracted(&self, page_num: usize, total_pages: usize, chars: usize) {
        self.bar
            .set_message(format!("page {page_num}/{total_pages}  {chars} chars"));
    }

    fn on_ocr_poll(&self, attempt: u32, status: &str) {
        self.bar.set_message(format!("OCR {status} (poll {attempt})"));
    }

    fn on_stage_complete(&self, stage: Stage, output_len: usize) {
        let unit = match stage {
            Stage::Extract | Stage::Structure => "chars",
            Stage::Parse => "rows",
            Stage::Export => "bytes",
        };
        self.bar.println(format!(
            "  {} {:<10} {:<14} {}",
            green("✓"),
            stage.to_string(),
            dim(&format!("{output_len:>6} {unit}")),
            dim(&self.elapsed()),
        ));
    }

    fn on_stage_error(&self, stage: Stage, error: &str) {
        let first_line = error.lines().next().unwrap_or(error);
        let msg = if first_line.chars().count() > 80 {
            format!("{}\u{2026}", first_line.chars().take(79).collect::<String>())
        } else {
            first_line.to_string()
        };
        self.bar.println(format!(
            "  {} {:<10} {}  {}",
            red("✗"),
            stage.to_string(),
            red(&msg),
            dim(&self.elapsed()),
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Photo of a menu → restaurant_menu.xlsx (Azure OCR + Azure OpenAI from config.json)
  menu2xlsx menu.jpg

  # PDF menu, explicit output path
  menu2xlsx lunch.pdf -o lunch.xlsx

  # Any edgequake-llm provider for the structuring step
  menu2xlsx --provider openai --model gpt-4.1-mini menu.pdf

  # Show the intermediate text
  menu2xlsx --print-text --print-structured menu.png

  # Re-export a hand-corrected pipe-delimited file, no backends needed
  menu2xlsx --from-structured corrected.txt -o menu.xlsx

  # Machine-readable result
  menu2xlsx --json menu.jpg > menu.json

CONFIG FILE (config.json):
  {
    "azure_api_key": "...",        "azure_endpoint": "https://….openai.azure.com",
    "azure_api_version": "2024-02-01", "deployment_name": "gpt-4o-mini",
    "azure_cv_api_key": "...",     "azure_cv_endpoint": "https://….cognitiveservices.azure.com"
  }
  Every key is optional: PDFs need no OCR keys, and --provider replaces the
  Azure OpenAI keys.

ENVIRONMENT VARIABLES:
  MENU2XLSX_CONFIG        Path to the config file (default: ./config.json if present)
  OPENAI_API_KEY          OpenAI API key (with --provider openai or auto-detection)
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_PROVIDER      Provider name (openai, anthropic, gemini, ollama, …)
  EDGEQUAKE_MODEL         Model ID
  PDFIUM_LIB_PATH         Path to an existing libpdfium; skips auto-download
"#;

/// Convert restaurant menu photos and PDFs into spreadsheets.
#[derive(Parser, Debug)]
#[command(
    name = "menu2xlsx",
    version,
    about = "Convert restaurant menu images and PDFs into an Excel spreadsheet",
    long_about = "Extract the text of a restaurant menu (OCR for JPEG/PNG, the text layer for \
PDF), let a language model arrange it into Category|Item|…|Price rows, and export the result \
as a single-sheet .xlsx workbook.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local JPEG/PNG/PDF path or HTTP/HTTPS URL.
    #[arg(required_unless_present = "from_structured")]
    input: Option<String>,

    /// Spreadsheet to write.
    #[arg(short, long, env = "MENU2XLSX_OUTPUT", default_value = EXPORT_FILE_NAME)]
    output: PathBuf,

    /// JSON file with Azure credentials.
    #[arg(long, env = "MENU2XLSX_CONFIG")]
    config: Option<PathBuf>,

    /// LLM provider for structuring: openai, anthropic, gemini, ollama, …
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// LLM model ID.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Max tokens of model output.
    #[arg(long, env = "MENU2XLSX_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Model temperature (0.0–2.0).
    #[arg(long, env = "MENU2XLSX_TEMPERATURE", default_value_t = 0.3)]
    temperature: f32,

    /// Retries on model failure.
    #[arg(long, env = "MENU2XLSX_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Give up on an OCR operation after this many seconds.
    #[arg(long, env = "MENU2XLSX_OCR_TIMEOUT", default_value_t = 120)]
    ocr_timeout: u64,

    /// Model call timeout in seconds.
    #[arg(long, env = "MENU2XLSX_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "MENU2XLSX_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Worksheet name.
    #[arg(long, env = "MENU2XLSX_SHEET_NAME", default_value = "Restaurant_menu")]
    sheet_name: String,

    /// PDF user password for encrypted menus.
    #[arg(long, env = "MENU2XLSX_PASSWORD")]
    password: Option<String>,

    /// Skip extraction and the model; parse this pipe-delimited file instead.
    #[arg(long, value_name = "FILE")]
    from_structured: Option<PathBuf>,

    /// Print the extracted text to stdout.
    #[arg(long)]
    print_text: bool,

    /// Print the model's pipe-delimited output to stdout.
    #[arg(long)]
    print_structured: bool,

    /// Print the whole result (text, table, errors, stats) as JSON.
    #[arg(long)]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "MENU2XLSX_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MENU2XLSX_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "MENU2XLSX_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner covers INFO-level feedback, so library logs are quieter
    // while it is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress = show_progress.then(CliProgress::new);
    let config = build_config(&cli, progress.clone().map(|p| p as ProgressCallback))?;

    let started = Instant::now();
    let mut state = SessionState::new();

    let pipeline = if let Some(ref path) = cli.from_structured {
        // ── Re-parse a structured file ───────────────────────────────────
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let pipeline = Pipeline::offline(&config).context("Invalid configuration")?;
        pipeline.load_structured_text(&mut state, text);
        pipeline
    } else {
        // ── Full conversion ──────────────────────────────────────────────
        let input = cli.input.as_deref().unwrap_or_default();
        let document = load_document(input, config.download_timeout_secs)
            .await
            .context("Failed to load menu")?;

        if document.kind == DocumentKind::Pdf && config.pdfium_lib_path.is_none() {
            ensure_pdfium(cli.quiet)?;
        }

        let pipeline = Pipeline::new(&config).context("Model backend unavailable")?;
        if document.kind.is_image() && !pipeline.has_ocr() {
            anyhow::bail!(edgequake_menu2xlsx::MenuError::OcrNotConfigured);
        }

        pipeline.ingest(&mut state, &document).await;
        pipeline.generate_structure(&mut state).await;
        pipeline
    };

    let exported = pipeline.export(&mut state);
    if let Some(ref p) = progress {
        p.finish();
    }

    if let Some(ref sheet) = exported {
        save_spreadsheet(sheet, &cli.output)
            .await
            .context("Failed to write spreadsheet")?;
    }

    let output = state.into_output();
    print_results(&cli, &output)?;

    if !cli.quiet {
        summarise(&output, exported.is_some().then_some(cli.output.as_path()), started);
    }

    if exported.is_none() {
        anyhow::bail!("No table was produced; nothing written");
    }
    Ok(())
}

/// Map CLI args to `MenuConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<MenuConfig> {
    let azure = load_azure_settings(cli.config.as_deref())?;

    let mut builder = MenuConfig::builder()
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .ocr_timeout_secs(cli.ocr_timeout)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout)
        .sheet_name(cli.sheet_name.clone())
        .azure(azure);

    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref password) = cli.password {
        builder = builder.pdf_password(password.clone());
    }
    if let Ok(path) = std::env::var("PDFIUM_LIB_PATH") {
        if !path.is_empty() {
            builder = builder.pdfium_lib_path(path);
        }
    }
    if let Some(cb) = progress {
        builder = builder.progress(cb);
    }

    builder.build().context("Invalid configuration")
}

/// `--config` if given, else `./config.json` if present, else empty
/// settings. An explicit `--provider` wins over Azure OpenAI keys.
fn load_azure_settings(path: Option<&Path>) -> Result<AzureSettings> {
    let settings = match path {
        Some(p) => AzureSettings::from_json_file(p)?,
        None => {
            let default = Path::new("config.json");
            if default.is_file() {
                AzureSettings::from_json_file(default)?
            } else {
                AzureSettings::default()
            }
        }
    };
    Ok(settings)
}

/// Make sure a pdfium library is available, downloading it on first use.
fn ensure_pdfium(quiet: bool) -> Result<()> {
    if pdfium_auto::is_pdfium_cached() {
        return Ok(());
    }
    if quiet {
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
            .context("Failed to download PDFium engine")?;
        return Ok(());
    }

    let dl_bar = ProgressBar::new(0);
    dl_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS),
    );
    dl_bar.set_prefix("PDF engine");
    dl_bar.enable_steady_tick(Duration::from_millis(80));

    let bar = dl_bar.clone();
    tokio::task::block_in_place(|| {
        pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
            if let Some(t) = total {
                if bar.length().unwrap_or(0) != t {
                    bar.set_length(t);
                }
            }
            bar.set_position(downloaded);
        }))
    })
    .context("Failed to download PDFium engine")?;

    dl_bar.finish_with_message("ready ✓");
    Ok(())
}

fn print_results(cli: &Cli, output: &MenuOutput) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();

    if cli.json {
        let json = serde_json::to_string_pretty(output).context("Failed to serialise output")?;
        writeln!(handle, "{json}").context("Failed to write to stdout")?;
        return Ok(());
    }
    if cli.print_text {
        writeln!(handle, "{}", output.extracted_text).context("Failed to write to stdout")?;
    }
    if cli.print_structured {
        if cli.print_text {
            writeln!(handle).ok();
        }
        writeln!(handle, "{}", output.structured_text).context("Failed to write to stdout")?;
    }
    Ok(())
}

fn summarise(output: &MenuOutput, written: Option<&Path>, started: Instant) {
    for e in &output.errors {
        eprintln!("{} {}", red("✗"), e);
    }
    let stats = &output.stats;
    match written {
        Some(path) => eprintln!(
            "{}  {} columns × {} rows  {}ms  →  {}",
            green("✔"),
            stats.table_columns,
            stats.table_rows,
            started.elapsed().as_millis(),
            bold(&path.display().to_string()),
        ),
        None => eprintln!("{}  no table to export", red("✘")),
    }
    if stats.prompt_tokens + stats.completion_tokens > 0 {
        eprintln!(
            "   {} tokens in  /  {} tokens out",
            dim(&stats.prompt_tokens.to_string()),
            dim(&stats.completion_tokens.to_string()),
        );
    }
}
