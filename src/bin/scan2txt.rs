//! CLI binary for edgequake-scan2txt.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `TranscriptionConfig`, builds the classifier and pipeline, and turns the
//! batch report into an exit code.

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, ValueEnum};
use edgequake_scan2txt::{
    batch, BatchInput, BatchProgressCallback, CoarseLabel, DocumentClassifier, EngineKind,
    EngineSet, ItemPipeline, ProgressCallback, TranscriptionConfig, TranscriptionPrompt,
    Unclassified,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

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

/// Terminal progress callback: a progress bar plus one log line per image.
struct CliProgressCallback {
    bar: ProgressBar,
    item_started: Mutex<Option<Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Scanning input…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            item_started: Mutex::new(None),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self) -> f64 {
        self.item_started
            .lock()
            .ok()
            .and_then(|mut g| g.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} images  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Transcribing");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Transcribing {total} image(s)…"))
        ));
    }

    fn on_item_start(&self, _index: usize, _total: usize, name: &str) {
        if let Ok(mut started) = self.item_started.lock() {
            *started = Some(Instant::now());
        }
        self.bar.set_message(name.to_string());
    }

    fn on_item_complete(&self, index: usize, total: usize, name: &str, chars: usize) {
        let secs = self.elapsed_secs();
        self.bar.println(format!(
            "  {} {:>3}/{:<3} {:<32} {}  {}",
            green("✓"),
            index,
            total,
            name,
            dim(&format!("{chars:>6} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_item_error(&self, index: usize, total: usize, name: &str, error: &str) {
        let secs = self.elapsed_secs();
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3} {:<32} {}  {}",
            red("✗"),
            index,
            total,
            name,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, succeeded: usize) {
        let failed = self.errors.load(Ordering::SeqCst);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} image(s) transcribed successfully",
                green("✔"),
                bold(&succeeded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} image(s) transcribed  ({} failed)",
                if succeeded == 0 { red("✘") } else { cyan("⚠") },
                bold(&succeeded.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One scan, output written next to it as letter_1884.txt
  scan2txt --image-file scans/letter_1884.jpg --no-classifier

  # A whole directory, classified with the DiT model, outputs in out/
  scan2txt --image-dir scans/ --classifier-model models/dit-rvlcdip.onnx --output-dir out/

  # Custom prompt and model
  scan2txt --image-dir scans/ --no-classifier --prompt-file prompts/ledger.txt \
           --provider openai --model gpt-4.1

  # Handwritten scans read on-device with TrOCR (build with --features trocr)
  scan2txt --image-dir scans/ --classifier-model models/dit-rvlcdip.onnx \
           --handwritten-engine local --ocr-model-dir models/trocr-base-handwritten/

  # Machine-readable report
  scan2txt --image-dir scans/ --no-classifier --json > report.json

EXIT STATUS:
  0  every image was transcribed
  1  at least one image failed (see the report)
  2  the run could not start (bad input path, prompt, output dir, provider)

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  RUST_LOG                Log filter (overrides --verbose / --quiet)
"#;

/// Transcribe scanned document images to text with a Vision LLM.
#[derive(Parser, Debug)]
#[command(
    name = "scan2txt",
    version,
    about = "Transcribe scanned document images to plain text using Vision LLMs",
    long_about = "Classify each scanned image locally, route it to a transcription engine and \
write the transcription next to the image (or into --output-dir) as <name>.txt. \
Supports OpenAI, Anthropic, Google Gemini, Azure OpenAI and any OpenAI-compatible endpoint.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
#[command(group(ArgGroup::new("input").required(true).args(["image_file", "image_dir"])))]
#[command(group(ArgGroup::new("classifier").required(true).args(["classifier_model", "no_classifier"])))]
struct Cli {
    /// A single .jpg/.jpeg image to transcribe.
    #[arg(long, alias = "image_file", env = "SCAN2TXT_IMAGE_FILE")]
    image_file: Option<PathBuf>,

    /// A directory; every .jpg/.jpeg directly inside it is transcribed.
    #[arg(long, alias = "image_dir", env = "SCAN2TXT_IMAGE_DIR")]
    image_dir: Option<PathBuf>,

    /// UTF-8 text file with the transcription prompt (default: built-in).
    #[arg(long, alias = "prompt_file", env = "SCAN2TXT_PROMPT_FILE")]
    prompt_file: Option<PathBuf>,

    /// Directory for the .txt outputs (created if missing).
    #[arg(long, alias = "output_dir", env = "SCAN2TXT_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// LLM model ID (e.g. gpt-4.1-mini, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "SCAN2TXT_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "SCAN2TXT_PROVIDER")]
    provider: Option<String>,

    /// ONNX export of the DiT RVL-CDIP document classifier.
    #[arg(long, env = "SCAN2TXT_CLASSIFIER_MODEL")]
    classifier_model: Option<PathBuf>,

    /// Skip classification; every image is routed as `undetermined`.
    #[arg(long, env = "SCAN2TXT_NO_CLASSIFIER")]
    no_classifier: bool,

    /// JSON file mapping model labels to handwritten / typewritten /
    /// other_document_type / undetermined.
    #[arg(long, env = "SCAN2TXT_LABEL_MAP", requires = "classifier_model")]
    label_map: Option<PathBuf>,

    /// Confidence floor below which a classification is `undetermined` (0.0–1.0).
    #[arg(long, env = "SCAN2TXT_MIN_CONFIDENCE", default_value_t = 0.5)]
    min_confidence: f32,

    /// Engine for images classified as handwritten.
    #[arg(long, env = "SCAN2TXT_HANDWRITTEN_ENGINE", value_enum, default_value = "remote")]
    handwritten_engine: EngineArg,

    /// TrOCR ONNX export (encoder_model.onnx, decoder_model.onnx,
    /// tokenizer.json) serving as the local engine.
    #[arg(long, env = "SCAN2TXT_OCR_MODEL_DIR")]
    ocr_model_dir: Option<PathBuf>,

    /// Text written when an image has no legible text.
    #[arg(long, env = "SCAN2TXT_SENTINEL", default_value = "[NO LEGIBLE TEXT]")]
    sentinel: String,

    /// Max LLM output tokens per image.
    #[arg(long, env = "SCAN2TXT_MAX_TOKENS", default_value_t = 1500)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "SCAN2TXT_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Per-image LLM call timeout in seconds.
    #[arg(long, env = "SCAN2TXT_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Print the batch report as JSON on stdout.
    #[arg(long, env = "SCAN2TXT_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "SCAN2TXT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SCAN2TXT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SCAN2TXT_QUIET")]
    quiet: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum EngineArg {
    Remote,
    Local,
}

impl From<EngineArg> for EngineKind {
    fn from(v: EngineArg) -> Self {
        match v {
            EngineArg::Remote => EngineKind::RemoteVision,
            EngineArg::Local => EngineKind::LocalOcr,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", red("error:"), e);
            ExitCode::from(2)
        }
    }
}

async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level logs unless --verbose is given.
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

    let input = match (&cli.image_file, &cli.image_dir) {
        (Some(file), _) => BatchInput::File(file.clone()),
        (None, Some(dir)) => BatchInput::Directory(dir.clone()),
        (None, None) => anyhow::bail!("one of --image-file or --image-dir is required"),
    };

    // ── Fatal checks before any image is processed ──────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    let prompt = TranscriptionPrompt::resolve(cli.prompt_file.as_deref(), &config.no_text_sentinel)
        .context("Cannot load prompt")?;
    let classifier = build_classifier(&cli, config.min_confidence)?;
    let local_engines = build_local_engines(&cli, &config)?;
    let pipeline = ItemPipeline::from_config_with_engines(config, classifier, local_engines)
        .await
        .context("Cannot set up transcription engine")?;

    // ── Run ──────────────────────────────────────────────────────────────
    let report = batch::run(&input, &prompt, cli.output_dir.as_deref(), &pipeline)
        .await
        .context("Transcription run failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    } else if !cli.quiet {
        if !show_progress {
            eprintln!(
                "Transcribed {}/{} image(s) in {}ms",
                report.succeeded, report.total, report.total_duration_ms
            );
        }
        for item in report.failures() {
            if let Some(ref e) = item.error {
                eprintln!(
                    "  {} {}  {}",
                    red("✗"),
                    item.image.display(),
                    dim(&format!("[{}] {}", e.kind(), e))
                );
            }
        }
        let (tokens_in, tokens_out) = report.total_tokens();
        eprintln!(
            "   {} tokens in  /  {} tokens out  —  {}ms total",
            dim(&tokens_in.to_string()),
            dim(&tokens_out.to_string()),
            report.total_duration_ms,
        );
    }

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Map CLI args to `TranscriptionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<TranscriptionConfig> {
    let mut builder = TranscriptionConfig::builder()
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .api_timeout_secs(cli.api_timeout)
        .min_confidence(cli.min_confidence)
        .no_text_sentinel(cli.sentinel.clone())
        .route(CoarseLabel::Handwritten, cli.handwritten_engine.into());

    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Build the classifier selected on the command line.
fn build_classifier(cli: &Cli, min_confidence: f32) -> Result<Arc<dyn DocumentClassifier>> {
    if cli.no_classifier {
        return Ok(Arc::new(Unclassified));
    }
    let Some(ref model_path) = cli.classifier_model else {
        anyhow::bail!("one of --classifier-model or --no-classifier is required");
    };
    load_dit_classifier(model_path, cli.label_map.as_deref(), min_confidence)
}

#[cfg(feature = "dit")]
fn load_dit_classifier(
    model_path: &std::path::Path,
    label_map: Option<&std::path::Path>,
    min_confidence: f32,
) -> Result<Arc<dyn DocumentClassifier>> {
    use edgequake_scan2txt::classify::dit::DitModel;
    use edgequake_scan2txt::{LabelMap, ModelClassifier};

    let labels = match label_map {
        Some(path) => LabelMap::from_json_file(path).context("Cannot load label map")?,
        None => LabelMap::rvl_cdip(),
    };
    let model = DitModel::from_file(model_path).context("Cannot load classifier")?;
    Ok(Arc::new(ModelClassifier::new(model, labels, min_confidence)))
}

#[cfg(not(feature = "dit"))]
fn load_dit_classifier(
    model_path: &std::path::Path,
    _label_map: Option<&std::path::Path>,
    _min_confidence: f32,
) -> Result<Arc<dyn DocumentClassifier>> {
    anyhow::bail!(
        "cannot load '{}': this build has no ONNX classifier (rebuild with --features dit) \
         or pass --no-classifier",
        model_path.display()
    )
}

/// Engines that run on this machine, keyed by route.
fn build_local_engines(cli: &Cli, config: &TranscriptionConfig) -> Result<EngineSet> {
    let mut engines = EngineSet::new();
    if let Some(ref dir) = cli.ocr_model_dir {
        engines.insert(EngineKind::LocalOcr, load_trocr_engine(dir, config)?);
    }
    Ok(engines)
}

#[cfg(feature = "trocr")]
fn load_trocr_engine(
    dir: &std::path::Path,
    config: &TranscriptionConfig,
) -> Result<Arc<dyn edgequake_scan2txt::TranscriptionEngine>> {
    use edgequake_scan2txt::pipeline::trocr::TrOcrModel;
    use edgequake_scan2txt::LocalOcrEngine;

    let model = TrOcrModel::from_dir(dir).context("Cannot load local OCR model")?;
    Ok(Arc::new(LocalOcrEngine::new(Arc::new(model), config)))
}

#[cfg(not(feature = "trocr"))]
fn load_trocr_engine(
    dir: &std::path::Path,
    _config: &TranscriptionConfig,
) -> Result<Arc<dyn edgequake_scan2txt::TranscriptionEngine>> {
    anyhow::bail!(
        "cannot load '{}': this build has no local OCR engine (rebuild with --features trocr)",
        dir.display()
    )
}
