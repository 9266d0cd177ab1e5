// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]
// Add other lints specific to this module that you want to allow but not auto-fix

use anyhow::{Context, Result, anyhow};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, error, info, warn};
use std::io::Write;
use std::path::{Path, PathBuf};

use doclingo::app_config::{self, Config, TranslationProvider};
use doclingo::app_controller::{Controller, FileOutcome};

/// CLI Wrapper for TranslationProvider to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliTranslationProvider {
    Ollama,
    OpenAI,
    Anthropic,
    LMStudio,
    DashScope,
}

impl From<CliTranslationProvider> for TranslationProvider {
    fn from(cli_provider: CliTranslationProvider) -> Self {
        match cli_provider {
            CliTranslationProvider::Ollama => TranslationProvider::Ollama,
            CliTranslationProvider::OpenAI => TranslationProvider::OpenAI,
            CliTranslationProvider::Anthropic => TranslationProvider::Anthropic,
            CliTranslationProvider::LMStudio => TranslationProvider::LMStudio,
            CliTranslationProvider::DashScope => TranslationProvider::DashScope,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

fn level_filter(level: &app_config::LogLevel) -> LevelFilter {
    match level {
        app_config::LogLevel::Error => LevelFilter::Error,
        app_config::LogLevel::Warn => LevelFilter::Warn,
        app_config::LogLevel::Info => LevelFilter::Info,
        app_config::LogLevel::Debug => LevelFilter::Debug,
        app_config::LogLevel::Trace => LevelFilter::Trace,
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Translate a document or every document in a directory
    Translate(TranslateArgs),

    /// Generate shell completions for doclingo
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser, Debug)]
struct TranslateArgs {
    /// Input document (PDF, DOCX, XLSX) or directory to process
    #[arg(value_name = "INPUT_PATH")]
    input_path: PathBuf,

    /// Target language code (e.g., 'fr', 'de', 'pt-BR')
    #[arg(short, long)]
    target_language: Option<String>,

    /// Source language code (e.g., 'en', 'es', 'fr')
    #[arg(short, long)]
    source_language: Option<String>,

    /// Directory for translated documents (default: next to each input)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Translation provider to use
    #[arg(short, long, value_enum)]
    provider: Option<CliTranslationProvider>,

    /// Model name to use for translation
    #[arg(short, long)]
    model: Option<String>,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json", env = "DOCLINGO_CONFIG")]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,

    /// Force overwrite of existing output files
    #[arg(short, long)]
    force_overwrite: bool,
}

/// doclingo - Office document translation with AI
///
/// Translates PDF, DOCX and XLSX documents with LLM providers while keeping
/// their layout, styles and cell structure.
#[derive(Parser, Debug)]
#[command(name = "doclingo")]
#[command(version)]
#[command(about = "AI-powered office document translation tool")]
#[command(long_about = "doclingo extracts the text of office documents, translates it with AI providers and writes it back in place.

EXAMPLES:
    doclingo translate report.docx -t fr             # Translate using default config
    doclingo translate -f report.pdf -t de           # Force overwrite existing files
    doclingo translate -p openai -m gpt-4o sheet.xlsx
    doclingo translate -o out/ --log-level debug docs/
    doclingo completions bash > doclingo.bash        # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config-path. If the config file doesn't exist, a default one
    will be created automatically. API keys can also be given in DOCLINGO_API_KEY.

SUPPORTED PROVIDERS:
    ollama    - Local Ollama server
    openai    - OpenAI API (requires API key)
    anthropic - Anthropic Claude API (requires API key)
    lmstudio  - LM Studio local server (OpenAI-compatible on http://localhost:1234/v1)
    dashscope - Alibaba DashScope compatible mode (requires API key)")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(CustomLogger { level: LevelFilter::Trace }))?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI color and tag for log level
    fn style_for_level(level: Level) -> (&'static str, &'static str) {
        match level {
            Level::Error => ("1;31", "ERROR"),
            Level::Warn => ("1;33", "WARN "),
            Level::Info => ("1;32", "INFO "),
            Level::Debug => ("1;36", "DEBUG"),
            Level::Trace => ("1;35", "TRACE"),
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        // Only our own crate logs below warn; dependencies are noisy
        metadata.level() <= self.level
            && (metadata.level() <= Level::Warn || metadata.target().starts_with("doclingo"))
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let (color, tag) = Self::style_for_level(record.level());
            let mut stderr = std::io::stderr();
            let _ = writeln!(stderr, "\x1B[{}m{} {} {}\x1B[0m", color, now, tag, record.args());
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Info until the config says otherwise
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "doclingo", &mut std::io::stdout());
            Ok(())
        }
        Commands::Translate(args) => run_translate(args).await,
    }
}

/// Config path to use: the given one, or the per-user config when the default is absent
fn resolve_config_path(config_path: &str) -> PathBuf {
    let path = PathBuf::from(config_path);
    if path.exists() || config_path != "conf.json" {
        return path;
    }
    match dirs::config_dir().map(|dir| dir.join("doclingo").join("conf.json")) {
        Some(user_config) if user_config.exists() => user_config,
        _ => path,
    }
}

fn load_config(options: &TranslateArgs) -> Result<Config> {
    let config_path = resolve_config_path(&options.config_path);

    let mut config = if config_path.exists() {
        Config::from_file(&config_path)?
    } else {
        warn!("Config file not found at '{}', creating default config.", config_path.display());
        let config = Config::default();
        config
            .save_to_file(&config_path)
            .context("Failed to write default config")?;
        config
    };

    // Override config with CLI options if provided
    if let Some(provider) = &options.provider {
        config.translation.provider = provider.clone().into();
    }
    if let Some(model) = &options.model {
        config.translation.set_model(model);
    }
    if let Some(source_lang) = &options.source_language {
        config.source_language = source_lang.clone();
    }
    if let Some(target_lang) = &options.target_language {
        config.target_language = target_lang.clone();
    }
    if let Some(log_level) = &options.log_level {
        config.log_level = log_level.clone().into();
    }

    config.validate().context("Configuration validation failed")?;
    Ok(config)
}

async fn run_translate(options: TranslateArgs) -> Result<()> {
    if let Some(level) = &options.log_level {
        log::set_max_level(level_filter(&level.clone().into()));
    }

    let config = load_config(&options)?;
    log::set_max_level(level_filter(&config.log_level));

    info!(
        "Translating {} -> {}",
        config.source_language, config.target_language
    );
    let controller = Controller::with_config(config)?;
    if let Err(e) = controller.test_connection().await {
        warn!("{}", e);
    }

    if options.input_path.is_file() {
        let output_dir = options
            .output_dir
            .clone()
            .or_else(|| options.input_path.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));

        match controller
            .run(options.input_path.clone(), output_dir, options.force_overwrite)
            .await?
        {
            FileOutcome::Failed(report) => Err(anyhow!("Translation failed: {}", report.message)),
            _ => Ok(()),
        }
    } else if options.input_path.is_dir() {
        let summary = controller
            .run_folder(options.input_path.clone(), options.output_dir.clone(), options.force_overwrite)
            .await?;
        if summary.failed > 0 {
            error!("{} file(s) failed", summary.failed);
            return Err(anyhow!("{} of {} files failed", summary.failed, summary.failed + summary.translated + summary.skipped));
        }
        Ok(())
    } else {
        Err(anyhow!("Input path does not exist: {}", options.input_path.display()))
    }
}
