// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use log::{error, info, warn, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

use slidecast::app_config::{self, Config, TranslationProvider};
use slidecast::app_controller::Controller;
use slidecast::cache::CacheKeying;

/// CLI Wrapper for TranslationProvider to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliTranslationProvider {
    Ollama,
    OpenAI,
    Anthropic,
    LMStudio,
}

impl From<CliTranslationProvider> for TranslationProvider {
    fn from(cli_provider: CliTranslationProvider) -> Self {
        match cli_provider {
            CliTranslationProvider::Ollama => TranslationProvider::Ollama,
            CliTranslationProvider::OpenAI => TranslationProvider::OpenAI,
            CliTranslationProvider::Anthropic => TranslationProvider::Anthropic,
            CliTranslationProvider::LMStudio => TranslationProvider::LMStudio,
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

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build narrated videos for every output language (default command)
    Run(RunArgs),

    /// Generate shell completions for slidecast
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Project directory containing data/
    #[arg(short, long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Language of data/texts.txt (e.g., 'en')
    #[arg(short, long)]
    input_language: Option<String>,

    /// Output language; repeat for several (e.g., -o fr -o de)
    #[arg(short, long = "output-language")]
    output_languages: Vec<String>,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,

    /// Translation provider to use
    #[arg(short, long, value_enum)]
    provider: Option<CliTranslationProvider>,

    /// Model name to use for translation
    #[arg(short, long)]
    model: Option<String>,

    /// Fetch slides and speaker notes from this Google Slides presentation first
    #[arg(long, value_name = "PRESENTATION_ID")]
    google_slides: Option<String>,

    /// Cancel remaining work after the first failure
    #[arg(long)]
    fail_fast: bool,

    /// Name cached artifacts after their content instead of their position
    #[arg(long)]
    content_addressed: bool,
}

/// slidecast - narrated videos from slides, in every language
#[derive(Parser, Debug)]
#[command(name = "slidecast")]
#[command(version)]
#[command(about = "Turn slides and a narration script into narrated videos in several languages")]
#[command(long_about = "slidecast translates the narration in data/texts.txt, synthesizes speech for each slide,
renders one video segment per slide and joins them into data/out/output-<lang>.mp4.
Only work whose inputs changed since the previous run is redone.

EXAMPLES:
    slidecast                                   # Run with conf.json in the current directory
    slidecast -o fr -o de                       # Produce French and German videos
    slidecast --root ./talk -i en -o es         # Spanish video for the project in ./talk
    slidecast -p ollama -m llama3.2:3b -o fr    # Translate with a local Ollama model
    slidecast --google-slides 1AbC...xyz        # Fetch slides and speaker notes first
    slidecast completions bash > slidecast.bash # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. If the file doesn't exist,
    a default one is created. API keys may also come from OPENAI_API_KEY and
    ANTHROPIC_API_KEY.")]
#[command(args_conflicts_with_subcommands = true)]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run: RunArgs,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: Emoji for log level
    fn get_emoji_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "❌",
            Level::Warn => "🚧",
            Level::Info => "",
            Level::Debug => "🔍",
            Level::Trace => "📋",
        }
    }

    // @returns: ANSI colour for log level
    fn get_color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    // Max level is adjusted through log::set_max_level after the config loads
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level() && self.level != LevelFilter::Off
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "{}{} {} {}\x1B[0m",
                Self::get_color_for_level(record.level()),
                now,
                Self::get_emoji_for_level(record.level()),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();

    match cli.command {
        Some(Commands::Completions { shell }) => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "slidecast", &mut std::io::stdout());
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Run(args)) => run(args).await,
        None => run(cli.run).await,
    }
}

/// Load the config file and apply command line overrides
fn load_config(options: &RunArgs) -> Result<Config> {
    let (mut config, created) = Config::load_or_create(Path::new(&options.config_path))?;
    if created {
        warn!("Config file not found at '{}', created a default config.", options.config_path);
    }

    if let Some(root) = &options.root {
        config.project_root = root.clone();
    }
    if let Some(input_language) = &options.input_language {
        config.input_language = input_language.clone();
    }
    if !options.output_languages.is_empty() {
        config.output_languages = options.output_languages.clone();
    }
    if let Some(provider) = &options.provider {
        config.translation.provider = provider.clone().into();
    }
    if let Some(model) = &options.model {
        let provider_str = config.translation.provider.to_lowercase_string();
        match config.translation.available_providers.iter_mut().find(|p| p.provider_type == provider_str) {
            Some(provider_config) => provider_config.model = model.clone(),
            None => {
                let mut provider_config = app_config::ProviderConfig::new(config.translation.provider.clone());
                provider_config.model = model.clone();
                config.translation.available_providers.push(provider_config);
            }
        }
    }
    if let Some(presentation_id) = &options.google_slides {
        config.presentation.google_slides_id = Some(presentation_id.clone());
    }
    if options.fail_fast {
        config.pipeline.fail_fast = true;
    }
    if options.content_addressed {
        config.pipeline.cache_keying = CacheKeying::Content;
    }
    if let Some(log_level) = &options.log_level {
        config.log_level = log_level.clone().into();
    }

    Ok(config)
}

async fn run(options: RunArgs) -> Result<ExitCode> {
    // Apply the command line level before anything else logs
    if let Some(cli_level) = &options.log_level {
        let level: app_config::LogLevel = cli_level.clone().into();
        log::set_max_level(level.to_level_filter());
    }

    let config = load_config(&options)?;
    config.validate().context("Configuration validation failed")?;
    log::set_max_level(config.log_level.to_level_filter());

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing in-flight work and stopping");
            on_interrupt.cancel();
        }
    });

    let controller = Controller::with_config(config)?;
    let report = controller.run(cancel).await?;

    if report.is_success() {
        for language in &report.languages {
            if let Some(output) = language.output() {
                info!("Success: {}", output.display());
            }
        }
        Ok(ExitCode::SUCCESS)
    } else {
        error!("Languages not completed: {}", report.failed_languages().join(", "));
        Ok(ExitCode::FAILURE)
    }
}
