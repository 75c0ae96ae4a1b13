use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::runtime::Runtime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bookbuddy::cli::Overrides;
use bookbuddy::cli::commands::{analyze, batch, check, clean, config, estimate};
use bookbuddy::cli::ui::OutputFormat;
use bookbuddy::{AnalysisDepth, AnalysisOptions};

#[derive(Parser)]
#[command(name = "bookbuddy")]
#[command(version, about = "AI-assisted analysis of books and long texts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, short, global = true, help = "Config file (replaces global/project lookup)")]
    config: Option<PathBuf>,

    #[arg(long, global = true, help = "LLM provider (openai, ollama)")]
    provider: Option<String>,

    #[arg(long, global = true, help = "Model to use")]
    model: Option<String>,

    #[arg(long, global = true, help = "Estimated tokens per chunk")]
    max_tokens_per_chunk: Option<usize>,

    #[arg(long, global = true, help = "Skip the in-memory result cache")]
    no_cache: bool,

    #[arg(long, global = true, help = "Do not save results to the store")]
    no_persist: bool,

    #[arg(long, global = true)]
    verbose: bool,

    #[arg(long, short, global = true)]
    quiet: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            config_path: self.config.clone(),
            provider: self.provider.clone(),
            model: self.model.clone(),
            max_tokens_per_chunk: self.max_tokens_per_chunk,
            no_cache: self.no_cache,
            no_persist: self.no_persist,
        }
    }
}

/// Book input and per-request analysis options
#[derive(Args)]
struct RequestArgs {
    #[arg(help = "Book file: JSON book document or plain text")]
    file: PathBuf,

    #[arg(long, help = "Book id (defaults to the document id or file stem)")]
    id: Option<String>,

    #[arg(long, help = "Book title override")]
    title: Option<String>,

    #[arg(long, default_value = "standard", help = "Analysis depth: standard, detailed")]
    depth: AnalysisDepth,

    #[arg(long, help = "Ask for supporting quotes")]
    quotes: bool,

    #[arg(long, help = "Audience to tailor the analysis for")]
    audience: Option<String>,

    #[arg(long, help = "Per-call timeout in milliseconds (min 1000)")]
    timeout_ms: Option<u64>,

    #[arg(long, help = "Accept books with no content")]
    allow_empty: bool,

    #[arg(
        short = 'f',
        long,
        default_value = "text",
        help = "Output format: text, json, yaml"
    )]
    format: OutputFormat,
}

impl RequestArgs {
    fn options(&self) -> AnalysisOptions {
        AnalysisOptions {
            analysis_depth: self.depth,
            include_quotes: self.quotes,
            target_audience: self.audience.clone(),
            max_tokens_per_chunk: None,
            timeout_ms: self.timeout_ms,
            allow_empty_content: self.allow_empty,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run one analysis over a book
    Analyze {
        #[command(flatten)]
        request: RequestArgs,
        #[arg(
            short = 't',
            long = "type",
            default_value = "summary",
            help = "summary, themes, characters, difficulty, sentiment, style"
        )]
        analysis_type: String,
    },

    /// Run several analyses over a book
    Batch {
        #[command(flatten)]
        request: RequestArgs,
        #[arg(long, value_delimiter = ',', help = "Comma separated types (default: all)")]
        types: Vec<String>,
    },

    /// Estimate tokens and show the chunk plan (offline)
    Estimate {
        #[arg(help = "Book file")]
        file: PathBuf,
        #[arg(short = 'f', long, default_value = "text")]
        format: OutputFormat,
    },

    /// Check that the configured provider is reachable
    Check,

    /// Remove persisted analysis results
    Clean {
        #[arg(long, help = "Only remove results for this book id")]
        book: Option<String>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show {
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            help = "Output format: text (toml), json, yaml"
        )]
        format: OutputFormat,
    },
    /// Show configuration and database paths
    Path,
    /// Write a default configuration file
    Init {
        #[arg(long, short, help = "Initialize global config")]
        global: bool,
        #[arg(long, help = "Overwrite existing config")]
        force: bool,
    },
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31mbookbuddy encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }
        eprintln!();

        // Call default hook for backtrace (if RUST_BACKTRACE=1)
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns `Ok(false)` when a command ran but its analyses failed
fn run_cli() -> anyhow::Result<bool> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let overrides = cli.overrides();

    match cli.command {
        Commands::Analyze {
            request,
            analysis_type,
        } => {
            let args = analyze::AnalyzeArgs {
                options: request.options(),
                show_progress: !cli.quiet && request.format == OutputFormat::Text,
                file: request.file,
                analysis_type,
                book_id: request.id,
                title: request.title,
                format: request.format,
            };
            let rt = Runtime::new()?;
            Ok(rt.block_on(analyze::run(&overrides, args))?)
        }
        Commands::Batch { request, types } => {
            let args = batch::BatchArgs {
                options: request.options(),
                show_progress: !cli.quiet && request.format == OutputFormat::Text,
                file: request.file,
                types,
                book_id: request.id,
                title: request.title,
                format: request.format,
            };
            let rt = Runtime::new()?;
            Ok(rt.block_on(batch::run(&overrides, args))?)
        }
        Commands::Estimate { file, format } => {
            estimate::run(&overrides, &file, format)?;
            Ok(true)
        }
        Commands::Check => {
            let rt = Runtime::new()?;
            Ok(rt.block_on(check::run(&overrides))?)
        }
        Commands::Clean { book } => {
            clean::run(&overrides, book.as_deref())?;
            Ok(true)
        }
        Commands::Config { action } => {
            match action {
                ConfigAction::Show { format } => config::show(&overrides, format)?,
                ConfigAction::Path => config::path(&overrides)?,
                ConfigAction::Init { global, force } => config::init(global, force)?,
            }
            Ok(true)
        }
    }
}
