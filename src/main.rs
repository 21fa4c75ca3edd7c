use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use recipeforge::cli::commands;
use recipeforge::cli::commands::analyze::AnalyzeOptions;
use recipeforge::cli::output::Format;
use recipeforge::types::TaskType;
use tokio::runtime::Runtime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "recipeforge")]
#[command(
    version,
    about = "Product analysis scheduler and category master-recipe generator"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    verbose: bool,

    #[arg(long, short, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize RecipeForge in the current directory
    Init {
        #[arg(long, short, help = "Overwrite existing initialization")]
        force: bool,
    },

    /// Import products or prompt blocks from a JSON file
    Import {
        #[command(subcommand)]
        what: ImportTarget,
    },

    /// Schedule analysis tasks and wait for them to finish
    Analyze {
        #[arg(long = "product", required = true, help = "Product ID (repeatable)")]
        products: Vec<String>,
        #[arg(long, help = "Owning user ID")]
        user: String,
        #[arg(long, help = "Project ID")]
        project: String,
        #[arg(long, default_value = "0", help = "Delay before the task runs (seconds)")]
        delay: u64,
        #[arg(
            long = "type",
            default_value = "standard_analysis",
            help = "Task type: standard_analysis, competitor_analysis, market_research"
        )]
        task_type: TaskType,
        #[arg(long, help = "Prompt block ID (market_research only)")]
        prompt_block: Option<String>,
        #[arg(short = 'f', long, default_value = "text", help = "Output format: text, json")]
        format: Format,
    },

    /// Show a task's recorded status
    Status {
        #[arg(help = "Task ID")]
        task_id: String,
        #[arg(short = 'f', long, default_value = "text", help = "Output format: text, json")]
        format: Format,
    },

    /// Show analysis progress
    Queue {
        #[arg(long, requires = "subcategory")]
        category: Option<String>,
        #[arg(long, requires = "category")]
        subcategory: Option<String>,
        #[arg(short = 'f', long, default_value = "text", help = "Output format: text, json")]
        format: Format,
    },

    /// List master recipes
    Recipes {
        #[arg(long, requires = "subcategory")]
        category: Option<String>,
        #[arg(long, requires = "category")]
        subcategory: Option<String>,
        #[arg(short = 'f', long, default_value = "text", help = "Output format: text, json")]
        format: Format,
    },

    /// Regenerate a category's master recipes in place
    Regenerate {
        #[arg(long)]
        category: String,
        #[arg(long)]
        subcategory: String,
        #[arg(long, help = "User the generation is recorded for")]
        user: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ImportTarget {
    /// Scraped product records
    Products { file: PathBuf },
    /// Prompt block definitions
    Prompts { file: PathBuf },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show {
        #[arg(short = 'f', long, default_value = "text", help = "Output format: text, json")]
        format: Format,
    },
    /// Show configuration file paths
    Path,
    /// Initialize configuration
    Init {
        #[arg(long, short, help = "Initialize global config")]
        global: bool,
        #[arg(long, help = "Overwrite existing config")]
        force: bool,
    },
}

/// Report panics with location before the default hook runs
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
        eprintln!("\x1b[31mRecipeForge encountered an unexpected error:\x1b[0m");
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

        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_cli() -> anyhow::Result<()> {
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

    match cli.command {
        Commands::Init { force } => commands::init::run(force)?,
        Commands::Import { what } => match what {
            ImportTarget::Products { file } => commands::import::products(&file)?,
            ImportTarget::Prompts { file } => commands::import::prompts(&file)?,
        },
        Commands::Analyze {
            products,
            user,
            project,
            delay,
            task_type,
            prompt_block,
            format,
        } => {
            let rt = Runtime::new()?;
            rt.block_on(commands::analyze::run(AnalyzeOptions {
                products,
                user,
                project,
                delay_secs: delay,
                task_type,
                prompt_block,
                format,
            }))?;
        }
        Commands::Status { task_id, format } => commands::status::run(&task_id, format)?,
        Commands::Queue {
            category,
            subcategory,
            format,
        } => commands::queue::run(category, subcategory, format)?,
        Commands::Recipes {
            category,
            subcategory,
            format,
        } => commands::recipes::list(category, subcategory, format)?,
        Commands::Regenerate {
            category,
            subcategory,
            user,
        } => {
            let rt = Runtime::new()?;
            rt.block_on(commands::recipes::regenerate(category, subcategory, user))?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show { format } => commands::config::show(format)?,
            ConfigAction::Path => commands::config::path()?,
            ConfigAction::Init { global, force } => {
                if global {
                    commands::config::init_global(force)?;
                } else {
                    commands::config::init_project()?;
                }
            }
        },
    }

    Ok(())
}
