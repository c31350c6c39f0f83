use clap::{Parser, Subcommand};
use anyhow::Result;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use biolog::data::TargetLanguage;

mod cli;

#[derive(Parser)]
#[command(name = "biolog")]
#[command(about = "Generate and repair executable analysis code from LLM responses", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, help = "Enable verbose debug output")]
    verbose: bool,

    #[arg(long, global = true, help = "Perform a dry run without calling the model or writing files")]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Generate analysis code from a natural-language instruction")]
    Generate {
        #[arg(help = "What the analysis should do")]
        instruction: String,

        #[arg(long, default_value = "python", help = "Target language (python or r)")]
        language: TargetLanguage,

        #[arg(long, help = "File with a description of the data set")]
        profile: Option<PathBuf>,

        #[arg(long, help = "Variable the analysis should focus on")]
        target: Option<String>,

        #[arg(long, help = "Do not pass recent analyses as context")]
        no_context: bool,

        #[arg(long, help = "Always call the model, ignoring cached responses")]
        no_cache: bool,

        #[arg(long, help = "Caption for the recorded analysis")]
        caption: Option<String>,
    },

    #[command(about = "Extract and normalize code from a saved model response")]
    Normalize {
        #[arg(help = "Response file (reads stdin when omitted)")]
        file: Option<PathBuf>,

        #[arg(long, default_value = "python", help = "Target language (python or r)")]
        language: TargetLanguage,

        #[arg(long, help = "Print the full result record as JSON")]
        json: bool,
    },

    #[command(about = "Print the suggested wait in seconds for a rate-limit error message")]
    RetryDelay {
        #[arg(help = "Error message text")]
        text: String,
    },

    #[command(subcommand)]
    History(HistoryCommands),
}

#[derive(Subcommand)]
enum HistoryCommands {
    #[command(about = "List recorded analyses")]
    Show,

    #[command(about = "Remove all recorded analyses")]
    Clear,

    #[command(about = "Export recorded analyses for the document renderer")]
    Export {
        #[arg(long, help = "Output file (prints to stdout when omitted)")]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = cli::Config {
        verbose: cli.verbose,
        dry_run: cli.dry_run,
    };

    match cli.command {
        Commands::Generate {
            instruction,
            language,
            profile,
            target,
            no_context,
            no_cache,
            caption,
        } => {
            let options = cli::GenerateOptions {
                instruction,
                language,
                profile,
                target,
                no_context,
                no_cache,
                caption,
            };
            cli::generate(options, &config)?;
        }
        Commands::Normalize { file, language, json } => {
            cli::normalize(file, language, json, &config)?;
        }
        Commands::RetryDelay { text } => {
            cli::retry_delay(&text)?;
        }
        Commands::History(history_cmd) => match history_cmd {
            HistoryCommands::Show => cli::show_history(&config)?,
            HistoryCommands::Clear => cli::clear_history(&config)?,
            HistoryCommands::Export { output } => cli::export_history(output, &config)?,
        },
    }

    Ok(())
}
