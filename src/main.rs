use anyhow::Result;
use clap::{Parser, Subcommand};
use dsfetch::config::load_settings;
use dsfetch::logging::LogHandle;
use dsfetch::pipeline::{RunOptions, run_all};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dsfetch", about = "Download configured datasets and normalize them to CSV")]
struct Cli {
    /// TOML settings file; built-in defaults and environment variables apply without one.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Run {
        #[arg(long)]
        dataset: Option<String>,
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    Validate,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Err(err) = dotenvy::dotenv()
        && !err.not_found()
    {
        return Err(anyhow::Error::new(err).context("failed to load .env"));
    }

    let settings = load_settings(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Run {
        dataset: None,
        dry_run: false,
    }) {
        Commands::Run { dataset, dry_run } => {
            let log = LogHandle::new(&settings.logging)?;
            let report = run_all(
                &settings.tasks(),
                &RunOptions {
                    data_dir: settings.data_dir.clone(),
                    fetch: settings.fetch_settings(),
                    dataset,
                    dry_run,
                },
                &log,
            )?;

            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Validate => {
            for task in settings.tasks() {
                println!(
                    "OK: {} ({}) -> {}",
                    task.key,
                    task.source_url.as_deref().unwrap_or("no url"),
                    settings.data_dir.join(&task.output_filename).display()
                );
            }
        }
    }

    Ok(())
}
