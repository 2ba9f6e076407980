use std::path::PathBuf;

use anyhow::{bail, Context};
use personal_hub::services::ImportOptions;
use personal_hub::web::{self, AppState};
use personal_hub::{App, Config, SyncTarget};

/// What this invocation should do.
enum Command {
    Serve,
    Sync(SyncTarget),
    Import { path: PathBuf, dry_run: bool },
}

struct Args {
    config: Option<PathBuf>,
    command: Command,
}

fn parse_args(args: &[String]) -> anyhow::Result<Args> {
    let mut config = None;
    let mut sync = None;
    let mut import = None;
    let mut dry_run = false;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => config = Some(PathBuf::from(iter.next().context("--config needs a path")?)),
            "--sync" => {
                let target = iter.next().map(String::as_str).unwrap_or("all");
                sync = Some(target.parse::<SyncTarget>()?);
            }
            "--import" => import = Some(PathBuf::from(iter.next().context("--import needs a CSV path")?)),
            "--dry-run" => dry_run = true,
            other => bail!("Unknown argument: {}", other),
        }
    }

    let command = match (sync, import) {
        (Some(_), Some(_)) => bail!("--sync and --import cannot be combined"),
        (Some(target), None) => Command::Sync(target),
        (None, Some(path)) => Command::Import { path, dry_run },
        (None, None) => Command::Serve,
    };
    Ok(Args { config, command })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let args = parse_args(&args)?;

    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    tracing::info!("Database path: {}", config.db_path);

    let app = App::new(config).await?;

    match args.command {
        Command::Sync(target) => {
            let stats = app.sync(target).await?;
            println!(
                "Synced {} items ({} summarized, {} errors)",
                stats.processed,
                stats.summarized,
                stats.errors.len()
            );
            for error in &stats.errors {
                eprintln!("  {}", serde_json::to_string(error)?);
            }
        }
        Command::Import { path, dry_run } => {
            let data = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let result = app
                .import_csv(
                    &data,
                    ImportOptions {
                        dry_run,
                        ..ImportOptions::default()
                    },
                )
                .await?;
            println!(
                "{}{} rows: {} inserted, {} updated, {} skipped",
                if dry_run { "[dry run] " } else { "" },
                result.total,
                result.inserted,
                result.updated,
                result.skipped
            );
            for error in &result.errors {
                eprintln!("  {}", error);
            }
        }
        Command::Serve => {
            app.config.warn_on_dev_secrets();
            let bind_addr = app.config.bind_addr.clone();
            tracing::info!("Starting personal-hub v{}", env!("CARGO_PKG_VERSION"));
            web::serve(AppState::new(app), &bind_addr).await?;
        }
    }

    Ok(())
}
