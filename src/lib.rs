mod cli;
pub mod commands;
pub mod core;

use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

pub use cli::{Cli, Command};

use crate::commands::Pipeline;
use crate::core::bundle::Side;
use crate::core::config::PackConfig;
use crate::core::error::PackResult;
use crate::core::progress::ProgressRecord;

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,modforge=debug")),
        )
        .init();
}

pub async fn run(cli: Cli) -> ExitCode {
    init_tracing();
    tracing::info!("modforge {} starting...", env!("CARGO_PKG_VERSION"));

    match execute(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            tracing::warn!("Finished with failures; see the log above");
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> PackResult<bool> {
    let config = PackConfig::load(cli.config.as_deref())?;
    let pipeline = Pipeline::new(config)?;
    pipeline.ensure_directories()?;

    let profile_name = cli
        .profile_name
        .clone()
        .unwrap_or_else(|| pipeline.config().default_profile.clone());

    match cli.command {
        Some(Command::Search {
            query,
            source,
            limit,
            download,
        }) => {
            let selection = source.unwrap_or(pipeline.config().search_source);
            let hits = pipeline.search(&query, selection, limit).await;
            if hits.is_empty() {
                println!("No results found for '{query}'");
            }
            for hit in &hits {
                println!(
                    "[{}] {} ({}) - {} downloads",
                    hit.source,
                    hit.title,
                    hit.slug.as_deref().unwrap_or(&hit.id),
                    hit.downloads
                );
            }
            if download && !hits.is_empty() {
                return Ok(pipeline.download_search("Search", &query, limit, cli.force).await);
            }
            return Ok(true);
        }
        Some(Command::DownloadId {
            id,
            source,
            version,
        }) => {
            return Ok(pipeline
                .download_by_id(source, &id, version.as_deref(), cli.force)
                .await);
        }
        None => {}
    }

    if cli.client {
        pipeline.create_client_pack(&profile_name).await?;
        return Ok(true);
    }

    let mut progress = ProgressRecord::load(&pipeline.config().progress_file());
    if cli.reset {
        progress.reset()?;
        tracing::info!("Download progress reset");
    }

    if cli.clean {
        pipeline.clean(&profile_name)?;
        pipeline.summary()?;
        return Ok(true);
    }

    pipeline.prepare_mods_directory()?;

    let profile_path = pipeline.profile_path(&profile_name);
    let mut ok = true;
    if cli.profile || profile_path.exists() {
        tracing::info!("Installing from profile {:?}", profile_path);
        ok &= pipeline.download_from_profile(&profile_path, cli.force).await?;
        ok &= pipeline.process_pending_bundles(Side::Server).await;
    } else {
        let names: Vec<String> = match &cli.category {
            Some(name) => vec![name.clone()],
            None => pipeline
                .config()
                .categories
                .iter()
                .map(|c| c.name.clone())
                .collect(),
        };
        for name in names {
            ok &= pipeline
                .download_category(&name, &mut progress, cli.force)
                .await?;
        }
    }

    pipeline.reconcile()?;
    ok &= pipeline.process_pending_bundles(Side::Server).await;
    pipeline.summary()?;

    if cli.all {
        pipeline.create_client_pack(&profile_name).await?;
    }
    Ok(ok)
}
