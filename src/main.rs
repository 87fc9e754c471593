//! Main entry point for the packzip CLI application.
//!
//! Lists and prints entries of packages stored as local ZIPs, remote ZIPs,
//! or exploded directories, and injects a single entry into a local ZIP.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use tokio::io::AsyncWriteExt;

use packzip::cli::Command;
use packzip::{AnyArchive, Archive, BufferedZip, Cli, InjectContent, inject_entry, open_archive};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .init();

    match &cli.command {
        Command::Ls { archive, buffered } => {
            let archive = open(&cli, archive, *buffered).await?;
            let entries = archive
                .list_entries()
                .await
                .with_context(|| format!("Couldn't list {}", archive.identifier()))?;
            for path in &entries {
                println!("{}", path);
            }
            archive.release();
        }

        Command::Cat {
            archive,
            entry,
            buffered,
        } => {
            let archive = open(&cli, archive, *buffered).await?;
            let mut opened = archive
                .open_entry_stream(entry)
                .await
                .with_context(|| format!("Couldn't open {} in {}", entry, archive.identifier()))?;
            archive.release();

            let mut stdout = tokio::io::stdout();
            let copied = tokio::io::copy(&mut opened.stream, &mut stdout).await?;
            stdout.flush().await?;
            info!("{}: {} bytes", entry, copied);
        }

        Command::Inject {
            tmp,
            final_path,
            entry,
            file,
        } => {
            let content = match file {
                Some(path) => InjectContent::File(path.clone()),
                None => InjectContent::Stream(Box::new(tokio::io::stdin())),
            };
            inject_entry(tmp, final_path, entry, content)
                .await
                .with_context(|| {
                    format!("Couldn't inject {} into {}", entry, final_path.display())
                })?;
        }
    }

    Ok(())
}

/// Open `identifier` with the backend the flags ask for.
async fn open(cli: &Cli, identifier: &str, buffered: bool) -> Result<AnyArchive> {
    let archive = if buffered {
        BufferedZip::open(identifier).await.map(AnyArchive::Buffered)
    } else {
        open_archive(identifier, &cli.open_options()).await
    };
    archive.with_context(|| format!("Couldn't open {}", identifier))
}
