//! archive-viewer: renders an unpacked web archive through ephemeral
//! locators and writes the rewritten root document.

mod cli;

use av_core::ViewerError;
use av_core::ViewerResult;
use av_net::OfflineFetcher;
use av_storage::DirectoryArchive;
use av_storage::ManifestEntry;
use av_viewer::Viewer;
use clap::Parser;
use cli::Cli;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("archive-viewer: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> ViewerResult<()> {
    let config = cli.viewer_config()?;
    let archive = DirectoryArchive::new(cli.archive.clone());
    let viewer = Viewer::open_archive(&archive, config, Arc::new(OfflineFetcher)).await?;

    let root = viewer
        .open_root_document(&cli.index, cli.fragment.as_deref())
        .await?;
    let content = viewer.read_locator(&root).ok_or_else(|| {
        ViewerError::new(
            "viewer.locator_unreadable",
            format!("root locator `{root}` does not resolve"),
        )
    })?;

    match &cli.out {
        Some(path) => tokio::fs::write(path, &content.bytes)
            .await
            .map_err(|error| {
                ViewerError::new(
                    "cli.write_failed",
                    format!("failed to write `{}`: {error}", path.display()),
                )
            })?,
        None => write_stdout(&content.bytes).await?,
    }
    info!(%root, mime = %content.mime_type, bytes = content.bytes.len(), "root document written");

    if cli.manifest {
        let listing = render_manifest(&viewer.manifest());
        // The document owns stdout unless it went to a file.
        if cli.out.is_some() {
            write_stdout(listing.as_bytes()).await?;
        } else {
            eprint!("{listing}");
        }
    }

    viewer.close();
    Ok(())
}

async fn write_stdout(bytes: &[u8]) -> ViewerResult<()> {
    let mut stdout = tokio::io::stdout();
    let written = async {
        stdout.write_all(bytes).await?;
        stdout.flush().await
    }
    .await;
    written.map_err(|error| {
        ViewerError::new("cli.write_failed", format!("failed to write stdout: {error}"))
    })
}

/// One tab-separated line per live locator: locator, kind, path, MIME type.
fn render_manifest(entries: &[ManifestEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        let path = entry
            .path
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "-".to_owned());
        out.push_str(&format!(
            "{}\t{}\t{}\t{}\n",
            entry.locator, entry.kind, path, entry.mime_type
        ));
    }
    out
}
