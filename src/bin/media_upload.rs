use clap::{Parser, Subcommand};
use cms_media_uploads::config::MediaConfig;
use cms_media_uploads::context::MediaContext;
use cms_media_uploads::infrastructure::storage;
use cms_media_uploads::models::{LocalBlob, RemoteFile};
use dotenvy::dotenv;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use validator::Validate;

#[derive(Parser)]
#[command(name = "media_upload", about = "Upload and manage CMS media in remote storage")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload files one after another under a prefix
    Upload {
        prefix: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Delete an existing object (best-effort) and upload its replacement
    Replace {
        old_path: String,
        prefix: String,
        file: PathBuf,
    },
    /// List object paths under a prefix
    List { prefix: String },
    /// Delete one object
    Delete { path: String },
}

async fn read_blob(path: &Path) -> anyhow::Result<LocalBlob> {
    let data = tokio::fs::read(path).await?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    Ok(LocalBlob::new(name, data))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "media_upload=info,cms_media_uploads=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = MediaConfig::from_env();
    config.validate()?;

    let storage = storage::setup_storage(&config).await;
    let media = MediaContext::new(storage, &config);

    // Progress reporter for the duration of the command.
    let mut activity = media.coordinator.subscribe();
    let reporter = tokio::spawn(async move {
        while activity.changed().await.is_ok() {
            let snapshot = *activity.borrow_and_update();
            if snapshot.blocking {
                info!("📊 {:.0}% ({} job(s))", snapshot.progress * 100.0, snapshot.active_jobs);
            }
        }
    });

    let result = match cli.command {
        Command::Upload { prefix, files } => {
            let mut blobs = Vec::with_capacity(files.len());
            for file in &files {
                blobs.push(read_blob(file).await?);
            }

            let outcome = media.transport.upload_many(blobs, &prefix).await;
            for (index, object) in outcome.uploaded() {
                println!("{}\t{}\t{}", files[index].display(), object.path, object.url);
            }
            let failed = outcome.failed_indices();
            for (index, result) in outcome.results().iter().enumerate() {
                if let Err(e) = result {
                    error!("❌ {}: {}", files[index].display(), e);
                }
            }
            if failed.is_empty() {
                Ok(())
            } else {
                Err(anyhow::anyhow!("{} of {} uploads failed", failed.len(), files.len()))
            }
        }
        Command::Replace {
            old_path,
            prefix,
            file,
        } => {
            let blob = read_blob(&file).await?;
            let remote = RemoteFile::from(media.transport.replace(&old_path, blob, &prefix).await?);
            println!("{}", serde_json::to_string_pretty(&remote)?);
            Ok(())
        }
        Command::List { prefix } => {
            for path in media.transport.list(&prefix).await? {
                println!("{}", path);
            }
            Ok(())
        }
        Command::Delete { path } => {
            media.transport.delete(&path).await?;
            info!("🗑️  Deleted {}", path);
            Ok(())
        }
    };

    reporter.abort();
    result
}
