//! Quill CLI: read and write versioned texts from the command line.
//!
//! ```text
//! quill read greeting
//! quill create greeting "hello"
//! quill update greeting "world" --etag <etag printed by read>
//! quill delete greeting --etag <etag>
//! ```
//!
//! Conditional commands exit with status 1 when the store rejects them
//! (stale ETag, text already exists) and status 2 on a fault.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use quill_core::config::{CONTAINER_ENV, DEFAULT_CONTAINER, DEFAULT_STORAGE_URI, STORAGE_URI_ENV};
use quill_core::{ETag, QuillError, StoreConfig, TextId, VersionedTextStore};

#[derive(Parser, Debug)]
#[command(name = "quill", version)]
#[command(about = "Versioned text storage with optimistic concurrency")]
struct Args {
    /// Storage URI: memory://, local://<path>, or s3://bucket/prefix
    #[arg(long, env = STORAGE_URI_ENV, default_value = DEFAULT_STORAGE_URI, global = true)]
    storage: String,

    /// Container holding the texts
    #[arg(long, env = CONTAINER_ENV, default_value = DEFAULT_CONTAINER, global = true)]
    container: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a text and its ETag
    Read { id: String },
    /// Write a text unconditionally
    Put { id: String, text: String },
    /// Write a text only if it does not exist yet
    Create { id: String, text: String },
    /// Write a text only if its ETag still matches
    Update {
        id: String,
        text: String,
        #[arg(long)]
        etag: String,
    },
    /// Delete a text; with --etag, only if the ETag still matches
    Delete {
        id: String,
        #[arg(long)]
        etag: Option<String>,
    },
}

/// What a command did, for exit-status purposes.
enum Status {
    Applied,
    Rejected(String),
}

async fn run(args: Args) -> Result<Status, QuillError> {
    let config = StoreConfig::new(args.storage, args.container)?;
    let store = quill_storage::open_store(&config).await?;

    let status = match args.command {
        Command::Read { id } => match store.read(&TextId::new(id.as_str())?).await? {
            Some(text) => {
                println!("etag: {}", text.version());
                println!("{}", text.content());
                Status::Applied
            }
            None => Status::Rejected(format!("{id} does not exist")),
        },
        Command::Put { id, text } => {
            store.create_or_update(&TextId::new(id)?, &text).await?;
            Status::Applied
        }
        Command::Create { id, text } => {
            if store.try_create(&TextId::new(id.as_str())?, &text).await? {
                Status::Applied
            } else {
                Status::Rejected(format!("{id} already exists"))
            }
        }
        Command::Update { id, text, etag } => {
            let etag = ETag::from_displayed(&etag);
            let applied = store
                .try_update(&TextId::new(id.as_str())?, &text, &etag)
                .await?;
            if applied {
                Status::Applied
            } else {
                Status::Rejected(format!("{id} changed or was deleted; read it again"))
            }
        }
        Command::Delete { id, etag: None } => {
            store.delete_if_exists(&TextId::new(id)?).await?;
            Status::Applied
        }
        Command::Delete { id, etag: Some(etag) } => {
            if store
                .try_delete(&TextId::new(id.as_str())?, &ETag::from_displayed(&etag))
                .await?
            {
                Status::Applied
            } else {
                Status::Rejected(format!("{id} changed or was already deleted"))
            }
        }
    };
    Ok(status)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    debug!(?args, "Parsed arguments");
    match run(args).await {
        Ok(Status::Applied) => ExitCode::SUCCESS,
        Ok(Status::Rejected(reason)) => {
            eprintln!("{reason}");
            ExitCode::from(1)
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(2)
        }
    }
}
