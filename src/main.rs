//! gitforge - repository storage engine
//!
//! Administrative command-line interface over the engine. Every command
//! prints its result as JSON on stdout.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gitforge::engine::{ConfigError, DeleteFileRequest, EngineConfig, RepositoryEngine, UpdateFileRequest};
use gitforge::storage::{Author, RepositoryLocation, StorageError};

#[derive(Parser, Debug)]
#[command(version, about = "Repository storage engine administration", long_about = None)]
struct Cli {
    /// Storage root (overrides GITFORGE_STORAGE_ROOT and the config file)
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct AuthorArgs {
    #[arg(long, default_value = "gitforge")]
    author_name: String,
    #[arg(long, default_value = "gitforge@localhost")]
    author_email: String,
}

impl AuthorArgs {
    fn author(&self) -> Author {
        Author::new(&self.author_name, &self.author_email)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create an empty repository
    Provision { location: RepositoryLocation },
    /// Check whether a repository exists
    Exists { location: RepositoryLocation },
    /// Remove a repository and all its history
    Destroy { location: RepositoryLocation },
    /// Seed an empty repository with a README
    Init {
        location: RepositoryLocation,
        /// Repository name written into the README
        #[arg(long)]
        name: String,
        #[arg(short, long)]
        branch: Option<String>,
        #[arg(short, long, default_value = "Initial commit")]
        message: String,
        #[command(flatten)]
        author: AuthorArgs,
    },
    /// Write a file as a new commit
    Write {
        location: RepositoryLocation,
        branch: String,
        path: String,
        /// Local file to upload; binary files are sent base64-encoded
        #[arg(short, long, conflicts_with = "content")]
        file: Option<PathBuf>,
        /// Inline text content
        #[arg(long)]
        content: Option<String>,
        #[arg(short, long, default_value = "")]
        message: String,
        #[command(flatten)]
        author: AuthorArgs,
    },
    /// Delete a file as a new commit
    Rm {
        location: RepositoryLocation,
        branch: String,
        path: String,
        #[arg(short, long, default_value = "")]
        message: String,
        #[command(flatten)]
        author: AuthorArgs,
    },
    /// Print a file
    Cat {
        location: RepositoryLocation,
        branch: String,
        path: String,
        /// Write the decoded bytes instead of JSON
        #[arg(long)]
        raw: bool,
    },
    /// List a directory at a branch, tag or commit
    Ls {
        location: RepositoryLocation,
        reference: String,
        #[arg(default_value = "")]
        path: String,
    },
    /// Show branch history, newest first
    Log {
        location: RepositoryLocation,
        branch: String,
        /// Maximum number of commits (defaults to the configured page size)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Walk the whole history
        #[arg(long, conflicts_with = "limit")]
        all: bool,
    },
    /// Show one commit
    Show { location: RepositoryLocation, hash: String },
    /// List refs (heads, tags, HEAD)
    Refs { location: RepositoryLocation },
    /// Branch management
    #[command(subcommand)]
    Branch(BranchCommands),
}

#[derive(Subcommand, Debug)]
enum BranchCommands {
    /// List branches
    List { location: RepositoryLocation },
    /// Create a branch at the tip of another
    Create {
        location: RepositoryLocation,
        name: String,
        #[arg(long)]
        from: String,
    },
    /// Delete a branch
    Delete {
        location: RepositoryLocation,
        name: String,
        /// Delete even if the tip is not reachable from HEAD
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("cannot read {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("output error: {0}")]
    Output(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("either --file or --content is required")]
    MissingContent,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let CliError::Storage(storage) = &e {
                error!(kind = ?storage.kind(), status = storage.kind().status_code(), "{}", storage);
            }
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<EngineConfig, CliError> {
    let config = match (&cli.config, &cli.root) {
        (Some(file), _) => EngineConfig::from_file(file)?,
        (None, Some(root)) => EngineConfig::new(root),
        (None, None) => EngineConfig::from_env()?,
    };

    Ok(match &cli.root {
        Some(root) => EngineConfig {
            storage_root: root.clone(),
            ..config
        },
        None => config,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_config(&cli)?;
    let engine = RepositoryEngine::new(config)?;

    match cli.command {
        Commands::Provision { location } => print_json(&engine.provision(&location)?),
        Commands::Exists { location } => print_json(&engine.exists(&location)),
        Commands::Destroy { location } => {
            engine.destroy(&location)?;
            print_json(&location)
        }
        Commands::Init {
            location,
            name,
            branch,
            message,
            author,
        } => {
            let branch = branch.unwrap_or_else(|| engine.config().default_branch.clone());
            let info = engine.create_initial_commit(&location, &branch, &name, &message, &author.author())?;
            print_json(&info)
        }
        Commands::Write {
            location,
            branch,
            path,
            file,
            content,
            message,
            author,
        } => {
            let (content, encoding) = match (file, content) {
                (Some(file), _) => {
                    let bytes = std::fs::read(&file).map_err(|source| CliError::Read { path: file, source })?;
                    match String::from_utf8(bytes) {
                        Ok(text) => (text, "utf-8"),
                        Err(e) => (STANDARD.encode(e.into_bytes()), "base64"),
                    }
                }
                (None, Some(text)) => (text, "utf-8"),
                (None, None) => return Err(CliError::MissingContent),
            };
            let request = UpdateFileRequest::text(branch, path, content, message, author.author()).with_encoding(encoding);
            print_json(&engine.update_file(&location, &request)?)
        }
        Commands::Rm {
            location,
            branch,
            path,
            message,
            author,
        } => {
            let request = DeleteFileRequest::new(branch, path, message, author.author());
            print_json(&engine.delete_file(&location, &request)?)
        }
        Commands::Cat {
            location,
            branch,
            path,
            raw,
        } => {
            let file = engine.get_file(&location, &branch, &path)?;
            if raw {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(&file.to_bytes()?)?;
                stdout.flush()?;
                Ok(())
            } else {
                print_json(&file)
            }
        }
        Commands::Ls {
            location,
            reference,
            path,
        } => print_json(&engine.get_tree(&location, &reference, &path)?),
        Commands::Log {
            location,
            branch,
            limit,
            all,
        } => {
            let limit = if all { None } else { limit.or(engine.config().history_limit) };
            print_json(&engine.get_commits(&location, &branch, limit)?)
        }
        Commands::Show { location, hash } => print_json(&engine.get_commit(&location, &hash)?),
        Commands::Refs { location } => print_json(&engine.list_refs(&location)?),
        Commands::Branch(BranchCommands::List { location }) => print_json(&engine.list_branches(&location)?),
        Commands::Branch(BranchCommands::Create { location, name, from }) => {
            print_json(&engine.create_branch(&location, &name, &from)?)
        }
        Commands::Branch(BranchCommands::Delete { location, name, force }) => {
            engine.delete_branch(&location, &name, force)?;
            print_json(&name)
        }
    }
}
