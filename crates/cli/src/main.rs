//! labflow CLI - inspect and maintain an execution store.

mod logging;

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use labflow_core::{ContextId, Discriminators, ExecutionMetadata};
use labflow_execution::subtasks_of;
use labflow_storage::records::{ATTRIBUTES_KEY, CONFIGURATION_KEY, DISCRIMINATORS_KEY};
use labflow_storage::{retrieve_json, FileStorage, StorageService};
use tracing::{debug, info};

use crate::logging::{init_logging, LogLevel};

/// Environment variable naming the storage root.
const STORAGE_ENV: &str = "LABFLOW_STORAGE";
const DEFAULT_STORAGE: &str = ".labflow";

#[derive(Parser)]
#[command(name = "labflow")]
#[command(about = "Inspect memoized task executions", long_about = None)]
struct Cli {
    /// Storage root (defaults to $LABFLOW_STORAGE, then .labflow)
    #[arg(long, global = true)]
    storage: Option<PathBuf>,

    /// Log level (defaults to $LABFLOW_LOG, then info)
    #[arg(long, value_enum, global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List completed executions, newest first
    List {
        /// Only executions of this task type
        #[arg(long = "type")]
        task_type: Option<String>,
        /// Required discriminator, as key=value (repeatable)
        #[arg(long = "where", value_parser = parse_pair)]
        constraints: Vec<(String, String)>,
    },
    /// Show an execution with its records
    Show {
        /// Context ID
        id: String,
    },
    /// Delete an execution
    Delete {
        /// Context ID
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level)?;

    let root = storage_root(cli.storage, std::env::var_os(STORAGE_ENV).map(PathBuf::from));
    debug!("Using storage at {}", root.display());
    let storage = FileStorage::new(&root)
        .await
        .with_context(|| format!("unable to open storage at {}", root.display()))?;

    match cli.command {
        Commands::List { task_type, constraints } => {
            let constraints: Discriminators = constraints.into_iter().collect();
            let contexts = completed_contexts(&storage, task_type.as_deref(), &constraints).await?;

            println!("Executions ({})", contexts.len());
            for meta in contexts {
                println!("  {} | {} | {}", meta.id, meta.task_type, format_time(&meta));
            }
        }
        Commands::Show { id } => {
            let id = parse_id(&id)?;
            let meta = storage.get_context(&id).await?;

            println!("Execution: {}", meta.id);
            println!("  Type: {}", meta.task_type);
            println!(
                "  Started: {}",
                meta.start.map(|t| t.to_string()).unwrap_or_else(|| "-".into())
            );
            println!("  Finished: {}", format_time(&meta));

            let discriminators: Discriminators = retrieve_json(&storage, &id, DISCRIMINATORS_KEY)
                .await?
                .unwrap_or_default();
            println!("  Discriminators:");
            for (key, value) in &discriminators {
                println!("    {} = {}", key, value);
            }

            let attributes: Discriminators = retrieve_json(&storage, &id, ATTRIBUTES_KEY)
                .await?
                .unwrap_or_default();
            println!("  Attributes:");
            for (key, value) in &attributes {
                println!("    {} = {}", key, value);
            }

            if let Some(raw) = storage.retrieve(&id, CONFIGURATION_KEY).await? {
                println!("  Configuration:");
                for line in String::from_utf8_lossy(&raw).lines() {
                    println!("    {}", line);
                }
            }

            let subtasks = match subtasks_of(&storage, &id).await {
                Ok(subtasks) => subtasks,
                Err(e) => {
                    debug!("No subtasks for [{}]: {}", id, e);
                    Vec::new()
                }
            };
            if !subtasks.is_empty() {
                println!("  Subtasks ({}):", subtasks.len());
                for subtask in subtasks {
                    println!("    {}", subtask);
                }
            }
        }
        Commands::Delete { id } => {
            let id = parse_id(&id)?;
            storage.get_context(&id).await?;
            storage.delete_context(&id).await?;
            info!("Deleted execution [{}]", id);
            println!("Deleted: {}", id);
        }
    }

    Ok(())
}

/// Completed executions, optionally of one type, carrying `constraints`.
async fn completed_contexts(
    storage: &dyn StorageService,
    task_type: Option<&str>,
    constraints: &Discriminators,
) -> Result<Vec<ExecutionMetadata>> {
    let types: BTreeSet<String> = match task_type {
        Some(task_type) => BTreeSet::from([task_type.to_string()]),
        None => {
            let mut types = BTreeSet::new();
            for id in storage.context_ids().await? {
                if let Ok(meta) = storage.get_context(&id).await {
                    types.insert(meta.task_type);
                }
            }
            types
        }
    };

    let mut found = Vec::new();
    for task_type in &types {
        found.extend(storage.list_contexts(task_type, constraints).await?);
    }
    found.sort_by(|a, b| b.end.cmp(&a.end).then_with(|| b.id.cmp(&a.id)));
    Ok(found)
}

fn storage_root(flag: Option<PathBuf>, env: Option<PathBuf>) -> PathBuf {
    flag.or(env).unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE))
}

fn parse_id(s: &str) -> Result<ContextId> {
    s.parse().map_err(|e| anyhow::anyhow!("Invalid context ID [{}]: {}", s, e))
}

fn parse_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got [{}]", s)),
    }
}

fn format_time(meta: &ExecutionMetadata) -> String {
    meta.end.map(|t| t.to_string()).unwrap_or_else(|| "-".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use labflow_storage::records::METADATA_KEY;
    use labflow_storage::{store_json, MemoryStorage};

    #[test]
    fn test_parse_list_filters() {
        let cli = Cli::try_parse_from([
            "labflow", "list", "--type", "Train", "--where", "x=1", "--where", "model=a=b",
        ])
        .unwrap();
        let Commands::List { task_type, constraints } = cli.command else {
            panic!("expected list");
        };
        assert_eq!(task_type.as_deref(), Some("Train"));
        assert_eq!(
            constraints,
            vec![("x".to_string(), "1".to_string()), ("model".to_string(), "a=b".to_string())]
        );

        assert!(Cli::try_parse_from(["labflow", "list", "--where", "novalue"]).is_err());
    }

    #[test]
    fn test_storage_root_priority() {
        assert_eq!(
            storage_root(Some("flag".into()), Some("env".into())),
            PathBuf::from("flag")
        );
        assert_eq!(storage_root(None, Some("env".into())), PathBuf::from("env"));
        assert_eq!(storage_root(None, None), PathBuf::from(DEFAULT_STORAGE));
    }

    #[tokio::test]
    async fn test_completed_contexts_across_types() {
        let storage = MemoryStorage::new();
        for task_type in ["Prepare", "Train"] {
            let meta = ExecutionMetadata::new(task_type);
            store_json(&storage, &meta.id, DISCRIMINATORS_KEY, &Discriminators::new())
                .await
                .unwrap();
            store_json(&storage, &meta.id, METADATA_KEY, &meta).await.unwrap();
        }
        // Incomplete context
        let running = ExecutionMetadata::new("Train");
        store_json(&storage, &running.id, DISCRIMINATORS_KEY, &Discriminators::new())
            .await
            .unwrap();

        let all = completed_contexts(&storage, None, &Discriminators::new()).await.unwrap();
        assert_eq!(all.len(), 2);
        let trains = completed_contexts(&storage, Some("Train"), &Discriminators::new())
            .await
            .unwrap();
        assert_eq!(trains.len(), 1);
    }
}
