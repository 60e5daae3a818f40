//! Backup CLI commands
//!
//! Implements CLI commands for creating, restoring and inspecting
//! encrypted backups.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Subcommand;

use crate::audit::AuditLogger;
use crate::backup::artifact::inspect;
use crate::backup::{
    BackupManager, BackupRequest, CancelToken, RestoreManager, RestoreOutcome, RestoreRequest,
};
use crate::config::{BackupConfig, Settings, VaultPaths};
use crate::crypto::SecureString;
use crate::error::{VaultError, VaultResult};
use crate::storage::{DirectoryFileRoot, JsonDataStore};

/// Backup subcommands
#[derive(Subcommand)]
pub enum BackupCommands {
    /// Create a new encrypted backup
    Create {
        /// Where to write the artifact (defaults to the backup directory)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Name recorded in the audit log
        #[arg(long, default_value = "cli")]
        requested_by: String,

        /// Read the password from this environment variable instead of prompting
        #[arg(long, value_name = "VAR")]
        password_env: Option<String>,
    },

    /// Replace all live data with the contents of a backup
    Restore {
        /// Path to the backup artifact
        artifact: PathBuf,

        /// Skip confirmation
        #[arg(short, long)]
        force: bool,

        /// Name recorded in the audit log
        #[arg(long, default_value = "cli")]
        requested_by: String,

        /// Read the password from this environment variable instead of prompting
        #[arg(long, value_name = "VAR")]
        password_env: Option<String>,
    },

    /// Show the envelope fields of a backup without decrypting it
    Info {
        /// Path to the backup artifact
        artifact: PathBuf,
    },

    /// Show recent backup and restore activity
    History {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

/// Handle a backup command
pub fn handle_backup_command(
    paths: &VaultPaths,
    settings: &Settings,
    cmd: BackupCommands,
) -> VaultResult<()> {
    match cmd {
        BackupCommands::Create {
            out,
            requested_by,
            password_env,
        } => {
            let config = Arc::new(BackupConfig::from_env(paths.clone(), settings.clone())?);
            paths.ensure_directories()?;

            let (password, confirmation) = match password_env {
                Some(var) => {
                    let password = password_from_env(&var)?;
                    (password, None)
                }
                None => {
                    let password = prompt_password("Backup password: ")?;
                    let confirmation = prompt_password("Confirm password: ")?;
                    (password, Some(confirmation))
                }
            };

            let mut request = BackupRequest::new(password).requested_by(requested_by);
            if let Some(confirmation) = confirmation {
                request = request.with_confirmation(confirmation);
            }

            let manager = BackupManager::new(config, open_store(paths)?, open_files(paths));

            println!("Creating backup...");
            let outcome = manager.create_backup(request)?;

            let path = out.unwrap_or_else(|| default_artifact_path(paths));
            BackupManager::write_artifact(&outcome, &path)?;

            println!("Backup created: {}", path.display());
            println!("{}", outcome.artifact.summary());
            println!("Keep the password safe; it cannot be recovered.");
        }

        BackupCommands::Restore {
            artifact,
            force,
            requested_by,
            password_env,
        } => {
            let bytes = read_artifact(&artifact)?;
            let envelope = inspect(&bytes)?;

            println!("Backup Information");
            println!("==================");
            println!("File: {}", artifact.display());
            println!("{}", envelope.summary());
            println!();

            if !force {
                println!("WARNING: This will overwrite ALL current data and uploaded files!");
                println!("To proceed, run again with --force flag:");
                println!("  rollcall-vault backup restore {} --force", artifact.display());
                return Ok(());
            }

            let config = Arc::new(BackupConfig::from_env(paths.clone(), settings.clone())?);
            paths.ensure_directories()?;

            let password = match password_env {
                Some(var) => password_from_env(&var)?,
                None => prompt_password("Backup password: ")?,
            };

            let manager = RestoreManager::new(config, open_store(paths)?, open_files(paths));
            let request = RestoreRequest::new(bytes, password).requested_by(requested_by);

            println!("Restoring from backup...");
            let result = manager.restore_with_cancel(&request, &CancelToken::new());

            match RestoreOutcome::from_result(&result) {
                RestoreOutcome::Success { restart_required } => {
                    if let Ok(report) = &result {
                        println!("Restore complete!");
                        println!("{}", report.summary());
                    }
                    if restart_required {
                        println!();
                        println!("Restart the application to load the restored data.");
                    }
                }
                RestoreOutcome::Failed { message, .. } => {
                    if let Err(e) = &result {
                        if e.requires_operator() {
                            eprintln!("OPERATOR ATTENTION REQUIRED: {}", e);
                        }
                    }
                    eprintln!("{}", message);
                }
            }

            result?;
        }

        BackupCommands::Info { artifact } => {
            let bytes = read_artifact(&artifact)?;
            let envelope = inspect(&bytes)?;

            println!("Backup Details");
            println!("==============");
            println!("File:     {}", artifact.display());
            println!("Format:   {}", envelope.version);
            println!(
                "Created:  {}",
                envelope.created_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            println!("Size:     {}", format_size(envelope.declared_size));
            println!("Digest:   {}", envelope.content_digest);
            if let Some(ctx) = &envelope.context_summary {
                println!("School:   {}", ctx.institution_name);
                println!("Files:    {}", ctx.file_count);
            }
        }

        BackupCommands::History { limit } => {
            let logger = AuditLogger::new(paths.audit_log());
            let entries = logger.read_recent(limit)?;

            if entries.is_empty() {
                println!("No backup activity recorded.");
                return Ok(());
            }

            for entry in entries.iter().rev() {
                println!("{}", entry.format_human_readable());
            }
        }
    }

    Ok(())
}

fn open_store(paths: &VaultPaths) -> VaultResult<Arc<JsonDataStore>> {
    Ok(Arc::new(JsonDataStore::open(paths.data_file())?))
}

fn open_files(paths: &VaultPaths) -> Arc<DirectoryFileRoot> {
    Arc::new(DirectoryFileRoot::new(paths.uploads_dir()))
}

fn default_artifact_path(paths: &VaultPaths) -> PathBuf {
    let now = chrono::Utc::now();
    paths.backup_dir().join(format!(
        "backup-{}-{:03}.json",
        now.format("%Y%m%d-%H%M%S"),
        now.timestamp_subsec_millis()
    ))
}

fn read_artifact(path: &Path) -> VaultResult<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| VaultError::Io(format!("Failed to read {}: {}", path.display(), e)))
}

fn password_from_env(var: &str) -> VaultResult<SecureString> {
    std::env::var(var)
        .map(SecureString::new)
        .map_err(|_| VaultError::Config(format!("Environment variable {} is not set", var)))
}

/// Prompt for a password (hidden input)
fn prompt_password(prompt: &str) -> VaultResult<SecureString> {
    rpassword::prompt_password(prompt)
        .map(SecureString::new)
        .map_err(|e| VaultError::Io(format!("Failed to read password: {}", e)))
}

/// Format a file size in human-readable form
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_default_artifact_path_in_backup_dir() {
        let paths = VaultPaths::with_base_dir(PathBuf::from("/tmp/rollcall-test"));
        let path = default_artifact_path(&paths);
        assert!(path.starts_with(paths.backup_dir()));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("json"));
    }
}
