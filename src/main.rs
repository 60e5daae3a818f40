use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use rollcall_vault::cli::handle_backup_command;
use rollcall_vault::config::backup::SECRET_ENV_VAR;
use rollcall_vault::config::{Settings, VaultPaths};

#[derive(Parser)]
#[command(
    name = "rollcall-vault",
    version,
    about = "Encrypted backup and restore for the Rollcall attendance system",
    long_about = "rollcall-vault produces password-encrypted, tamper-evident backups of a \
                  school's attendance records and uploaded files, and restores them \
                  after verifying their integrity and origin."
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Backup management commands
    #[command(subcommand)]
    Backup(rollcall_vault::cli::BackupCommands),

    /// Show current configuration and paths
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("rollcall_vault=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rollcall_vault=info"))
    };
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Initialize paths and settings
    let paths = VaultPaths::new()?;
    let settings = Settings::load_or_create(&paths)?;

    match cli.command {
        Some(Commands::Backup(cmd)) => {
            handle_backup_command(&paths, &settings, cmd)
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
        }
        Some(Commands::Config) => {
            println!("rollcall-vault Configuration");
            println!("============================");
            println!("Base directory:   {}", paths.base_dir().display());
            println!("Data file:        {}", paths.data_file().display());
            println!("Uploads:          {}", paths.uploads_dir().display());
            println!("Backup directory: {}", paths.backup_dir().display());
            println!("Audit log:        {}", paths.audit_log().display());
            println!();
            println!("Settings:");
            println!("  Institution:         {}", settings.institution_name);
            println!("  Min password length: {}", settings.min_password_length);
            println!("  Compression level:   {}", settings.compression_level);
            println!(
                "  Key derivation:      {} KiB, {} passes, {} lanes",
                settings.key_derivation.memory_cost,
                settings.key_derivation.time_cost,
                settings.key_derivation.parallelism
            );
            let secret_state = match std::env::var(SECRET_ENV_VAR) {
                Ok(s) if !s.trim().is_empty() => "configured",
                _ => "NOT SET (backups disabled)",
            };
            println!("  {}: {}", SECRET_ENV_VAR, secret_state);
        }
        None => {
            println!("rollcall-vault - encrypted backups for Rollcall");
            println!();
            println!("Run 'rollcall-vault --help' for usage information.");
        }
    }

    Ok(())
}
