use anyhow::Result;
use clap::{Parser, Subcommand};
use dbmt::commands::{self, CreateOptions, DownOutcome, StatusFormat};
use dbmt::config::{self, ConfigBuilder, ConfigInput, DirectoriesInput};
use dbmt::constants::CONFIG_FILENAME;
use dotenv::dotenv;
use std::path::Path;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(long, default_value = CONFIG_FILENAME, global = true)]
    config_file: String,

    /// Enable verbose output (info level)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Suppress all non-essential output (error level only)
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Enable debug output (debug level)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migration commands
    Migrate {
        #[command(subcommand)]
        command: MigrateCommands,
    },
}

/// Options shared by every command that runs against the databases
#[derive(clap::Args, Debug, Clone)]
struct TargetArgs {
    #[command(flatten)]
    connection_args: config::ConnectionArgs,

    #[command(flatten)]
    directory_args: config::DirectoryArgs,

    #[command(flatten)]
    migration_table_args: config::MigrationTableArgs,
}

#[derive(Subcommand)]
enum MigrateCommands {
    /// Create an empty migration file for the configured databases
    #[command(visible_alias = "new")]
    Create {
        /// Comment stored in the migration file
        #[arg(long, short = 'm')]
        comment: Option<String>,

        /// Suffix appended to the file name
        #[arg(long)]
        suffix: Option<String>,

        /// Editor command used to open the new file
        #[arg(long)]
        editor: Option<String>,

        #[command(flatten)]
        schema_dir_args: config::SchemaDirArgs,

        #[command(flatten)]
        target_args: TargetArgs,
    },

    /// Apply all pending migrations
    Apply {
        #[command(flatten)]
        policy_args: config::PolicyArgs,

        #[command(flatten)]
        target_args: TargetArgs,
    },

    /// Apply the next pending migration only
    Up {
        #[command(flatten)]
        policy_args: config::PolicyArgs,

        #[command(flatten)]
        target_args: TargetArgs,
    },

    /// Reverse the most recently applied migration
    Down {
        #[command(flatten)]
        policy_args: config::PolicyArgs,

        #[command(flatten)]
        target_args: TargetArgs,
    },

    /// Show applied, pending and skipped migrations per connection
    Status {
        /// Output format
        #[arg(long, value_enum, default_value = "human")]
        format: StatusFormat,

        #[command(flatten)]
        target_args: TargetArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    initialize_logging(&cli);
    run_main(cli).await
}

fn initialize_logging(cli: &Cli) {
    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else if cli.quiet {
        "error"
    } else {
        "warn" // default level
    };

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(level)
    };

    fmt().with_env_filter(filter).with_target(false).init();
}

fn resolve_config(
    file_config: ConfigInput,
    root_dir: &Path,
    target_args: &TargetArgs,
    schema_dir: Option<String>,
) -> Result<config::Config> {
    let cli_config = ConfigInput {
        databases: None,
        directories: Some(DirectoriesInput {
            schema_dir,
            ..DirectoriesInput::from(target_args.directory_args.clone())
        }),
        migration: Some(target_args.migration_table_args.clone().into()),
    };

    Ok(ConfigBuilder::new()
        .with_file(file_config)
        .with_cli_args(cli_config)
        .with_root_dir(root_dir)
        .resolve()?)
}

async fn run_main(cli: Cli) -> Result<()> {
    let (file_config, root_dir) = config::load_config(&cli.config_file)?;

    match cli.command {
        Commands::Migrate { command } => match command {
            MigrateCommands::Create {
                comment,
                suffix,
                editor,
                schema_dir_args,
                target_args,
            } => {
                let config = resolve_config(
                    file_config,
                    &root_dir,
                    &target_args,
                    schema_dir_args.schema_dir,
                )?;

                info!("Creating migration file");
                let options = CreateOptions {
                    comment,
                    suffix,
                    editor,
                };
                commands::cmd_migrate_create(
                    &config,
                    &target_args.connection_args.connections,
                    &options,
                )
                .await?;
                Ok(())
            }
            MigrateCommands::Apply {
                policy_args,
                target_args,
            } => {
                let config = resolve_config(file_config, &root_dir, &target_args, None)?;

                info!("Applying pending migrations");
                commands::cmd_migrate_apply(
                    &config,
                    &target_args.connection_args.connections,
                    policy_args.policy(),
                    None,
                    cli.verbose,
                )
                .await?;
                Ok(())
            }
            MigrateCommands::Up {
                policy_args,
                target_args,
            } => {
                let config = resolve_config(file_config, &root_dir, &target_args, None)?;

                info!("Applying the next pending migration");
                commands::cmd_migrate_apply(
                    &config,
                    &target_args.connection_args.connections,
                    policy_args.policy(),
                    Some(1),
                    cli.verbose,
                )
                .await?;
                Ok(())
            }
            MigrateCommands::Down {
                policy_args,
                target_args,
            } => {
                let config = resolve_config(file_config, &root_dir, &target_args, None)?;

                info!("Reversing the latest migration");
                let outcome = commands::cmd_migrate_down(
                    &config,
                    &target_args.connection_args.connections,
                    policy_args.policy(),
                    cli.verbose,
                )
                .await?;

                // Nothing to reverse is a clean failure, not an error trace
                match outcome {
                    DownOutcome::NothingToReverse => std::process::exit(1),
                    DownOutcome::Reverted { .. } => Ok(()),
                }
            }
            MigrateCommands::Status {
                format,
                target_args,
            } => {
                let config = resolve_config(file_config, &root_dir, &target_args, None)?;

                info!("Checking migration status");
                commands::cmd_migrate_status(
                    &config,
                    &target_args.connection_args.connections,
                    format,
                )
                .await?;
                Ok(())
            }
        },
    }
}
