//! tickbridge - Helpdesk to issue-tracker reconciliation
//!
//! Main entry point for the tickbridge CLI.

use clap::{Parser, Subcommand};
use std::process;
use tickbridge::association::Association;
use tickbridge::cache::{self, CacheStore};
use tickbridge::config::{validate_config, CredentialGroup, TickBridgeConfig};
use tickbridge::model::format_timestamp;
use tickbridge::reconcile::Reconciler;
use tickbridge::{dashboard, TickBridgeError};

/// tickbridge - Reconcile Zendesk enhancement tickets with GitHub issues
#[derive(Parser, Debug)]
#[command(name = "tickbridge")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: ~/.config/tickbridge/config.yaml)
    #[arg(short, long, env = "TICKBRIDGE_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Update the cache and show every bucket
    Dashboard {
        /// Credential group (default: every group)
        #[arg(short, long)]
        group: Option<String>,

        /// Use cached data only (don't fetch updates)
        #[arg(long)]
        cached: bool,
    },

    /// Discard the cached entry for a group and rebuild it
    Rebuild {
        /// Credential group
        #[arg(short, long)]
        group: String,
    },

    /// Show the quick-reference listing from the cache
    Summary {
        /// Credential group (default: every group)
        #[arg(short, long)]
        group: Option<String>,
    },

    /// List configured groups and cache freshness
    Groups,

    /// Parse an association field value
    CheckAssociation {
        /// Field value (e.g., gh-42)
        value: String,

        /// Issue tracker prefix
        #[arg(short, long, default_value = tickbridge::association::DEFAULT_PREFIX)]
        prefix: String,
    },

    /// Clear the local cache
    ClearCache,

    /// Validate the configuration file
    Validate,
}

#[tokio::main]
async fn main() {
    // Initialize logging
    if let Err(e) = tickbridge::logging::init() {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e.user_message());
        process::exit(1);
    }
}

async fn run(cli: Cli) -> tickbridge::Result<()> {
    // Parser check needs no configuration
    if let Commands::CheckAssociation { value, prefix } = &cli.command {
        print_association(value, prefix);
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    tracing::info!(groups = config.groups.len(), "Configuration loaded");

    if let Commands::Validate = cli.command {
        return handle_validate(&config);
    }

    let reconciler = Reconciler::new(cache::open(&config.cache)?);

    match cli.command {
        Commands::Dashboard { group, cached } => {
            for group in select_groups(&config, group.as_deref())? {
                let entry = if cached {
                    reconciler.cached(&group.id)?.ok_or_else(|| {
                        TickBridgeError::Cache(format!(
                            "No cached data for group '{}'. Run without --cached first.",
                            group.id
                        ))
                    })?
                } else {
                    reconciler.update(group).await?
                };

                println!("== {} ({}/{}) ==", group.id, group.github.owner, group.github.repo);
                print!("{}", dashboard::render(&entry, group.utc_offset));
                println!();
            }
        }

        Commands::Rebuild { group } => {
            let group = config.require_group(&group)?;
            let entry = reconciler.rebuild(group).await?;
            let counts = entry.counts();
            println!("Rebuilt cache for '{}':", group.id);
            println!("  Tracking:              {}", counts.tracking);
            println!("  Need attention:        {}", counts.need_attention);
            println!("  Unassociated:          {}", counts.unassociated);
            println!("  Malformed association: {}", counts.malformed_association);
            println!("  Unresolved links:      {}", counts.unresolved);
        }

        Commands::Summary { group } => {
            for group in select_groups(&config, group.as_deref())? {
                match reconciler.cached(&group.id)? {
                    Some(entry) => {
                        println!("== {} ==", group.id);
                        print!("{}", dashboard::render_summary(&entry.quick_reference()));
                    }
                    None => println!("== {} == (not cached)", group.id),
                }
            }
        }

        Commands::Groups => {
            let cached_groups = reconciler.cache().groups()?;
            println!("Configured groups: {}", config.groups.len());
            println!();
            for group in &config.groups {
                let freshness = if cached_groups.contains(&group.id) {
                    match reconciler.cached(&group.id)? {
                        Some(entry) => format!(
                            "updated {}",
                            format_timestamp(entry.last_updated, group.utc_offset)
                        ),
                        None => "cache unreadable".to_string(),
                    }
                } else {
                    "not cached".to_string()
                };
                println!(
                    "  {:<15} {}/{} <-> {} ({})",
                    group.id,
                    group.github.owner,
                    group.github.repo,
                    group.zendesk.base_url(),
                    freshness
                );
            }
        }

        Commands::ClearCache => {
            reconciler.cache().clear()?;
            println!("Cache cleared successfully");
        }

        Commands::CheckAssociation { .. } | Commands::Validate => {
            // Handled before the cache is opened
        }
    }

    Ok(())
}

fn load_config(path: Option<&str>) -> tickbridge::Result<TickBridgeConfig> {
    match path {
        Some(path) => TickBridgeConfig::load(path),
        None => match TickBridgeConfig::load_default() {
            Ok(config) => Ok(config),
            Err(TickBridgeError::Config(msg)) if msg.contains("Config file not found") => {
                Err(TickBridgeError::Config(format!(
                    "No configuration found at {}.\n\n\
                     Create it with at least one credential group, e.g.:\n\n\
                     groups:\n  \
                     - id: acme\n    \
                       github: {{ owner: acme, repo: app, token_env: GITHUB_TOKEN }}\n    \
                       zendesk: {{ subdomain: acme, email: agent@acme.com, token_env: ZENDESK_TOKEN }}\n    \
                       association: {{ field_id: 360001 }}",
                    TickBridgeConfig::default_path().display()
                )))
            }
            Err(e) => Err(e),
        },
    }
}

fn select_groups<'a>(
    config: &'a TickBridgeConfig,
    group: Option<&str>,
) -> tickbridge::Result<Vec<&'a CredentialGroup>> {
    match group {
        Some(id) => Ok(vec![config.require_group(id)?]),
        None if config.groups.is_empty() => Err(TickBridgeError::Config(
            "No credential groups configured".to_string(),
        )),
        None => Ok(config.groups.iter().collect()),
    }
}

fn handle_validate(config: &TickBridgeConfig) -> tickbridge::Result<()> {
    match validate_config(config) {
        Ok(()) => {
            println!("Configuration is valid ({} groups)", config.groups.len());
            Ok(())
        }
        Err(errors) => {
            println!("Found {} problems:", errors.len());
            for error in &errors {
                println!("  {}", error);
            }
            Err(TickBridgeError::Config("validation failed".to_string()))
        }
    }
}

fn print_association(value: &str, prefix: &str) {
    match Association::parse(Some(value), prefix) {
        Association::Absent => println!("absent (no association)"),
        Association::Malformed(raw) => {
            println!("malformed: {:?} is not {}-<number>", raw, prefix)
        }
        Association::Valid(number) => println!("valid: issue #{}", number),
    }
}
