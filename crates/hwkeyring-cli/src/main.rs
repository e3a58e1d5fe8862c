//! hwkeyring CLI - offline tooling for the hardware keyring
//!
//! Derives account addresses from an extended public key exported by the
//! device, formats addresses with checksum casing, and scaffolds bridge
//! configuration files.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hwkeyring_bridge::BridgeConfig;
use hwkeyring_core::{
    account_path, derive_addresses, Address, ExtendedPublicKey, DEFAULT_HD_PATH, MAX_ACCOUNTS,
};

#[derive(Parser)]
#[command(name = "hwkeyring")]
#[command(about = "Offline tooling for a hardware-backed signing keyring", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive account addresses from an extended public key
    Derive {
        /// Account-level extended public key (xpub...)
        #[arg(long)]
        xpub: String,

        /// Derivation path the key was exported at
        #[arg(long, default_value = DEFAULT_HD_PATH)]
        hd_path: String,

        /// First account index
        #[arg(long, default_value_t = 0)]
        from: u32,

        /// Number of accounts
        #[arg(short = 'n', long, default_value_t = MAX_ACCOUNTS)]
        count: u32,
    },

    /// Print an address with checksum casing
    Checksum {
        /// Address, any casing, with or without 0x
        address: String,
    },

    /// Bridge configuration commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write a default bridge configuration
    Init {
        /// Output path
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate and print a bridge configuration
    Show {
        /// Configuration path
        path: PathBuf,
    },
}

/// One derived account
#[derive(Debug, PartialEq, Eq)]
struct DerivedAccount {
    index: u32,
    derivation_path: String,
    address: Address,
}

fn derive_accounts(xpub: &str, hd_path: &str, from: u32, count: u32) -> Result<Vec<DerivedAccount>> {
    let key: ExtendedPublicKey = xpub.parse().context("Could not parse extended public key")?;
    let to = from
        .checked_add(count)
        .context("Account range overflows the index space")?;

    let accounts = derive_addresses(&key, from..to)?
        .into_iter()
        .map(|(index, address)| DerivedAccount {
            index,
            derivation_path: account_path(hd_path, index),
            address,
        })
        .collect();
    Ok(accounts)
}

fn checksum(address: &str) -> Result<String> {
    let address: Address = address.parse()?;
    Ok(address.to_checksum())
}

fn init_config(path: &Path, force: bool) -> Result<BridgeConfig> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    let config = BridgeConfig::default();
    config.save(path)?;
    Ok(config)
}

fn handle_config_command(cmd: ConfigCommands) -> Result<()> {
    match cmd {
        ConfigCommands::Init { path, force } => {
            init_config(&path, force)?;
            info!(path = %path.display(), "Bridge configuration written");
            println!("✓ Bridge configuration written to {}", path.display());
        }

        ConfigCommands::Show { path } => {
            let config = BridgeConfig::load(&path)
                .with_context(|| format!("Could not load {}", path.display()))?;
            let timeout = |secs: Option<u64>| match secs {
                Some(s) => format!("{}s", s),
                None => "none".to_string(),
            };

            println!("Bridge Configuration:");
            println!("  Surface URL: {}", config.surface_url);
            println!("  Channel Name: {}", config.channel_name);
            println!("  Attach Timeout: {}", timeout(config.attach_timeout_secs));
            println!("  Request Timeout: {}", timeout(config.request_timeout_secs));
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hwkeyring=info,hwkeyring_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Derive {
            xpub,
            hd_path,
            from,
            count,
        } => {
            let accounts = derive_accounts(&xpub, &hd_path, from, count)?;
            info!(count = accounts.len(), "Derived accounts");
            for account in accounts {
                println!(
                    "{:>4}  {}  {}",
                    account.index, account.address, account.derivation_path
                );
            }
        }

        Commands::Checksum { address } => {
            println!("{}", checksum(&address)?);
        }

        Commands::Config(cmd) => handle_config_command(cmd)?,
    }

    Ok(())
}
