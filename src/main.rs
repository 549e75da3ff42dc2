use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use zeroize::Zeroizing;

use luna_cycles::collaborators::SynodicMoonPhase;
use luna_cycles::config::Config;
use luna_cycles::store::VaultStore;
use luna_cycles::{logging, CycleService, NewCycle, OwnerId};

#[derive(Parser)]
#[command(
    name = "luna",
    about = "Track periods, see the current phase and predict the next cycle",
    long_about = "Cycle tracker backed by an encrypted local vault. \
                  The vault passphrase is read from LUNA_PASSPHRASE."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Whose history to work on
    #[arg(long, global = true, default_value = "00000000-0000-0000-0000-000000000000")]
    owner: OwnerId,

    /// Vault file (defaults to <LUNA_DATA_DIR>/cycles.luna)
    #[arg(long, global = true)]
    vault: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Create an empty vault
    Init {
        /// Replace an existing vault
        #[arg(long)]
        force: bool,
    },
    /// Log a period
    Add {
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
        /// Reference day for the phase snapshot (defaults to today)
        #[arg(long)]
        today: Option<NaiveDate>,
    },
    /// List all logged periods, oldest first
    List,
    /// List periods starting in one month
    Month { year: i32, month: u32 },
    /// Predict the next period and fertile window
    Predict,
    /// Phase of the latest period as of a day
    Phase {
        #[arg(long)]
        today: Option<NaiveDate>,
    },
    /// Fill in missing cycle lengths across the history
    Backfill,
    /// Summary statistics
    Stats,
    /// Print the decrypted vault as JSON
    Export,
    /// Delete the vault permanently
    Wipe {
        #[arg(long)]
        yes: bool,
    },
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn passphrase() -> Result<Zeroizing<String>> {
    let pass = env::var("LUNA_PASSPHRASE").context("LUNA_PASSPHRASE is not set")?;
    if pass.is_empty() {
        bail!("LUNA_PASSPHRASE is empty");
    }
    Ok(Zeroizing::new(pass))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    logging::init(&config.logging)?;

    let path = match cli.vault {
        Some(path) => path,
        None => VaultStore::path_in(&config.data_dir)?,
    };
    let owner = cli.owner;
    let today = Local::now().date_naive();

    match cli.command {
        Command::Init { force } => {
            if VaultStore::exists(&path) && !force {
                bail!("vault already exists at {}", path.display());
            }
            VaultStore::create(&path, &passphrase()?, config.kdf).await?;
            println!("created {}", path.display());
            return Ok(());
        }
        Command::Wipe { yes } => {
            if !yes {
                bail!("refusing to wipe without --yes");
            }
            VaultStore::wipe(&path).await?;
            return Ok(());
        }
        _ => {}
    }

    if !VaultStore::exists(&path) {
        bail!("no vault at {}; run `luna init` first", path.display());
    }
    let store = VaultStore::open(&path, &passphrase()?, config.kdf)
        .await
        .context("could not open vault")?;
    let service = CycleService::new(store).with_moon_phase(SynodicMoonPhase);

    match cli.command {
        Command::Add {
            start,
            end,
            today: reference,
        } => {
            let cycle = NewCycle::new(start, end)?;
            let added = service
                .add_cycle(owner, cycle, reference.unwrap_or(today))
                .await?;
            if let Some(value) = added.backfilled_previous {
                info!(value, "previous cycle length filled in");
            }
            print_json(&added.record)?;
        }
        Command::List => print_json(&service.history(owner).await?)?,
        Command::Month { year, month } => print_json(&service.month(owner, year, month).await?)?,
        Command::Predict => print_json(&service.predict(owner).await?)?,
        Command::Phase { today: reference } => {
            let phase = service
                .current_phase(owner, reference.unwrap_or(today))
                .await?;
            println!("{phase}");
        }
        Command::Backfill => {
            let updated = service.backfill(owner).await?;
            println!("{updated} record(s) updated");
        }
        Command::Stats => print_json(&service.stats(owner).await?)?,
        Command::Export => println!("{}", service.store().export().await?),
        Command::Init { .. } | Command::Wipe { .. } => {}
    }

    Ok(())
}
