use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use topom::{
    FileStore, HttpProxyConnector, SlotAction, SlotId, SlotMapping, Topom, TopomConfig, TopomStore,
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "topom-tool")]
#[command(about = "Administrative tooling for the topom slot manager")]
struct Cli {
    /// JSON document holding groups, proxies, and slot mappings
    #[arg(long, default_value = "topom-store.json")]
    store: PathBuf,

    /// Optional JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Drop a stale manager lock left by a crashed run
    #[arg(long)]
    force_unlock: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the store document if it does not exist yet
    Init,
    Group {
        #[command(subcommand)]
        command: GroupCommand,
    },
    Proxy {
        #[command(subcommand)]
        command: ProxyCommand,
    },
    Action {
        #[command(subcommand)]
        command: ActionCommand,
    },
    /// Assign a slot range to a group without migration
    Remap {
        /// Slot or inclusive range, e.g. `7` or `0-511`
        #[arg(long)]
        slots: String,
        #[arg(long)]
        group: u32,
    },
    /// Print the derived routing table
    Slots,
    Overview,
}

#[derive(Subcommand)]
enum GroupCommand {
    Create { gid: u32 },
    Remove { gid: u32 },
    AddServer { gid: u32, addr: String },
    DelServer { gid: u32, addr: String },
}

#[derive(Subcommand)]
enum ProxyCommand {
    Create {
        admin_addr: String,
    },
    Reinit {
        token: String,
    },
    Remove {
        token: String,
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum ActionCommand {
    Create {
        slot: SlotId,
        gid: u32,
    },
    CreateRange {
        begin: SlotId,
        end: SlotId,
        gid: u32,
    },
    Remove {
        slot: SlotId,
    },
    /// Advance the oldest queued action to `migrating`
    Prepare,
    /// Commit a migrated slot to its target group
    Complete {
        slot: SlotId,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => TopomConfig::from_json_file(path)
            .with_context(|| format!("load config {}", path.display()))?,
        None => TopomConfig::default(),
    };

    let store = Arc::new(
        FileStore::open(&cli.store, config.max_slot_num)
            .await
            .with_context(|| format!("open store {}", cli.store.display()))?,
    );
    if matches!(cli.command, Command::Init) {
        println!(
            "store {} ready with {} slots",
            store.path().display(),
            config.max_slot_num
        );
        return Ok(());
    }
    if cli.force_unlock {
        store.release().await?;
    }
    let connector = Arc::new(HttpProxyConnector::new(config.proxy_request_timeout)?);

    let topom = Topom::new(config, store, connector)?;
    topom.start().await?;
    let outcome = run(&topom, cli.command).await;
    topom.close().await?;
    outcome
}

async fn run(topom: &Topom, command: Command) -> Result<()> {
    match command {
        Command::Init => {}
        Command::Group { command } => match command {
            GroupCommand::Create { gid } => topom.create_group(gid).await?,
            GroupCommand::Remove { gid } => topom.remove_group(gid).await?,
            GroupCommand::AddServer { gid, addr } => topom.group_add_server(gid, &addr).await?,
            GroupCommand::DelServer { gid, addr } => topom.group_del_server(gid, &addr).await?,
        },
        Command::Proxy { command } => match command {
            ProxyCommand::Create { admin_addr } => {
                let proxy = topom.create_proxy(&admin_addr).await?;
                println!("{}", serde_json::to_string_pretty(&proxy)?);
            }
            ProxyCommand::Reinit { token } => topom.reinit_proxy(&token).await?,
            ProxyCommand::Remove { token, force } => topom.remove_proxy(&token, force).await?,
        },
        Command::Action { command } => match command {
            ActionCommand::Create { slot, gid } => topom.create_action(slot, gid).await?,
            ActionCommand::CreateRange { begin, end, gid } => {
                let created = topom.create_action_range(begin, end, gid).await?;
                println!("created {} actions", created);
            }
            ActionCommand::Remove { slot } => topom.remove_action(slot).await?,
            ActionCommand::Prepare => {
                let slot = topom.prepare_action().await?;
                println!("slot {} is migrating", slot);
            }
            ActionCommand::Complete { slot } => topom.complete_action(slot).await?,
        },
        Command::Remap { slots, group } => {
            let (begin, end) = parse_slot_range(&slots)?;
            let mappings = (begin..=end)
                .map(|id| SlotMapping {
                    id,
                    group_id: group,
                    action: SlotAction::default(),
                })
                .collect();
            topom.remap_group(mappings).await?;
        }
        Command::Slots => {
            let slots = topom.slots().await?;
            println!("{}", serde_json::to_string_pretty(&slots)?);
        }
        Command::Overview => {
            let overview = topom.overview().await?;
            println!("{}", serde_json::to_string_pretty(&overview)?);
        }
    }
    Ok(())
}

fn parse_slot_range(raw: &str) -> Result<(SlotId, SlotId)> {
    let parse = |part: &str| -> Result<SlotId> {
        part.trim()
            .parse::<SlotId>()
            .map_err(|err| anyhow!("invalid slot '{}': {}", part, err))
    };
    let (begin, end) = match raw.split_once('-') {
        Some((begin, end)) => (parse(begin)?, parse(end)?),
        None => {
            let slot = parse(raw)?;
            (slot, slot)
        }
    };
    if begin > end {
        bail!("slot range {} is reversed", raw);
    }
    Ok((begin, end))
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("topom=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
