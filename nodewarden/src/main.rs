//! Nodewarden - masternode daemon orchestrator
//!
//! Operator CLI over the node manager: provision coin daemons, control
//! their lifecycle and query them over RPC.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use nodewarden::auth::{hash_password, verify_password};
use nodewarden::explorer::PER_NODE_TX_LIMIT;
use nodewarden::settings::SETTINGS_FILE;
use nodewarden::{
    load_settings, JsonNodeStore, NodeCreateInput, NodeManager, NodeStore, OwnerId, Settings,
};

#[derive(Parser)]
#[command(name = "nodewarden")]
#[command(about = "Masternode daemon orchestrator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (default: <base dir>/nodewarden.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Base directory for cores, node data and the node store
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Acting user for node commands
    #[arg(short, long, env = "NODEWARDEN_USER")]
    user: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List supported chains
    Chains,

    /// Manage users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Manage nodes of the acting user
    Node {
        #[command(subcommand)]
        command: NodeCommands,
    },

    /// Wallet and masternode operations on a node
    Wallet {
        #[command(subcommand)]
        command: WalletCommands,
    },

    /// Download and unpack a chain core
    Install {
        chain: String,

        /// Release version (latest if omitted)
        version: Option<String>,
    },

    /// Transactions across all nodes of the acting user
    Tx {
        /// Case-insensitive filter
        #[arg(long, default_value = "")]
        search: String,

        /// Transactions fetched per node
        #[arg(long, default_value_t = PER_NODE_TX_LIMIT)]
        limit: u32,
    },

    /// Query a chain through its most synced node
    Explorer {
        chain: String,

        #[command(subcommand)]
        query: ExplorerQuery,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Register a user
    Add {
        username: String,

        #[arg(long, env = "NODEWARDEN_PASSWORD")]
        password: String,
    },

    /// Show a user record
    Show { username: String },

    /// Check a password against the stored hash
    Verify {
        username: String,

        #[arg(long, env = "NODEWARDEN_PASSWORD")]
        password: String,
    },
}

#[derive(Subcommand)]
enum NodeCommands {
    /// List nodes
    List,

    /// Show a node
    Show {
        id: String,

        /// Include RPC credentials and the masternode key
        #[arg(long)]
        secrets: bool,
    },

    /// Provision and start a node
    Create {
        id: String,
        chain: String,

        /// Address advertised to peers
        #[arg(long)]
        external_ip: String,

        #[arg(long, env = "NODEWARDEN_MASTERNODE_KEY")]
        masternode_key: String,

        #[arg(long)]
        p2p_port: Option<u16>,

        #[arg(long)]
        rpc_port: Option<u16>,

        /// Pre-synced chain data archive
        #[arg(long)]
        snapshot_url: Option<String>,

        /// Core version (latest if omitted)
        #[arg(long)]
        core_version: Option<String>,
    },

    Start { id: String },
    Stop { id: String },
    Restart { id: String },

    /// Wipe block data and sync from the network
    Resync { id: String },

    /// Stop a node and remove it with its data
    Delete { id: String },

    /// Sync state, or offline
    Status { id: String },

    /// Compare the node's core with the latest release
    UpdateCheck { id: String },

    /// Move the node to the latest core
    Update { id: String },
}

#[derive(Subcommand)]
enum WalletCommands {
    Balance { id: String },

    Transactions {
        id: String,

        #[arg(long, default_value_t = 25)]
        count: u32,

        #[arg(long, default_value_t = 0)]
        skip: u32,
    },

    Send {
        id: String,
        address: String,
        amount: f64,
    },

    NewAddress { id: String },

    ImportKey {
        id: String,
        priv_key: String,

        #[arg(long, default_value = "")]
        label: String,

        #[arg(long)]
        rescan: bool,
    },

    DumpKey { id: String, address: String },

    /// Export keys of all receiving addresses
    ExportKeys {
        id: String,

        /// Skip addresses without balance
        #[arg(long)]
        funded_only: bool,
    },

    Peers { id: String },

    Masternode { id: String },

    StartMasternode { id: String },

    StakingStatus { id: String },

    ColdStakingBalance { id: String },

    NewStakingAddress { id: String },

    ColdUtxos { id: String },

    /// Whitelist all pending cold staking delegators
    WhitelistDelegators { id: String },
}

#[derive(Subcommand)]
enum ExplorerQuery {
    Blockcount,
    Bestblockhash,
    Mempool,
    Block { id: String },
    Tx { txid: String },
    Address { address: String },
    /// New address with its private key
    PaymentAddress,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let settings = load(&cli).await?;
    let base_dir = settings.resolve_base_dir()?;
    info!("Using base directory {}", base_dir.display());

    let store: Arc<dyn NodeStore> = Arc::new(JsonNodeStore::open(&base_dir)?);
    let manager = NodeManager::new(&settings, &base_dir, store);

    match cli.command {
        Commands::Chains => print_json(&manager.list_chains())?,

        Commands::User { command } => user_command(&manager, command).await?,

        Commands::Node { command } => {
            let owner = acting_user(&manager, cli.user.as_deref()).await?;
            node_command(&manager, owner, command).await?;
        }

        Commands::Wallet { command } => {
            let owner = acting_user(&manager, cli.user.as_deref()).await?;
            wallet_command(&manager, owner, command).await?;
        }

        Commands::Install { chain, version } => {
            let dir = manager.install(&chain, version.as_deref()).await?;
            println!("Installed into {}", dir.display());
        }

        Commands::Tx { search, limit } => {
            let owner = acting_user(&manager, cli.user.as_deref()).await?;
            print_json(&manager.list_all_transactions(owner, &search, limit).await?)?;
        }

        Commands::Explorer { chain, query } => explorer_query(&manager, &chain, query).await?,
    }

    Ok(())
}

async fn load(cli: &Cli) -> Result<Settings> {
    let config = match &cli.config {
        Some(path) => path.clone(),
        None => {
            let mut bootstrap = Settings {
                base_dir: cli.base_dir.clone(),
                ..Default::default()
            };
            bootstrap.apply_env();
            bootstrap.resolve_base_dir()?.join(SETTINGS_FILE)
        }
    };

    let mut settings = load_settings(&config)
        .await
        .with_context(|| format!("loading {}", config.display()))?;

    settings.apply_env();
    if let Some(dir) = &cli.base_dir {
        settings.base_dir = Some(dir.clone());
    }
    settings.show_progress = true;

    Ok(settings)
}

async fn acting_user(manager: &NodeManager, username: Option<&str>) -> Result<OwnerId> {
    let username = username.ok_or_else(|| anyhow!("--user or NODEWARDEN_USER is required"))?;
    let user = manager
        .store()
        .get_user_by_username(username)
        .await?
        .ok_or_else(|| anyhow!("Unknown user: {}", username))?;
    Ok(user.id)
}

async fn user_command(manager: &NodeManager, command: UserCommands) -> Result<()> {
    match command {
        UserCommands::Add { username, password } => {
            let user = manager
                .store()
                .create_user(&username, &hash_password(&password)?)
                .await?;
            println!("Created user {} (id {})", user.username, user.id);
        }

        UserCommands::Show { username } => {
            let user = manager
                .store()
                .get_user_by_username(&username)
                .await?
                .ok_or_else(|| anyhow!("Unknown user: {}", username))?;
            print_json(&serde_json::json!({ "id": user.id, "username": user.username }))?;
        }

        UserCommands::Verify { username, password } => {
            let user = manager
                .store()
                .get_user_by_username(&username)
                .await?
                .ok_or_else(|| anyhow!("Unknown user: {}", username))?;

            if !verify_password(&password, &user.password_hash)? {
                return Err(anyhow!("Password mismatch for {}", username));
            }
            println!("Password OK for {}", username);
        }
    }

    Ok(())
}

async fn node_command(manager: &NodeManager, owner: OwnerId, command: NodeCommands) -> Result<()> {
    match command {
        NodeCommands::List => {
            let nodes: Vec<_> = manager
                .list_nodes(owner)
                .await?
                .iter()
                .map(|node| node.summary())
                .collect();
            print_json(&nodes)?;
        }

        NodeCommands::Show { id, secrets } => {
            let node = manager.get_node(owner, &id).await?;
            if secrets {
                print_json(&serde_json::json!({
                    "node": node.summary(),
                    "secrets": node.secrets(),
                }))?;
            } else {
                print_json(&node.summary())?;
            }
        }

        NodeCommands::Create {
            id,
            chain,
            external_ip,
            masternode_key,
            p2p_port,
            rpc_port,
            snapshot_url,
            core_version,
        } => {
            let input = NodeCreateInput {
                id,
                chain,
                external_ip,
                masternode_key,
                p2p_port,
                rpc_port,
                snapshot_url,
                core_version,
            };
            let node = manager.create(owner, input).await?;
            print_json(&node.summary())?;
        }

        NodeCommands::Start { id } => {
            let pid = manager.start(owner, &id).await?;
            println!("Started {} (pid {})", id, pid);
        }

        NodeCommands::Stop { id } => {
            manager.stop(owner, &id).await?;
            println!("Stop requested for {}", id);
        }

        NodeCommands::Restart { id } => {
            manager.restart(owner, &id).await?;
            println!("Restarted {}", id);
        }

        NodeCommands::Resync { id } => {
            manager.resync(owner, &id).await?;
            println!("Resync started for {}", id);
        }

        NodeCommands::Delete { id } => {
            manager.delete(owner, &id).await?;
            println!("Deleted {}", id);
        }

        NodeCommands::Status { id } => print_json(&manager.status(owner, &id).await?)?,

        NodeCommands::UpdateCheck { id } => {
            print_json(&manager.check_for_update(owner, &id).await?)?
        }

        NodeCommands::Update { id } => {
            if manager.update_node_core(owner, &id).await? {
                println!("Updated {}", id);
            } else {
                println!("{} already runs the latest core", id);
            }
        }
    }

    Ok(())
}

async fn wallet_command(manager: &NodeManager, owner: OwnerId, command: WalletCommands) -> Result<()> {
    match command {
        WalletCommands::Balance { id } => print_json(&manager.balance(owner, &id).await?)?,
        WalletCommands::Transactions { id, count, skip } => {
            print_json(&manager.transactions(owner, &id, count, skip).await?)?
        }
        WalletCommands::Send { id, address, amount } => {
            let txid = manager.send_to_address(owner, &id, &address, amount).await?;
            println!("{}", txid);
        }
        WalletCommands::NewAddress { id } => println!("{}", manager.get_new_address(owner, &id).await?),
        WalletCommands::ImportKey {
            id,
            priv_key,
            label,
            rescan,
        } => {
            manager
                .import_priv_key(owner, &id, &priv_key, &label, rescan)
                .await?;
            println!("Imported key into {}", id);
        }
        WalletCommands::DumpKey { id, address } => {
            println!("{}", manager.dump_priv_key(owner, &id, &address).await?)
        }
        WalletCommands::ExportKeys { id, funded_only } => {
            print_json(&manager.export_all_keys(owner, &id, !funded_only).await?)?
        }
        WalletCommands::Peers { id } => print_json(&manager.peers(owner, &id).await?)?,
        WalletCommands::Masternode { id } => print_json(&manager.masternode(owner, &id).await?)?,
        WalletCommands::StartMasternode { id } => {
            print_json(&manager.start_masternode(owner, &id).await?)?
        }
        WalletCommands::StakingStatus { id } => {
            print_json(&manager.get_staking_status(owner, &id).await?)?
        }
        WalletCommands::ColdStakingBalance { id } => {
            print_json(&manager.get_cold_staking_balance(owner, &id).await?)?
        }
        WalletCommands::NewStakingAddress { id } => {
            println!("{}", manager.get_new_staking_address(owner, &id).await?)
        }
        WalletCommands::ColdUtxos { id } => print_json(&manager.list_cold_utxos(owner, &id).await?)?,
        WalletCommands::WhitelistDelegators { id } => {
            let added = manager.whitelist_cold_staking_delegators(owner, &id).await?;
            println!("Whitelisted {} delegators", added);
        }
    }

    Ok(())
}

async fn explorer_query(manager: &NodeManager, chain: &str, query: ExplorerQuery) -> Result<()> {
    match query {
        ExplorerQuery::Blockcount => println!("{}", manager.explorer_block_count(chain).await?),
        ExplorerQuery::Bestblockhash => {
            println!("{}", manager.explorer_best_block_hash(chain).await?)
        }
        ExplorerQuery::Mempool => print_json(&manager.explorer_mempool(chain).await?)?,
        ExplorerQuery::Block { id } => print_json(&manager.explorer_block(chain, &id).await?)?,
        ExplorerQuery::Tx { txid } => print_json(&manager.explorer_tx(chain, &txid).await?)?,
        ExplorerQuery::Address { address } => {
            print_json(&manager.explorer_address(chain, &address).await?)?
        }
        ExplorerQuery::PaymentAddress => {
            print_json(&manager.create_payment_address(chain).await?)?
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
