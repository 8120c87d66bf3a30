//! Nodewarden - masternode daemon orchestrator
//!
//! Provisions blockchain daemons per user: fetches and verifies release
//! binaries, allocates ports, writes daemon configs, bootstraps chain data
//! from snapshots and drives the daemons through their JSON-RPC interface.

pub mod archive;
pub mod auth;
pub mod chain;
pub mod chains;
pub mod config_writer;
pub mod error;
pub mod explorer;
pub mod installer;
pub mod lock;
pub mod manager;
pub mod node;
pub mod process;
pub mod rpc;
pub mod settings;
pub mod snapshot;
pub mod status;
pub mod store;
pub mod wallet;

pub use chain::{ChainInfo, ChainPlugin, ChainRegistry, StandardChain};
pub use error::{Result, WardenError};
pub use manager::{NodeManager, UpdateCheck};
pub use node::{NodeConfig, NodeCreateInput, NodeSummary, OwnerId, UserRecord};
pub use settings::{load_settings, Settings};
pub use store::{JsonNodeStore, MemoryNodeStore, NodeStore};
