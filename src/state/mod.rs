pub mod database;
pub mod mirror;
pub mod schema;

pub use database::{AgentRecord, ChainRecord, Database, LedgerStatus};
pub use mirror::{mirror_all, LedgerMirror, LedgerPersistence, SqliteLedger};
