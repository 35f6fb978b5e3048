pub mod daemon;
pub mod tasks;

pub use daemon::HeartbeatDaemon;
pub use tasks::TaskContext;
