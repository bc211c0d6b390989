#![forbid(unsafe_code)]

pub mod model;
pub mod store;

pub use model::{Command, CommandStatus, ScheduledCommand};
pub use store::CommandStore;
