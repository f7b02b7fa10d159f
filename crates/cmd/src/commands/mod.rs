pub mod aggregate;
pub mod columns;
pub mod earliest;
pub mod init;
pub mod list;

pub use aggregate::{AggregateRequest, aggregate_command};
pub use columns::columns_command;
pub use earliest::earliest_command;
pub use init::init_command;
pub use list::list_command;
