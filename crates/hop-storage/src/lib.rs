//! Storage backends for links, the id counter, the blacklist and the audit logs.

pub mod memory;
pub mod mysql;
pub mod retention;

pub use memory::InMemoryStore;
pub use mysql::MySqlStore;
pub use retention::LogRetention;
