// Domain entities

pub mod audit_entry;
pub mod calendar;
pub mod config;
pub mod directory;
pub mod flag;

pub use audit_entry::*;
pub use calendar::*;
pub use config::*;
pub use directory::*;
pub use flag::*;
