pub mod clickhouse_repo;
pub mod memory_repo;
pub mod seed_file;

pub use clickhouse_repo::*;
pub use memory_repo::*;
pub use seed_file::*;
