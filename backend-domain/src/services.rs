pub mod flag_rules;
pub mod pair_aggregation;

pub use flag_rules::*;
pub use pair_aggregation::*;
