// Domain value objects
pub mod flag_rule;
pub mod identifiers;
pub mod severity;

pub use flag_rule::*;
pub use identifiers::*;
pub use severity::*;
