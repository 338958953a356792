//! Rule key factories.
//!
//! A factory opens one [`Accumulator`](crate::accumulator::Accumulator) per
//! call, walks the rule's fields through it with its own input policy, and
//! assembles the result.

pub mod default;
pub mod dep_file;

pub use default::DefaultRuleKeyFactory;
pub use dep_file::DependencyFileRuleKeyFactory;
