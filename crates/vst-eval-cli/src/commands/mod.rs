//! Subcommand implementations.

pub mod analyze;
pub mod estimate;
pub mod load;
pub mod roundtrip;
pub mod sigma;
