//! CLI command implementations.

pub mod bench;
pub mod generate;
pub mod info;
pub mod stats;
pub mod train;
