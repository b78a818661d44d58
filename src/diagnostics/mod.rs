pub mod probe;
pub mod stats;
