pub mod nat;
pub mod report;
pub mod stats;
