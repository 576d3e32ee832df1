#[macro_use]
extern crate lazy_static;
extern crate tracing;

pub mod bandwidth;
pub mod capabilities;
pub mod cli;
pub mod diagnostics;
pub mod error;
pub mod logger;
pub mod network;
pub mod probe;
pub mod settings;
pub mod stats;
pub mod suite;
pub mod video;
