pub mod sampler;

pub use sampler::{BandwidthConfig, BandwidthSampler};
