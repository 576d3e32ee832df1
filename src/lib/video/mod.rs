pub mod frame_quality;
pub mod ssim;

pub use frame_quality::{FrameAnalyzer, FrameQualityConfig, FrameQualityMonitor};
