/// Raster frame in packed RGBA, 8 bits per channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl PixelBuffer {
    pub const CHANNELS: usize = 4;

    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
        }
    }

    /// A frame of a single color.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = (width * height) as usize;
        Self::new(width, height, rgba.repeat(pixels))
    }

    pub fn pixel_count(&self) -> usize {
        self.data.len() / Self::CHANNELS
    }

    pub fn pixels(&self) -> impl Iterator<Item = &[u8]> {
        self.data.chunks_exact(Self::CHANNELS)
    }

    /// Per pixel Rec. 709 luma.
    pub fn luma(&self) -> Vec<f64> {
        self.pixels().map(luma).collect()
    }
}

/// Rec. 709 weights, alpha ignored.
#[inline]
pub fn luma(pixel: &[u8]) -> f64 {
    0.21 * pixel[0] as f64 + 0.72 * pixel[1] as f64 + 0.07 * pixel[2] as f64
}

/// Something that can be sampled for the frame currently on display, like a
/// video element fed by a camera track.
pub trait FrameSource: Send {
    /// `None` while no frame is available yet.
    fn current_frame(&mut self) -> Option<PixelBuffer>;

    /// `false` once the underlying track ended.
    fn is_active(&self) -> bool;
}
