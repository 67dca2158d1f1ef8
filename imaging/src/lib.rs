//! Image buffers and FITS I/O for calibration frames.

mod fits;

pub use fits::{read_image, write_image, FitsError};

/// A 2-D monochrome image buffer, row-major, 16-bit counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u16>,
}

impl ImageData {
    pub fn new(width: u32, height: u32, data: Vec<u16>) -> Self {
        debug_assert_eq!(data.len(), (width as usize) * (height as usize));
        Self {
            width,
            height,
            data,
        }
    }

    /// A frame with every pixel at `level`.
    pub fn uniform(width: u32, height: u32, level: u16) -> Self {
        Self::new(width, height, vec![level; (width as usize) * (height as usize)])
    }

    /// Arithmetic mean over every pixel. Zero for an empty buffer.
    pub fn mean(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.data.iter().map(|&p| u64::from(p)).sum();
        sum as f64 / self.data.len() as f64
    }
}
