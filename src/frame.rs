use image::RgbImage;

/// One decoded video frame with its acquisition time.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Milliseconds since the start of the stream; never decreases.
    pub timestamp_ms: i64,
    pub image: RgbImage,
}

impl Frame {
    #[inline]
    pub fn new(timestamp_ms: i64, image: RgbImage) -> Self {
        Self {
            timestamp_ms,
            image,
        }
    }

    #[inline]
    pub fn dims(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }
}
