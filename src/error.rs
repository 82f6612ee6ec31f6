use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Background update received a timestamp older than the previous one.
    #[error("Timing Error: negative interval between frames (last: {last} ms, got: {t} ms)")]
    Timing { last: i64, t: i64 },

    #[error("Invalid ROI: {0}")]
    InvalidRoi(String),

    #[error("ROI {idx} ({x}, {y}, {w}x{h}) does not fit into a {frame_w}x{frame_h} frame")]
    RoiOutOfFrame {
        idx: usize,
        x: u32,
        y: u32,
        w: u32,
        h: u32,
        frame_w: u32,
        frame_h: u32,
    },

    #[error("Mask is {mask_w}x{mask_h} but the frame is {frame_w}x{frame_h}")]
    MaskMismatch {
        mask_w: u32,
        mask_h: u32,
        frame_w: u32,
        frame_h: u32,
    },

    #[error("Shape Error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Frame Source Error: {0}")]
    FrameSource(String),

    #[error("Unsupported: {0}")]
    Unsupported(&'static str),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "opencv")]
    #[error("OpenCV Error: {0}")]
    OpenCv(#[from] opencv::Error),
}

impl Error {
    /// `true` for errors that mean the instrument itself is broken rather than
    /// that nothing was observed.
    #[inline]
    pub fn is_timing(&self) -> bool {
        matches!(self, Error::Timing { .. })
    }
}
