use crate::camera::FrameSource;
use crate::detection::Positions;
use crate::drawer::{DefaultDrawer, Drawer};
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::monitor::TrackingUnit;
use crate::tracker::DebugSink;
use image::{GrayImage, RgbImage};
use opencv::{core::Mat, imgproc, prelude::*, videoio};
use tracing::{info, warn};

/// Frames of a video file, timestamped by the container position.
pub struct MovieCamera {
    cam: videoio::VideoCapture,
    frame: Mat,
    rgb: Mat,
}

impl MovieCamera {
    pub fn open(path: &str) -> Result<Self> {
        let cam = videoio::VideoCapture::from_file(path, videoio::CAP_ANY)?;
        if !cam.is_opened()? {
            return Err(Error::FrameSource(format!("unable to open {}", path)));
        }

        let width = cam.get(videoio::CAP_PROP_FRAME_WIDTH)? as i32;
        let height = cam.get(videoio::CAP_PROP_FRAME_HEIGHT)? as i32;
        let total = cam.get(videoio::CAP_PROP_FRAME_COUNT)? as i32;
        info!(path, width, height, total, "video opened");

        Ok(Self {
            cam,
            frame: Mat::default(),
            rgb: Mat::default(),
        })
    }
}

impl FrameSource for MovieCamera {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.cam.read(&mut self.frame)? {
            return Ok(None);
        }

        let (w, h) = (self.frame.cols(), self.frame.rows());
        if w == 0 || h == 0 {
            return Ok(None);
        }

        let t = self.cam.get(videoio::CAP_PROP_POS_MSEC)?.round() as i64;

        imgproc::cvt_color(&self.frame, &mut self.rgb, imgproc::COLOR_BGR2RGB, 0)?;
        let data = self.rgb.data_bytes()?.to_vec();
        let image = RgbImage::from_raw(w as u32, h as u32, data)
            .ok_or_else(|| Error::FrameSource(format!("unexpected {}x{} frame layout", w, h)))?;

        Ok(Some(Frame::new(t, image)))
    }

    fn restart(&mut self) -> Result<()> {
        self.cam.set(videoio::CAP_PROP_POS_FRAMES, 0.0)?;
        Ok(())
    }
}

/// `VideoWriter` opened on the first frame and reopened whenever the frame
/// size changes.
struct LazyVideoWriter {
    writer: Option<videoio::VideoWriter>,
    size: Option<(i32, i32)>,
    out_file: String,
    fps: f64,
    is_color: bool,
}

impl LazyVideoWriter {
    fn new(out_file: String, fps: f64, is_color: bool) -> Self {
        Self {
            writer: None,
            size: None,
            out_file,
            fps,
            is_color,
        }
    }

    fn release(&mut self) -> Result<()> {
        if let Some(mut w) = self.writer.take() {
            w.release()?;
        }

        Ok(())
    }

    fn reinit(&mut self, size: (i32, i32)) -> Result<()> {
        self.release()?;

        info!(path = %self.out_file, w = size.0, h = size.1, "opening video writer");
        self.size = Some(size);
        self.writer = Some(videoio::VideoWriter::new(
            &self.out_file,
            videoio::VideoWriter::fourcc(b'D' as _, b'I' as _, b'V' as _, b'X' as _)?,
            self.fps,
            opencv::core::Size::new(size.0, size.1),
            self.is_color,
        )?);

        Ok(())
    }

    fn write(&mut self, mat: &Mat) -> Result<()> {
        let size = (mat.cols(), mat.rows());
        if self.writer.is_none() || self.size != Some(size) {
            self.reinit(size)?;
        }

        if let Some(writer) = self.writer.as_mut() {
            writer.write(mat)?;
        }

        Ok(())
    }
}

impl Drop for LazyVideoWriter {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!(%err, path = %self.out_file, "failed to release video writer");
        }
    }
}

/// Annotates frames like [`DefaultDrawer`] and appends them to a video file.
pub struct VideoDrawer {
    inner: DefaultDrawer,
    out: LazyVideoWriter,
}

impl VideoDrawer {
    pub fn new<S: ToString>(out_file: S, fps: f64) -> Self {
        Self {
            inner: DefaultDrawer::new(),
            out: LazyVideoWriter::new(out_file.to_string(), fps, true),
        }
    }

    pub fn release(&mut self) -> Result<()> {
        self.out.release()
    }
}

impl Drawer for VideoDrawer {
    fn draw(&mut self, frame: &RgbImage, t: i64, positions: &Positions, units: &[TrackingUnit]) -> Result<()> {
        self.inner.draw(frame, t, positions, units)?;

        let Some(img) = self.inner.last_drawn_frame() else {
            return Ok(());
        };

        let rgb = Mat::from_slice(img.as_raw())?.reshape(3, img.height() as i32)?;
        let mut bgr = Mat::default();
        imgproc::cvt_color(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR, 0)?;

        self.out.write(&bgr)
    }
}

/// Appends the tracker's `grey | background | foreground` panels to a
/// greyscale video file.
pub struct VideoDebugSink {
    out: LazyVideoWriter,
}

impl VideoDebugSink {
    pub fn new<S: ToString>(out_file: S, fps: f64) -> Self {
        Self {
            out: LazyVideoWriter::new(out_file.to_string(), fps, false),
        }
    }
}

impl DebugSink for VideoDebugSink {
    fn record(&mut self, _t: i64, panel: &GrayImage) -> Result<()> {
        let mat = Mat::from_slice(panel.as_raw())?.reshape(1, panel.height() as i32)?;

        self.out.write(&mat)
    }
}
