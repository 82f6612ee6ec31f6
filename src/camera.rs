use crate::error::{Error, Result};
use crate::frame::Frame;

/// Ordered stream of timestamped frames.
///
/// File-backed sources are finite and may support [`restart`](FrameSource::restart);
/// live sources never return `None`. Reading may block.
pub trait FrameSource {
    /// The next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Rewinds to the first frame.
    fn restart(&mut self) -> Result<()> {
        Err(Error::Unsupported("restarting this frame source"))
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    #[inline]
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }

    #[inline]
    fn restart(&mut self) -> Result<()> {
        (**self).restart()
    }
}

/// In-memory, restartable frame source.
#[derive(Debug, Clone, Default)]
pub struct FrameSequence {
    frames: Vec<Frame>,
    pos: usize,
}

impl FrameSequence {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames, pos: 0 }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[inline]
    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }
}

impl FromIterator<Frame> for FrameSequence {
    fn from_iter<I: IntoIterator<Item = Frame>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl FrameSource for FrameSequence {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let frame = self.frames.get(self.pos).cloned();
        if frame.is_some() {
            self.pos += 1;
        }

        Ok(frame)
    }

    fn restart(&mut self) -> Result<()> {
        self.pos = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    struct Live;

    impl FrameSource for Live {
        fn next_frame(&mut self) -> Result<Option<Frame>> {
            Ok(Some(Frame::new(0, RgbImage::new(1, 1))))
        }
    }

    #[test]
    fn sequence_yields_in_order_and_restarts() {
        let mut seq: FrameSequence = (0..3)
            .map(|i| Frame::new(i * 40, RgbImage::new(2, 2)))
            .collect();

        let ts: Vec<i64> = std::iter::from_fn(|| seq.next_frame().unwrap())
            .map(|f| f.timestamp_ms)
            .collect();
        assert_eq!(ts, vec![0, 40, 80]);
        assert!(seq.next_frame().unwrap().is_none());

        seq.restart().unwrap();
        assert_eq!(seq.next_frame().unwrap().unwrap().timestamp_ms, 0);
    }

    #[test]
    fn restart_is_unsupported_by_default() {
        let mut live: Box<dyn FrameSource> = Box::new(Live);

        assert!(live.next_frame().unwrap().is_some());
        assert!(matches!(live.restart(), Err(Error::Unsupported(_))));
    }
}
