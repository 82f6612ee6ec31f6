use crate::camera::FrameSource;
use crate::config::MonitorConfig;
use crate::detection::{DataPoint, Positions};
use crate::drawer::Drawer;
use crate::error::Result;
use crate::frame::Frame;
use crate::interactor::{Interactor, NullInteractor};
use crate::roi::Roi;
use crate::tracker::{Tracker, TrackerFactory};
use crate::writer::ResultWriter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// One ROI with the tracker and interactor dedicated to it.
pub struct TrackingUnit {
    roi: Roi,
    tracker: Box<dyn Tracker>,
    interactor: Box<dyn Interactor>,
    faulted: bool,
}

impl TrackingUnit {
    pub fn new(roi: Roi, tracker: Box<dyn Tracker>) -> Self {
        Self {
            roi,
            tracker,
            interactor: Box::new(NullInteractor),
            faulted: false,
        }
    }

    pub fn with_interactor(mut self, interactor: Box<dyn Interactor>) -> Self {
        self.interactor = interactor;
        self
    }

    #[inline]
    pub fn roi(&self) -> &Roi {
        &self.roi
    }

    /// `true` once the tracker has failed hard; the unit is skipped from then on.
    #[inline]
    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    /// Position of the animal in this unit's ROI, relative to the ROI offset.
    pub fn track(&mut self, frame: &Frame) -> Result<Option<DataPoint>> {
        let (image, mask) = self.roi.apply(&frame.image)?;
        let detection = self.tracker.track(&image, mask, frame.timestamp_ms)?;

        Ok(detection.into_point())
    }

    fn interact(&mut self, t: i64, point: Option<DataPoint>) -> Option<DataPoint> {
        match self.interactor.apply(t, point.as_ref()) {
            Ok(interaction) => point.map(|p| p.with_interaction(interaction.has_interacted)),
            Err(err) => {
                warn!(roi = self.roi.idx(), t, %err, "interactor failed");
                point
            }
        }
    }
}

/// Cooperative stop request, checked between frames.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    #[inline]
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: usize,
    /// Indices of ROIs whose tracker failed hard during the run.
    pub faulted: Vec<usize>,
}

/// Drives one tracker per ROI over a frame source.
pub struct Monitor<C> {
    camera: C,
    units: Vec<TrackingUnit>,
    config: MonitorConfig,
    stop: StopHandle,
}

impl<C: FrameSource> Monitor<C> {
    pub fn new<F: TrackerFactory>(camera: C, rois: Vec<Roi>, mut factory: F) -> Self {
        let units = rois
            .into_iter()
            .map(|roi| {
                let tracker = factory.build(&roi);
                TrackingUnit::new(roi, tracker)
            })
            .collect();

        Self {
            camera,
            units,
            config: MonitorConfig::default(),
            stop: StopHandle::default(),
        }
    }

    /// Attaches interactors to units, in ROI order.
    pub fn with_interactors(mut self, interactors: Vec<Box<dyn Interactor>>) -> Self {
        if interactors.len() != self.units.len() {
            warn!(
                interactors = interactors.len(),
                units = self.units.len(),
                "interactor count does not match ROI count"
            );
        }

        for (unit, interactor) in self.units.iter_mut().zip(interactors) {
            unit.interactor = interactor;
        }

        self
    }

    pub fn with_config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    #[inline]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    #[inline]
    pub fn units(&self) -> &[TrackingUnit] {
        &self.units
    }

    #[inline]
    pub fn camera_mut(&mut self) -> &mut C {
        &mut self.camera
    }

    /// Processes frames until the source is exhausted or a stop is requested.
    ///
    /// A unit whose tracker fails hard is logged, marked faulted and skipped for
    /// the rest of the run. Drawer errors are logged; writer and frame source
    /// errors end the run.
    pub fn run<W, D>(&mut self, writer: &mut W, drawer: &mut D) -> Result<RunSummary>
    where
        W: ResultWriter + ?Sized,
        D: Drawer + ?Sized,
    {
        let rois: Vec<&Roi> = self.units.iter().map(|u| &u.roi).collect();
        writer.start(&rois)?;

        info!(units = self.units.len(), "monitor started");
        let mut summary = RunSummary::default();

        while !self.stop.is_stopped() {
            let Some(frame) = self.camera.next_frame()? else {
                debug!("frame source exhausted");
                break;
            };

            if frame.is_empty() {
                debug!(t = frame.timestamp_ms, "empty frame, end of stream");
                break;
            }

            let t = frame.timestamp_ms;
            let mut positions = Positions::new();

            for unit in self.units.iter_mut().filter(|u| !u.faulted) {
                match unit.track(&frame) {
                    Ok(point) => {
                        if let Some(point) = unit.interact(t, point) {
                            positions.insert(unit.roi.idx(), point);
                        }
                    }

                    Err(err) => {
                        error!(roi = unit.roi.idx(), t, timing = err.is_timing(), %err, "tracking unit faulted");
                        unit.faulted = true;
                    }
                }
            }

            if self.config.draw_results {
                if let Err(err) = drawer.draw(&frame.image, t, &positions, &self.units) {
                    warn!(t, %err, "drawer failed");
                }
            }

            writer.write(t, &positions)?;
            summary.frames += 1;
        }

        writer.flush()?;

        summary.faulted = self
            .units
            .iter()
            .filter(|u| u.faulted)
            .map(|u| u.roi.idx())
            .collect();

        info!(frames = summary.frames, faulted = summary.faulted.len(), "monitor stopped");

        Ok(summary)
    }
}
