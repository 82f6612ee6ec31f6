pub mod background;
pub mod camera;
pub mod config;
pub mod detection;
pub mod drawer;
pub mod error;
pub mod frame;
pub mod interactor;
pub mod math;
pub mod monitor;
pub mod object_model;
pub mod roi;
pub mod tracker;
pub mod writer;

#[cfg(feature = "opencv")]
pub mod movie;

mod circular_queue;

pub use background::BackgroundModel;
pub use camera::{FrameSequence, FrameSource};
pub use config::{Config, ObjectModelSharing};
pub use detection::{DataPoint, Detection, NoPosition, Positions};
pub use error::{Error, Result};
pub use frame::Frame;
pub use monitor::{Monitor, RunSummary, StopHandle, TrackingUnit};
pub use object_model::{ObjectModel, SharedObjectModel};
pub use roi::Roi;
pub use tracker::{AdaptiveBgFactory, AdaptiveBgTracker, Tracker, TrackerFactory};
