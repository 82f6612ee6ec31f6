use crate::detection::DataPoint;
use crate::error::Result;
use serde_derive::{Deserialize, Serialize};
use tracing::debug;

/// What an interactor did this frame.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interaction {
    pub has_interacted: bool,
}

/// Per-unit hook invoked every frame with the unit's detection, or its absence.
pub trait Interactor: Send {
    fn apply(&mut self, t: i64, point: Option<&DataPoint>) -> Result<Interaction>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullInteractor;

impl Interactor for NullInteractor {
    #[inline]
    fn apply(&mut self, _t: i64, _point: Option<&DataPoint>) -> Result<Interaction> {
        Ok(Interaction::default())
    }
}

/// External device driven by an interactor.
pub trait Actuator: Send {
    fn trigger(&mut self, t: i64) -> Result<()>;
}

impl<F> Actuator for F
where
    F: FnMut(i64) -> Result<()> + Send,
{
    #[inline]
    fn trigger(&mut self, t: i64) -> Result<()> {
        self(t)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct InactivityConfig {
    /// Displacement, in pixels, that counts as activity.
    pub min_distance: f64,
    pub inactivity_ms: i64,
    /// Quiet period after a trigger.
    pub refractory_ms: i64,
}

impl Default for InactivityConfig {
    fn default() -> Self {
        Self {
            min_distance: 5.0,
            inactivity_ms: 120 * 1000,
            refractory_ms: 60 * 1000,
        }
    }
}

/// Triggers an actuator when the animal has stayed in place for too long.
pub struct InactivityInteractor<A> {
    actuator: A,
    config: InactivityConfig,
    anchor: Option<(i32, i32)>,
    last_active: Option<i64>,
    last_triggered: Option<i64>,
}

impl<A: Actuator> InactivityInteractor<A> {
    pub fn new(actuator: A, config: InactivityConfig) -> Self {
        Self {
            actuator,
            config,
            anchor: None,
            last_active: None,
            last_triggered: None,
        }
    }

    #[inline]
    pub fn last_triggered(&self) -> Option<i64> {
        self.last_triggered
    }

    fn has_moved(&self, point: &DataPoint) -> bool {
        let Some((ax, ay)) = self.anchor else {
            return true;
        };

        let (dx, dy) = ((point.x - ax) as f64, (point.y - ay) as f64);

        dx.hypot(dy) > self.config.min_distance
    }
}

impl<A: Actuator> Interactor for InactivityInteractor<A> {
    fn apply(&mut self, t: i64, point: Option<&DataPoint>) -> Result<Interaction> {
        if let Some(point) = point {
            if self.has_moved(point) {
                self.anchor = Some((point.x, point.y));
                self.last_active = Some(t);
            }
        }

        let Some(last_active) = self.last_active else {
            self.last_active = Some(t);
            return Ok(Interaction::default());
        };

        let idle = t - last_active >= self.config.inactivity_ms;
        let refractory = self
            .last_triggered
            .map_or(false, |lt| t - lt < self.config.refractory_ms);

        if !idle || refractory {
            return Ok(Interaction::default());
        }

        self.actuator.trigger(t)?;
        self.last_triggered = Some(t);
        debug!(t, idle_ms = t - last_active, "actuator triggered");

        Ok(Interaction {
            has_interacted: true,
        })
    }
}
