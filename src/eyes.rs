//! Eye Position Provider
//!
//! Two interchangeable sources for the per-frame eye pair:
//! - Predicted: queried from the weaver, already extrapolated to scan-out
//! - Callback: the last pair pushed by the runtime's eye-tracker stream
//!
//! Both sources exist for the whole session so switching is a single atomic
//! store. The callback slot publishes a whole pair at once; readers never see
//! a left eye from one update and a right eye from another.

use bevy::math::Vec3;
use bevy::prelude::{debug, info};
use crossbeam::atomic::AtomicCell;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use crate::runtime::{EyePairCallback, RuntimeError, SrContext, StreamToken};
use crate::weaver::WeaverHandle;

/// Left eye used until the first update, in millimeters
pub const DEFAULT_LEFT_EYE_MM: Vec3 = Vec3::new(-30.0, 0.0, 600.0);
/// Right eye used until the first update, in millimeters
pub const DEFAULT_RIGHT_EYE_MM: Vec3 = Vec3::new(30.0, 0.0, 600.0);

/// Which eye a view belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    pub const BOTH: [Eye; 2] = [Eye::Left, Eye::Right];

    /// Tile index inside the side-by-side view texture
    #[inline]
    pub fn index(self) -> u32 {
        match self {
            Eye::Left => 0,
            Eye::Right => 1,
        }
    }
}

/// Eye positions in display space (mm, +z toward the viewer)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyePair {
    pub left: Vec3,
    pub right: Vec3,
    pub timestamp_us: u64,
}

impl EyePair {
    pub fn new(left: Vec3, right: Vec3) -> Self {
        Self {
            left,
            right,
            timestamp_us: 0,
        }
    }

    #[inline]
    pub fn eye(&self, eye: Eye) -> Vec3 {
        match eye {
            Eye::Left => self.left,
            Eye::Right => self.right,
        }
    }

    /// Interpupillary distance in millimeters
    pub fn ipd(&self) -> f32 {
        self.left.distance(self.right)
    }
}

impl Default for EyePair {
    fn default() -> Self {
        Self::new(DEFAULT_LEFT_EYE_MM, DEFAULT_RIGHT_EYE_MM)
    }
}

/// Eye source selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum EyeSource {
    #[default]
    Predicted = 0,
    Callback = 1,
}

impl EyeSource {
    fn from_u8(raw: u8) -> Self {
        if raw == EyeSource::Callback as u8 {
            EyeSource::Callback
        } else {
            EyeSource::Predicted
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            EyeSource::Predicted => EyeSource::Callback,
            EyeSource::Callback => EyeSource::Predicted,
        }
    }
}

/// Single-writer slot holding the last eye pair from the tracker stream
#[derive(Debug)]
pub struct EyePairSlot {
    pair: AtomicCell<EyePair>,
    published: AtomicBool,
}

impl EyePairSlot {
    pub fn new() -> Self {
        Self {
            pair: AtomicCell::new(EyePair::default()),
            published: AtomicBool::new(false),
        }
    }

    /// Store a whole pair; readers observe it atomically
    pub fn publish(&self, pair: EyePair) {
        self.pair.store(pair);
        self.published.store(true, Ordering::Release);
    }

    /// Last published pair, or the default pair before the first update
    pub fn load(&self) -> EyePair {
        self.pair.load()
    }

    pub fn has_update(&self) -> bool {
        self.published.load(Ordering::Acquire)
    }
}

impl Default for EyePairSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscription to the eye-pair stream feeding an [`EyePairSlot`]
///
/// Dropping the listener closes the stream; the slot keeps its last value.
pub struct EyePairListener {
    stream: Option<StreamToken>,
    slot: Arc<EyePairSlot>,
}

impl EyePairListener {
    pub fn open(context: &dyn SrContext, slot: Arc<EyePairSlot>) -> Result<Self, RuntimeError> {
        let target = Arc::clone(&slot);
        let callback: EyePairCallback = Arc::new(move |pair: &EyePair| target.publish(*pair));
        let stream = context.open_eye_pair_stream(callback)?;
        info!("👀 Eye pair stream opened");
        Ok(Self {
            stream: Some(stream),
            slot,
        })
    }

    /// Same path the runtime stream uses
    pub fn accept(&self, pair: &EyePair) {
        self.slot.publish(*pair);
    }

    pub fn slot(&self) -> &Arc<EyePairSlot> {
        &self.slot
    }
}

impl Drop for EyePairListener {
    fn drop(&mut self) {
        self.stream.take();
        debug!("Eye pair stream closed");
    }
}

/// Both sources side by side, for diagnostics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeComparison {
    /// `None` when the weaver cannot predict (legacy or absent)
    pub predicted: Option<EyePair>,
    pub callback: EyePair,
}

impl EyeComparison {
    /// Per-eye distance between the sources in millimeters
    pub fn delta_mm(&self) -> Option<(f32, f32)> {
        self.predicted.map(|p| {
            (
                p.left.distance(self.callback.left),
                p.right.distance(self.callback.right),
            )
        })
    }
}

/// Per-frame eye pair, from whichever source is selected
#[derive(Debug)]
pub struct EyePositionProvider {
    source: AtomicU8,
    slot: Arc<EyePairSlot>,
}

impl EyePositionProvider {
    pub fn new(source: EyeSource) -> Self {
        Self {
            source: AtomicU8::new(source as u8),
            slot: Arc::new(EyePairSlot::new()),
        }
    }

    /// Slot the callback listener publishes into
    pub fn slot(&self) -> Arc<EyePairSlot> {
        Arc::clone(&self.slot)
    }

    pub fn source(&self) -> EyeSource {
        EyeSource::from_u8(self.source.load(Ordering::Acquire))
    }

    /// Takes effect on the next [`EyePositionProvider::current`]
    pub fn set_source(&self, source: EyeSource) {
        self.source.store(source as u8, Ordering::Release);
        info!("👀 Eye source: {:?}", source);
    }

    pub fn toggle_source(&self) -> EyeSource {
        let next = self.source().toggled();
        self.set_source(next);
        next
    }

    /// Never blocks; falls back to the callback slot when prediction is unavailable
    pub fn current(&self, weaver: Option<&WeaverHandle>) -> EyePair {
        match self.source() {
            EyeSource::Predicted => weaver
                .and_then(WeaverHandle::predicted_eye_positions)
                .unwrap_or_else(|| self.slot.load()),
            EyeSource::Callback => self.slot.load(),
        }
    }

    /// Query both sources regardless of the selected one
    pub fn both(&self, weaver: Option<&WeaverHandle>) -> EyeComparison {
        EyeComparison {
            predicted: weaver.and_then(WeaverHandle::predicted_eye_positions),
            callback: self.slot.load(),
        }
    }
}

impl Default for EyePositionProvider {
    fn default() -> Self {
        Self::new(EyeSource::default())
    }
}
