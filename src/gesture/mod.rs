//! Synthetic multi-touch gesture state.
//!
//! The emulator's touch API has no native scroll or pinch primitive, so the
//! bridge maintains gesture state of its own and expresses both as sequences
//! of `sendTouch` calls under reserved touch identifiers. The state machines
//! here are pure — they consume wheel/pinch deltas and return the touch
//! events to issue — which keeps ordering explicit and lets tests drive every
//! transition without timers or a live device.
//!
//! Idle timers are owned by the session loop: each new delta re-arms (never
//! stacks) a deadline, and expiry releases the gesture.

pub mod pinch;
pub mod scroll;

pub use pinch::PinchGesture;
pub use scroll::ScrollGesture;

/// Touch pressure reported for a synthetic press. Matches the value the
/// browser client sends for real touches.
pub const PRESS: i32 = 1024;

/// Pressure 0 releases a touch point.
pub const RELEASE: i32 = 0;

/// Reserved identifier for the scroll drag point. Browser touch identifiers
/// are small non-negative integers, so synthetic points sit well above them.
pub const SCROLL_ID: i32 = 9;

/// Reserved identifiers for the two pinch points.
pub const PINCH_ID_A: i32 = 7;
pub const PINCH_ID_B: i32 = 8;

/// Gesture tuning shared by both state machines.
#[derive(Debug, Clone, Copy)]
pub struct GestureConfig {
    /// Multiplier applied to wheel deltas before moving the scroll point.
    pub scroll_scale: f64,
    /// Initial distance between the two pinch points, in device pixels.
    pub pinch_initial_spread: i32,
    /// Spread change per pinch delta step.
    pub pinch_step: i32,
    /// Spread never shrinks below this floor.
    pub pinch_min_spread: i32,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            scroll_scale: 2.0,
            pinch_initial_spread: 100,
            pinch_step: 20,
            pinch_min_spread: 20,
        }
    }
}

/// Clamp a coordinate to the device surface.
pub(crate) fn clamp(v: f64, max: u32) -> f64 {
    v.clamp(0.0, f64::from(max))
}
