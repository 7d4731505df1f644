//! Pinch synthesis: wheel deltas while dragging become a two-finger zoom.
//!
//! Two reserved touch points are placed symmetrically about the anchor and
//! brought up sequentially — point A alone, then A and B together, because a
//! simultaneous multi-touch down must be expressed as the union of all
//! currently-down points in a single call.
//!
//! Setup spans two RPCs whose completions race with newly arriving deltas,
//! so the gesture runs a two-phase lifecycle:
//!
//! - **Pending**: setup issued but not yet acknowledged. Deltas adjust the
//!   target spread and queue their move events instead of issuing RPCs; a
//!   release request (explicit or idle-timer) only sets a deferred flag.
//! - **Active**: setup acknowledged, queue flushed in order, a deferred
//!   release executed exactly once. Further deltas issue moves directly.

use crate::device::proto::{Touch, TouchEvent};
use crate::device::Dimensions;

use super::{GestureConfig, PINCH_ID_A, PINCH_ID_B, PRESS, RELEASE};

/// What to do once both setup RPCs have completed: flush `moves` in order,
/// then issue `release` (if a release came in while pending) and destroy the
/// gesture.
#[derive(Debug)]
pub struct SetupOutcome {
    pub moves: Vec<TouchEvent>,
    pub release: Option<TouchEvent>,
}

#[derive(Debug)]
enum Phase {
    Pending {
        queued: Vec<TouchEvent>,
        release_requested: bool,
    },
    Active,
}

/// An open pinch gesture. Owned by exactly one client session.
#[derive(Debug)]
pub struct PinchGesture {
    center_x: i32,
    center_y: i32,
    /// Distance from the center to each finger.
    spread: i32,
    phase: Phase,
}

impl PinchGesture {
    /// Open the gesture at the anchor point. The two returned events are the
    /// setup sequence and must be issued in order: point A down, then A and B
    /// down together.
    pub fn begin(x: i32, y: i32, config: &GestureConfig, dims: Dimensions) -> (Self, [TouchEvent; 2]) {
        let gesture = Self {
            center_x: x,
            center_y: y,
            spread: config.pinch_initial_spread,
            phase: Phase::Pending {
                queued: Vec::new(),
                release_requested: false,
            },
        };
        let first = TouchEvent {
            touches: vec![gesture.point_a(PRESS, dims)],
            display: 0,
        };
        let second = gesture.both(PRESS, dims);
        (gesture, [first, second])
    }

    /// Apply one pinch delta: `spread = max(min_spread, spread - delta*step)`,
    /// capped at the longer surface edge (the points clamp to the surface, so
    /// a larger spread is indistinguishable).
    ///
    /// Returns the two-point move to issue immediately when *active*, or
    /// `None` when *pending* (the move was queued for the setup-completion
    /// flush).
    ///
    /// The delta arrives from the wire unvalidated; the arithmetic runs in
    /// `i64` so an absurd value cannot overflow.
    pub fn update(&mut self, delta: i32, config: &GestureConfig, dims: Dimensions) -> Option<TouchEvent> {
        let floor = i64::from(config.pinch_min_spread);
        let ceiling = i64::from(dims.width.max(dims.height)).max(floor);
        let next = i64::from(self.spread) - i64::from(delta) * i64::from(config.pinch_step);
        self.spread = i32::try_from(next.clamp(floor, ceiling)).unwrap_or(i32::MAX);
        let event = self.both(PRESS, dims);
        match &mut self.phase {
            Phase::Pending { queued, .. } => {
                queued.push(event);
                None
            }
            Phase::Active => Some(event),
        }
    }

    /// Both setup RPCs have completed. Transitions to *active* and hands back
    /// the queued moves plus, when a release was requested while pending, the
    /// release event — in which case the caller destroys the gesture after
    /// issuing it.
    pub fn setup_complete(&mut self, dims: Dimensions) -> SetupOutcome {
        match std::mem::replace(&mut self.phase, Phase::Active) {
            Phase::Pending {
                queued,
                release_requested,
            } => SetupOutcome {
                moves: queued,
                release: release_requested.then(|| self.both(RELEASE, dims)),
            },
            // Idempotent against a stray completion signal.
            Phase::Active => SetupOutcome {
                moves: Vec::new(),
                release: None,
            },
        }
    }

    /// Request a release (idle timeout or session teardown).
    ///
    /// When *active*, returns the two-point touch-up and the caller destroys
    /// the gesture. When *pending*, marks the deferred flag and returns
    /// `None` — the release happens in [`Self::setup_complete`], exactly once.
    pub fn request_release(&mut self, dims: Dimensions) -> Option<TouchEvent> {
        match &mut self.phase {
            Phase::Pending {
                release_requested, ..
            } => {
                *release_requested = true;
                None
            }
            Phase::Active => Some(self.both(RELEASE, dims)),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.phase, Phase::Pending { .. })
    }

    fn point_a(&self, pressure: i32, dims: Dimensions) -> Touch {
        self.point(PINCH_ID_A, -self.spread, pressure, dims)
    }

    fn both(&self, pressure: i32, dims: Dimensions) -> TouchEvent {
        TouchEvent {
            touches: vec![
                self.point(PINCH_ID_A, -self.spread, pressure, dims),
                self.point(PINCH_ID_B, self.spread, pressure, dims),
            ],
            display: 0,
        }
    }

    fn point(&self, identifier: i32, offset: i32, pressure: i32, dims: Dimensions) -> Touch {
        #[allow(clippy::cast_possible_wrap)]
        let (w, h) = (dims.width as i32, dims.height as i32);
        Touch {
            x: self.center_x.clamp(0, w),
            y: (self.center_y + offset).clamp(0, h),
            identifier,
            pressure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims() -> Dimensions {
        Dimensions {
            width: 1080,
            height: 2400,
        }
    }

    fn config() -> GestureConfig {
        GestureConfig::default()
    }

    #[test]
    fn test_setup_sequence_is_point_then_union() {
        let (_, setup) = PinchGesture::begin(540, 1200, &config(), dims());
        assert_eq!(setup[0].touches.len(), 1);
        assert_eq!(setup[0].touches[0].identifier, PINCH_ID_A);
        assert_eq!(setup[1].touches.len(), 2);
        assert_eq!(setup[1].touches[0].identifier, PINCH_ID_A);
        assert_eq!(setup[1].touches[1].identifier, PINCH_ID_B);
        // Symmetric about the anchor at the initial spread.
        assert_eq!(setup[1].touches[0].y, 1200 - 100);
        assert_eq!(setup[1].touches[1].y, 1200 + 100);
    }

    #[test]
    fn test_moves_queue_while_pending_and_flush_in_order() {
        let (mut g, _) = PinchGesture::begin(540, 1200, &config(), dims());
        assert!(g.update(-1, &config(), dims()).is_none());
        assert!(g.update(-1, &config(), dims()).is_none());
        let outcome = g.setup_complete(dims());
        assert_eq!(outcome.moves.len(), 2);
        // Spreads 120 then 140: flush preserves submission order.
        assert_eq!(outcome.moves[0].touches[1].y, 1200 + 120);
        assert_eq!(outcome.moves[1].touches[1].y, 1200 + 140);
        assert!(outcome.release.is_none());
        assert!(!g.is_pending());
    }

    #[test]
    fn test_active_moves_issue_directly() {
        let (mut g, _) = PinchGesture::begin(540, 1200, &config(), dims());
        g.setup_complete(dims());
        let mv = g.update(1, &config(), dims()).unwrap();
        assert_eq!(mv.touches[1].y, 1200 + 80);
        assert_eq!(mv.touches[0].pressure, PRESS);
    }

    #[test]
    fn test_spread_never_below_floor() {
        let (mut g, _) = PinchGesture::begin(540, 1200, &config(), dims());
        g.setup_complete(dims());
        let mut last = None;
        for _ in 0..50 {
            last = g.update(1, &config(), dims());
        }
        let mv = last.unwrap();
        // Floor of 20 regardless of how far the wheel turned.
        assert_eq!(mv.touches[0].y, 1200 - 20);
        assert_eq!(mv.touches[1].y, 1200 + 20);
        // Mixed signs stay within the floor too.
        let mv = g.update(-1, &config(), dims()).unwrap();
        assert_eq!(mv.touches[1].y, 1200 + 40);
    }

    #[test]
    fn test_extreme_deltas_saturate_instead_of_overflowing() {
        let (mut g, _) = PinchGesture::begin(540, 1200, &config(), dims());
        g.setup_complete(dims());
        // A wheel delta of i32::MAX would overflow the spread arithmetic if
        // it ran in i32; it must land on the floor instead.
        let mv = g.update(i32::MAX, &config(), dims()).unwrap();
        assert_eq!(mv.touches[0].y, 1200 - 20);
        assert_eq!(mv.touches[1].y, 1200 + 20);
        // The opposite extreme caps at the longer surface edge, so the
        // screen-clamp addition in `point` cannot overflow either.
        let mv = g.update(i32::MIN, &config(), dims()).unwrap();
        assert_eq!(mv.touches[0].y, 0);
        assert_eq!(mv.touches[1].y, 2400);
    }

    #[test]
    fn test_release_during_pending_is_deferred_and_runs_once() {
        let (mut g, _) = PinchGesture::begin(540, 1200, &config(), dims());
        // Idle timer fires while setup is outstanding: no event yet.
        assert!(g.request_release(dims()).is_none());
        // A second request (timer re-fire) is still deferred, not doubled.
        assert!(g.request_release(dims()).is_none());
        let outcome = g.setup_complete(dims());
        let release = outcome.release.expect("deferred release must surface");
        assert!(release.touches.iter().all(|t| t.pressure == RELEASE));
        // A stray second completion does not produce another release.
        let again = g.setup_complete(dims());
        assert!(again.release.is_none());
        assert!(again.moves.is_empty());
    }

    #[test]
    fn test_release_while_active_is_immediate() {
        let (mut g, _) = PinchGesture::begin(540, 1200, &config(), dims());
        g.setup_complete(dims());
        let up = g.request_release(dims()).unwrap();
        assert_eq!(up.touches.len(), 2);
        assert!(up.touches.iter().all(|t| t.pressure == RELEASE));
    }

    #[test]
    fn test_points_clamped_to_surface() {
        let (g, setup) = PinchGesture::begin(540, 30, &config(), dims());
        // Upper finger would sit at y = -70; clamped to 0.
        assert_eq!(setup[1].touches[0].y, 0);
        drop(g);
    }
}
