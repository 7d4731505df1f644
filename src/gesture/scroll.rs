//! Scroll synthesis: wheel deltas become a synthetic drag.
//!
//! The first delta in an idle session presses a reserved touch point at the
//! wheel position; each subsequent delta drags it opposite to the wheel
//! direction (scrolling down drags content up), clamped to the device
//! surface. When no delta arrives within the idle window the session loop
//! releases the point and discards the state.

use crate::device::proto::{Touch, TouchEvent};
use crate::device::Dimensions;

use super::{clamp, GestureConfig, PRESS, RELEASE, SCROLL_ID};

/// An open scroll drag. Owned by exactly one client session.
#[derive(Debug)]
pub struct ScrollGesture {
    x: f64,
    y: f64,
}

impl ScrollGesture {
    /// Open the drag at the wheel's screen position. The returned event is
    /// the touch-down to issue.
    pub fn begin(x: i32, y: i32) -> (Self, TouchEvent) {
        let gesture = Self {
            x: f64::from(x),
            y: f64::from(y),
        };
        let down = gesture.event(PRESS);
        (gesture, down)
    }

    /// Apply one wheel delta: move the virtual point by `-delta * scale`,
    /// clamped to `[0, W] × [0, H]`. Returns the touch-move to issue.
    pub fn update(&mut self, dx: f64, dy: f64, config: &GestureConfig, dims: Dimensions) -> TouchEvent {
        self.x = clamp(self.x - dx * config.scroll_scale, dims.width);
        self.y = clamp(self.y - dy * config.scroll_scale, dims.height);
        self.event(PRESS)
    }

    /// Close the drag (idle timeout or session teardown). Returns the
    /// touch-up to issue; the state is consumed.
    pub fn release(self) -> TouchEvent {
        self.event(RELEASE)
    }

    fn event(&self, pressure: i32) -> TouchEvent {
        #[allow(clippy::cast_possible_truncation)]
        let (x, y) = (self.x.round() as i32, self.y.round() as i32);
        TouchEvent {
            touches: vec![Touch {
                x,
                y,
                identifier: SCROLL_ID,
                pressure,
            }],
            display: 0,
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

    #[test]
    fn test_begin_presses_at_wheel_position() {
        let (_, down) = ScrollGesture::begin(500, 1200);
        assert_eq!(down.touches.len(), 1);
        let t = &down.touches[0];
        assert_eq!((t.x, t.y, t.identifier, t.pressure), (500, 1200, SCROLL_ID, PRESS));
    }

    #[test]
    fn test_update_moves_against_delta() {
        let config = GestureConfig::default();
        let (mut g, _) = ScrollGesture::begin(500, 1200);
        let mv = g.update(0.0, 10.0, &config, dims());
        // Scrolling down (positive dy) drags the point up.
        assert_eq!(mv.touches[0].y, 1200 - 20);
        assert_eq!(mv.touches[0].pressure, PRESS);
    }

    #[test]
    fn test_position_clamped_to_bounds() {
        let config = GestureConfig::default();
        let (mut g, _) = ScrollGesture::begin(5, 10);
        for _ in 0..100 {
            let mv = g.update(100.0, 100.0, &config, dims());
            let t = &mv.touches[0];
            assert!(t.x >= 0 && t.x <= 1080);
            assert!(t.y >= 0 && t.y <= 2400);
        }
        let mv = g.update(-10_000.0, -10_000.0, &config, dims());
        assert_eq!((mv.touches[0].x, mv.touches[0].y), (1080, 2400));
    }

    #[test]
    fn test_release_balances_press() {
        // One down, any number of moves, exactly one up.
        let config = GestureConfig::default();
        let (mut g, down) = ScrollGesture::begin(100, 100);
        assert_eq!(down.touches[0].pressure, PRESS);
        for _ in 0..5 {
            assert_eq!(g.update(1.0, 1.0, &config, dims()).touches[0].pressure, PRESS);
        }
        let up = g.release();
        assert_eq!(up.touches[0].pressure, RELEASE);
        assert_eq!(up.touches[0].identifier, SCROLL_ID);
    }
}
