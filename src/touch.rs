// Multi-touch sessions: each touch identifier owns at most one layer.

use std::collections::HashMap;

use crate::trigger::{SurfaceRect, TriggerMapper};
use crate::voice::LayerTrigger;

/// Identifier the host uses for the mouse pointer.
pub const MOUSE_TOUCH_ID: u64 = 0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchPoint {
    pub id: u64,
    pub x: f32,
    pub y: f32,
}

impl TouchPoint {
    pub fn new(id: u64, x: f32, y: f32) -> Self {
        Self { id, x, y }
    }
}

#[derive(Debug, Default)]
pub struct TouchTracker {
    sessions: HashMap<u64, usize>,
}

impl TouchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layer_for(&self, id: u64) -> Option<usize> {
        self.sessions.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    #[cfg(test)]
    fn holds(&self, layer: usize) -> bool {
        self.sessions.values().any(|&l| l == layer)
    }

    pub fn touch_start(
        &mut self,
        changed: &[TouchPoint],
        rect: &SurfaceRect,
        mapper: &TriggerMapper,
        hold: bool,
        trigger: &mut impl LayerTrigger,
    ) {
        for touch in changed {
            let Some(layer) = mapper.layer_at(rect, touch.x, touch.y) else {
                continue;
            };
            // A restarted identifier gives up whatever it held before.
            if let Some(previous) = self.sessions.insert(touch.id, layer)
                && previous != layer
                && !hold
            {
                trigger.deactivate(previous);
            }
            if hold {
                trigger.toggle(layer);
            } else {
                trigger.activate(layer);
            }
        }
    }

    /// Follow every tracked touch in `changed`. Leaving a cell releases it
    /// before the new one is taken.
    pub fn touch_move(
        &mut self,
        changed: &[TouchPoint],
        rect: &SurfaceRect,
        mapper: &TriggerMapper,
        trigger: &mut impl LayerTrigger,
    ) {
        for touch in changed {
            let Some(&current) = self.sessions.get(&touch.id) else {
                continue;
            };
            let next = mapper.layer_at(rect, touch.x, touch.y);
            if next == Some(current) {
                continue;
            }

            trigger.deactivate(current);
            self.sessions.remove(&touch.id);

            if let Some(layer) = next {
                trigger.activate(layer);
                self.sessions.insert(touch.id, layer);
            }
        }
    }

    /// Also used for cancelled touches.
    pub fn touch_end(&mut self, changed: &[TouchPoint], hold: bool, trigger: &mut impl LayerTrigger) {
        for touch in changed {
            if let Some(layer) = self.sessions.remove(&touch.id)
                && !hold
            {
                trigger.deactivate(layer);
            }
        }
    }

    /// Forget every session without touching voices.
    pub fn clear(&mut self) {
        self.sessions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::Transition;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        On(usize),
        Off(usize),
    }

    #[derive(Default)]
    struct Recording {
        active: Vec<bool>,
        calls: Vec<Call>,
    }

    impl Recording {
        fn new(n: usize) -> Self {
            Self {
                active: vec![false; n],
                calls: Vec::new(),
            }
        }
    }

    impl LayerTrigger for Recording {
        fn activate(&mut self, layer: usize) -> Transition {
            self.calls.push(Call::On(layer));
            if std::mem::replace(&mut self.active[layer], true) {
                Transition::Unchanged
            } else {
                Transition::Started
            }
        }

        fn deactivate(&mut self, layer: usize) -> Transition {
            self.calls.push(Call::Off(layer));
            if std::mem::replace(&mut self.active[layer], false) {
                Transition::Released
            } else {
                Transition::Unchanged
            }
        }

        fn is_active(&self, layer: usize) -> bool {
            self.active[layer]
        }
    }

    // 2x2 grid over a 200x200 surface: layer 0 top-left, 1 top-right, 2 bottom-left.
    fn setup() -> (TouchTracker, SurfaceRect, TriggerMapper, Recording) {
        (
            TouchTracker::new(),
            SurfaceRect::from_size(200.0, 200.0),
            TriggerMapper::new(vec!['k', 'b', 's'], 3),
            Recording::new(3),
        )
    }

    #[test]
    fn drag_switches_layers_release_first() {
        let (mut tracker, rect, mapper, mut pad) = setup();
        tracker.touch_start(&[TouchPoint::new(7, 50.0, 50.0)], &rect, &mapper, false, &mut pad);
        tracker.touch_move(&[TouchPoint::new(7, 150.0, 50.0)], &rect, &mapper, &mut pad);

        assert_eq!(pad.calls, vec![Call::On(0), Call::Off(0), Call::On(1)]);
        assert_eq!(tracker.layer_for(7), Some(1));
        assert!(!pad.is_active(0));
        assert!(pad.is_active(1));

        tracker.touch_end(&[TouchPoint::new(7, 150.0, 50.0)], false, &mut pad);
        assert!(tracker.is_empty());
        assert!(!pad.is_active(1));
    }

    #[test]
    fn leaving_the_surface_releases() {
        let (mut tracker, rect, mapper, mut pad) = setup();
        tracker.touch_start(&[TouchPoint::new(1, 50.0, 150.0)], &rect, &mapper, false, &mut pad);
        tracker.touch_move(&[TouchPoint::new(1, 250.0, 150.0)], &rect, &mapper, &mut pad);

        assert_eq!(tracker.layer_for(1), None);
        assert!(!pad.is_active(2));

        // Coming back in does not resurrect an ended session.
        tracker.touch_move(&[TouchPoint::new(1, 50.0, 150.0)], &rect, &mapper, &mut pad);
        assert!(!pad.is_active(2));
    }

    #[test]
    fn empty_cell_and_outside_start_are_ignored() {
        let (mut tracker, rect, mapper, mut pad) = setup();
        tracker.touch_start(
            &[TouchPoint::new(1, 150.0, 150.0), TouchPoint::new(2, -5.0, 10.0)],
            &rect,
            &mapper,
            false,
            &mut pad,
        );
        assert!(tracker.is_empty());
        assert!(pad.calls.is_empty());
    }

    #[test]
    fn one_mapping_per_identifier() {
        let (mut tracker, rect, mapper, mut pad) = setup();
        tracker.touch_start(
            &[TouchPoint::new(1, 50.0, 50.0), TouchPoint::new(2, 150.0, 50.0)],
            &rect,
            &mapper,
            false,
            &mut pad,
        );
        tracker.touch_start(&[TouchPoint::new(1, 50.0, 150.0)], &rect, &mapper, false, &mut pad);

        assert_eq!(tracker.len(), 2);
        assert_eq!(tracker.layer_for(1), Some(2));
        assert!(!tracker.holds(0));
        assert!(!pad.is_active(0));
        assert!(pad.is_active(1));
    }

    #[test]
    fn hold_mode_toggles_and_survives_touch_end() {
        let (mut tracker, rect, mapper, mut pad) = setup();
        let tap = [TouchPoint::new(3, 50.0, 50.0)];

        tracker.touch_start(&tap, &rect, &mapper, true, &mut pad);
        tracker.touch_end(&tap, true, &mut pad);
        assert!(pad.is_active(0));
        assert!(tracker.is_empty());

        tracker.touch_start(&tap, &rect, &mapper, true, &mut pad);
        tracker.touch_end(&tap, true, &mut pad);
        assert!(!pad.is_active(0));
    }

    #[test]
    fn untracked_moves_and_ends_do_nothing() {
        let (mut tracker, rect, mapper, mut pad) = setup();
        tracker.touch_move(&[TouchPoint::new(9, 50.0, 50.0)], &rect, &mapper, &mut pad);
        tracker.touch_end(&[TouchPoint::new(9, 50.0, 50.0)], false, &mut pad);
        assert!(pad.calls.is_empty());
    }
}
