// Keyboard state for per-frame polling, and modality selection.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::InputPreference;

/// How triggers reach the pad. Chosen once when the pad is mounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputModality {
    /// Mapped keys are polled every frame.
    Keyboard,
    /// Touch/mouse sessions drive the layers.
    Pointer,
}

impl InputModality {
    pub fn resolve(preference: InputPreference, reports_release: bool) -> Self {
        match preference {
            InputPreference::Keyboard => InputModality::Keyboard,
            InputPreference::Pointer => InputModality::Pointer,
            InputPreference::Auto if reports_release => InputModality::Keyboard,
            InputPreference::Auto => InputModality::Pointer,
        }
    }
}

/// Which keys are down right now.
///
/// Terminals without the keyboard enhancement protocol only report presses and
/// auto-repeats. In that case a key counts as down until `grace` has passed
/// since its last press or repeat.
#[derive(Debug, Clone)]
pub struct KeyboardState {
    down: HashMap<char, Instant>,
    reports_release: bool,
    grace: Duration,
}

impl KeyboardState {
    pub fn new(reports_release: bool, grace: Duration) -> Self {
        Self {
            down: HashMap::new(),
            reports_release,
            grace,
        }
    }

    pub fn reports_release(&self) -> bool {
        self.reports_release
    }

    /// Press or auto-repeat.
    pub fn press(&mut self, key: char, now: Instant) {
        self.down.insert(key.to_ascii_lowercase(), now);
    }

    pub fn release(&mut self, key: char) {
        self.down.remove(&key.to_ascii_lowercase());
    }

    pub fn is_down(&self, key: char, now: Instant) -> bool {
        let Some(&last) = self.down.get(&key.to_ascii_lowercase()) else {
            return false;
        };
        self.reports_release || now.saturating_duration_since(last) < self.grace
    }

    pub fn clear(&mut self) {
        self.down.clear();
    }
}

/// Previous-frame key state per layer, so a held key toggles exactly once.
#[derive(Debug, Clone, Default)]
pub struct EdgeDetector {
    previous: Vec<bool>,
}

impl EdgeDetector {
    /// Record `down` for `slot` and report whether it just went down.
    pub fn rising(&mut self, slot: usize, down: bool) -> bool {
        if self.previous.len() <= slot {
            self.previous.resize(slot + 1, false);
        }
        let was_down = std::mem::replace(&mut self.previous[slot], down);
        down && !was_down
    }

    pub fn reset(&mut self) {
        self.previous.iter_mut().for_each(|d| *d = false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_modality_follows_release_support() {
        assert_eq!(
            InputModality::resolve(InputPreference::Auto, true),
            InputModality::Keyboard
        );
        assert_eq!(
            InputModality::resolve(InputPreference::Auto, false),
            InputModality::Pointer
        );
        assert_eq!(
            InputModality::resolve(InputPreference::Keyboard, false),
            InputModality::Keyboard
        );
    }

    #[test]
    fn released_keys_are_up() {
        let now = Instant::now();
        let mut keys = KeyboardState::new(true, Duration::from_millis(500));
        keys.press('K', now);
        assert!(keys.is_down('k', now + Duration::from_secs(10)));
        keys.release('k');
        assert!(!keys.is_down('k', now));
    }

    #[test]
    fn press_only_terminals_use_grace() {
        let now = Instant::now();
        let mut keys = KeyboardState::new(false, Duration::from_millis(500));
        keys.press('b', now);
        assert!(keys.is_down('b', now + Duration::from_millis(499)));
        assert!(!keys.is_down('b', now + Duration::from_millis(500)));

        keys.press('b', now + Duration::from_millis(400));
        assert!(keys.is_down('b', now + Duration::from_millis(800)));
    }

    #[test]
    fn edges_fire_once_per_press() {
        let mut edges = EdgeDetector::default();
        assert!(edges.rising(2, true));
        assert!(!edges.rising(2, true));
        assert!(!edges.rising(2, false));
        assert!(edges.rising(2, true));

        edges.reset();
        assert!(edges.rising(2, true));
    }
}
