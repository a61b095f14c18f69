use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use winit::keyboard::KeyCode;

use crate::orientation::InputDelta;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    OrbitLeft,
    OrbitRight,
    OrbitUp,
    OrbitDown,
    RollLeft,
    RollRight,
    TwistForward,
    TwistBackward,
    ZoomIn,
    ZoomOut,
    Reset,
    ToggleRunning,
    Quit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct KeyBind {
    pub code: KeyCode,
    pub shift: bool,
}

impl KeyBind {
    pub fn new(code: KeyCode) -> Self {
        Self { code, shift: false }
    }

    pub fn with_shift(code: KeyCode) -> Self {
        Self { code, shift: true }
    }

    pub fn display_name(&self) -> String {
        if self.shift {
            format!("Shift+{:?}", self.code)
        } else {
            format!("{:?}", self.code)
        }
    }
}

impl Serialize for KeyBind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.display_name())
    }
}

impl<'de> Deserialize<'de> for KeyBind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let (shift, key_str) = match s.strip_prefix("Shift+") {
            Some(rest) => (true, rest),
            None => (false, s.as_str()),
        };
        let code = keycode_from_str(key_str).ok_or_else(|| {
            serde::de::Error::custom(format!("Unknown key code: {key_str}"))
        })?;
        Ok(KeyBind { code, shift })
    }
}

fn keycode_from_str(s: &str) -> Option<KeyCode> {
    // Names follow the Debug output of KeyCode
    let code = match s {
        "KeyA" => KeyCode::KeyA,
        "KeyB" => KeyCode::KeyB,
        "KeyC" => KeyCode::KeyC,
        "KeyD" => KeyCode::KeyD,
        "KeyE" => KeyCode::KeyE,
        "KeyF" => KeyCode::KeyF,
        "KeyG" => KeyCode::KeyG,
        "KeyH" => KeyCode::KeyH,
        "KeyI" => KeyCode::KeyI,
        "KeyJ" => KeyCode::KeyJ,
        "KeyK" => KeyCode::KeyK,
        "KeyL" => KeyCode::KeyL,
        "KeyM" => KeyCode::KeyM,
        "KeyN" => KeyCode::KeyN,
        "KeyO" => KeyCode::KeyO,
        "KeyP" => KeyCode::KeyP,
        "KeyQ" => KeyCode::KeyQ,
        "KeyR" => KeyCode::KeyR,
        "KeyS" => KeyCode::KeyS,
        "KeyT" => KeyCode::KeyT,
        "KeyU" => KeyCode::KeyU,
        "KeyV" => KeyCode::KeyV,
        "KeyW" => KeyCode::KeyW,
        "KeyX" => KeyCode::KeyX,
        "KeyY" => KeyCode::KeyY,
        "KeyZ" => KeyCode::KeyZ,
        "Escape" => KeyCode::Escape,
        "Space" => KeyCode::Space,
        "Enter" => KeyCode::Enter,
        "ArrowUp" => KeyCode::ArrowUp,
        "ArrowDown" => KeyCode::ArrowDown,
        "ArrowLeft" => KeyCode::ArrowLeft,
        "ArrowRight" => KeyCode::ArrowRight,
        "PageUp" => KeyCode::PageUp,
        "PageDown" => KeyCode::PageDown,
        "Home" => KeyCode::Home,
        "End" => KeyCode::End,
        "Minus" => KeyCode::Minus,
        "Equal" => KeyCode::Equal,
        _ => return None,
    };
    Some(code)
}

pub fn default_bindings() -> HashMap<Action, KeyBind> {
    use Action::*;
    HashMap::from([
        (OrbitLeft, KeyBind::new(KeyCode::ArrowLeft)),
        (OrbitRight, KeyBind::new(KeyCode::ArrowRight)),
        (OrbitUp, KeyBind::new(KeyCode::ArrowUp)),
        (OrbitDown, KeyBind::new(KeyCode::ArrowDown)),
        (RollLeft, KeyBind::new(KeyCode::KeyQ)),
        (RollRight, KeyBind::new(KeyCode::KeyE)),
        (TwistForward, KeyBind::new(KeyCode::KeyW)),
        (TwistBackward, KeyBind::new(KeyCode::KeyS)),
        (ZoomIn, KeyBind::with_shift(KeyCode::ArrowUp)),
        (ZoomOut, KeyBind::with_shift(KeyCode::ArrowDown)),
        (Reset, KeyBind::new(KeyCode::KeyR)),
        (ToggleRunning, KeyBind::new(KeyCode::Space)),
        (Quit, KeyBind::new(KeyCode::Escape)),
    ])
}

pub struct InputState {
    pub bindings: HashMap<Action, KeyBind>,
    reverse_map: HashMap<KeyCode, Vec<Action>>,
    active_actions: HashSet<Action>,
    just_pressed_actions: HashSet<Action>,
    pub shift_held: bool,
}

impl InputState {
    pub fn new(bindings: HashMap<Action, KeyBind>) -> Self {
        let reverse_map = build_reverse_map(&bindings);
        Self {
            bindings,
            reverse_map,
            active_actions: HashSet::new(),
            just_pressed_actions: HashSet::new(),
            shift_held: false,
        }
    }

    #[cfg(test)]
    pub fn with_defaults() -> Self {
        Self::new(default_bindings())
    }

    pub fn on_key_event(&mut self, code: KeyCode, pressed: bool) {
        if code == KeyCode::ShiftLeft || code == KeyCode::ShiftRight {
            self.shift_held = pressed;
        }

        if let Some(actions) = self.reverse_map.get(&code) {
            for &action in actions {
                if pressed {
                    let wants_shift = self.bindings.get(&action).is_some_and(|b| b.shift);
                    if wants_shift != self.shift_held {
                        continue;
                    }
                    // Key repeat re-sends presses for held keys
                    if self.active_actions.insert(action) {
                        self.just_pressed_actions.insert(action);
                    }
                } else {
                    // Release always deactivates so a changed modifier can't leave it stuck
                    self.active_actions.remove(&action);
                }
            }
        }
    }

    pub fn is_active(&self, action: Action) -> bool {
        self.active_actions.contains(&action)
    }

    pub fn just_pressed(&self, action: Action) -> bool {
        self.just_pressed_actions.contains(&action)
    }

    pub fn end_frame(&mut self) {
        self.just_pressed_actions.clear();
    }

    /// Held actions folded into one frame of orbit/roll/twist/zoom input.
    pub fn delta(&self) -> InputDelta {
        let axis = |neg: Action, pos: Action| {
            f64::from(u8::from(self.is_active(pos))) - f64::from(u8::from(self.is_active(neg)))
        };
        InputDelta {
            x: axis(Action::OrbitLeft, Action::OrbitRight),
            y: axis(Action::OrbitDown, Action::OrbitUp),
            z: axis(Action::RollLeft, Action::RollRight),
            twist: axis(Action::TwistBackward, Action::TwistForward),
            zoom: axis(Action::ZoomIn, Action::ZoomOut),
        }
    }
}

fn build_reverse_map(bindings: &HashMap<Action, KeyBind>) -> HashMap<KeyCode, Vec<Action>> {
    let mut map: HashMap<KeyCode, Vec<Action>> = HashMap::new();
    for (&action, bind) in bindings {
        map.entry(bind.code).or_default().push(action);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bindings_cover_every_action() {
        use Action::*;
        let bindings = default_bindings();
        for action in [
            OrbitLeft, OrbitRight, OrbitUp, OrbitDown, RollLeft, RollRight, TwistForward,
            TwistBackward, ZoomIn, ZoomOut, Reset, ToggleRunning, Quit,
        ] {
            assert!(bindings.contains_key(&action), "{action:?} unbound");
        }
        assert_eq!(bindings.len(), 13);
    }

    #[test]
    fn test_input_state_action_resolution() {
        let mut state = InputState::with_defaults();
        state.on_key_event(KeyCode::KeyW, true);
        assert!(state.is_active(Action::TwistForward));
        assert!(state.just_pressed(Action::TwistForward));

        state.end_frame();
        assert!(state.is_active(Action::TwistForward));
        assert!(!state.just_pressed(Action::TwistForward));

        state.on_key_event(KeyCode::KeyW, false);
        assert!(!state.is_active(Action::TwistForward));
    }

    #[test]
    fn test_delta_from_held_keys() {
        let mut state = InputState::with_defaults();
        assert!(state.delta().is_zero());

        state.on_key_event(KeyCode::ArrowRight, true);
        state.on_key_event(KeyCode::KeyQ, true);
        state.on_key_event(KeyCode::KeyS, true);
        let delta = state.delta();
        assert_eq!(delta.x, 1.0);
        assert_eq!(delta.y, 0.0);
        assert_eq!(delta.z, -1.0);
        assert_eq!(delta.twist, -1.0);
        assert_eq!(delta.zoom, 0.0);

        // Opposite keys cancel
        state.on_key_event(KeyCode::ArrowLeft, true);
        assert_eq!(state.delta().x, 0.0);
    }

    #[test]
    fn test_shift_selects_zoom_over_orbit() {
        let mut state = InputState::with_defaults();
        state.on_key_event(KeyCode::ArrowUp, true);
        assert!(state.is_active(Action::OrbitUp));
        assert!(!state.is_active(Action::ZoomIn));
        state.on_key_event(KeyCode::ArrowUp, false);

        state.on_key_event(KeyCode::ShiftLeft, true);
        state.on_key_event(KeyCode::ArrowUp, true);
        assert!(state.is_active(Action::ZoomIn));
        assert!(!state.is_active(Action::OrbitUp));
        assert_eq!(state.delta().zoom, -1.0);
    }

    #[test]
    fn test_key_repeat_is_not_a_new_press() {
        let mut state = InputState::with_defaults();
        state.on_key_event(KeyCode::Space, true);
        assert!(state.just_pressed(Action::ToggleRunning));
        state.end_frame();

        // Held key, repeated press events
        state.on_key_event(KeyCode::Space, true);
        state.on_key_event(KeyCode::Space, true);
        assert!(!state.just_pressed(Action::ToggleRunning));
        assert!(state.is_active(Action::ToggleRunning));

        state.on_key_event(KeyCode::Space, false);
        state.on_key_event(KeyCode::Space, true);
        assert!(state.just_pressed(Action::ToggleRunning));
    }

    #[test]
    fn test_keybind_serialization() {
        let mut map = HashMap::new();
        map.insert("key", KeyBind::with_shift(KeyCode::ArrowUp));
        let s = toml::to_string(&map).unwrap();
        assert!(s.contains("Shift+ArrowUp"));

        let parsed: HashMap<String, KeyBind> = toml::from_str(&s).unwrap();
        assert_eq!(parsed["key"], KeyBind::with_shift(KeyCode::ArrowUp));

        let bad: Result<HashMap<String, KeyBind>, _> = toml::from_str("key = \"NotAKey\"");
        assert!(bad.is_err());
    }
}
