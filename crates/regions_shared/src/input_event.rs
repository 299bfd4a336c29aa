const KEY_ESC: u32 = 1;
const KEY_UP: u32 = 103;
const KEY_LEFT: u32 = 105;
const KEY_RIGHT: u32 = 106;
const KEY_DOWN: u32 = 108;

/// The keys the editor reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Escape,
    Up,
    Down,
    Left,
    Right,
    /// Any other key, identified by its evdev code
    Other(u32),
}

impl Key {
    /// Interprets a raw evdev key code as delivered by `wl_keyboard.key`
    pub const fn from_evdev(code: u32) -> Self {
        match code {
            KEY_ESC => Key::Escape,
            KEY_UP => Key::Up,
            KEY_DOWN => Key::Down,
            KEY_LEFT => Key::Left,
            KEY_RIGHT => Key::Right,
            code => Key::Other(code),
        }
    }
}

/// Input delivered to the editor, in surface-local pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    ButtonPress { x: f64, y: f64 },
    ButtonRelease { x: f64, y: f64 },
    PointerMotion { x: f64, y: f64 },
    Key(Key),
}

/// What the display has to do after an input event was handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputResponse {
    /// The overlay needs to be drawn again
    pub redraw: bool,
    /// The session is over and the overlay should close
    pub end_session: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evdev_codes_map_to_keys() {
        assert_eq!(Key::from_evdev(1), Key::Escape);
        assert_eq!(Key::from_evdev(103), Key::Up);
        assert_eq!(Key::from_evdev(108), Key::Down);
        assert_eq!(Key::from_evdev(105), Key::Left);
        assert_eq!(Key::from_evdev(106), Key::Right);
        assert_eq!(Key::from_evdev(30), Key::Other(30));
    }
}
