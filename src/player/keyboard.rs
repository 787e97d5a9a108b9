use crossterm::event::{KeyCode, KeyEvent, KeyEventKind};

/// Keys the player reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Space,
    ArrowLeft,
    ArrowRight,
    ArrowUp,
    ArrowDown,
    M,
    F,
    /// 0..=9
    Digit(u8),
}

impl Key {
    pub fn from_key_code(code: KeyCode) -> Option<Key> {
        match code {
            KeyCode::Char(' ') => Some(Key::Space),
            KeyCode::Left => Some(Key::ArrowLeft),
            KeyCode::Right => Some(Key::ArrowRight),
            KeyCode::Up => Some(Key::ArrowUp),
            KeyCode::Down => Some(Key::ArrowDown),
            KeyCode::Char('m') | KeyCode::Char('M') => Some(Key::M),
            KeyCode::Char('f') | KeyCode::Char('F') => Some(Key::F),
            KeyCode::Char(c) => c.to_digit(10).map(|digit| Key::Digit(digit as u8)),
            _ => None,
        }
    }

    /// Key presses only; repeats and releases are ignored
    pub fn from_key_event(event: &KeyEvent) -> Option<Key> {
        if event.kind != KeyEventKind::Press {
            return None;
        }
        Self::from_key_code(event.code)
    }
}

/// What a key press asks the player to do
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyAction {
    TogglePlay,
    Rewind(f64),
    Forward(f64),
    /// Relative volume change
    Volume(f64),
    ToggleMute,
    ToggleFullscreen,
    /// Fraction of the duration, 0.0..=0.9
    SeekFraction(f64),
}

pub fn key_action(key: Key, seek_step: f64, volume_step: f64) -> KeyAction {
    match key {
        Key::Space => KeyAction::TogglePlay,
        Key::ArrowLeft => KeyAction::Rewind(seek_step),
        Key::ArrowRight => KeyAction::Forward(seek_step),
        Key::ArrowUp => KeyAction::Volume(volume_step),
        Key::ArrowDown => KeyAction::Volume(-volume_step),
        Key::M => KeyAction::ToggleMute,
        Key::F => KeyAction::ToggleFullscreen,
        Key::Digit(digit) => KeyAction::SeekFraction(digit.min(9) as f64 / 10.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyModifiers;

    #[test]
    fn test_key_codes() {
        assert_eq!(Key::from_key_code(KeyCode::Char(' ')), Some(Key::Space));
        assert_eq!(Key::from_key_code(KeyCode::Char('M')), Some(Key::M));
        assert_eq!(Key::from_key_code(KeyCode::Char('7')), Some(Key::Digit(7)));
        assert_eq!(Key::from_key_code(KeyCode::Char('x')), None);
        assert_eq!(Key::from_key_code(KeyCode::Esc), None);
    }

    #[test]
    fn test_release_is_ignored() {
        let mut event = KeyEvent::new(KeyCode::Left, KeyModifiers::NONE);
        assert_eq!(Key::from_key_event(&event), Some(Key::ArrowLeft));
        event.kind = KeyEventKind::Release;
        assert_eq!(Key::from_key_event(&event), None);
    }

    #[test]
    fn test_key_actions() {
        assert_eq!(key_action(Key::ArrowLeft, 5.0, 0.1), KeyAction::Rewind(5.0));
        assert_eq!(key_action(Key::ArrowDown, 5.0, 0.1), KeyAction::Volume(-0.1));
        assert_eq!(key_action(Key::Digit(0), 5.0, 0.1), KeyAction::SeekFraction(0.0));
        assert_eq!(key_action(Key::Digit(3), 5.0, 0.1), KeyAction::SeekFraction(0.3));
    }
}
