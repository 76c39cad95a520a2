//! Translation of backend key codes into [`KeyCode`].

use super::KeyCode;

/// Map an egui key to a [`KeyCode`].
pub fn from_egui_key(key: egui::Key) -> KeyCode {
    use egui::Key;

    match key {
        Key::Space => KeyCode::Space,
        Key::Enter => KeyCode::Enter,
        Key::Escape => KeyCode::Escape,
        Key::Backspace => KeyCode::Backspace,
        Key::Delete => KeyCode::Delete,
        Key::Tab => KeyCode::Tab,
        Key::ArrowLeft => KeyCode::Left,
        Key::ArrowRight => KeyCode::Right,
        Key::ArrowUp => KeyCode::Up,
        Key::ArrowDown => KeyCode::Down,
        Key::Home => KeyCode::Home,
        Key::End => KeyCode::End,
        Key::PageUp => KeyCode::PageUp,
        Key::PageDown => KeyCode::PageDown,
        Key::Insert => KeyCode::Insert,

        Key::F1 => KeyCode::F(1),
        Key::F2 => KeyCode::F(2),
        Key::F3 => KeyCode::F(3),
        Key::F4 => KeyCode::F(4),
        Key::F5 => KeyCode::F(5),
        Key::F6 => KeyCode::F(6),
        Key::F7 => KeyCode::F(7),
        Key::F8 => KeyCode::F(8),
        Key::F9 => KeyCode::F(9),
        Key::F10 => KeyCode::F(10),
        Key::F11 => KeyCode::F(11),
        Key::F12 => KeyCode::F(12),

        Key::Num0 => KeyCode::Char('0'),
        Key::Num1 => KeyCode::Char('1'),
        Key::Num2 => KeyCode::Char('2'),
        Key::Num3 => KeyCode::Char('3'),
        Key::Num4 => KeyCode::Char('4'),
        Key::Num5 => KeyCode::Char('5'),
        Key::Num6 => KeyCode::Char('6'),
        Key::Num7 => KeyCode::Char('7'),
        Key::Num8 => KeyCode::Char('8'),
        Key::Num9 => KeyCode::Char('9'),

        Key::Minus => KeyCode::Char('-'),
        Key::Equals => KeyCode::Char('='),
        Key::Comma => KeyCode::Char(','),
        Key::Period => KeyCode::Char('.'),
        Key::Slash => KeyCode::Char('/'),
        Key::Backslash => KeyCode::Char('\\'),
        Key::Semicolon => KeyCode::Char(';'),
        Key::OpenBracket => KeyCode::Char('['),
        Key::CloseBracket => KeyCode::Char(']'),
        Key::Backtick => KeyCode::Char('`'),

        other => letter(other.name()),
    }
}

/// Letters report their name as a single uppercase character.
fn letter(name: &str) -> KeyCode {
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => KeyCode::Char(c.to_ascii_lowercase()),
        _ => KeyCode::Other,
    }
}

/// Map an rdev key to a [`KeyCode`].
pub fn from_rdev_key(key: rdev::Key) -> KeyCode {
    use rdev::Key;

    match key {
        Key::Space => KeyCode::Space,
        Key::Return | Key::KpReturn => KeyCode::Enter,
        Key::Escape => KeyCode::Escape,
        Key::Backspace => KeyCode::Backspace,
        Key::Delete | Key::KpDelete => KeyCode::Delete,
        Key::Tab => KeyCode::Tab,
        Key::LeftArrow => KeyCode::Left,
        Key::RightArrow => KeyCode::Right,
        Key::UpArrow => KeyCode::Up,
        Key::DownArrow => KeyCode::Down,
        Key::Home => KeyCode::Home,
        Key::End => KeyCode::End,
        Key::PageUp => KeyCode::PageUp,
        Key::PageDown => KeyCode::PageDown,
        Key::Insert => KeyCode::Insert,

        Key::F1 => KeyCode::F(1),
        Key::F2 => KeyCode::F(2),
        Key::F3 => KeyCode::F(3),
        Key::F4 => KeyCode::F(4),
        Key::F5 => KeyCode::F(5),
        Key::F6 => KeyCode::F(6),
        Key::F7 => KeyCode::F(7),
        Key::F8 => KeyCode::F(8),
        Key::F9 => KeyCode::F(9),
        Key::F10 => KeyCode::F(10),
        Key::F11 => KeyCode::F(11),
        Key::F12 => KeyCode::F(12),

        Key::KeyA => KeyCode::Char('a'),
        Key::KeyB => KeyCode::Char('b'),
        Key::KeyC => KeyCode::Char('c'),
        Key::KeyD => KeyCode::Char('d'),
        Key::KeyE => KeyCode::Char('e'),
        Key::KeyF => KeyCode::Char('f'),
        Key::KeyG => KeyCode::Char('g'),
        Key::KeyH => KeyCode::Char('h'),
        Key::KeyI => KeyCode::Char('i'),
        Key::KeyJ => KeyCode::Char('j'),
        Key::KeyK => KeyCode::Char('k'),
        Key::KeyL => KeyCode::Char('l'),
        Key::KeyM => KeyCode::Char('m'),
        Key::KeyN => KeyCode::Char('n'),
        Key::KeyO => KeyCode::Char('o'),
        Key::KeyP => KeyCode::Char('p'),
        Key::KeyQ => KeyCode::Char('q'),
        Key::KeyR => KeyCode::Char('r'),
        Key::KeyS => KeyCode::Char('s'),
        Key::KeyT => KeyCode::Char('t'),
        Key::KeyU => KeyCode::Char('u'),
        Key::KeyV => KeyCode::Char('v'),
        Key::KeyW => KeyCode::Char('w'),
        Key::KeyX => KeyCode::Char('x'),
        Key::KeyY => KeyCode::Char('y'),
        Key::KeyZ => KeyCode::Char('z'),

        Key::Num0 => KeyCode::Char('0'),
        Key::Num1 => KeyCode::Char('1'),
        Key::Num2 => KeyCode::Char('2'),
        Key::Num3 => KeyCode::Char('3'),
        Key::Num4 => KeyCode::Char('4'),
        Key::Num5 => KeyCode::Char('5'),
        Key::Num6 => KeyCode::Char('6'),
        Key::Num7 => KeyCode::Char('7'),
        Key::Num8 => KeyCode::Char('8'),
        Key::Num9 => KeyCode::Char('9'),

        Key::Minus => KeyCode::Char('-'),
        Key::Equal => KeyCode::Char('='),
        Key::Comma => KeyCode::Char(','),
        Key::Dot => KeyCode::Char('.'),
        Key::Slash => KeyCode::Char('/'),
        Key::BackSlash => KeyCode::Char('\\'),
        Key::SemiColon => KeyCode::Char(';'),
        Key::LeftBracket => KeyCode::Char('['),
        Key::RightBracket => KeyCode::Char(']'),
        Key::BackQuote => KeyCode::Char('`'),
        Key::Quote => KeyCode::Char('\''),

        _ => KeyCode::Other,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
