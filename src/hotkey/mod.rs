//! Keyboard shortcuts — key events, token normalisation and dispatch.
//!
//! # Flow
//!
//! ```text
//!  egui key event ─┐
//!                  ├─▶ KeyEvent ──▶ token_for ──▶ dispatch ──▶ Playback
//!  rdev (global) ──┘                    "space" ─▶ stop_all
//! ```
//!
//! Tokens are the strings stored in `library.json`: `"f1"`, `"esc"`, `"a"`…
//! [`STOP_TOKEN`] is reserved for stop-all and can never be bound to a clip.
//!
//! Global (unfocused) hotkeys are opt-in.  `rdev::listen()` is a blocking
//! OS-level call, so [`GlobalKeyListener`] runs it on a dedicated thread and
//! forwards [`KeyEvent`]s over a channel to the UI thread.

pub mod dispatch;
pub mod keymap;
pub mod listener;

pub use dispatch::{dispatch, DispatchOutcome};
pub use keymap::{from_egui_key, from_rdev_key};
pub use listener::GlobalKeyListener;

/// Token that always stops every playing sound.
pub const STOP_TOKEN: &str = "space";

// ---------------------------------------------------------------------------
// KeyEvent
// ---------------------------------------------------------------------------

/// Keys with a fixed token name.  Printable keys are [`KeyCode::Char`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    Space,
    Enter,
    Escape,
    Backspace,
    Delete,
    Tab,
    Left,
    Right,
    Up,
    Down,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    /// Function key `F1`–`F12`.
    F(u8),
    Char(char),
    /// Anything else (modifier keys, media keys, …).
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    /// Super / Windows / Command key.
    pub meta: bool,
}

impl Modifiers {
    /// Shift alone does not count: it only changes the typed character.
    pub fn blocks_hotkeys(&self) -> bool {
        self.ctrl || self.alt || self.meta
    }
}

/// A key press from either the focused window or the global listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: KeyCode,
    pub modifiers: Modifiers,
    /// Text the key produced, when the source reports it.
    pub text: Option<String>,
    /// `true` for auto-repeat presses while the key is held.
    pub repeat: bool,
}

impl KeyEvent {
    pub fn new(key: KeyCode) -> Self {
        Self {
            key,
            modifiers: Modifiers::default(),
            text: None,
            repeat: false,
        }
    }
}

// ---------------------------------------------------------------------------
// token_for
// ---------------------------------------------------------------------------

/// Normalise a key to the token used in hotkey bindings.
///
/// Named keys map to fixed names; printable keys map to their lowercased
/// character.  Returns `None` for keys that have neither.
pub fn token_for(event: &KeyEvent) -> Option<String> {
    let named = match event.key {
        KeyCode::Space => "space",
        KeyCode::Enter => "enter",
        KeyCode::Escape => "esc",
        KeyCode::Backspace => "backspace",
        KeyCode::Delete => "delete",
        KeyCode::Tab => "tab",
        KeyCode::Left => "left",
        KeyCode::Right => "right",
        KeyCode::Up => "up",
        KeyCode::Down => "down",
        KeyCode::Home => "home",
        KeyCode::End => "end",
        KeyCode::PageUp => "pageup",
        KeyCode::PageDown => "pagedown",
        KeyCode::Insert => "insert",
        KeyCode::F(n @ 1..=12) => return Some(format!("f{n}")),
        KeyCode::F(_) => return None,
        KeyCode::Char(c) => return printable_token(c),
        KeyCode::Other => {
            let c = event.text.as_deref()?.chars().next()?;
            return printable_token(c);
        }
    };
    Some(named.to_string())
}

fn printable_token(c: char) -> Option<String> {
    if c.is_control() || c.is_whitespace() {
        return None;
    }
    Some(c.to_lowercase().collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
