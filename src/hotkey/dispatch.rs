//! Key event → playback action.

use crate::library::ClipStore;
use crate::playback::Playback;

use super::{token_for, KeyEvent, STOP_TOKEN};

/// What [`dispatch`] did with a key event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Auto-repeat while the key is held.
    IgnoredRepeat,
    /// Ctrl, Alt or Meta was held.
    IgnoredModifier,
    /// The key has no token.
    IgnoredKey,
    /// The stop token: every voice was halted.
    StoppedAll,
    /// The token is not bound, or its clip is gone.
    Unbound(String),
    Played { token: String, clip: String },
    /// The binding resolved but playback refused it.
    PlayFailed { clip: String, reason: String },
}

/// Handle one key event.  Never panics and never touches the store.
pub fn dispatch(event: &KeyEvent, store: &ClipStore, playback: &mut dyn Playback) -> DispatchOutcome {
    if event.repeat {
        return DispatchOutcome::IgnoredRepeat;
    }
    if event.modifiers.blocks_hotkeys() {
        return DispatchOutcome::IgnoredModifier;
    }
    let Some(token) = token_for(event) else {
        return DispatchOutcome::IgnoredKey;
    };

    if token == STOP_TOKEN {
        playback.stop_all();
        return DispatchOutcome::StoppedAll;
    }

    let Some(clip) = store.resolve_hotkey(&token) else {
        return DispatchOutcome::Unbound(token);
    };
    let clip = clip.to_string();

    match playback.play(&clip) {
        Ok(()) => {
            log::debug!("hotkey '{token}' → {clip}");
            DispatchOutcome::Played { token, clip }
        }
        Err(e) => {
            log::warn!("hotkey '{token}' could not play {clip}: {e}");
            DispatchOutcome::PlayFailed {
                clip,
                reason: e.to_string(),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::{KeyCode, Modifiers};
    use crate::playback::MockPlayback;
    use std::path::PathBuf;

    fn setup() -> (ClipStore, MockPlayback) {
        let mut store = ClipStore::default();
        store.register("Airhorn", PathBuf::from("Airhorn.mp3"));
        store.bind_hotkey("a", "Airhorn").unwrap();
        store.bind_hotkey("f1", "Airhorn").unwrap();

        let mut playback = MockPlayback::default();
        playback.load("Airhorn", &PathBuf::from("Airhorn.mp3")).unwrap();
        (store, playback)
    }

    #[test]
    fn bound_key_plays_clip() {
        let (store, mut playback) = setup();
        let outcome = dispatch(&KeyEvent::new(KeyCode::Char('A')), &store, &mut playback);
        assert_eq!(
            outcome,
            DispatchOutcome::Played {
                token: "a".into(),
                clip: "Airhorn".into()
            }
        );
        assert_eq!(playback.played, vec!["Airhorn"]);
    }

    #[test]
    fn space_stops_everything() {
        let (store, mut playback) = setup();
        let outcome = dispatch(&KeyEvent::new(KeyCode::Space), &store, &mut playback);
        assert_eq!(outcome, DispatchOutcome::StoppedAll);
        assert_eq!(playback.stop_count, 1);
    }

    #[test]
    fn repeats_are_ignored() {
        let (store, mut playback) = setup();
        let mut ev = KeyEvent::new(KeyCode::F(1));
        ev.repeat = true;
        assert_eq!(dispatch(&ev, &store, &mut playback), DispatchOutcome::IgnoredRepeat);
        assert!(playback.played.is_empty());
    }

    #[test]
    fn ctrl_combinations_are_ignored() {
        let (store, mut playback) = setup();
        let mut ev = KeyEvent::new(KeyCode::Char('a'));
        ev.modifiers = Modifiers {
            ctrl: true,
            ..Modifiers::default()
        };
        assert_eq!(dispatch(&ev, &store, &mut playback), DispatchOutcome::IgnoredModifier);
        assert!(playback.played.is_empty());
    }

    #[test]
    fn unbound_key_is_a_no_op() {
        let (store, mut playback) = setup();
        let outcome = dispatch(&KeyEvent::new(KeyCode::Char('z')), &store, &mut playback);
        assert_eq!(outcome, DispatchOutcome::Unbound("z".into()));
        assert!(playback.played.is_empty());
        assert_eq!(playback.stop_count, 0);
    }

    #[test]
    fn keys_without_token_are_ignored() {
        let (store, mut playback) = setup();
        let outcome = dispatch(&KeyEvent::new(KeyCode::Other), &store, &mut playback);
        assert_eq!(outcome, DispatchOutcome::IgnoredKey);
    }

    #[test]
    fn playback_failure_is_reported_not_raised() {
        let (store, mut playback) = setup();
        playback.current = None;
        let outcome = dispatch(&KeyEvent::new(KeyCode::F(1)), &store, &mut playback);
        assert!(matches!(outcome, DispatchOutcome::PlayFailed { .. }));
    }
}
