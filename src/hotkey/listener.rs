//! System-wide key listener using `rdev::listen`.
//!
//! `rdev::listen` is a blocking call that must live on its own OS thread.
//! [`GlobalKeyListener`] owns that thread and a stop flag; dropping it sets
//! the flag so the callback silently ignores further events.
//!
//! rdev reports raw presses and releases only, so the listener tracks which
//! keys are down to flag auto-repeat and which modifiers are held.
//!
//! `rdev::listen` has no graceful shutdown API: after the flag is set the
//! thread stays blocked in the event loop until the process exits.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use rdev::{EventType, Key};
use tokio::sync::mpsc;

use super::{keymap::from_rdev_key, KeyEvent, Modifiers};

// ---------------------------------------------------------------------------
// KeyTracker
// ---------------------------------------------------------------------------

/// Turns a press/release stream into [`KeyEvent`]s.
#[derive(Debug, Default)]
pub(crate) struct KeyTracker {
    /// Keys currently held.  `rdev::Key` is not `Hash`.
    down: Vec<Key>,
}

impl KeyTracker {
    fn modifiers(&self) -> Modifiers {
        let any = |keys: &[Key]| keys.iter().any(|k| self.down.contains(k));
        Modifiers {
            ctrl: any(&[Key::ControlLeft, Key::ControlRight]),
            alt: any(&[Key::Alt, Key::AltGr]),
            shift: any(&[Key::ShiftLeft, Key::ShiftRight]),
            meta: any(&[Key::MetaLeft, Key::MetaRight]),
        }
    }

    /// Feed one raw event; returns a [`KeyEvent`] for presses.
    pub(crate) fn feed(&mut self, event_type: EventType, text: Option<String>) -> Option<KeyEvent> {
        match event_type {
            EventType::KeyPress(key) => {
                let repeat = self.down.contains(&key);
                if !repeat {
                    self.down.push(key);
                }
                Some(KeyEvent {
                    key: from_rdev_key(key),
                    modifiers: self.modifiers(),
                    text,
                    repeat,
                })
            }
            EventType::KeyRelease(key) => {
                self.down.retain(|k| *k != key);
                None
            }
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// GlobalKeyListener
// ---------------------------------------------------------------------------

/// Handle to a running global key listener thread.  Drop it to stop
/// forwarding events.
pub struct GlobalKeyListener {
    stop: Arc<AtomicBool>,
    /// Never joined; `rdev::listen` does not return.
    _thread: std::thread::JoinHandle<()>,
}

impl GlobalKeyListener {
    /// Spawn the listener thread, forwarding every key press on `tx`.
    pub fn start(tx: mpsc::UnboundedSender<KeyEvent>) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let thread = std::thread::Builder::new()
            .name("global-hotkeys".into())
            .spawn(move || {
                let mut tracker = KeyTracker::default();
                let result = rdev::listen(move |event| {
                    if stop_flag.load(Ordering::Relaxed) {
                        return;
                    }
                    if let Some(key_event) = tracker.feed(event.event_type, event.name) {
                        let _ = tx.send(key_event);
                    }
                });

                if let Err(e) = result {
                    log::error!("global-hotkeys: rdev::listen exited with error: {e:?}");
                }
            })?;

        log::info!("global hotkeys enabled");
        Ok(Self {
            stop,
            _thread: thread,
        })
    }
}

impl Drop for GlobalKeyListener {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
