//! Virtual audio routing.
//!
//! Voice-chat mode plays clips into a null sink whose monitor is remapped
//! into a virtual microphone, so chat applications hear the soundboard as
//! mic input.  Both devices are created on demand through a
//! [`SoundServer`].

pub mod controller;
pub mod sound_server;

pub use controller::{
    AudioRouteController, RouteError, RouteMode, RouteState, RouteStatus, MAX_MIC_GAIN,
};
pub use sound_server::{PactlServer, SoundServer, SoundServerError, UnavailableServer};

#[cfg(test)]
pub use sound_server::MockSoundServer;
