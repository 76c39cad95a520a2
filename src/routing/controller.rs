//! [`AudioRouteController`] — virtual device provisioning and output
//! selection.
//!
//! ```text
//!  Uninitialized ──ensure_virtual_devices──▶ Probing ──┬──▶ Ready
//!                                                      └──▶ Degraded
//! ```
//!
//! `Degraded` only blocks voice-chat mode and mic gain; playback to physical
//! devices keeps working.

use std::time::Instant;

use thiserror::Error;

use crate::config::RoutingSettings;
use crate::playback::{OutputTarget, Playback, SYSTEM_DEFAULT_DEVICE};

use super::sound_server::{SoundServer, SoundServerError};

/// Upper limit of the virtual microphone gain, in percent.
pub const MAX_MIC_GAIN: u16 = 200;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteStatus {
    Uninitialized,
    Probing,
    Ready,
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMode {
    /// Sounds go to the selected physical device.
    Normal,
    /// Sounds go to the virtual sink, heard by chat apps as a microphone.
    VoiceChat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteState {
    pub status: RouteStatus,
    pub mode: RouteMode,
    /// Device-list label the user picked.  Remembered across voice-chat mode.
    pub selected_device: String,
    /// Last gain successfully applied to the virtual source.
    pub mic_gain: Option<u16>,
}

impl Default for RouteState {
    fn default() -> Self {
        Self {
            status: RouteStatus::Uninitialized,
            mode: RouteMode::Normal,
            selected_device: SYSTEM_DEFAULT_DEVICE.to_string(),
            mic_gain: None,
        }
    }
}

// ---------------------------------------------------------------------------
// RouteError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("virtual audio routing is unavailable")]
    RoutingUnavailable,

    #[error("could not switch output to '{device}' ({reason}); using system default")]
    DeviceSwitchFailed { device: String, reason: String },

    #[error("virtual devices did not appear within {0:?}")]
    SettleTimeout(std::time::Duration),

    #[error(transparent)]
    Server(#[from] SoundServerError),
}

// ---------------------------------------------------------------------------
// AudioRouteController
// ---------------------------------------------------------------------------

pub struct AudioRouteController {
    server: Box<dyn SoundServer>,
    settings: RoutingSettings,
    state: RouteState,
}

impl AudioRouteController {
    pub fn new(server: Box<dyn SoundServer>, settings: RoutingSettings) -> Self {
        Self {
            server,
            settings,
            state: RouteState::default(),
        }
    }

    pub fn state(&self) -> &RouteState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state.status == RouteStatus::Ready
    }

    /// Name other applications should pick as their microphone.
    pub fn virtual_source_name(&self) -> &str {
        &self.settings.virtual_source_name
    }

    // ── Provisioning ──────────────────────────────────────────────────────

    /// Make sure the virtual sink and microphone exist, creating them when
    /// missing.  Returns `Ok(true)` when anything was created.
    ///
    /// The server gives no signal when a new module has registered, so this
    /// polls the device lists with a doubling interval until both names show
    /// up or `settle_timeout` passes.  Blocks the calling thread.
    pub fn ensure_virtual_devices(&mut self) -> Result<bool, RouteError> {
        if !self.server.is_available() {
            self.state.status = RouteStatus::Degraded;
            return Err(RouteError::RoutingUnavailable);
        }

        self.state.status = RouteStatus::Probing;
        match self.provision() {
            Ok(created) => {
                self.state.status = RouteStatus::Ready;
                Ok(created)
            }
            Err(e) => {
                log::warn!("virtual routing degraded: {e}");
                self.state.status = RouteStatus::Degraded;
                Err(e)
            }
        }
    }

    fn provision(&mut self) -> Result<bool, RouteError> {
        let sink = self.settings.virtual_sink_name.clone();
        let source = self.settings.virtual_source_name.clone();

        let (has_sink, has_source) = self.device_presence()?;
        let mut created = false;

        if !has_sink {
            log::info!("creating virtual sink '{sink}'");
            self.server.load_null_sink(&sink)?;
            created = true;
        }
        if !has_source {
            if !has_sink {
                // The remap source needs the sink's monitor to exist.
                self.wait_for(|sinks, _| sinks.iter().any(|s| *s == sink))?;
            }
            log::info!("creating virtual microphone '{source}'");
            self.server.load_remap_source(
                &format!("{sink}.monitor"),
                &source,
                &self.settings.virtual_source_description(),
            )?;
            created = true;
        }

        if created {
            self.wait_for(|sinks, sources| {
                sinks.iter().any(|s| *s == sink) && sources.iter().any(|s| *s == source)
            })?;
        }
        Ok(created)
    }

    fn device_presence(&self) -> Result<(bool, bool), RouteError> {
        let sinks = self.server.list_sinks()?;
        let sources = self.server.list_sources()?;
        Ok((
            sinks.contains(&self.settings.virtual_sink_name),
            sources.contains(&self.settings.virtual_source_name),
        ))
    }

    fn wait_for<F>(&self, mut ready: F) -> Result<(), RouteError>
    where
        F: FnMut(&[String], &[String]) -> bool,
    {
        self.poll_until(|server| {
            let sinks = server.list_sinks()?;
            let sources = server.list_sources()?;
            Ok(ready(&sinks, &sources))
        })
    }

    /// Re-run `check` with a doubling interval until it reports `true` or
    /// `settle_timeout` passes.
    fn poll_until<F>(&self, mut check: F) -> Result<(), RouteError>
    where
        F: FnMut(&dyn SoundServer) -> Result<bool, SoundServerError>,
    {
        let timeout = self.settings.settle_timeout();
        let deadline = Instant::now() + timeout;
        let mut interval = self.settings.poll_interval();

        loop {
            if check(self.server.as_ref())? {
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(RouteError::SettleTimeout(timeout));
            }
            std::thread::sleep(interval.min(deadline - now));
            interval = interval.saturating_mul(2);
        }
    }

    /// Move this process's playback streams onto `sink`, waiting for the
    /// freshly opened stream to register with the server.
    fn move_streams_to(&self, sink: &str) -> Result<(), RouteError> {
        let pid = std::process::id();
        self.poll_until(|server| Ok(server.move_process_streams(pid, sink)? > 0))
    }

    // ── Output selection ──────────────────────────────────────────────────

    /// "System Default" followed by the platform's output devices.
    pub fn list_output_devices(&self, playback: &dyn Playback) -> Vec<String> {
        playback.output_devices()
    }

    /// Remember `label` as the physical output and switch to it unless
    /// voice-chat mode currently owns the output.
    pub fn set_output_target(
        &mut self,
        label: &str,
        playback: &mut dyn Playback,
    ) -> Result<(), RouteError> {
        self.state.selected_device = label.to_string();
        if self.state.mode == RouteMode::VoiceChat {
            log::debug!("voice chat active; '{label}' stored for later");
            return Ok(());
        }
        self.open_selected(playback)
    }

    fn open_selected(&mut self, playback: &mut dyn Playback) -> Result<(), RouteError> {
        let target = OutputTarget::from_label(&self.state.selected_device);
        match playback.open_output(&target) {
            Ok(()) => Ok(()),
            Err(e) => {
                let device = self.state.selected_device.clone();
                log::warn!("output switch to '{device}' failed: {e}");
                if target != OutputTarget::Default {
                    if let Err(e) = playback.open_output(&OutputTarget::Default) {
                        log::error!("default output also failed: {e}");
                    }
                }
                self.state.selected_device = SYSTEM_DEFAULT_DEVICE.to_string();
                Err(RouteError::DeviceSwitchFailed {
                    device,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Route playback to the virtual sink (`true`) or back to the selected
    /// physical device (`false`).
    pub fn set_voice_chat_mode(
        &mut self,
        enabled: bool,
        playback: &mut dyn Playback,
    ) -> Result<(), RouteError> {
        if !enabled {
            if self.state.mode == RouteMode::Normal {
                return Ok(());
            }
            self.state.mode = RouteMode::Normal;
            self.open_selected(playback)?;
            self.release_streams();
            return Ok(());
        }

        if !self.is_ready() {
            return Err(RouteError::RoutingUnavailable);
        }

        let sink_name = self.settings.virtual_sink_name.clone();
        let routed = playback
            .open_output(&OutputTarget::VirtualSink(sink_name.clone()))
            .map_err(|e| e.to_string())
            .and_then(|()| self.move_streams_to(&sink_name).map_err(|e| e.to_string()));

        match routed {
            Ok(()) => {
                self.state.mode = RouteMode::VoiceChat;
                log::info!("voice chat mode on");
                Ok(())
            }
            Err(reason) => {
                log::warn!("virtual sink output failed: {reason}");
                // Restore whatever the user had picked.
                let reason = match self.open_selected(playback) {
                    Ok(()) => reason,
                    Err(restore) => {
                        log::error!("restoring output after voice chat failure: {restore}");
                        format!("{reason}; {restore}")
                    }
                };
                Err(RouteError::DeviceSwitchFailed {
                    device: sink_name,
                    reason,
                })
            }
        }
    }

    /// Send a stream opened on the system default back to the server's
    /// default sink; the server may otherwise restore it onto the virtual
    /// sink it was last moved to.
    fn release_streams(&self) {
        if !self.is_ready()
            || OutputTarget::from_label(&self.state.selected_device) != OutputTarget::Default
        {
            return;
        }
        let moved = self
            .server
            .default_sink()
            .and_then(|sink| self.server.move_process_streams(std::process::id(), &sink));
        if let Err(e) = moved {
            log::warn!("could not return playback to the default sink: {e}");
        }
    }

    // ── Mic gain ──────────────────────────────────────────────────────────

    /// Set the virtual microphone's input volume.  Returns the clamped value
    /// that was applied.
    pub fn set_mic_gain(&mut self, percent: u16) -> Result<u16, RouteError> {
        let percent = percent.min(MAX_MIC_GAIN);
        if !self.is_ready() {
            return Err(RouteError::RoutingUnavailable);
        }
        match self
            .server
            .set_source_volume(&self.settings.virtual_source_name, percent)
        {
            Ok(()) => {
                self.state.mic_gain = Some(percent);
                Ok(percent)
            }
            Err(e) => {
                log::warn!("could not set mic gain to {percent}%: {e}");
                Err(e.into())
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
    use crate::playback::MockPlayback;
    use crate::routing::sound_server::{MockSoundServer, UnavailableServer};

    fn fast_settings() -> RoutingSettings {
        RoutingSettings {
            settle_timeout_ms: 200,
            poll_interval_ms: 1,
            ..RoutingSettings::default()
        }
    }

    fn ready_controller() -> AudioRouteController {
        let mut ctl = AudioRouteController::new(Box::new(MockSoundServer::default()), fast_settings());
        ctl.ensure_virtual_devices().expect("provision");
        ctl
    }

    fn degraded_controller() -> AudioRouteController {
        let mut ctl = AudioRouteController::new(Box::new(UnavailableServer), fast_settings());
        assert!(ctl.ensure_virtual_devices().is_err());
        ctl
    }

    // ---- provisioning ----------------------------------------------------

    fn controller_with(server: &MockSoundServer) -> AudioRouteController {
        let mut ctl = AudioRouteController::new(Box::new(server.clone()), fast_settings());
        ctl.ensure_virtual_devices().expect("provision");
        ctl
    }

    #[test]
    fn creates_missing_devices_and_becomes_ready() {
        let server = MockSoundServer::with(|s| s.registration_delay = 2);
        let mut ctl = AudioRouteController::new(Box::new(server.clone()), fast_settings());
        assert_eq!(ctl.state().status, RouteStatus::Uninitialized);

        assert!(ctl.ensure_virtual_devices().expect("provision"));
        assert_eq!(ctl.state().status, RouteStatus::Ready);

        let state = server.state();
        assert_eq!(state.null_sinks_loaded, 1);
        assert_eq!(
            state.remaps_loaded,
            vec![(
                "MemeBoard_Virtual_Output.monitor".to_string(),
                "Virtual_Mic_Remap".to_string(),
                fast_settings().virtual_source_description(),
            )]
        );
    }

    #[test]
    fn provisioning_is_idempotent() {
        let server = MockSoundServer::default();
        let mut ctl = controller_with(&server);

        assert!(!ctl.ensure_virtual_devices().unwrap());
        assert_eq!(ctl.state().status, RouteStatus::Ready);
        assert_eq!(server.state().null_sinks_loaded, 1);
        assert_eq!(server.state().remaps_loaded.len(), 1);
    }

    #[test]
    fn existing_devices_are_left_alone() {
        let server = MockSoundServer::with(|s| {
            s.sinks.push("MemeBoard_Virtual_Output".into());
            s.sources.push("Virtual_Mic_Remap".into());
        });
        let mut ctl = AudioRouteController::new(Box::new(server), fast_settings());
        assert!(!ctl.ensure_virtual_devices().unwrap());
        assert!(ctl.is_ready());
    }

    #[test]
    fn devices_that_never_register_degrade() {
        let server = MockSoundServer::with(|s| s.never_register = true);
        let mut ctl = AudioRouteController::new(Box::new(server), fast_settings());
        assert!(matches!(
            ctl.ensure_virtual_devices(),
            Err(RouteError::SettleTimeout(_))
        ));
        assert_eq!(ctl.state().status, RouteStatus::Degraded);
    }

    #[test]
    fn load_failure_degrades() {
        let server = MockSoundServer::with(|s| s.fail_loads = true);
        let mut ctl = AudioRouteController::new(Box::new(server), fast_settings());
        assert!(matches!(ctl.ensure_virtual_devices(), Err(RouteError::Server(_))));
        assert_eq!(ctl.state().status, RouteStatus::Degraded);
    }

    #[test]
    fn no_server_degrades() {
        let ctl = degraded_controller();
        assert_eq!(ctl.state().status, RouteStatus::Degraded);
    }

    // ---- voice chat ------------------------------------------------------

    #[test]
    fn voice_chat_while_degraded_is_refused() {
        let mut ctl = degraded_controller();
        let mut playback = MockPlayback::with_devices(&["Headphones"]);
        ctl.set_output_target("Headphones", &mut playback).unwrap();

        assert!(matches!(
            ctl.set_voice_chat_mode(true, &mut playback),
            Err(RouteError::RoutingUnavailable)
        ));
        assert_eq!(ctl.state().selected_device, "Headphones");
        assert_eq!(ctl.state().mode, RouteMode::Normal);
        assert_eq!(playback.current, Some(OutputTarget::Device("Headphones".into())));
    }

    #[test]
    fn voice_chat_targets_virtual_sink_and_restores_device() {
        let mut ctl = ready_controller();
        let mut playback = MockPlayback::with_devices(&["Headphones"]);
        ctl.set_output_target("Headphones", &mut playback).unwrap();

        ctl.set_voice_chat_mode(true, &mut playback).unwrap();
        assert_eq!(
            playback.current,
            Some(OutputTarget::VirtualSink("MemeBoard_Virtual_Output".into()))
        );

        ctl.set_voice_chat_mode(false, &mut playback).unwrap();
        assert_eq!(playback.current, Some(OutputTarget::Device("Headphones".into())));
    }

    #[test]
    fn voice_chat_moves_our_stream_onto_the_sink_and_back() {
        let server = MockSoundServer::default();
        let mut ctl = controller_with(&server);
        let mut playback = MockPlayback::default();
        let pid = std::process::id();

        ctl.set_voice_chat_mode(true, &mut playback).unwrap();
        assert_eq!(
            server.state().moves,
            vec![(pid, "MemeBoard_Virtual_Output".to_string())]
        );

        ctl.set_voice_chat_mode(false, &mut playback).unwrap();
        assert_eq!(playback.current, Some(OutputTarget::Default));
        assert_eq!(
            server.state().moves.last(),
            Some(&(pid, "alsa_output.default".to_string()))
        );
    }

    #[test]
    fn stream_that_never_registers_keeps_normal_mode() {
        let server = MockSoundServer::default();
        let mut ctl = controller_with(&server);
        server.state().no_streams = true;
        let mut playback = MockPlayback::with_devices(&["Headphones"]);
        ctl.set_output_target("Headphones", &mut playback).unwrap();

        assert!(matches!(
            ctl.set_voice_chat_mode(true, &mut playback),
            Err(RouteError::DeviceSwitchFailed { .. })
        ));
        assert_eq!(ctl.state().mode, RouteMode::Normal);
        assert_eq!(playback.current, Some(OutputTarget::Device("Headphones".into())));
    }

    #[test]
    fn failed_restore_is_reported_with_the_sink_failure() {
        let mut ctl = ready_controller();
        let mut playback = MockPlayback::with_devices(&["Headphones"]);
        ctl.set_output_target("Headphones", &mut playback).unwrap();
        playback.broken_targets.push(OutputTarget::VirtualSink(
            "MemeBoard_Virtual_Output".into(),
        ));
        playback
            .broken_targets
            .push(OutputTarget::Device("Headphones".into()));

        let err = ctl.set_voice_chat_mode(true, &mut playback).unwrap_err();
        match err {
            RouteError::DeviceSwitchFailed { device, reason } => {
                assert_eq!(device, "MemeBoard_Virtual_Output");
                assert!(reason.contains("Headphones"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(ctl.state().selected_device, SYSTEM_DEFAULT_DEVICE);
        assert_eq!(playback.current, Some(OutputTarget::Default));
    }

    #[test]
    fn device_picked_during_voice_chat_applies_afterwards() {
        let mut ctl = ready_controller();
        let mut playback = MockPlayback::with_devices(&["Speakers", "Headphones"]);
        ctl.set_voice_chat_mode(true, &mut playback).unwrap();

        ctl.set_output_target("Speakers", &mut playback).unwrap();
        assert!(matches!(playback.current, Some(OutputTarget::VirtualSink(_))));

        ctl.set_voice_chat_mode(false, &mut playback).unwrap();
        assert_eq!(playback.current, Some(OutputTarget::Device("Speakers".into())));
    }

    // ---- device switching ------------------------------------------------

    #[test]
    fn failed_switch_falls_back_to_default() {
        let mut ctl = ready_controller();
        let mut playback = MockPlayback::with_devices(&["Broken"]);
        playback
            .broken_targets
            .push(OutputTarget::Device("Broken".into()));

        let err = ctl.set_output_target("Broken", &mut playback).unwrap_err();
        assert!(matches!(err, RouteError::DeviceSwitchFailed { .. }));
        assert_eq!(playback.current, Some(OutputTarget::Default));
        assert_eq!(ctl.state().selected_device, SYSTEM_DEFAULT_DEVICE);
    }

    #[test]
    fn device_list_starts_with_system_default() {
        let ctl = degraded_controller();
        let playback = MockPlayback::default();
        assert_eq!(ctl.list_output_devices(&playback), vec![SYSTEM_DEFAULT_DEVICE]);
    }

    // ---- mic gain --------------------------------------------------------

    #[test]
    fn mic_gain_is_clamped() {
        let server = MockSoundServer::default();
        let mut ctl = controller_with(&server);
        assert_eq!(ctl.set_mic_gain(500).unwrap(), 200);
        assert_eq!(ctl.state().mic_gain, Some(200));
        assert_eq!(server.state().volumes, vec![("Virtual_Mic_Remap".to_string(), 200)]);
    }

    #[test]
    fn mic_gain_failure_leaves_state_unchanged() {
        let mut broken = AudioRouteController::new(
            Box::new(MockSoundServer::with(|s| s.fail_volume = true)),
            fast_settings(),
        );
        broken.ensure_virtual_devices().unwrap();
        let before = broken.state().clone();
        assert!(broken.set_mic_gain(80).is_err());
        assert_eq!(broken.state(), &before);
    }

    #[test]
    fn mic_gain_without_routing_is_refused() {
        let mut ctl = degraded_controller();
        let before = ctl.state().clone();
        assert!(matches!(ctl.set_mic_gain(100), Err(RouteError::RoutingUnavailable)));
        assert_eq!(ctl.state(), &before);
    }
}
