//! Sound-server control surface.
//!
//! [`SoundServer`] is the narrow set of operations the route controller
//! needs.  [`PactlServer`] shells out to `pactl`, which works against both
//! PulseAudio and PipeWire's pulse compatibility layer.
//! [`UnavailableServer`] stands in where no server can be reached.

use std::process::Command;

use thiserror::Error;

// ---------------------------------------------------------------------------
// SoundServerError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SoundServerError {
    #[error("no sound server available")]
    Unavailable,

    #[error("failed to run pactl: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("`pactl {command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
}

// ---------------------------------------------------------------------------
// SoundServer
// ---------------------------------------------------------------------------

pub trait SoundServer: Send {
    /// Whether the server answered at construction time.
    fn is_available(&self) -> bool;

    /// Names of all sinks.
    fn list_sinks(&self) -> Result<Vec<String>, SoundServerError>;

    /// Names of all sources, monitors included.
    fn list_sources(&self) -> Result<Vec<String>, SoundServerError>;

    /// Create a null sink called `name`.
    fn load_null_sink(&self, name: &str) -> Result<(), SoundServerError>;

    /// Create a source `name` that re-exposes `master` as a microphone.
    fn load_remap_source(
        &self,
        master: &str,
        name: &str,
        description: &str,
    ) -> Result<(), SoundServerError>;

    /// Set a source's input volume in percent.
    fn set_source_volume(&self, name: &str, percent: u16) -> Result<(), SoundServerError>;

    /// Name of the sink new streams go to.
    fn default_sink(&self) -> Result<String, SoundServerError>;

    /// Move every playback stream owned by process `pid` onto `sink`.
    /// Returns how many streams were moved.
    fn move_process_streams(&self, pid: u32, sink: &str) -> Result<usize, SoundServerError>;
}

// ---------------------------------------------------------------------------
// PactlServer
// ---------------------------------------------------------------------------

/// [`SoundServer`] backed by the `pactl` command-line tool.
#[derive(Debug, Default)]
pub struct PactlServer;

impl PactlServer {
    /// Return a `pactl` server when `pactl info` succeeds, otherwise an
    /// [`UnavailableServer`].
    pub fn detect() -> Box<dyn SoundServer> {
        match run_pactl(&["info"]) {
            Ok(_) => {
                log::info!("sound server reachable via pactl");
                Box::new(PactlServer)
            }
            Err(e) => {
                log::warn!("pactl unavailable ({e}); virtual routing disabled");
                Box::new(UnavailableServer)
            }
        }
    }
}

fn run_pactl(args: &[&str]) -> Result<String, SoundServerError> {
    log::debug!("pactl {}", args.join(" "));
    let output = Command::new("pactl").args(args).output()?;
    if !output.status.success() {
        return Err(SoundServerError::CommandFailed {
            command: args.join(" "),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Extract the name column from `pactl list short …` output.
pub(crate) fn parse_short_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split('\t').nth(1))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

/// Sink-input ids owned by `pid` in `pactl list sink-inputs` output.
///
/// Each block starts with `Sink Input #<id>`; ownership comes from the
/// `application.process.id = "<pid>"` property.
pub(crate) fn parse_sink_inputs_of(output: &str, pid: u32) -> Vec<u32> {
    let wanted = pid.to_string();
    let mut ids = Vec::new();
    let mut current: Option<u32> = None;

    for line in output.lines() {
        let line = line.trim();
        if let Some(id) = line.strip_prefix("Sink Input #") {
            current = id.trim().parse().ok();
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        if key.trim() == "application.process.id" && value.trim().trim_matches('"') == wanted {
            if let Some(id) = current.take() {
                ids.push(id);
            }
        }
    }
    ids
}

// ── pactl argument builders ──────────────────────────────────────────────

fn null_sink_args(name: &str) -> Vec<String> {
    vec![
        "load-module".into(),
        "module-null-sink".into(),
        format!("sink_name={name}"),
        format!("sink_properties=device.description={name}"),
    ]
}

fn remap_source_args(master: &str, name: &str, description: &str) -> Vec<String> {
    vec![
        "load-module".into(),
        "module-remap-source".into(),
        format!("master={master}"),
        format!("source_name={name}"),
        format!("source_properties=device.description={description}"),
    ]
}

fn source_volume_args(name: &str, percent: u16) -> Vec<String> {
    vec!["set-source-volume".into(), name.into(), format!("{percent}%")]
}

fn move_sink_input_args(id: u32, sink: &str) -> Vec<String> {
    vec!["move-sink-input".into(), id.to_string(), sink.into()]
}

fn run_pactl_owned(args: &[String]) -> Result<String, SoundServerError> {
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    run_pactl(&args)
}

impl SoundServer for PactlServer {
    fn is_available(&self) -> bool {
        true
    }

    fn list_sinks(&self) -> Result<Vec<String>, SoundServerError> {
        run_pactl(&["list", "short", "sinks"]).map(|out| parse_short_list(&out))
    }

    fn list_sources(&self) -> Result<Vec<String>, SoundServerError> {
        run_pactl(&["list", "short", "sources"]).map(|out| parse_short_list(&out))
    }

    fn load_null_sink(&self, name: &str) -> Result<(), SoundServerError> {
        run_pactl_owned(&null_sink_args(name)).map(|_| ())
    }

    fn load_remap_source(
        &self,
        master: &str,
        name: &str,
        description: &str,
    ) -> Result<(), SoundServerError> {
        run_pactl_owned(&remap_source_args(master, name, description)).map(|_| ())
    }

    fn set_source_volume(&self, name: &str, percent: u16) -> Result<(), SoundServerError> {
        run_pactl_owned(&source_volume_args(name, percent)).map(|_| ())
    }

    fn default_sink(&self) -> Result<String, SoundServerError> {
        run_pactl(&["get-default-sink"]).map(|out| out.trim().to_string())
    }

    fn move_process_streams(&self, pid: u32, sink: &str) -> Result<usize, SoundServerError> {
        let listing = run_pactl(&["list", "sink-inputs"])?;
        let ids = parse_sink_inputs_of(&listing, pid);
        for id in &ids {
            run_pactl_owned(&move_sink_input_args(*id, sink))?;
        }
        Ok(ids.len())
    }
}

// ---------------------------------------------------------------------------
// UnavailableServer
// ---------------------------------------------------------------------------

/// Placeholder used when no sound server can be reached.  Every call fails
/// with [`SoundServerError::Unavailable`].
#[derive(Debug, Default)]
pub struct UnavailableServer;

impl SoundServer for UnavailableServer {
    fn is_available(&self) -> bool {
        false
    }

    fn list_sinks(&self) -> Result<Vec<String>, SoundServerError> {
        Err(SoundServerError::Unavailable)
    }

    fn list_sources(&self) -> Result<Vec<String>, SoundServerError> {
        Err(SoundServerError::Unavailable)
    }

    fn load_null_sink(&self, _name: &str) -> Result<(), SoundServerError> {
        Err(SoundServerError::Unavailable)
    }

    fn load_remap_source(&self, _: &str, _: &str, _: &str) -> Result<(), SoundServerError> {
        Err(SoundServerError::Unavailable)
    }

    fn set_source_volume(&self, _name: &str, _percent: u16) -> Result<(), SoundServerError> {
        Err(SoundServerError::Unavailable)
    }

    fn default_sink(&self) -> Result<String, SoundServerError> {
        Err(SoundServerError::Unavailable)
    }

    fn move_process_streams(&self, _pid: u32, _sink: &str) -> Result<usize, SoundServerError> {
        Err(SoundServerError::Unavailable)
    }
}

// ---------------------------------------------------------------------------
// MockSoundServer  (test-only)
// ---------------------------------------------------------------------------

/// Scriptable in-memory sound server.
///
/// Devices created through `load_*` only show up in listings after
/// `registration_delay` further list calls, mimicking a server that takes a
/// moment to register new modules.
///
/// Clones share state, so a test can keep one to inspect what the
/// controller asked for.
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub struct MockSoundServer {
    pub inner: std::sync::Arc<std::sync::Mutex<MockState>>,
}

#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockState {
    pub sinks: Vec<String>,
    pub sources: Vec<String>,
    pub pending_sinks: Vec<String>,
    pub pending_sources: Vec<String>,
    pub registration_delay: usize,
    pub list_calls: usize,
    /// Created devices never appear.
    pub never_register: bool,
    pub fail_loads: bool,
    pub fail_volume: bool,
    pub null_sinks_loaded: usize,
    pub remaps_loaded: Vec<(String, String, String)>,
    pub volumes: Vec<(String, u16)>,
    /// The stream never shows up as a sink input.
    pub no_streams: bool,
    /// `(pid, sink)` for every stream move.
    pub moves: Vec<(u32, String)>,
}

#[cfg(test)]
impl MockSoundServer {
    pub fn with(f: impl FnOnce(&mut MockState)) -> Self {
        let server = Self::default();
        f(&mut server.inner.lock().unwrap());
        server
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.inner.lock().unwrap()
    }

    fn tick(state: &mut MockState) {
        state.list_calls += 1;
        if state.never_register || state.list_calls <= state.registration_delay {
            return;
        }
        let sinks = std::mem::take(&mut state.pending_sinks);
        for sink in sinks {
            state.sources.push(format!("{sink}.monitor"));
            state.sinks.push(sink);
        }
        let sources = std::mem::take(&mut state.pending_sources);
        state.sources.extend(sources);
    }
}

#[cfg(test)]
impl SoundServer for MockSoundServer {
    fn is_available(&self) -> bool {
        true
    }

    fn list_sinks(&self) -> Result<Vec<String>, SoundServerError> {
        let mut s = self.inner.lock().unwrap();
        Self::tick(&mut s);
        Ok(s.sinks.clone())
    }

    fn list_sources(&self) -> Result<Vec<String>, SoundServerError> {
        let s = self.inner.lock().unwrap();
        Ok(s.sources.clone())
    }

    fn load_null_sink(&self, name: &str) -> Result<(), SoundServerError> {
        let mut s = self.inner.lock().unwrap();
        if s.fail_loads {
            return Err(SoundServerError::CommandFailed {
                command: "load-module module-null-sink".into(),
                stderr: "Failure: Module initialization failed".into(),
            });
        }
        s.null_sinks_loaded += 1;
        s.list_calls = 0;
        s.pending_sinks.push(name.to_string());
        Ok(())
    }

    fn load_remap_source(
        &self,
        master: &str,
        name: &str,
        description: &str,
    ) -> Result<(), SoundServerError> {
        let mut s = self.inner.lock().unwrap();
        if s.fail_loads {
            return Err(SoundServerError::CommandFailed {
                command: "load-module module-remap-source".into(),
                stderr: "Failure: Module initialization failed".into(),
            });
        }
        s.remaps_loaded
            .push((master.into(), name.into(), description.into()));
        s.list_calls = 0;
        s.pending_sources.push(name.to_string());
        Ok(())
    }

    fn set_source_volume(&self, name: &str, percent: u16) -> Result<(), SoundServerError> {
        let mut s = self.inner.lock().unwrap();
        if s.fail_volume {
            return Err(SoundServerError::CommandFailed {
                command: "set-source-volume".into(),
                stderr: "No such entity".into(),
            });
        }
        s.volumes.push((name.into(), percent));
        Ok(())
    }

    fn default_sink(&self) -> Result<String, SoundServerError> {
        Ok("alsa_output.default".into())
    }

    fn move_process_streams(&self, pid: u32, sink: &str) -> Result<usize, SoundServerError> {
        let mut s = self.inner.lock().unwrap();
        if s.no_streams {
            return Ok(0);
        }
        s.moves.push((pid, sink.into()));
        Ok(1)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
