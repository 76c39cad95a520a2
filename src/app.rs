//! Soundboard window — egui/eframe application.
//!
//! # Architecture
//!
//! [`SoundboardApp`] is the top-level [`eframe::App`].  It owns the
//! [`Soundboard`] and turns every widget interaction into a [`Command`]:
//!
//! ```text
//!  widgets ──┐
//!  egui keys ┼─▶ Vec<Command> ──▶ Soundboard::handle ──▶ Vec<Notice> ─▶ banner
//!  rdev keys ┘
//! ```
//!
//! Commands are collected while drawing and applied after the frame's
//! panels are laid out, so drawing only ever needs `&Soundboard`.
//!
//! # Layout
//!
//! | Panel | Contents |
//! |-------|----------|
//! | top | category ribbon, URL field |
//! | centre | notices, clip button grid |
//! | bottom | output device, voice chat, stop all, volume, mic gain |

use std::time::{Duration, Instant};

use eframe::egui;
use tokio::sync::mpsc;

use crate::config::UiSettings;
use crate::controller::{Command, Notice, Soundboard};
use crate::hotkey::{from_egui_key, token_for, GlobalKeyListener, KeyEvent, Modifiers};
use crate::library::{is_system_category, Clip, ALL_CATEGORY};
use crate::routing::{RouteMode, RouteStatus, MAX_MIC_GAIN};

/// How long a notice stays in the banner.
const NOTICE_TTL: Duration = Duration::from_secs(8);
const CLIP_BUTTON_SIZE: [f32; 2] = [150.0, 52.0];

const COLOR_INFO: egui::Color32 = egui::Color32::from_rgb(68, 136, 255);
const COLOR_WARN: egui::Color32 = egui::Color32::from_rgb(255, 136, 68);
const COLOR_READY: egui::Color32 = egui::Color32::from_rgb(80, 200, 120);
const COLOR_DIM: egui::Color32 = egui::Color32::from_rgb(140, 140, 140);
const COLOR_FAVORITE: egui::Color32 = egui::Color32::from_rgb(255, 200, 60);
const COLOR_DANGER: egui::Color32 = egui::Color32::from_rgb(255, 80, 80);

// ---------------------------------------------------------------------------
// GlobalKeys
// ---------------------------------------------------------------------------

/// Running rdev listener plus the receiving end of its channel.
struct GlobalKeys {
    _listener: GlobalKeyListener,
    rx: mpsc::UnboundedReceiver<KeyEvent>,
}

impl GlobalKeys {
    fn start() -> std::io::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let listener = GlobalKeyListener::start(tx)?;
        Ok(Self {
            _listener: listener,
            rx,
        })
    }
}

// ---------------------------------------------------------------------------
// SoundboardApp
// ---------------------------------------------------------------------------

pub struct SoundboardApp {
    board: Soundboard,

    // ── UI state ─────────────────────────────────────────────────────────
    /// Category whose clips the grid shows.
    category: String,
    url_input: String,
    new_category: String,
    /// Clip waiting for a key press to bind.
    binding: Option<String>,
    always_on_top: bool,
    /// Slider positions; committed to the board when a drag ends.
    volume: f32,
    mic_gain: u16,
    /// Output device labels, refreshed on demand.
    devices: Vec<String>,

    notices: Vec<(Notice, Instant)>,
    global_keys: Option<GlobalKeys>,
}

impl SoundboardApp {
    /// Wrap an already started board.  `startup_notices` are shown in the
    /// banner on the first frame.
    pub fn new(board: Soundboard, startup_notices: Vec<Notice>, ui: &UiSettings) -> Self {
        let mut app = Self {
            category: ALL_CATEGORY.to_string(),
            url_input: String::new(),
            new_category: String::new(),
            binding: None,
            always_on_top: ui.always_on_top,
            volume: board.volume(),
            mic_gain: board.mic_gain(),
            devices: board.output_devices(),
            notices: Vec::new(),
            global_keys: None,
            board,
        };
        app.push_notices(startup_notices);

        if ui.global_hotkeys {
            match GlobalKeys::start() {
                Ok(keys) => app.global_keys = Some(keys),
                Err(e) => app.push_notices(vec![Notice::Warning(format!(
                    "Global hotkeys unavailable: {e}"
                ))]),
            }
        }
        app
    }

    // ── Commands / notices ───────────────────────────────────────────────

    fn apply(&mut self, cmd: Command) {
        let deleted_category = match &cmd {
            Command::DeleteCategory(name) => Some(name.clone()),
            _ => None,
        };

        let notices = self.board.handle(cmd);

        if deleted_category.as_deref() == Some(self.category.as_str())
            && !self.board.store().categories().contains(&self.category)
        {
            self.category = ALL_CATEGORY.to_string();
        }
        self.push_notices(notices);
    }

    fn push_notices(&mut self, notices: Vec<Notice>) {
        let now = Instant::now();
        for notice in notices {
            log::debug!("notice: {}", notice.text());
            self.notices.push((notice, now));
        }
    }

    // ── Input ────────────────────────────────────────────────────────────

    /// Forward window key presses and pasted text.  Skipped entirely while a
    /// text field has focus so typing never fires clips.
    fn handle_input(&mut self, ctx: &egui::Context) {
        if ctx.wants_keyboard_input() {
            return;
        }

        let events = ctx.input(|i| i.events.clone());
        for event in events {
            match event {
                egui::Event::Key {
                    key,
                    pressed: true,
                    repeat,
                    modifiers,
                    ..
                } => {
                    let event = key_event(key, repeat, modifiers);
                    if self.capture_binding(&event) {
                        continue;
                    }
                    // The rdev listener already sees focused presses.
                    if self.global_keys.is_none() {
                        self.apply(Command::Key(event));
                    }
                }
                // Paste & Add: clipboard text pasted outside a text field.
                egui::Event::Paste(text) if self.binding.is_none() => {
                    self.apply(Command::SubmitUrl(text));
                }
                _ => {}
            }
        }
    }

    /// Returns `true` when `event` was consumed by a pending hotkey binding.
    fn capture_binding(&mut self, event: &KeyEvent) -> bool {
        let Some(clip) = self.binding.clone() else {
            return false;
        };
        if event.repeat || event.modifiers.blocks_hotkeys() {
            return true;
        }
        if let Some(token) = token_for(event) {
            self.binding = None;
            self.apply(Command::BindHotkey { token, clip });
        }
        true
    }

    fn poll_global_keys(&mut self, ctx: &egui::Context) {
        let Some(keys) = self.global_keys.as_mut() else {
            return;
        };
        let mut events = Vec::new();
        while let Ok(event) = keys.rx.try_recv() {
            events.push(event);
        }

        // Typing into our own text fields, or capturing a binding.
        if self.binding.is_some() || ctx.wants_keyboard_input() {
            return;
        }
        for event in events {
            self.apply(Command::Key(event));
        }
    }

    fn set_always_on_top(&mut self, ctx: &egui::Context, on_top: bool) {
        self.always_on_top = on_top;
        let level = if on_top {
            egui::WindowLevel::AlwaysOnTop
        } else {
            egui::WindowLevel::Normal
        };
        ctx.send_viewport_cmd(egui::ViewportCommand::WindowLevel(level));
    }

    // ── Drawing ──────────────────────────────────────────────────────────

    fn draw_categories(&mut self, ui: &mut egui::Ui, commands: &mut Vec<Command>) {
        ui.horizontal_wrapped(|ui| {
            for name in self.board.store().categories() {
                if ui
                    .selectable_label(self.category == *name, name.as_str())
                    .clicked()
                {
                    self.category = name.clone();
                }
            }

            ui.separator();

            let edit = ui.add(
                egui::TextEdit::singleline(&mut self.new_category)
                    .hint_text("New category")
                    .desired_width(120.0),
            );
            let entered = edit.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            if (ui.button("+").clicked() || entered) && !self.new_category.trim().is_empty() {
                commands.push(Command::CreateCategory(
                    self.new_category.trim().to_string(),
                ));
                self.new_category.clear();
            }

            if !is_system_category(&self.category)
                && ui
                    .button(egui::RichText::new("Delete category").color(COLOR_DANGER))
                    .clicked()
            {
                commands.push(Command::DeleteCategory(self.category.clone()));
            }
        });
    }

    fn draw_add_clip(&mut self, ui: &mut egui::Ui, commands: &mut Vec<Command>) {
        ui.horizontal(|ui| {
            ui.label("Add from URL:");
            let edit = ui.add(
                egui::TextEdit::singleline(&mut self.url_input)
                    .hint_text("https://www.myinstants.com/en/instant/...")
                    .desired_width((ui.available_width() - 140.0).max(120.0)),
            );
            let entered = edit.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            if (ui.button("Add").clicked() || entered) && !self.url_input.trim().is_empty() {
                commands.push(Command::SubmitUrl(std::mem::take(&mut self.url_input)));
            }
            if ui
                .button("Rescan")
                .on_hover_text("Reload the clip folder")
                .clicked()
            {
                commands.push(Command::Rescan);
            }
        });
        ui.label(
            egui::RichText::new("Tip: press Ctrl+V anywhere in the window to paste & add a link")
                .small()
                .color(COLOR_DIM),
        );
    }

    fn draw_notices(&mut self, ui: &mut egui::Ui) {
        let mut dismissed = None;
        for (i, (notice, _)) in self.notices.iter().enumerate() {
            let color = match notice {
                Notice::Info(_) => COLOR_INFO,
                Notice::Warning(_) => COLOR_WARN,
            };
            ui.horizontal(|ui| {
                ui.label(egui::RichText::new(notice.text()).color(color));
                if ui.small_button("x").clicked() {
                    dismissed = Some(i);
                }
            });
        }
        if let Some(i) = dismissed {
            self.notices.remove(i);
        }
        if !self.notices.is_empty() {
            ui.separator();
        }
    }

    fn draw_grid(&mut self, ui: &mut egui::Ui, commands: &mut Vec<Command>) {
        let clips = self.board.visible_clips(&self.category);
        if clips.is_empty() {
            ui.centered_and_justified(|ui| {
                ui.label(egui::RichText::new("No sounds here yet").color(COLOR_DIM));
            });
            return;
        }

        egui::ScrollArea::vertical().show(ui, |ui| {
            ui.horizontal_wrapped(|ui| {
                for clip in &clips {
                    let label = self.button_label(clip);
                    let response = ui.add_sized(CLIP_BUTTON_SIZE, egui::Button::new(label));
                    if response.clicked() {
                        commands.push(Command::Play(clip.display_name.clone()));
                    }
                    response.context_menu(|ui| self.clip_menu(ui, clip, commands));
                }
            });
        });
    }

    fn button_label(&self, clip: &Clip) -> egui::RichText {
        let hotkeys = self.board.store().hotkeys_for(&clip.display_name);
        let mut text = if clip.favorite {
            format!("★ {}", clip.display_name)
        } else {
            clip.display_name.clone()
        };
        if !hotkeys.is_empty() {
            text.push_str(&format!("\n[{}]", hotkeys.join(", ")));
        }

        let label = egui::RichText::new(text);
        if clip.favorite {
            label.color(COLOR_FAVORITE)
        } else {
            label
        }
    }

    fn clip_menu(&mut self, ui: &mut egui::Ui, clip: &Clip, commands: &mut Vec<Command>) {
        let name = &clip.display_name;

        let favorite = if clip.favorite { "Unfavorite" } else { "Favorite" };
        if ui.button(favorite).clicked() {
            commands.push(Command::ToggleFavorite(name.clone()));
            ui.close_menu();
        }

        if ui.button("Bind hotkey…").clicked() {
            self.binding = Some(name.clone());
            ui.close_menu();
        }

        let categories: Vec<String> = self
            .board
            .store()
            .categories()
            .iter()
            .filter(|c| c.as_str() != ALL_CATEGORY)
            .cloned()
            .collect();
        ui.menu_button("Move to", |ui| {
            for category in categories {
                if ui
                    .radio(clip.category == category, category.as_str())
                    .clicked()
                {
                    commands.push(Command::MoveClip {
                        clip: name.clone(),
                        category,
                    });
                    ui.close_menu();
                }
            }
        });

        ui.separator();
        if ui
            .button(egui::RichText::new("Delete").color(COLOR_DANGER))
            .clicked()
        {
            commands.push(Command::DeleteClip(name.clone()));
            ui.close_menu();
        }
    }

    fn draw_binding_window(&mut self, ctx: &egui::Context) {
        let Some(clip) = self.binding.clone() else {
            return;
        };

        let mut cancelled = false;
        egui::Window::new("Bind hotkey")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(format!("Press a key for '{clip}'"));
                ui.label(
                    egui::RichText::new("Space is reserved for stop all")
                        .small()
                        .color(COLOR_DIM),
                );
                if ui.button("Cancel").clicked() {
                    cancelled = true;
                }
            });

        if cancelled {
            self.binding = None;
        }
    }

    fn draw_controls(&mut self, ui: &mut egui::Ui, ctx: &egui::Context, commands: &mut Vec<Command>) {
        let state = self.board.route_state().clone();
        let ready = self.board.routing_ready();
        let voice_chat = state.mode == RouteMode::VoiceChat;

        ui.horizontal(|ui| {
            ui.label("Output:");
            ui.add_enabled_ui(!voice_chat, |ui| {
                egui::ComboBox::from_id_salt("output_device")
                    .selected_text(state.selected_device.as_str())
                    .width(220.0)
                    .show_ui(ui, |ui| {
                        for device in &self.devices {
                            if ui
                                .selectable_label(state.selected_device == *device, device.as_str())
                                .clicked()
                            {
                                commands.push(Command::SelectOutput(device.clone()));
                            }
                        }
                    });
            });
            if ui.button("⟳").on_hover_text("Refresh devices").clicked() {
                self.devices = self.board.output_devices();
            }

            let mut enabled = voice_chat;
            let toggle = ui
                .add_enabled(ready, egui::Checkbox::new(&mut enabled, "Voice chat"))
                .on_hover_text("Play sounds into the virtual microphone")
                .on_disabled_hover_text("Virtual audio devices are unavailable");
            if toggle.changed() {
                commands.push(Command::SetVoiceChat(enabled));
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui
                    .button(egui::RichText::new("■ Stop all").color(COLOR_DANGER))
                    .on_hover_text("Space")
                    .clicked()
                {
                    commands.push(Command::StopAll);
                }
            });
        });

        ui.horizontal(|ui| {
            let volume = ui.add(egui::Slider::new(&mut self.volume, 0.0..=1.0).text("Volume"));
            if committed(&volume) {
                commands.push(Command::SetVolume(self.volume));
            }

            let mic = ui.add_enabled(
                ready,
                egui::Slider::new(&mut self.mic_gain, 0..=MAX_MIC_GAIN)
                    .suffix("%")
                    .text("Mic gain"),
            );
            if committed(&mic) {
                commands.push(Command::SetMicGain(self.mic_gain));
            }

            let mut on_top = self.always_on_top;
            if ui.checkbox(&mut on_top, "Always on top").changed() {
                self.set_always_on_top(ctx, on_top);
            }
        });

        ui.horizontal(|ui| {
            let (color, text) = match state.status {
                RouteStatus::Ready => (
                    COLOR_READY,
                    format!("Virtual mic: {}", self.board.virtual_source_name()),
                ),
                RouteStatus::Degraded => (COLOR_WARN, "Voice chat unavailable".to_string()),
                RouteStatus::Uninitialized | RouteStatus::Probing => {
                    (COLOR_DIM, "Preparing virtual devices…".to_string())
                }
            };
            ui.label(egui::RichText::new("●").color(color));
            ui.label(egui::RichText::new(text).color(COLOR_DIM));
            ui.label(
                egui::RichText::new(format!("{} sounds", self.board.store().len()))
                    .small()
                    .color(COLOR_DIM),
            );
        });
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn key_event(key: egui::Key, repeat: bool, modifiers: egui::Modifiers) -> KeyEvent {
    KeyEvent {
        key: from_egui_key(key),
        modifiers: Modifiers {
            ctrl: modifiers.ctrl,
            alt: modifiers.alt,
            shift: modifiers.shift,
            meta: modifiers.mac_cmd,
        },
        text: None,
        repeat,
    }
}

/// A slider value is committed when a drag ends or on a non-drag change
/// (click, keyboard), so the sound server is not called every frame.
fn committed(response: &egui::Response) -> bool {
    response.drag_stopped() || (response.changed() && !response.dragged())
}

// ---------------------------------------------------------------------------
// eframe::App impl
// ---------------------------------------------------------------------------

impl eframe::App for SoundboardApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // --- Background results --------------------------------------------
        let finished = self.board.poll_ingest();
        self.push_notices(finished);
        self.poll_global_keys(ctx);
        self.handle_input(ctx);
        self.notices.retain(|(_, at)| at.elapsed() < NOTICE_TTL);

        // Ingest results and global keys arrive without input events.
        ctx.request_repaint_after(Duration::from_millis(100));

        let mut commands = Vec::new();

        egui::TopBottomPanel::top("categories").show(ctx, |ui| {
            self.draw_categories(ui, &mut commands);
            ui.separator();
            self.draw_add_clip(ui, &mut commands);
        });

        egui::TopBottomPanel::bottom("controls")
            .frame(
                egui::Frame::new()
                    .fill(ctx.style().visuals.panel_fill)
                    .inner_margin(egui::Margin::same(8)),
            )
            .show(ctx, |ui| self.draw_controls(ui, ctx, &mut commands));

        egui::CentralPanel::default().show(ctx, |ui| {
            self.draw_notices(ui);
            self.draw_grid(ui, &mut commands);
        });

        self.draw_binding_window(ctx);

        for cmd in commands {
            self.apply(cmd);
        }
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.board.shutdown();
        log::info!("soundboard closing");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::KeyCode;

    #[test]
    fn egui_modifiers_are_translated() {
        let mods = egui::Modifiers {
            ctrl: true,
            ..Default::default()
        };
        let event = key_event(egui::Key::A, false, mods);
        assert_eq!(event.key, KeyCode::Char('a'));
        assert!(event.modifiers.blocks_hotkeys());

        let event = key_event(egui::Key::A, true, egui::Modifiers::SHIFT);
        assert!(event.repeat);
        assert!(!event.modifiers.blocks_hotkeys());
    }

    #[test]
    fn function_keys_yield_tokens() {
        let event = key_event(egui::Key::F5, false, egui::Modifiers::NONE);
        assert_eq!(token_for(&event).as_deref(), Some("f5"));
    }
}
