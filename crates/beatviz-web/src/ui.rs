use beatviz_core::catalog::now_playing_line;
use beatviz_core::{Mode, TrackInfo};
use eframe::egui::{self, RichText};

/// What the user asked for this frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UiAction {
    Search,
    Select(usize),
    Play,
    Pause,
    Volume(f32),
}

/// Everything the side panel shows or edits.
pub struct PanelModel {
    pub query: String,
    pub results: Vec<TrackInfo>,
    pub searching: bool,
    pub badge: String,
    pub status: Option<String>,
    pub selected: Option<usize>,
    pub volume: f32,
    pub mode: Mode,
    pub remote_ready: bool,
    pub now_playing: Option<String>,
    pub cover: Option<String>,
    /// `position / duration` for the loaded track
    pub clock: Option<String>,
}

impl PanelModel {
    pub fn new(seed_query: &str) -> Self {
        Self {
            query: seed_query.to_string(),
            results: Vec::new(),
            searching: false,
            badge: "Not logged in".to_string(),
            status: None,
            selected: None,
            volume: 0.8,
            mode: Mode::Idle,
            remote_ready: false,
            now_playing: None,
            cover: None,
            clock: None,
        }
    }

    /// Marks a search as running and hands back the trimmed query, unless
    /// the box is blank or a search is already out.
    pub fn begin_search(&mut self) -> Option<String> {
        let query = self.query.trim();
        if query.is_empty() || self.searching {
            return None;
        }
        let query = query.to_string();
        self.searching = true;
        Some(query)
    }

    pub fn show_track(&mut self, track: &TrackInfo) {
        self.now_playing = Some(now_playing_line(track));
        self.cover = track.cover_url.clone();
        self.clock = None;
    }
}

pub fn side_panel(ui: &mut egui::Ui, model: &mut PanelModel) -> Option<UiAction> {
    let mut action = None;

    ui.horizontal(|ui| {
        ui.heading("beatviz");
        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            ui.label(RichText::new(&model.badge).weak());
        });
    });
    ui.separator();

    ui.horizontal(|ui| {
        let edit = ui.add(egui::TextEdit::singleline(&mut model.query).hint_text("Search tracks"));
        let submitted = edit.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
        if ui.add_enabled(!model.searching, egui::Button::new("Search")).clicked() || submitted {
            action = Some(UiAction::Search);
        }
    });

    ui.horizontal(|ui| {
        if ui.button("▶ Play").clicked() {
            action = Some(UiAction::Play);
        }
        if ui.button("⏸ Pause").clicked() {
            action = Some(UiAction::Pause);
        }
        let mut volume = model.volume;
        if ui
            .add(egui::Slider::new(&mut volume, 0.0..=1.0).text("Volume"))
            .changed()
        {
            model.volume = volume;
            action = Some(UiAction::Volume(volume));
        }
    });

    if let Some(line) = &model.now_playing {
        ui.horizontal(|ui| {
            cover(ui, model.cover.as_deref(), 64.0);
            ui.label(RichText::new(line).strong());
        });
    }
    if let Some(clock) = &model.clock {
        ui.monospace(clock);
    }
    ui.label(format!(
        "Mode: {}{}",
        model.mode.label(),
        if model.remote_ready { "" } else { " (web player not ready)" }
    ));
    if let Some(status) = &model.status {
        ui.colored_label(egui::Color32::from_rgb(230, 160, 60), status);
    }
    ui.separator();

    egui::ScrollArea::vertical().show(ui, |ui| {
        if model.searching {
            ui.spinner();
        }
        for (i, track) in model.results.iter().enumerate() {
            let mut text = RichText::new(format!("{}\n{}", track.name, track.artists));
            if model.selected == Some(i) {
                text = text.strong();
            }
            ui.horizontal(|ui| {
                cover(ui, track.cover_url.as_deref(), 40.0);
                if ui.selectable_label(model.selected == Some(i), text).clicked() {
                    action = Some(UiAction::Select(i));
                }
                if !track.has_preview() {
                    ui.label(RichText::new("No preview").small().weak());
                }
            });
        }
    });

    action
}

/// Album art fetched by the installed image loaders, or a blank square.
fn cover(ui: &mut egui::Ui, url: Option<&str>, side: f32) {
    let size = egui::vec2(side, side);
    match url {
        Some(url) => {
            ui.add(egui::Image::new(url).fit_to_exact_size(size).corner_radius(4.0));
        }
        None => {
            ui.allocate_space(size);
        }
    }
}
