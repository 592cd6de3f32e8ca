use beatviz_core::catalog::{format_clock, progress_fraction, AudioFeatures};
use beatviz_core::{Mode, TrackInfo};
use eframe::egui::{self, Color32, RichText};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UiAction {
    Search,
    Select(usize),
    Play,
    Pause,
    Volume(f32),
}

/// Playhead for the now-playing card, in milliseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Progress {
    pub position_ms: u64,
    pub duration_ms: u64,
}

impl Progress {
    pub fn label(self) -> String {
        format!(
            "{} / {}",
            format_clock(self.position_ms),
            format_clock(self.duration_ms)
        )
    }
}

pub struct PanelModel {
    pub query: String,
    pub results: Vec<TrackInfo>,
    pub searching: bool,
    pub badge: String,
    pub status: Option<String>,
    pub selected: Option<usize>,
    pub volume: f32,
    pub mode: Mode,
    pub remote_enabled: bool,
    pub track: Option<TrackInfo>,
    pub features: Option<AudioFeatures>,
    pub progress: Option<Progress>,
}

impl PanelModel {
    pub fn new(seed_query: &str, remote_enabled: bool) -> Self {
        Self {
            query: seed_query.to_string(),
            results: Vec::new(),
            searching: false,
            badge: "Not logged in".to_string(),
            status: None,
            selected: None,
            volume: 0.8,
            mode: Mode::Idle,
            remote_enabled,
            track: None,
            features: None,
            progress: None,
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
        self.track = Some(track.clone());
        self.features = None;
        self.progress = None;
    }
}

pub fn side_panel(ui: &mut egui::Ui, model: &mut PanelModel) -> Option<UiAction> {
    let mut action = None;

    ui.horizontal(|ui| {
        ui.heading("🎵 beatviz");
        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            ui.label(RichText::new(&model.badge).weak());
        });
    });
    ui.separator();

    ui.horizontal(|ui| {
        let edit = ui.add(egui::TextEdit::singleline(&mut model.query).hint_text("Search tracks"));
        let submitted = edit.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
        if ui
            .add_enabled(!model.searching, egui::Button::new("🔍 Search"))
            .clicked()
            || submitted
        {
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
    });
    let mut volume = model.volume;
    if ui
        .add(egui::Slider::new(&mut volume, 0.0..=1.0).text("Volume"))
        .changed()
    {
        model.volume = volume;
        action = Some(UiAction::Volume(volume));
    }

    now_playing(ui, model);

    if let Some(status) = &model.status {
        ui.colored_label(Color32::from_rgb(230, 160, 60), status);
    }
    ui.separator();

    egui::ScrollArea::vertical().show(ui, |ui| {
        if model.searching {
            ui.spinner();
        }
        for (i, track) in model.results.iter().enumerate() {
            let is_selected = model.selected == Some(i);
            ui.horizontal(|ui| {
                cover(ui, track.cover_url.as_deref(), 40.0);
                let text = RichText::new(format!("{}\n{}", track.name, track.artists));
                if ui.selectable_label(is_selected, text).clicked() {
                    action = Some(UiAction::Select(i));
                }
                if !track.has_preview() {
                    let marker = if model.remote_enabled { "remote only" } else { "No preview" };
                    ui.label(RichText::new(marker).small().weak());
                }
            });
        }
    });

    action
}

fn now_playing(ui: &mut egui::Ui, model: &PanelModel) {
    let Some(track) = &model.track else {
        ui.label(RichText::new("Nothing selected").weak());
        return;
    };
    ui.group(|ui| {
        ui.horizontal(|ui| {
            cover(ui, track.cover_url.as_deref(), 64.0);
            ui.vertical(|ui| {
                ui.label(RichText::new(&track.name).strong());
                ui.label(&track.artists);
            });
        });
        if let Some(progress) = model.progress {
            ui.add(
                egui::ProgressBar::new(progress_fraction(progress.position_ms, progress.duration_ms))
                    .text(progress.label()),
            );
        }
        ui.label(format!("Mode: {}", model.mode.label()));
        if let Some(f) = &model.features {
            egui::Grid::new("features").num_columns(2).show(ui, |ui| {
                ui.label("Tempo");
                ui.label(format!("{:.0} BPM", f.tempo));
                ui.end_row();
                ui.label("Key");
                ui.label(format!("{} {}", f.key_name(), f.mode_name()));
                ui.end_row();
                ui.label("Energy");
                ui.add(egui::ProgressBar::new(f.energy as f32));
                ui.end_row();
                ui.label("Danceability");
                ui.add(egui::ProgressBar::new(f.danceability as f32));
                ui.end_row();
                ui.label("Valence");
                ui.add(egui::ProgressBar::new(f.valence as f32));
                ui.end_row();
            });
        }
    });
}

/// Album art through the installed image loaders, or an empty square.
fn cover(ui: &mut egui::Ui, url: Option<&str>, side: f32) {
    let size = egui::vec2(side, side);
    if let Some(url) = url {
        ui.add(egui::Image::new(url).fit_to_exact_size(size).corner_radius(4.0));
    } else {
        ui.allocate_space(size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn progress_label_uses_minutes_and_seconds() {
        let p = Progress {
            position_ms: 65_400,
            duration_ms: 30_000,
        };
        assert_eq!(p.label(), "1:05 / 0:30");
    }

    #[test]
    fn search_runs_once_until_results_arrive() {
        let mut model = PanelModel::new(" Daft Punk", true);
        assert_eq!(model.begin_search().as_deref(), Some("Daft Punk"));
        assert_eq!(model.begin_search(), None);
        model.searching = false;
        model.query.clear();
        assert_eq!(model.begin_search(), None);
    }

    #[test]
    fn selecting_a_track_resets_details() {
        let mut model = PanelModel::new("seed", false);
        model.features = Some(AudioFeatures::default());
        model.progress = Some(Progress::default());
        let track = TrackInfo {
            id: "t".into(),
            name: "Song".into(),
            ..TrackInfo::default()
        };
        model.show_track(&track);
        assert_eq!(model.track.as_ref().map(|t| t.name.as_str()), Some("Song"));
        assert!(model.features.is_none());
        assert!(model.progress.is_none());
    }

    #[test]
    fn panel_renders_cover_art_without_acting() {
        let track = TrackInfo {
            id: "t".into(),
            name: "Song".into(),
            cover_url: Some("https://i.scdn.co/image/abc".into()),
            ..TrackInfo::default()
        };
        let mut model = PanelModel::new("seed", true);
        model.results = vec![track.clone(), TrackInfo::default()];
        model.show_track(&track);

        let ctx = egui::Context::default();
        let mut action = None;
        let output = ctx.run(egui::RawInput::default(), |ctx| {
            egui::CentralPanel::default().show(ctx, |ui| {
                action = side_panel(ui, &mut model);
            });
        });
        assert_eq!(action, None);
        assert!(!output.shapes.is_empty());
    }
}
