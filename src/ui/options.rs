//! Tabbed display options shown under "Show Options".

use eframe::egui;

use crate::app::MainFrame;
use crate::colormap::{CMAPS_IMAGE, CMAPS_MASK, QRANGE};
use crate::config::{CbarTicks, Config, LayerValue, Title};
use crate::layout::{preset, LAYOUT_STRINGS, RESIZINGS};
use crate::spinbox::Spinbox;

use super::sidebar::entry_committed;

const CATALOG_URL: &str = "https://cmap-docs.readthedocs.io/en/latest/catalog/";
const SPIN_WIDTH: f32 = 64.0;
/// Upper limits of the unbounded-looking entries.
const MAX_HEIGHT: f64 = 8192.0;
const MAX_SAMPLES: f64 = 256.0;
const MAX_FONTSIZE: f64 = 200.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum OptionsTab {
    #[default]
    Main,
    Image,
    Mask,
    Overlay,
    Colorbar,
}

const TABS: [(OptionsTab, &str); 5] = [
    (OptionsTab::Main, "Main"),
    (OptionsTab::Image, "Image"),
    (OptionsTab::Mask, "Mask"),
    (OptionsTab::Overlay, "Overlay"),
    (OptionsTab::Colorbar, "Colorbar"),
];

/// A committed change in the options tabs.
#[derive(Debug, Clone, PartialEq)]
enum OptionAction {
    Layout(String),
    Cmap(String, bool),
    Catalog,
    Height(u32),
    MaxSamples(usize),
    EqualHist,
    Qrange { value: f32, is_mask: bool, stop: bool },
    Vrange { value: f32, is_mask: bool, stop: bool },
    TranspIf(String, bool),
    Resizing(usize, bool),
    Alpha(f32),
    IsAtlas,
    Crosshair,
    Coordinates,
    Header,
    Histogram,
    Fpath(usize),
    Title(String),
    Fontsize(u32),
    Cbar(&'static str),
    CbarX(f32),
    CbarY(f32),
    CbarWidth(f32),
    CbarLength(f32),
    CbarPad(u32),
    CbarLabel(String),
    CbarTicks(String),
}

/// Widget state of the options tabs.
#[derive(Debug, Clone)]
pub struct OptionsFrame {
    tab: OptionsTab,
    layout: String,
    cmap: String,
    cmap_mask: String,
    pub(crate) height: Spinbox,
    max_samples: Spinbox,
    pub(crate) qrange_start: Spinbox,
    pub(crate) qrange_stop: Spinbox,
    pub(crate) vrange_start: Spinbox,
    pub(crate) vrange_stop: Spinbox,
    transp_if: String,
    alpha: Spinbox,
    pub(crate) qrange_start_mask: Spinbox,
    pub(crate) qrange_stop_mask: Spinbox,
    pub(crate) vrange_start_mask: Spinbox,
    pub(crate) vrange_stop_mask: Spinbox,
    transp_if_mask: String,
    fpath: Spinbox,
    pub(crate) title: String,
    fontsize: Spinbox,
    cbar_x: Spinbox,
    cbar_y: Spinbox,
    cbar_width: Spinbox,
    cbar_length: Spinbox,
    cbar_pad: Spinbox,
    cbar_label: String,
    cbar_ticks: String,
}

impl OptionsFrame {
    pub fn new(config: &Config) -> Self {
        let percent = |from, to, inc| Spinbox::new(from, to, inc, true);
        let unbounded = |inc| Spinbox::new(f64::NEG_INFINITY, f64::INFINITY, inc, true);
        let image_qrange = config.qrange.first().copied().flatten().unwrap_or(QRANGE[0]);
        let mask_qrange = if config.n_layers() > 1 {
            config.qrange.last().copied().flatten().unwrap_or(QRANGE[1])
        } else {
            QRANGE[1]
        };
        Self {
            tab: OptionsTab::default(),
            layout: preset(&config.layout).unwrap_or(&config.layout).to_string(),
            cmap: String::new(),
            cmap_mask: String::new(),
            height: Spinbox::new(100.0, MAX_HEIGHT, 100.0, false)
                .with_value(f64::from(config.height)),
            max_samples: Spinbox::new(1.0, MAX_SAMPLES, 1.0, false)
                .with_value(config.max_samples as f64),
            qrange_start: percent(0.0, 100.0, 1.0).with_value(f64::from(100.0 * image_qrange.0)),
            qrange_stop: percent(0.0, 100.0, 1.0).with_value(f64::from(100.0 * image_qrange.1)),
            vrange_start: unbounded(0.5),
            vrange_stop: unbounded(0.5),
            transp_if: config.transp_if.first().cloned().flatten().unwrap_or_default(),
            alpha: percent(0.0, 100.0, 10.0).with_value(f64::from(100.0 * config.alpha)),
            qrange_start_mask: percent(0.0, 100.0, 1.0)
                .with_value(f64::from(100.0 * mask_qrange.0)),
            qrange_stop_mask: percent(0.0, 100.0, 1.0)
                .with_value(f64::from(100.0 * mask_qrange.1)),
            vrange_start_mask: unbounded(1.0),
            vrange_stop_mask: unbounded(1.0),
            transp_if_mask: config
                .transp_if
                .last()
                .filter(|_| config.n_layers() > 1)
                .cloned()
                .flatten()
                .unwrap_or_default(),
            fpath: Spinbox::new(0.0, f64::INFINITY, 1.0, false).with_value(config.fpath as f64),
            title: title_text(config.title.as_ref()),
            fontsize: Spinbox::new(1.0, MAX_FONTSIZE, 1.0, false)
                .with_value(f64::from(config.fontsize)),
            cbar_x: percent(0.0, 100.0, 1.0).with_value(f64::from(100.0 * config.cbar_x)),
            cbar_y: percent(0.0, 100.0, 1.0).with_value(f64::from(100.0 * config.cbar_y)),
            cbar_width: percent(0.0, 100.0, 1.0).with_value(f64::from(100.0 * config.cbar_width)),
            cbar_length: percent(0.0, 100.0, 5.0)
                .with_value(f64::from(100.0 * config.cbar_length)),
            cbar_pad: Spinbox::new(0.0, 500.0, 20.0, false).with_value(f64::from(config.cbar_pad)),
            cbar_label: config.cbar_label.clone().unwrap_or_default(),
            cbar_ticks: ticks_text(config.cbar_ticks.as_ref()),
        }
    }

    fn show(&mut self, ui: &mut egui::Ui, config: &Config) -> Vec<OptionAction> {
        let mut actions = Vec::new();
        ui.horizontal(|ui| {
            for (tab, name) in TABS {
                ui.selectable_value(&mut self.tab, tab, name);
            }
        });
        ui.separator();
        egui::Grid::new("options_grid")
            .num_columns(2)
            .spacing([8.0, 4.0])
            .show(ui, |ui| match self.tab {
                OptionsTab::Main => self.show_main(ui, config, &mut actions),
                OptionsTab::Image => self.show_image(ui, config, &mut actions),
                OptionsTab::Mask => self.show_mask(ui, config, &mut actions),
                OptionsTab::Overlay => self.show_overlay(ui, config, &mut actions),
                OptionsTab::Colorbar => self.show_colorbar(ui, config, &mut actions),
            });
        actions
    }

    fn show_main(&mut self, ui: &mut egui::Ui, config: &Config, actions: &mut Vec<OptionAction>) {
        ui.label("Layout");
        let selected = LAYOUT_STRINGS
            .iter()
            .find(|(key, _)| *key == config.layout)
            .map_or("", |(key, _)| *key);
        egui::ComboBox::from_id_salt("layout")
            .selected_text(selected)
            .show_ui(ui, |ui| {
                for (key, expanded) in LAYOUT_STRINGS {
                    if ui.selectable_label(selected == key, key).clicked() {
                        self.layout = expanded.to_string();
                        actions.push(OptionAction::Layout(key.to_string()));
                    }
                }
            });
        ui.end_row();
        ui.label("");
        let response = ui.text_edit_singleline(&mut self.layout);
        if entry_committed(ui, &response) {
            actions.push(OptionAction::Layout(self.layout.trim().to_string()));
        }
        ui.end_row();

        for (is_mask, label, names) in [
            (false, "Colormap", &CMAPS_IMAGE[..]),
            (true, "Mask colormap", &CMAPS_MASK[..]),
        ] {
            let current = config.layer(&config.cmap, is_mask).cloned().unwrap_or_default();
            ui.label(label);
            egui::ComboBox::from_id_salt(label)
                .selected_text(current.as_str())
                .show_ui(ui, |ui| {
                    for name in names {
                        if ui.selectable_label(current == *name, *name).clicked() {
                            actions.push(OptionAction::Cmap(name.to_string(), is_mask));
                        }
                    }
                    if ui.selectable_label(false, "CATALOG").clicked() {
                        actions.push(OptionAction::Catalog);
                    }
                });
            ui.end_row();
            ui.label("");
            let entry = if is_mask { &mut self.cmap_mask } else { &mut self.cmap };
            let response = ui.add(egui::TextEdit::singleline(entry).hint_text(current.as_str()));
            if entry_committed(ui, &response) && !entry.trim().is_empty() {
                actions.push(OptionAction::Cmap(entry.trim().to_string(), is_mask));
            }
            ui.end_row();
        }

        ui.label("Height");
        if let Some(v) = self.height.show(ui, SPIN_WIDTH) {
            actions.push(OptionAction::Height(v as u32));
        }
        ui.end_row();
        ui.label("Max samples");
        if let Some(v) = self.max_samples.show(ui, SPIN_WIDTH) {
            actions.push(OptionAction::MaxSamples(v as usize));
        }
        ui.end_row();
    }

    fn show_image(&mut self, ui: &mut egui::Ui, config: &Config, actions: &mut Vec<OptionAction>) {
        ui.label("Equalize histogram");
        if ui.checkbox(&mut config.equal_hist.clone(), "").clicked() {
            actions.push(OptionAction::EqualHist);
        }
        ui.end_row();
        show_ranges(
            ui,
            [
                &mut self.qrange_start,
                &mut self.qrange_stop,
                &mut self.vrange_start,
                &mut self.vrange_stop,
            ],
            false,
            actions,
        );
        ui.label("Transparent if");
        let response = ui.add(egui::TextEdit::singleline(&mut self.transp_if).hint_text("<0.5"));
        if entry_committed(ui, &response) {
            actions.push(OptionAction::TranspIf(self.transp_if.clone(), false));
        }
        ui.end_row();
        show_resizing(ui, config, false, actions);
    }

    fn show_mask(&mut self, ui: &mut egui::Ui, config: &Config, actions: &mut Vec<OptionAction>) {
        ui.label("Opacity [%]");
        if let Some(v) = self.alpha.show(ui, SPIN_WIDTH) {
            actions.push(OptionAction::Alpha(v as f32 / 100.0));
        }
        ui.end_row();
        show_ranges(
            ui,
            [
                &mut self.qrange_start_mask,
                &mut self.qrange_stop_mask,
                &mut self.vrange_start_mask,
                &mut self.vrange_stop_mask,
            ],
            true,
            actions,
        );
        ui.label("Transparent if");
        let response =
            ui.add(egui::TextEdit::singleline(&mut self.transp_if_mask).hint_text("=0"));
        if entry_committed(ui, &response) {
            actions.push(OptionAction::TranspIf(self.transp_if_mask.clone(), true));
        }
        ui.end_row();
        show_resizing(ui, config, true, actions);
        ui.label("Is atlas");
        let is_atlas = config.n_layers() > 1 && config.is_atlas.last().copied().unwrap_or(false);
        if ui.checkbox(&mut is_atlas.clone(), "").clicked() {
            actions.push(OptionAction::IsAtlas);
        }
        ui.end_row();
    }

    fn show_overlay(&mut self, ui: &mut egui::Ui, config: &Config, actions: &mut Vec<OptionAction>) {
        for (label, value, action) in [
            ("Crosshair", config.crosshair, OptionAction::Crosshair),
            ("Coordinates", config.coordinates, OptionAction::Coordinates),
            ("Header", config.header, OptionAction::Header),
            ("Histogram", config.histogram, OptionAction::Histogram),
        ] {
            ui.label(label);
            if ui.checkbox(&mut value.clone(), "").clicked() {
                actions.push(action);
            }
            ui.end_row();
        }
        ui.label("Filepath");
        if let Some(v) = self.fpath.show(ui, SPIN_WIDTH) {
            actions.push(OptionAction::Fpath(v as usize));
        }
        ui.end_row();
        ui.label("Title");
        let response = ui.text_edit_singleline(&mut self.title);
        if entry_committed(ui, &response) {
            actions.push(OptionAction::Title(self.title.clone()));
        }
        ui.end_row();
        ui.label("Fontsize");
        if let Some(v) = self.fontsize.show(ui, SPIN_WIDTH) {
            actions.push(OptionAction::Fontsize(v as u32));
        }
        ui.end_row();
    }

    fn show_colorbar(&mut self, ui: &mut egui::Ui, config: &Config, actions: &mut Vec<OptionAction>) {
        ui.label("Bar");
        let current = match (config.cbar, config.cbar_vertical) {
            (false, _) => "",
            (true, true) => "vertical",
            (true, false) => "horizontal",
        };
        egui::ComboBox::from_id_salt("cbar")
            .selected_text(current)
            .show_ui(ui, |ui| {
                for orientation in ["", "vertical", "horizontal"] {
                    if ui.selectable_label(current == orientation, orientation).clicked() {
                        actions.push(OptionAction::Cbar(orientation));
                    }
                }
            });
        ui.end_row();
        ui.label("Bar Position [%]");
        if let Some(v) = self.cbar_x.show(ui, SPIN_WIDTH) {
            actions.push(OptionAction::CbarX(v as f32 / 100.0));
        }
        ui.end_row();
        ui.label("");
        if let Some(v) = self.cbar_y.show(ui, SPIN_WIDTH) {
            actions.push(OptionAction::CbarY(v as f32 / 100.0));
        }
        ui.end_row();
        ui.label("Bar Size [%]");
        if let Some(v) = self.cbar_width.show(ui, SPIN_WIDTH) {
            actions.push(OptionAction::CbarWidth(v as f32 / 100.0));
        }
        ui.end_row();
        ui.label("");
        if let Some(v) = self.cbar_length.show(ui, SPIN_WIDTH) {
            actions.push(OptionAction::CbarLength(v as f32 / 100.0));
        }
        ui.end_row();
        ui.label("Padding");
        if let Some(v) = self.cbar_pad.show(ui, SPIN_WIDTH) {
            actions.push(OptionAction::CbarPad(v as u32));
        }
        ui.end_row();
        ui.label("Label");
        let response = ui.text_edit_singleline(&mut self.cbar_label);
        if entry_committed(ui, &response) {
            actions.push(OptionAction::CbarLabel(self.cbar_label.clone()));
        }
        ui.end_row();
        ui.label("Ticks");
        let response =
            ui.add(egui::TextEdit::singleline(&mut self.cbar_ticks).hint_text("0|1 or 0:low|1:high"));
        if entry_committed(ui, &response) {
            actions.push(OptionAction::CbarTicks(self.cbar_ticks.clone()));
        }
        ui.end_row();
    }
}

/// Percentile and value range rows shared by the Image and Mask tabs.
fn show_ranges(
    ui: &mut egui::Ui,
    spinboxes: [&mut Spinbox; 4],
    is_mask: bool,
    actions: &mut Vec<OptionAction>,
) {
    let labels = ["Percentile range", "", "Value range", ""];
    for (i, (spinbox, label)) in spinboxes.into_iter().zip(labels).enumerate() {
        ui.label(label);
        if let Some(v) = spinbox.show(ui, SPIN_WIDTH) {
            let (value, stop) = (v as f32, i % 2 == 1);
            actions.push(if i < 2 {
                OptionAction::Qrange { value, is_mask, stop }
            } else {
                OptionAction::Vrange { value, is_mask, stop }
            });
        }
        ui.end_row();
    }
}

fn show_resizing(ui: &mut egui::Ui, config: &Config, is_mask: bool, actions: &mut Vec<OptionAction>) {
    ui.label("Resizing");
    let current = config.layer(&config.resizing, is_mask).copied().unwrap_or(0);
    let name = RESIZINGS.get(current).copied().unwrap_or_default();
    egui::ComboBox::from_id_salt(("resizing", is_mask))
        .selected_text(name)
        .show_ui(ui, |ui| {
            for (i, resizing) in RESIZINGS.into_iter().enumerate() {
                if ui.selectable_label(i == current, resizing).clicked() {
                    actions.push(OptionAction::Resizing(i, is_mask));
                }
            }
        });
    ui.end_row();
}

/// Entry text for a title, the inverse of [`Config::set_title`].
fn title_text(title: Option<&Title>) -> String {
    match title {
        None => String::new(),
        Some(Title::Single(title)) => title.clone(),
        Some(Title::PerSample(titles)) => titles
            .iter()
            .map(|t| t.as_deref().unwrap_or_default())
            .collect::<Vec<_>>()
            .join("|"),
    }
}

/// Entry text for colorbar ticks, the inverse of [`Config::set_cbar_ticks`].
fn ticks_text(ticks: Option<&CbarTicks>) -> String {
    match ticks {
        None => String::new(),
        Some(CbarTicks::Values(values)) => values
            .iter()
            .map(f32::to_string)
            .collect::<Vec<_>>()
            .join("|"),
        Some(CbarTicks::Labeled(labeled)) => labeled
            .iter()
            .map(|(value, label)| format!("{value}:{label}"))
            .collect::<Vec<_>>()
            .join("|"),
    }
}

impl MainFrame {
    pub(crate) fn render_options_frame(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        let Some(mut options) = self.options.take() else {
            if ui
                .add_sized([ui.available_width(), 24.0], egui::Button::new("Show Options"))
                .clicked()
            {
                self.options = Some(OptionsFrame::new(&self.config));
                self.update_image(true);
            }
            return;
        };
        let actions = options.show(ui, &self.config);
        self.options = Some(options);
        for action in actions {
            self.apply_option(ctx, action);
        }
    }

    fn apply_option(&mut self, ctx: &egui::Context, action: OptionAction) {
        log::debug!("option changed: {action:?}");
        match action {
            OptionAction::Layout(layout) => self.update_config(|c| c.layout = layout),
            OptionAction::Cmap(name, is_mask) => {
                self.set_layer_attribute(LayerValue::Cmap(name), is_mask);
            }
            OptionAction::Catalog => ctx.open_url(egui::OpenUrl::new_tab(CATALOG_URL)),
            OptionAction::Height(height) => self.set_height(ctx, height),
            OptionAction::MaxSamples(n) => self.set_max_samples(n),
            OptionAction::EqualHist => self.toggle_equal_hist(),
            OptionAction::Qrange { value, is_mask, stop } => {
                self.set_quantile_range(Some(value), is_mask, stop, None);
            }
            OptionAction::Vrange { value, is_mask, stop } => {
                self.set_value_range(value, is_mask, stop);
            }
            OptionAction::TranspIf(rule, is_mask) => self.set_transp_if(&rule, is_mask),
            OptionAction::Resizing(resizing, is_mask) => {
                self.set_layer_attribute(LayerValue::Resizing(resizing), is_mask);
            }
            OptionAction::Alpha(alpha) => {
                self.hidden_alpha = None;
                self.update_config(|c| c.alpha = alpha);
            }
            OptionAction::IsAtlas => self.toggle_is_atlas(),
            OptionAction::Crosshair => self.update_config(|c| c.crosshair = !c.crosshair),
            OptionAction::Coordinates => self.update_config(|c| c.coordinates = !c.coordinates),
            OptionAction::Header => self.update_config(|c| c.header = !c.header),
            OptionAction::Histogram => self.update_config(|c| c.histogram = !c.histogram),
            OptionAction::Fpath(fpath) => self.update_config(|c| c.fpath = fpath),
            OptionAction::Title(title) => self.set_title(&title),
            OptionAction::Fontsize(size) => self.update_config(|c| c.fontsize = size),
            OptionAction::Cbar(orientation) => self.set_cbar(orientation),
            OptionAction::CbarX(x) => self.update_config(|c| c.cbar_x = x),
            OptionAction::CbarY(y) => self.update_config(|c| c.cbar_y = y),
            OptionAction::CbarWidth(w) => self.update_config(|c| c.cbar_width = w),
            OptionAction::CbarLength(l) => self.update_config(|c| c.cbar_length = l),
            OptionAction::CbarPad(pad) => self.update_config(|c| c.cbar_pad = pad),
            OptionAction::CbarLabel(label) => self.update_config(|c| {
                c.cbar_label = (!label.trim().is_empty()).then_some(label);
            }),
            OptionAction::CbarTicks(ticks) => self.set_cbar_ticks(&ticks),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_reads_config() {
        let mut config = Config::default();
        config.alpha = 0.3;
        config.layout = "axial++".to_string();
        let options = OptionsFrame::new(&config);
        assert_eq!(options.layout, "axial|sagittal|coronal");
        assert_eq!(options.alpha.get(), Some(30.0));
        assert_eq!(options.qrange_start.get(), Some(1.0));
        assert_eq!(options.qrange_stop.get(), Some(99.9));
        assert_eq!(options.vrange_start.get(), Some(0.0));
        assert!(options.transp_if_mask.is_empty());
    }

    #[test]
    fn test_size_entries_are_capped() {
        let mut options = OptionsFrame::new(&Config::default());
        options.height.set(200_000.0);
        assert_eq!(options.height.get(), Some(MAX_HEIGHT));
        options.fontsize.set(f64::INFINITY);
        assert_eq!(options.fontsize.get(), Some(MAX_FONTSIZE));
        options.max_samples.set(1e9);
        assert_eq!(options.max_samples.get(), Some(MAX_SAMPLES));
    }

    #[test]
    fn test_entry_text_inverts_setters() {
        let mut config = Config::default();
        config.set_cbar_ticks("0:low|1.5:high").unwrap();
        assert_eq!(ticks_text(config.cbar_ticks.as_ref()), "0:low|1.5:high");
        config.set_cbar_ticks("1|2").unwrap();
        assert_eq!(ticks_text(config.cbar_ticks.as_ref()), "1|2");
        config.set_title("T1");
        assert_eq!(title_text(config.title.as_ref()), "T1");
        config.set_title("a|b");
        assert_eq!(title_text(config.title.as_ref()), "a|b");
    }
}
