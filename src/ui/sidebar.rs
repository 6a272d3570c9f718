//! Left sidebar: file inputs, options, origin sliders and paging.

use eframe::egui;

use crate::app::MainFrame;
use crate::config::Config;
use crate::layout::PLANES_4D;

const SIDEBAR_WIDTH: f32 = 280.0;
/// Scroll distance per slider step, as in the single-volume viewer.
const SCROLL_STEP: f32 = 30.0;

/// Text of the image and mask path entries.
#[derive(Debug, Default)]
pub struct InputFrame {
    pub image: String,
    pub mask: String,
    /// Where the mask entry was drawn, so drops onto it add masks.
    pub mask_rect: Option<egui::Rect>,
}

impl InputFrame {
    pub fn new(config: &Config) -> Self {
        let image = config
            .filepaths()
            .first()
            .and_then(|fps| fps.first())
            .cloned()
            .unwrap_or_default();
        Self {
            image,
            ..Self::default()
        }
    }
}

/// True when the entry lost focus because Enter was pressed.
pub(crate) fn entry_committed(ui: &egui::Ui, response: &egui::Response) -> bool {
    response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter))
}

impl MainFrame {
    pub(crate) fn render_sidebar(&mut self, ctx: &egui::Context) {
        let response = egui::SidePanel::left("sidebar")
            .resizable(false)
            .exact_width(SIDEBAR_WIDTH)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    if !self.toplevel {
                        self.render_input_frame(ui);
                    }
                    if ui
                        .add_sized([ui.available_width(), 24.0], egui::Button::new("Clear masks"))
                        .clicked()
                    {
                        self.clear_masks();
                    }
                    ui.add_space(4.0);
                    self.render_options_frame(ui, ctx);
                    ui.add_space(4.0);
                    self.render_slider_frame(ui);
                    if !self.toplevel {
                        ui.add_space(4.0);
                        self.render_pages_frame(ui);
                    }
                });
            });
        self.sidebar_width = response.response.rect.width();
    }

    fn render_input_frame(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            for view in [1u8, 2] {
                if ui
                    .selectable_label(self.config.view == view, format!("View {view}"))
                    .clicked()
                    && self.config.view != view
                {
                    self.set_view(view);
                }
            }
        });

        let image_response = ui.add(
            egui::TextEdit::singleline(&mut self.input.image)
                .hint_text("/path/to/images/*.nii (or drag&drop here)")
                .desired_width(f32::INFINITY),
        );
        if entry_committed(ui, &image_response) {
            let pattern = self.input.image.clone();
            self.open_pattern(&pattern, false);
        }

        let mask_response = ui.add(
            egui::TextEdit::singleline(&mut self.input.mask)
                .hint_text("/path/to/masks/*.nii (or drag&drop here)")
                .desired_width(f32::INFINITY),
        );
        self.input.mask_rect = Some(mask_response.rect);
        let convert = mask_response.has_focus()
            && ui.input(|i| i.modifiers.ctrl && i.modifiers.alt && i.key_pressed(egui::Key::N));
        if convert {
            let (input, output) = (self.input.image.clone(), self.input.mask.clone());
            self.convert_dicom_and_open(&input, &output);
        } else if entry_committed(ui, &mask_response) {
            let pattern = self.input.mask.clone();
            self.open_pattern(&pattern, true);
        }
        ui.add_space(4.0);
    }

    fn render_slider_frame(&mut self, ui: &mut egui::Ui) {
        let bounds = self.niigrid().and_then(|grid| {
            let volume = grid.samples().first()?.first()?;
            let bounds = volume.origin_bounds(self.config.coord_sys, &volume.full_extent());
            Some((bounds, volume.n_frames()))
        });
        ui.columns(PLANES_4D.len(), |columns| {
            for (axis, (col, plane)) in columns.iter_mut().zip(PLANES_4D).enumerate() {
                col.vertical_centered(|ui| {
                    let mut label = plane.to_string();
                    label[..1].make_ascii_uppercase();
                    ui.label(label);
                    let range = if axis == 3 { 0.0..=400.0 } else { -200.0..=200.0 };
                    let mut value = self.config.origin[axis];
                    let response = ui.add(
                        egui::Slider::new(&mut value, range)
                            .vertical()
                            .show_value(false),
                    );
                    let response = match bounds {
                        Some(([lo, hi], _)) if axis < 3 => response
                            .on_hover_text(format!("{:.1} to {:.1}", lo[axis], hi[axis])),
                        Some((_, n_frames)) if axis == 3 => {
                            response.on_hover_text(format!("{n_frames} frames"))
                        }
                        _ => response,
                    };
                    if response.changed() {
                        self.update_origin(axis, value, false);
                    }
                    if response.drag_stopped() {
                        self.update_image(true);
                    }
                    if response.hovered() {
                        self.scroll_accum[axis] += ui.input(|i| i.raw_scroll_delta.y);
                        while self.scroll_accum[axis] >= SCROLL_STEP {
                            self.scroll_accum[axis] -= SCROLL_STEP;
                            self.step_origin(axis, 1.0);
                        }
                        while self.scroll_accum[axis] <= -SCROLL_STEP {
                            self.scroll_accum[axis] += SCROLL_STEP;
                            self.step_origin(axis, -1.0);
                        }
                    }
                    ui.label(format!("{:.1}", self.config.origin[axis]));
                });
            }
        });
    }

    fn render_pages_frame(&mut self, ui: &mut egui::Ui) {
        let n_pages = self.config.n_pages();
        let page = self.config.page.min(n_pages - 1);
        ui.columns(3, |columns| {
            if columns[0].button("Previous").clicked() {
                self.set_page(false);
            }
            columns[1].vertical_centered(|ui| {
                ui.label(format!("Page {} of {n_pages}", page + 1));
            });
            if columns[2].button("Next").clicked() {
                self.set_page(true);
            }
        });
    }
}
