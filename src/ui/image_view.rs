//! Central panel: the rendered grid, pointer interaction and text overlays.

use std::path::Path;

use eframe::egui::{self, Color32, FontId, Pos2, Rect, Sense, Vec2};
use image::RgbaImage;

use crate::app::{FrameEvent, MainFrame};
use crate::colormap::named_color;
use crate::config::{CbarTicks, Title};
use crate::grid::PixelRect;
use crate::layout::Plane;
use crate::util::{f32_to_index, f32_to_u8, window_frame};

/// Steepness of the hover vignette falloff.
const FRAME_EXP: i32 = 12;
const ANNOTATION_LABELS: [&str; 3] = ["0", "1", "2"];
const ANNOTATION_BUTTON: Vec2 = Vec2::new(22.0, 20.0);

/// Largest size with the image's aspect ratio that fits into `max`.
fn fit_size(width: u32, height: u32, max: Vec2) -> Vec2 {
    if width == 0 || height == 0 {
        return Vec2::ZERO;
    }
    let (w, h) = (width as f32, height as f32);
    let scale = (max.x / w).min(max.y / h).max(0.0);
    Vec2::new(w * scale, h * scale)
}

/// Copy of `image` with `rect` faded to white towards its border.
fn vignette(image: &RgbaImage, rect: PixelRect) -> RgbaImage {
    let mut out = image.clone();
    let frame = window_frame((rect.w, rect.h), FRAME_EXP);
    for (x, y, alpha) in frame.enumerate_pixels() {
        let (px, py) = (rect.x + x, rect.y + y);
        if px >= out.width() || py >= out.height() {
            continue;
        }
        let a = f32::from(alpha[0]) / 255.0;
        let pixel = out.get_pixel_mut(px, py);
        for c in &mut pixel.0[..3] {
            *c = f32_to_u8(f32::from(*c) * a + 255.0 * (1.0 - a));
        }
    }
    out
}

fn axis_label(plane: Plane) -> &'static str {
    match plane {
        Plane::Sagittal => "x",
        Plane::Coronal => "y",
        Plane::Axial => "z",
    }
}

/// Last `n` components of a path.
fn tail_components(path: &str, n: usize) -> String {
    let components: Vec<_> = Path::new(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    components[components.len().saturating_sub(n)..].join("/")
}

impl MainFrame {
    pub(crate) fn render_image_view(&mut self, ctx: &egui::Context) -> Option<FrameEvent> {
        let mut event = None;
        egui::CentralPanel::default()
            .frame(egui::Frame::new().fill(Color32::BLACK))
            .show(ctx, |ui| {
                let available = ui.available_size();
                self.track_view_size(available, ctx.pixels_per_point());
                self.upload_texture(ctx);
                let (Some(texture), Some(image)) = (self.texture.as_ref(), self.image.as_ref())
                else {
                    ui.centered_and_justified(|ui| {
                        ui.colored_label(
                            Color32::GRAY,
                            "No volume loaded.\nUse Open > Load 3D image… or drop files here.",
                        );
                    });
                    return;
                };
                let texture_id = texture.id();
                let size = fit_size(image.width(), image.height(), available);
                let (rect, response) = ui.allocate_exact_size(size, Sense::click_and_drag());
                ui.painter().image(
                    texture_id,
                    rect,
                    Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
                    Color32::WHITE,
                );
                event = self.handle_pointer(ui, &response, rect);
                self.draw_overlays(ui, rect);
                if self.config.annotations {
                    self.render_annotation_buttons(ui, rect);
                }
            });
        event
    }

    fn upload_texture(&mut self, ctx: &egui::Context) {
        if !self.texture_dirty {
            return;
        }
        self.texture_dirty = false;
        let Some(image) = self.image.as_ref() else {
            self.texture = None;
            return;
        };
        let highlighted = self
            .hover_sample
            .filter(|_| self.n_boxes() > 1)
            .and_then(|s| self.niigrid()?.boxes().get(s).copied())
            .map(|rect| vignette(image, rect));
        let shown = highlighted.as_ref().unwrap_or(image);
        let size = [shown.width() as usize, shown.height() as usize];
        let color_image = egui::ColorImage::from_rgba_unmultiplied(size, shown.as_raw());
        match self.texture.as_mut() {
            Some(texture) => texture.set(color_image, egui::TextureOptions::LINEAR),
            None => {
                self.texture =
                    Some(ctx.load_texture("niftiview", color_image, egui::TextureOptions::LINEAR));
            }
        }
    }

    fn handle_pointer(
        &mut self,
        ui: &egui::Ui,
        response: &egui::Response,
        rect: Rect,
    ) -> Option<FrameEvent> {
        let scale = self.image_scale(rect.height());
        let to_pixel = |pos: Pos2| ((pos.x - rect.min.x) / scale, (pos.y - rect.min.y) / scale);

        let hovered = response
            .hover_pos()
            .map(to_pixel)
            .and_then(|(x, y)| self.niigrid()?.sample_at(x, y))
            .filter(|_| self.n_boxes() > 1);
        if hovered != self.hover_sample {
            self.hover_sample = hovered;
            self.texture_dirty = true;
            ui.ctx().request_repaint();
        }

        let mut event = None;
        if response.double_clicked() && !self.toplevel {
            if let Some(sample) = response
                .interact_pointer_pos()
                .map(to_pixel)
                .and_then(|(x, y)| self.niigrid()?.sample_at(x, y))
            {
                event = Some(FrameEvent::OpenToplevel(sample));
            }
        }
        if response.secondary_clicked() && !self.toplevel {
            self.set_page(true);
            return event;
        }
        if let Some((x, y)) = response.interact_pointer_pos().map(to_pixel) {
            let moved = ui.input(|i| i.pointer.delta() != Vec2::ZERO);
            if response.drag_stopped_by(egui::PointerButton::Primary)
                || response.clicked_by(egui::PointerButton::Primary)
            {
                self.update_origin_click(x, y, true);
            } else if response.dragged_by(egui::PointerButton::Primary)
                && (moved || response.drag_started())
            {
                self.update_origin_click(x, y, false);
            }
        }
        event
    }

    fn render_annotation_buttons(&mut self, ui: &mut egui::Ui, rect: Rect) {
        let scale = self.image_scale(rect.height());
        let boxes = self.niigrid().map(|g| g.boxes().to_vec()).unwrap_or_default();
        let filepaths: Vec<String> = self
            .config
            .get_filepaths(Some(1))
            .iter()
            .filter_map(|fps| fps.first().cloned())
            .collect();
        for (b, filepath) in boxes.iter().zip(filepaths) {
            let current = self.config.annotation_dict.get(&filepath).copied();
            let top_right = rect.min + Vec2::new((b.x + b.w) as f32, b.y as f32) * scale;
            for (n, label) in ANNOTATION_LABELS.iter().enumerate().rev() {
                let offset = (ANNOTATION_LABELS.len() - n) as f32 * ANNOTATION_BUTTON.x;
                let min = top_right + Vec2::new(-offset, 2.0);
                let button_rect = Rect::from_min_size(min, ANNOTATION_BUTTON);
                let annotation = n as u8;
                let button = egui::Button::new(*label).selected(current == Some(annotation));
                if ui.put(button_rect, button).clicked() {
                    self.set_annotation(&filepath, annotation);
                }
            }
        }
    }

    /// Image value of a sample at the current origin.
    fn origin_value(&self, sample: usize) -> Option<f32> {
        let volume = self.niigrid()?.samples().get(sample)?.first()?;
        let sys = self.config.coord_sys;
        let voxel = [0, 1, 2].map(|axis| volume.coord_to_voxel(sys, axis, self.config.origin[axis]));
        let frame = f32_to_index(self.config.origin[3], volume.n_frames());
        volume.value_at(voxel, frame)
    }

    fn draw_overlays(&self, ui: &egui::Ui, rect: Rect) {
        let Some(grid) = self.niigrid() else {
            return;
        };
        let scale = self.image_scale(rect.height());
        let to_screen = |x: u32, y: u32| rect.min + Vec2::new(x as f32, y as f32) * scale;
        let font = FontId::proportional((self.config.fontsize as f32 * scale).max(6.0));
        let [r, g, b, a] = named_color(&self.config.linecolor).unwrap_or([255; 4]);
        let color = Color32::from_rgba_unmultiplied(r, g, b, a);
        let painter = ui.painter_at(rect);
        let margin = Vec2::splat(4.0);

        if self.config.coordinates {
            let mut labelled = vec![false; grid.boxes().len()];
            for tile in grid.tiles() {
                let plane = tile.plane;
                let pos = to_screen(tile.rect.x, tile.rect.y + tile.rect.h);
                let mut text =
                    format!("{}={:.1}", axis_label(plane), self.config.origin[plane.axis()]);
                if let Some(first) = labelled.get_mut(tile.sample).filter(|done| !**done) {
                    *first = true;
                    if let Some(value) = self.origin_value(tile.sample) {
                        text = format!("{text}  {value:.4}");
                    }
                }
                let pos = pos + Vec2::new(margin.x, -margin.y);
                painter.text(pos, egui::Align2::LEFT_BOTTOM, text, font.clone(), color);
            }
        }

        for (i, b) in grid.boxes().iter().enumerate() {
            let Some(volume) = grid.samples().get(i).and_then(|layers| layers.first()) else {
                continue;
            };
            if self.config.header {
                let text = volume.header_lines().join("\n");
                let pos = to_screen(b.x, b.y) + margin;
                painter.text(pos, egui::Align2::LEFT_TOP, text, font.clone(), color);
            }
            if self.config.fpath > 0 {
                let toplevel = grid.samples()[i].last().map_or("", |v| v.filepath());
                let text = tail_components(toplevel, self.config.fpath);
                let pos = to_screen(b.x + b.w, b.y + b.h) - margin;
                painter.text(pos, egui::Align2::RIGHT_BOTTOM, text, font.clone(), color);
            }
            if let Some(title @ Title::PerSample(_)) = &self.config.title {
                if let Some(title) = title.for_sample(i) {
                    let top = to_screen(b.x + b.w / 2, b.y) + Vec2::new(0.0, margin.y);
                    painter.text(top, egui::Align2::CENTER_TOP, title, font.clone(), color);
                }
            }
        }
        if let Some(Title::Single(title)) = &self.config.title {
            let top = Pos2::new(rect.center().x, rect.min.y + margin.y);
            painter.text(top, egui::Align2::CENTER_TOP, title, font.clone(), color);
        }

        if let Some(cbar) = grid.colorbar() {
            let bar = Rect::from_min_max(
                to_screen(cbar.rect.x, cbar.rect.y),
                to_screen(cbar.rect.x + cbar.rect.w, cbar.rect.y + cbar.rect.h),
            );
            let (lo, hi) = cbar.vrange;
            let ticks: Vec<(f32, String)> = match &self.config.cbar_ticks {
                Some(CbarTicks::Values(values)) => {
                    values.iter().map(|v| (*v, format!("{v}"))).collect()
                }
                Some(CbarTicks::Labeled(labeled)) => labeled.clone(),
                None => vec![(lo, format!("{lo:.3}")), (hi, format!("{hi:.3}"))],
            };
            for (value, label) in ticks {
                let t = if hi > lo { ((value - lo) / (hi - lo)).clamp(0.0, 1.0) } else { 0.0 };
                if cbar.vertical {
                    let pos = Pos2::new(bar.min.x - margin.x, bar.max.y - t * bar.height());
                    painter.text(pos, egui::Align2::RIGHT_CENTER, label, font.clone(), color);
                } else {
                    let pos = Pos2::new(bar.min.x + t * bar.width(), bar.max.y + margin.y);
                    painter.text(pos, egui::Align2::CENTER_TOP, label, font.clone(), color);
                }
            }
            if let Some(label) = &self.config.cbar_label {
                let pos = Pos2::new(bar.center().x, bar.min.y - margin.y);
                painter.text(pos, egui::Align2::CENTER_BOTTOM, label, font, color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_size_keeps_aspect() {
        let size = fit_size(300, 100, Vec2::new(600.0, 600.0));
        assert_eq!(size, Vec2::new(600.0, 200.0));
        let size = fit_size(100, 200, Vec2::new(600.0, 100.0));
        assert_eq!(size, Vec2::new(50.0, 100.0));
        assert_eq!(fit_size(0, 10, Vec2::splat(100.0)), Vec2::ZERO);
    }

    #[test]
    fn test_vignette_whitens_border_only() {
        let image = RgbaImage::from_pixel(20, 10, image::Rgba([0, 0, 0, 255]));
        let rect = PixelRect { x: 10, y: 0, w: 10, h: 10 };
        let out = vignette(&image, rect);
        assert_eq!(out.get_pixel(0, 0).0, [0, 0, 0, 255]);
        assert_eq!(out.get_pixel(10, 0).0, [255, 255, 255, 255]);
        assert!(out.get_pixel(15, 5)[0] < 10);
    }

    #[test]
    fn test_tail_components() {
        assert_eq!(tail_components("/data/sub-01/anat/t1.nii", 2), "anat/t1.nii");
        assert_eq!(tail_components("t1.nii", 3), "t1.nii");
    }
}
