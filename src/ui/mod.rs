//! UI rendering modules.
//!
//! Contains the UI rendering logic split into separate modules:
//! - `menu_bar`: Open/Save/Appearance/Extra Options/Help/About menus
//! - `sidebar`: file inputs, sliders and page buttons
//! - `options`: the tabbed display options
//! - `image_view`: central panel with the rendered grid and overlays
//! - `keys`: keyboard shortcuts

mod image_view;
mod keys;
mod menu_bar;
mod options;
mod sidebar;

use eframe::egui;

pub use options::OptionsFrame;
pub use sidebar::InputFrame;

use crate::app::{FrameEvent, MainFrame};
use crate::config::{Appearance, Config};

/// Apply the configured appearance mode and widget scaling.
pub fn apply_appearance(ctx: &egui::Context, config: &Config) {
    match config.appearance_mode {
        Some(Appearance::Light) => ctx.set_visuals(egui::Visuals::light()),
        Some(Appearance::Dark) => ctx.set_visuals(egui::Visuals::dark()),
        None => {}
    }
    if let Some(scaling) = config.scaling.filter(|s| *s > 0.0) {
        ctx.set_zoom_factor(scaling);
    }
}

impl MainFrame {
    /// Draw one frame of this window.
    pub fn show(&mut self, ctx: &egui::Context) -> Option<FrameEvent> {
        self.handle_dropped_files(ctx);
        self.handle_keys(ctx);
        self.render_menu_bar(ctx);
        self.render_sidebar(ctx);
        let event = self.render_image_view(ctx);
        if self.resize_pending() {
            ctx.request_repaint();
        }
        event
    }

    fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        let (files, pointer) = ctx.input(|i| (i.raw.dropped_files.clone(), i.pointer.hover_pos()));
        if files.is_empty() || self.toplevel {
            return;
        }
        let is_mask = pointer
            .zip(self.input.mask_rect)
            .is_some_and(|(pos, rect)| rect.contains(pos));
        log::info!("{} files dropped", files.len());
        self.open_dropped(files, is_mask);
    }
}
