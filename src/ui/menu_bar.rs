//! Menu bar and status line.

use eframe::egui;

use crate::app::MainFrame;
use crate::config::{Appearance, LINECOLORS, PADCOLORS, TMP_HEIGHTS};
use crate::layout::{COORDINATE_SYSTEMS, GLASS_MODES};

pub(crate) const HOMEPAGE_URL: &str = "https://github.com/codingfisch/niftiview_app";
const AUTHOR_URL: &str = "https://github.com/codingfisch";
const SCALINGS: [f32; 7] = [0.5, 2.0 / 3.0, 0.75, 1.0, 4.0 / 3.0, 1.5, 2.0];
/// Raster formats offered by "Save image as".
const FILETYPES: [(&str, &[&str]); 4] = [
    ("Portable Network Graphics", &["png"]),
    ("JPEG", &["jpg", "jpeg"]),
    ("Tagged Image File", &["tiff", "tif"]),
    ("Bitmap", &["bmp"]),
];

impl MainFrame {
    pub(crate) fn render_menu_bar(&mut self, ctx: &egui::Context) {
        let response = egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            egui::MenuBar::new().ui(ui, |ui| {
                self.render_open_menu(ui);
                self.render_save_menu(ui);
                self.render_appearance_menu(ui, ctx);
                self.render_extra_options_menu(ui);
                if ui.button("Help").clicked() {
                    ctx.open_url(egui::OpenUrl::new_tab(format!("{HOMEPAGE_URL}#readme")));
                }
                ui.menu_button("About", |ui| {
                    if ui.button("Homepage").clicked() {
                        ui.close();
                        ctx.open_url(egui::OpenUrl::new_tab(HOMEPAGE_URL));
                    }
                    if ui.button("Author").clicked() {
                        ui.close();
                        ctx.open_url(egui::OpenUrl::new_tab(AUTHOR_URL));
                    }
                    ui.separator();
                    let version = env!("CARGO_PKG_VERSION");
                    if ui.button(format!("App-Version {version}")).clicked() {
                        ui.close();
                        ctx.open_url(egui::OpenUrl::new_tab(format!(
                            "{HOMEPAGE_URL}/releases/tag/v{version}"
                        )));
                    }
                });
            });
            if let Some(ref msg) = self.error_msg {
                ui.colored_label(egui::Color32::RED, msg);
            }
        });
        self.menu_height = response.response.rect.height();
    }

    fn render_open_menu(&mut self, ui: &mut egui::Ui) {
        ui.menu_button("Open", |ui| {
            if ui.button("Load 3D image…").clicked() {
                ui.close();
                self.open_files_dialog(false);
            }
            ui.separator();
            if ui.button("Load 3D mask…").clicked() {
                ui.close();
                self.open_files_dialog(true);
            }
            ui.separator();
            if ui.button("Load configuration").clicked() {
                ui.close();
                self.load_config_dialog();
            }
        });
    }

    fn render_save_menu(&mut self, ui: &mut egui::Ui) {
        ui.menu_button("Save", |ui| {
            ui.menu_button("Save image as", |ui| {
                for (name, extensions) in FILETYPES {
                    if ui.button(format!("{name} (*.{})", extensions[0])).clicked() {
                        ui.close();
                        self.save_image_dialog(name, extensions);
                    }
                }
            });
            if ui.button("Save all images").clicked() {
                ui.close();
                self.save_all_dialog(false);
            }
            if ui.button("Save GIF").clicked() {
                ui.close();
                self.save_gif_dialog();
            }
            if ui.button("Save all GIFs").clicked() {
                ui.close();
                self.save_all_dialog(true);
            }
            if ui.button("Save annotations").clicked() {
                ui.close();
                self.save_annotations_dialog();
            }
            if ui.button("Save configuration").clicked() {
                ui.close();
                self.save_config_dialog();
            }
        });
    }

    fn render_appearance_menu(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.menu_button("Appearance", |ui| {
            if ui.button("Dark mode").clicked() {
                ui.close();
                self.config.appearance_mode = Some(Appearance::Dark);
                ctx.set_visuals(egui::Visuals::dark());
            }
            if ui.button("Light mode").clicked() {
                ui.close();
                self.config.appearance_mode = Some(Appearance::Light);
                ctx.set_visuals(egui::Visuals::light());
            }
            ui.separator();
            ui.menu_button("Widget scaling", |ui| {
                for scaling in SCALINGS {
                    let label = format!("{:.0}%", 100.0 * scaling);
                    if ui.button(label).clicked() {
                        ui.close();
                        self.config.scaling = Some(scaling);
                        ctx.set_zoom_factor(scaling);
                    }
                }
            });
            ui.menu_button("Temp. image height", |ui| {
                if ui
                    .radio(self.config.tmp_height.is_none(), "Disable (can be laggy)")
                    .clicked()
                {
                    ui.close();
                    self.update_config(|config| config.tmp_height = None);
                }
                for height in TMP_HEIGHTS {
                    if ui
                        .radio(self.config.tmp_height == Some(height), height.to_string())
                        .clicked()
                    {
                        ui.close();
                        self.update_config(|config| config.tmp_height = Some(height));
                    }
                }
            });
            ui.separator();
            if ui.button("Fullscreen").clicked() {
                ui.close();
                let fullscreen = ctx.input(|i| i.viewport().fullscreen.unwrap_or(false));
                ctx.send_viewport_cmd(egui::ViewportCommand::Fullscreen(!fullscreen));
            }
        });
    }

    fn render_extra_options_menu(&mut self, ui: &mut egui::Ui) {
        ui.menu_button("Extra Options", |ui| {
            if ui.checkbox(&mut self.config.annotations.clone(), "Annotations").clicked() {
                self.toggle_annotations();
            }
            ui.menu_button("Linewidth", |ui| {
                for width in 1..=8 {
                    if ui.radio(self.config.linewidth == width, width.to_string()).clicked() {
                        ui.close();
                        self.update_config(|config| config.linewidth = width);
                    }
                }
            });
            ui.menu_button("Linecolor", |ui| {
                for color in LINECOLORS {
                    if ui.radio(self.config.linecolor == color, color).clicked() {
                        ui.close();
                        self.update_config(|config| config.linecolor = color.to_string());
                    }
                }
            });
            ui.menu_button("Padcolor", |ui| {
                for color in PADCOLORS {
                    if ui.radio(self.config.cbar_pad_color == color, color).clicked() {
                        ui.close();
                        self.update_config(|config| config.cbar_pad_color = color.to_string());
                    }
                }
            });
            ui.menu_button("Number of rows", |ui| {
                if ui.radio(self.config.nrows.is_none(), "Auto").clicked() {
                    ui.close();
                    self.update_config(|config| config.nrows = None);
                }
                for nrows in 1..=8 {
                    if ui.radio(self.config.nrows == Some(nrows), nrows.to_string()).clicked() {
                        ui.close();
                        self.update_config(|config| config.nrows = Some(nrows));
                    }
                }
            });
            ui.menu_button("Glassbrain mode", |ui| {
                if ui.radio(self.config.glass_mode.is_none(), "None").clicked() {
                    ui.close();
                    self.update_config(|config| config.glass_mode = None);
                }
                for mode in GLASS_MODES {
                    if ui.radio(self.config.glass_mode == Some(mode), mode.name()).clicked() {
                        ui.close();
                        self.update_config(|config| config.glass_mode = Some(mode));
                    }
                }
            });
            ui.menu_button("Coordinate system", |ui| {
                for sys in COORDINATE_SYSTEMS {
                    if ui.radio(self.config.coord_sys == sys, sys.name()).clicked() {
                        ui.close();
                        self.update_config(|config| config.coord_sys = sys);
                    }
                }
            });
            if ui.checkbox(&mut self.config.squeeze.clone(), "Squeeze").clicked() {
                self.update_config(|config| config.squeeze = !config.squeeze);
            }
        });
    }
}
