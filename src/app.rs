//! Application state and the actions behind every widget.
//!
//! `MainFrame` owns a configuration and the grids rendered from it. The
//! main window and each detail window opened by double-click have one.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use eframe::egui;
use image::RgbaImage;
use rfd::FileDialog;

use crate::colormap::QRANGE;
use crate::config::{Config, LayerValue};
use crate::export;
use crate::grid::NiftiImageGrid;
use crate::ui::{InputFrame, OptionsFrame};
use crate::util::{dcm2nii, expand_glob, f32_to_u32, parse_dnd_filepaths, Debouncer};
use crate::volume::Volume;

const RESIZE_WAIT: Duration = Duration::from_millis(100);

/// What the main window should do after a frame was drawn.
pub enum FrameEvent {
    /// Open a detail window for this sample of the current page.
    OpenToplevel(usize),
}

pub struct MainFrame {
    pub(crate) config: Config,
    pub(crate) toplevel: bool,
    niigrid1: Option<NiftiImageGrid>,
    niigrid2: Option<NiftiImageGrid>,
    pub(crate) image: Option<RgbaImage>,
    pub(crate) texture: Option<egui::TextureHandle>,
    pub(crate) texture_dirty: bool,
    pub(crate) error_msg: Option<String>,
    pub(crate) input: InputFrame,
    pub(crate) options: Option<OptionsFrame>,
    pub(crate) hover_sample: Option<usize>,
    pub(crate) hidden_alpha: Option<f32>,
    pub(crate) scroll_accum: [f32; 4],
    pub(crate) sidebar_width: f32,
    pub(crate) menu_height: f32,
    resize: Debouncer,
    view_size: egui::Vec2,
}

impl MainFrame {
    pub fn new(config: Config, toplevel: bool) -> Self {
        let input = InputFrame::new(&config);
        let mut frame = Self {
            config,
            toplevel,
            niigrid1: None,
            niigrid2: None,
            image: None,
            texture: None,
            texture_dirty: true,
            error_msg: None,
            input,
            options: None,
            hover_sample: None,
            hidden_alpha: None,
            scroll_accum: [0.0; 4],
            sidebar_width: 0.0,
            menu_height: 0.0,
            resize: Debouncer::new(RESIZE_WAIT),
            view_size: egui::Vec2::ZERO,
        };
        frame.load_niigrid();
        frame.update_image(true);
        frame
    }

    pub(crate) fn niigrid(&self) -> Option<&NiftiImageGrid> {
        if self.config.view == 2 {
            self.niigrid2.as_ref()
        } else {
            self.niigrid1.as_ref()
        }
    }

    fn niigrid_mut(&mut self) -> &mut Option<NiftiImageGrid> {
        if self.config.view == 2 {
            &mut self.niigrid2
        } else {
            &mut self.niigrid1
        }
    }

    pub(crate) fn set_error(&mut self, msg: impl std::fmt::Display) {
        let msg = msg.to_string();
        log::error!("{msg}");
        self.error_msg = Some(msg);
    }

    /// (Re)load the volumes shown on the current page.
    pub(crate) fn load_niigrid(&mut self) {
        let filepaths = self.config.get_filepaths(None).to_vec();
        let grid = if filepaths.is_empty() {
            None
        } else {
            match NiftiImageGrid::open(&filepaths) {
                Ok(grid) => Some(grid),
                Err(e) => {
                    self.set_error(format!("Failed to load: {e}"));
                    None
                }
            }
        };
        *self.niigrid_mut() = grid;
    }

    /// Render the current page; `hd` false uses the temporary height.
    pub(crate) fn update_image(&mut self, hd: bool) {
        let opts = match self.config.to_grid_options(hd) {
            Ok(opts) => opts,
            Err(e) => {
                self.set_error(e);
                return;
            }
        };
        let result = match self.niigrid_mut() {
            Some(grid) => grid.get_image(&opts).map(Some),
            None => Ok(None),
        };
        match result {
            Ok(image) => {
                self.image = image;
                self.texture_dirty = true;
            }
            Err(e) => self.set_error(e),
        }
        self.update_sidebar();
    }

    /// Show the effective value windows in the option spinboxes.
    fn update_sidebar(&mut self) {
        let n_layers = self.config.n_layers();
        let image_vrange = self.niigrid().and_then(|g| g.layer_vrange(0, 0));
        let mask_vrange = self
            .niigrid()
            .and_then(|g| g.layer_vrange(0, n_layers - 1))
            .filter(|_| n_layers > 1);
        if let Some(options) = self.options.as_mut() {
            if let Some((lo, hi)) = image_vrange {
                options.vrange_start.set(f64::from(lo));
                options.vrange_stop.set(f64::from(hi));
            }
            if let Some((lo, hi)) = mask_vrange {
                options.vrange_start_mask.set(f64::from(lo));
                options.vrange_stop_mask.set(f64::from(hi));
            }
        }
    }

    /// Apply a change to the configuration and re-render.
    pub(crate) fn update_config(&mut self, change: impl FnOnce(&mut Config)) {
        change(&mut self.config);
        self.error_msg = None;
        self.update_image(true);
    }

    pub(crate) fn set_layer_attribute(&mut self, value: LayerValue, is_mask: bool) {
        self.update_config(|config| config.set_layer_attribute(value, is_mask));
    }

    pub(crate) fn set_view(&mut self, view: u8) {
        self.config.view = view;
        if self.niigrid().is_none() {
            self.load_niigrid();
        }
        self.update_image(true);
    }

    pub(crate) fn clear_masks(&mut self) {
        self.config.remove_mask_layers();
        self.load_niigrid();
        self.update_image(true);
    }

    pub(crate) fn set_max_samples(&mut self, max_samples: usize) {
        self.config.set_max_samples(max_samples);
        self.load_niigrid();
        self.update_image(true);
    }

    pub(crate) fn set_page(&mut self, next: bool) {
        let page = if next {
            self.config.page + 1
        } else {
            match self.config.page.checked_sub(1) {
                Some(page) => page,
                None => return,
            }
        };
        if page < self.config.n_pages() {
            self.config.page = page;
            self.load_niigrid();
            self.update_image(true);
        }
    }

    pub(crate) fn toggle_annotations(&mut self) {
        self.config.annotations = !self.config.annotations;
    }

    pub(crate) fn set_annotation(&mut self, filepath: &str, annotation: u8) {
        self.config
            .annotation_dict
            .insert(filepath.to_string(), annotation);
    }

    pub(crate) fn set_title(&mut self, title: &str) {
        self.update_config(|config| config.set_title(title));
    }

    fn unset_title(&mut self) {
        if let Some(options) = self.options.as_mut() {
            options.title.clear();
        }
        self.config.set_title("");
    }

    pub(crate) fn toggle_equal_hist(&mut self) {
        self.update_config(|config| config.equal_hist = !config.equal_hist);
    }

    pub(crate) fn set_transp_if(&mut self, rule: &str, is_mask: bool) {
        let rule = (!rule.trim().is_empty()).then(|| rule.trim().to_string());
        self.set_layer_attribute(LayerValue::TranspIf(rule), is_mask);
    }

    /// Set the start (or stop) percentile, either to `value` or shifted by
    /// `increment` percent.
    pub(crate) fn set_quantile_range(
        &mut self,
        value: Option<f32>,
        is_mask: bool,
        stop: bool,
        increment: Option<f32>,
    ) {
        let current = self
            .config
            .layer(&self.config.qrange, is_mask)
            .copied()
            .flatten()
            .unwrap_or(QRANGE[usize::from(is_mask)]);
        let mut qrange = [current.0, current.1];
        let slot = usize::from(stop);
        qrange[slot] = match (value, increment) {
            (_, Some(inc)) => qrange[slot] + inc / 100.0,
            (Some(v), None) => v / 100.0,
            (None, None) => return,
        };
        qrange[slot] = qrange[slot].clamp(0.0, 1.0);
        self.config
            .set_layer_attribute(LayerValue::Vrange(None), is_mask);
        self.set_layer_attribute(LayerValue::Qrange(Some((qrange[0], qrange[1]))), is_mask);
        if increment.is_some() {
            if let Some(options) = self.options.as_mut() {
                let (start, stop) = if is_mask {
                    (&mut options.qrange_start_mask, &mut options.qrange_stop_mask)
                } else {
                    (&mut options.qrange_start, &mut options.qrange_stop)
                };
                start.set(f64::from(qrange[0] * 100.0));
                stop.set(f64::from(qrange[1] * 100.0));
            }
        }
    }

    pub(crate) fn set_value_range(&mut self, value: f32, is_mask: bool, stop: bool) {
        let layer = if is_mask { self.config.n_layers() - 1 } else { 0 };
        let (mut lo, mut hi) = self
            .niigrid()
            .and_then(|g| g.layer_vrange(0, layer))
            .unwrap_or((0.0, 1.0));
        if stop {
            hi = value;
        } else {
            lo = value;
        }
        self.set_layer_attribute(LayerValue::Vrange(Some((lo, hi))), is_mask);
    }

    pub(crate) fn toggle_is_atlas(&mut self) {
        let is_atlas = self.config.is_atlas.last().copied().unwrap_or(true);
        self.set_layer_attribute(LayerValue::IsAtlas(!is_atlas), true);
    }

    /// `""` hides the colorbar, otherwise `"vertical"` or `"horizontal"`.
    pub(crate) fn set_cbar(&mut self, orientation: &str) {
        self.update_config(|config| {
            config.cbar_vertical = orientation == "vertical";
            config.cbar = !orientation.is_empty();
        });
    }

    pub(crate) fn set_cbar_ticks(&mut self, ticks: &str) {
        match self.config.set_cbar_ticks(ticks) {
            Ok(()) => self.update_config(|_| {}),
            Err(e) => self.set_error(e),
        }
    }

    /// Resize the window so the image gets `height` pixels, or just
    /// re-render at that height when fullscreen.
    pub(crate) fn set_height(&mut self, ctx: &egui::Context, height: u32) {
        let fullscreen = ctx.input(|i| i.viewport().fullscreen.unwrap_or(false));
        self.update_config(|config| config.height = height);
        if fullscreen {
            return;
        }
        if let Some(image) = &self.image {
            let ppp = ctx.pixels_per_point();
            let aspect = image.width() as f32 / image.height().max(1) as f32;
            let width = aspect * height as f32 / ppp + self.sidebar_width;
            let total_height = height as f32 / ppp + self.menu_height;
            ctx.send_viewport_cmd(egui::ViewportCommand::InnerSize(egui::vec2(
                width + 1.0,
                total_height + 1.0,
            )));
        }
    }

    /// Shift one of the sliders (three planes and time).
    pub(crate) fn step_origin(&mut self, axis: usize, delta: f32) {
        let value = self.config.origin[axis] + delta;
        self.update_origin(axis, value, true);
    }

    pub(crate) fn update_origin(&mut self, axis: usize, value: f32, hd: bool) {
        self.config.origin[axis] = if axis == 3 { value.max(0.0) } else { value };
        self.update_image(hd);
    }

    /// Move the origin to the coordinate under an image pixel.
    pub(crate) fn update_origin_click(&mut self, x: f32, y: f32, hd: bool) {
        let Some(coords) = self.niigrid().and_then(|g| g.origin_at(x, y)) else {
            return;
        };
        for (axis, coord) in coords.into_iter().enumerate() {
            if let Some(coord) = coord {
                self.config.origin[axis] = coord;
            }
        }
        self.update_image(hd);
    }

    /// Note the size available to the image; re-render once resizing stops.
    pub(crate) fn track_view_size(&mut self, size: egui::Vec2, ppp: f32) {
        let now = Instant::now();
        if (size - self.view_size).length() > 0.5 {
            self.view_size = size;
            self.resize.trigger(now);
        }
        if self.resize.poll(now) {
            self.fit_height(size * ppp);
        }
    }

    pub(crate) fn resize_pending(&self) -> bool {
        self.resize.is_pending()
    }

    /// Pick the image height that fills `size` (in pixels).
    fn fit_height(&mut self, size: egui::Vec2) {
        let Some(image) = &self.image else {
            return;
        };
        if size.x <= 0.0 || size.y <= 0.0 {
            return;
        }
        let ratio = size.x / size.y;
        let image_ratio = image.width() as f32 / image.height().max(1) as f32;
        let height = if ratio >= image_ratio {
            size.y
        } else {
            size.x / image_ratio
        };
        let height = f32_to_u32(height.floor());
        if height > 0 && height.abs_diff(image.height()) > 1 {
            log::debug!("resizing image to height {height}");
            self.config.height = height;
            self.update_image(true);
            if let Some(options) = self.options.as_mut() {
                options.height.set(f64::from(height));
            }
        }
    }

    /// Expand an entry's glob pattern and open the matches.
    ///
    /// Several patterns can be given as `{a b} {c}`, the form drop
    /// payloads take when pasted.
    pub(crate) fn open_pattern(&mut self, pattern: &str, is_mask: bool) {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return;
        }
        let patterns = if pattern.starts_with('{') {
            parse_dnd_filepaths(pattern)
        } else {
            vec![pattern.to_string()]
        };
        let mut paths = Vec::new();
        for p in &patterns {
            match expand_glob(p) {
                Ok(matches) => paths.extend(matches),
                Err(e) => return self.set_error(e),
            }
        }
        if paths.is_empty() {
            self.set_error(format!("No files match {pattern}"));
        } else {
            self.open_files(paths, is_mask);
        }
    }

    pub(crate) fn open_files(&mut self, filepaths: Vec<String>, is_mask: bool) {
        if filepaths.is_empty() {
            return;
        }
        self.unset_title();
        match self.config.add_filepaths(filepaths, is_mask) {
            Ok(()) => {
                self.error_msg = None;
                self.load_niigrid();
                self.update_image(true);
            }
            Err(e) => self.set_error(e),
        }
    }

    pub(crate) fn open_files_dialog(&mut self, is_mask: bool) {
        let title = if is_mask { "Open Mask Files" } else { "Open Nifti Files" };
        if let Some(paths) = FileDialog::new().set_title(title).pick_files() {
            let paths = paths
                .into_iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect();
            self.open_files(paths, is_mask);
        }
    }

    /// Open files dropped on the window.
    ///
    /// Drops that only carry bytes are checked and written to the temp
    /// directory first.
    pub(crate) fn open_dropped(&mut self, files: Vec<egui::DroppedFile>, is_mask: bool) {
        let mut paths = Vec::new();
        for file in files {
            if let Some(path) = file.path {
                paths.push(path.to_string_lossy().into_owned());
            } else if let Some(bytes) = file.bytes {
                match persist_dropped_bytes(&file.name, &bytes) {
                    Ok(path) => paths.push(path.to_string_lossy().into_owned()),
                    Err(e) => self.set_error(format!("Failed to load {}: {e}", file.name)),
                }
            }
        }
        self.open_files(paths, is_mask);
    }

    pub(crate) fn convert_dicom_and_open(&mut self, input: &str, output_dir: &str) {
        match dcm2nii(Path::new(input), Path::new(output_dir)) {
            Ok(paths) if !paths.is_empty() => {
                self.input.image = format!("{output_dir}/*.ni*");
                self.input.mask.clear();
                let paths = paths
                    .into_iter()
                    .map(|p| p.to_string_lossy().into_owned())
                    .collect();
                self.open_files(paths, false);
            }
            Ok(_) => self.set_error(format!("dcm2niix wrote no NIfTI files to {output_dir}")),
            Err(e) => self.set_error(e),
        }
    }

    pub(crate) fn load_config_dialog(&mut self) {
        let Some(path) = FileDialog::new()
            .set_title("Open Config File")
            .add_filter("JSON Files", &["json"])
            .pick_file()
        else {
            return;
        };
        match Config::from_json(&path) {
            Ok(config) => {
                self.config = config;
                self.niigrid1 = None;
                self.niigrid2 = None;
                self.error_msg = None;
                self.load_niigrid();
                self.update_image(true);
            }
            Err(e) => self.set_error(e),
        }
    }

    pub(crate) fn save_config_dialog(&mut self) {
        if let Some(path) = save_dialog("config.json", "JSON Files", &["json"]) {
            if let Err(e) = self.config.save(&path) {
                self.set_error(e);
            }
        }
    }

    pub(crate) fn save_annotations_dialog(&mut self) {
        if let Some(path) = save_dialog("annotations.csv", "Comma-separated values", &["csv"]) {
            if let Err(e) = self.config.save_annotations(&path) {
                self.set_error(e);
            }
        }
    }

    pub(crate) fn save_image_dialog(&mut self, name: &str, extensions: &[&str]) {
        let default = format!("image.{}", extensions.first().copied().unwrap_or("png"));
        let Some(path) = save_dialog(&default, name, extensions) else {
            return;
        };
        let result = self.config.to_grid_options(true).and_then(|opts| {
            match self.niigrid_mut() {
                Some(grid) => export::save_image(grid, &path, &opts),
                None => Err(crate::error::Error::NoVolumes),
            }
        });
        if let Err(e) = result {
            self.set_error(e);
        }
        self.update_image(true);
    }

    pub(crate) fn save_gif_dialog(&mut self) {
        let Some(path) = save_dialog("image.gif", "Graphics Interchange Format", &["gif"]) else {
            return;
        };
        let result = self.config.to_grid_options(true).and_then(|opts| {
            match self.niigrid_mut() {
                Some(grid) => export::save_gif(grid, &path, &opts, export::GIF_DURATION_MS, 0),
                None => Err(crate::error::Error::NoVolumes),
            }
        });
        if let Err(e) = result {
            self.set_error(e);
        }
        self.update_image(true);
    }

    pub(crate) fn save_all_dialog(&mut self, gif: bool) {
        let Some(dir) = FileDialog::new().pick_folder() else {
            return;
        };
        let result = self.config.to_grid_options(true).and_then(|opts| {
            export::save_images_or_gifs(
                self.config.filepaths(),
                &dir,
                gif,
                self.config.max_samples,
                &opts,
            )
        });
        match result {
            Ok(paths) => log::info!("saved {} files to {}", paths.len(), dir.display()),
            Err(e) => self.set_error(e),
        }
    }

    /// Hide masks while Shift+Space is held.
    pub(crate) fn hide_masks(&mut self, hidden: bool) {
        match (hidden, self.hidden_alpha) {
            (true, None) => {
                self.hidden_alpha = Some(self.config.alpha);
                self.update_config(|config| config.alpha = 0.0);
            }
            (false, Some(alpha)) => {
                self.hidden_alpha = None;
                self.update_config(|config| config.alpha = alpha);
            }
            _ => {}
        }
    }

    /// Configuration for a detail window showing only one sample.
    pub(crate) fn toplevel_config(&self, sample: usize) -> Option<Config> {
        let fpaths = self.config.get_filepaths(None);
        let sample = fpaths.get(sample)?.clone();
        let mut config = self.config.clone();
        if config.view == 2 {
            config.filepaths_view2 = vec![sample];
        } else {
            config.filepaths_view1 = vec![sample];
        }
        config.page = 0;
        Some(config)
    }

    /// Number of samples on the current page, as laid out.
    pub(crate) fn n_boxes(&self) -> usize {
        self.niigrid().map_or(0, |g| g.boxes().len())
    }

    /// Image pixels per point of the last layout, used for overlays.
    pub(crate) fn image_scale(&self, display_height: f32) -> f32 {
        self.image
            .as_ref()
            .map_or(1.0, |img| display_height / img.height().max(1) as f32)
    }
}

fn save_dialog(default_name: &str, filter: &str, extensions: &[&str]) -> Option<PathBuf> {
    FileDialog::new()
        .set_file_name(default_name)
        .add_filter(filter, extensions)
        .save_file()
}

fn persist_dropped_bytes(name: &str, bytes: &[u8]) -> crate::error::Result<PathBuf> {
    Volume::from_bytes(name, bytes)?;
    let dir = std::env::temp_dir().join("niftiview");
    std::fs::create_dir_all(&dir)?;
    let file_name = Path::new(name)
        .file_name()
        .map_or_else(|| "dropped.nii".into(), std::ffi::OsStr::to_os_string);
    let path = dir.join(file_name);
    std::fs::write(&path, bytes)?;
    Ok(path)
}

/// The application: the main window plus an optional detail window.
pub struct NiftiView {
    main: MainFrame,
    toplevel: Option<MainFrame>,
}

impl NiftiView {
    pub fn new(cc: &eframe::CreationContext<'_>, config: Config) -> Self {
        crate::ui::apply_appearance(&cc.egui_ctx, &config);
        Self {
            main: MainFrame::new(config, false),
            toplevel: None,
        }
    }
}

impl eframe::App for NiftiView {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if let Some(FrameEvent::OpenToplevel(sample)) = self.main.show(ctx) {
            if let Some(config) = self.main.toplevel_config(sample) {
                log::info!("opening detail window for sample {sample}");
                self.toplevel = Some(MainFrame::new(config, true));
            }
        }

        let mut close_toplevel = false;
        if let Some(toplevel) = self.toplevel.as_mut() {
            let title = toplevel
                .config
                .toplevel_filepaths()
                .first()
                .map_or_else(|| "NiftiView".to_string(), |fp| format!("NiftiView - {fp}"));
            ctx.show_viewport_immediate(
                egui::ViewportId::from_hash_of("niftiview_toplevel"),
                egui::ViewportBuilder::default()
                    .with_title(title)
                    .with_inner_size([900.0, 600.0]),
                |ctx, _class| {
                    toplevel.show(ctx);
                    if ctx.input(|i| i.viewport().close_requested()) {
                        close_toplevel = true;
                    }
                },
            );
        }
        if close_toplevel {
            self.toplevel = None;
        }
    }
}
