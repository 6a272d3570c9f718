//! User-selected display options and the file lists they apply to.
//!
//! `Config` is the model behind every widget. It is a plain settings
//! aggregate; the only logic is keeping the per-layer lists in step with
//! the number of layers (image + masks) per sample.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::colormap::{named_color, Colormap, TransparencyRule, CMAP, CMAP_MASK, QRANGE};
use crate::error::{Error, Result};
use crate::grid::{GridOptions, LayerOptions};
use crate::layout::{CoordSys, GlassMode};
use crate::util::expand_glob;

const DEFAULT_CONFIG: &str = include_str!("../data/config.json");
const APP_NAME: &str = "niftiview";
const CONFIG_FILE: &str = "config.json";

/// Keys written as `null` by [`Config::save`].
pub const SAVE_RESET_ATTRIBUTES: [&str; 10] = [
    "filepaths_view1",
    "filepaths_view2",
    "origin",
    "resizing",
    "cmap",
    "transp_if",
    "qrange",
    "vrange",
    "is_atlas",
    "annotation_dict",
];
pub const LAYER_ATTRIBUTES: [&str; 6] =
    ["resizing", "cmap", "transp_if", "qrange", "vrange", "is_atlas"];
pub const LINECOLORS: [&str; 3] = ["white", "gray", "black"];
pub const TMP_HEIGHTS: [u32; 5] = [1080, 720, 480, 360, 240];
pub const PADCOLORS: [&str; 4] = ["black", "white", "gray", "transparent"];

/// Treat an explicit `null` like a missing key.
fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Appearance {
    Dark,
    Light,
}

/// Title drawn above the grid, or one title per sample on the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Title {
    Single(String),
    PerSample(Vec<Option<String>>),
}

impl Title {
    /// Title for the sample at `index` on the current page.
    pub fn for_sample(&self, index: usize) -> Option<&str> {
        match self {
            Title::Single(title) => (index == 0).then_some(title.as_str()),
            Title::PerSample(titles) => titles.get(index).and_then(|t| t.as_deref()),
        }
    }
}

/// Colorbar tick marks, either plain values or values with labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged, try_from = "RawCbarTicks")]
pub enum CbarTicks {
    Values(Vec<f32>),
    Labeled(Vec<(f32, String)>),
}

/// Accepted file forms of [`CbarTicks`], including `{"0.0": "low"}` maps.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawCbarTicks {
    Values(Vec<f32>),
    Labeled(Vec<(f32, String)>),
    Map(BTreeMap<String, String>),
}

impl TryFrom<RawCbarTicks> for CbarTicks {
    type Error = Error;

    fn try_from(raw: RawCbarTicks) -> Result<Self> {
        Ok(match raw {
            RawCbarTicks::Values(values) => CbarTicks::Values(values),
            RawCbarTicks::Labeled(labeled) => CbarTicks::Labeled(labeled),
            RawCbarTicks::Map(map) => {
                let mut labeled = map
                    .into_iter()
                    .map(|(value, label)| {
                        let tick = value
                            .trim()
                            .parse::<f32>()
                            .map_err(|_| Error::InvalidTicks(value.clone()))?;
                        Ok((tick, label))
                    })
                    .collect::<Result<Vec<_>>>()?;
                labeled.sort_by(|a, b| a.0.total_cmp(&b.0));
                CbarTicks::Labeled(labeled)
            }
        })
    }
}

/// New value for one of the per-layer attributes.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerValue {
    Resizing(usize),
    Cmap(String),
    TranspIf(Option<String>),
    Qrange(Option<(f32, f32)>),
    Vrange(Option<(f32, f32)>),
    IsAtlas(bool),
}

impl LayerValue {
    /// Config key of the attribute, one of [`LAYER_ATTRIBUTES`].
    pub fn name(&self) -> &'static str {
        let index = match self {
            LayerValue::Resizing(_) => 0,
            LayerValue::Cmap(_) => 1,
            LayerValue::TranspIf(_) => 2,
            LayerValue::Qrange(_) => 3,
            LayerValue::Vrange(_) => 4,
            LayerValue::IsAtlas(_) => 5,
        };
        LAYER_ATTRIBUTES[index]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scaling: Option<f32>,
    pub appearance_mode: Option<Appearance>,
    #[serde(deserialize_with = "nullable")]
    pub filepaths_view1: Vec<Vec<String>>,
    #[serde(deserialize_with = "nullable")]
    pub filepaths_view2: Vec<Vec<String>>,
    pub view: u8,
    pub page: usize,
    pub max_samples: usize,
    #[serde(deserialize_with = "nullable")]
    pub origin: [f32; 4],
    pub layout: String,
    pub height: u32,
    pub squeeze: bool,
    pub coord_sys: CoordSys,
    pub glass_mode: Option<GlassMode>,
    pub annotations: bool,
    #[serde(deserialize_with = "nullable")]
    pub resizing: Vec<usize>,
    #[serde(deserialize_with = "nullable")]
    pub cmap: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub transp_if: Vec<Option<String>>,
    #[serde(deserialize_with = "nullable")]
    pub qrange: Vec<Option<(f32, f32)>>,
    #[serde(deserialize_with = "nullable")]
    pub vrange: Vec<Option<(f32, f32)>>,
    pub equal_hist: bool,
    #[serde(deserialize_with = "nullable")]
    pub is_atlas: Vec<bool>,
    pub alpha: f32,
    pub crosshair: bool,
    pub fpath: usize,
    pub coordinates: bool,
    pub header: bool,
    pub histogram: bool,
    pub cbar: bool,
    pub title: Option<Title>,
    pub fontsize: u32,
    pub linecolor: String,
    pub linewidth: u32,
    pub tmp_height: Option<u32>,
    pub nrows: Option<usize>,
    pub cbar_vertical: bool,
    pub cbar_pad: u32,
    pub cbar_pad_color: String,
    pub cbar_x: f32,
    pub cbar_y: f32,
    pub cbar_width: f32,
    pub cbar_length: f32,
    pub cbar_label: Option<String>,
    pub cbar_ticks: Option<CbarTicks>,
    #[serde(deserialize_with = "nullable")]
    pub annotation_dict: BTreeMap<String, u8>,
}

impl Default for Config {
    fn default() -> Self {
        let mut config = Self {
            scaling: None,
            appearance_mode: Some(Appearance::Dark),
            filepaths_view1: Vec::new(),
            filepaths_view2: Vec::new(),
            view: 1,
            page: 0,
            max_samples: 4,
            origin: [0.0; 4],
            layout: "sagittal++".to_string(),
            height: 600,
            squeeze: false,
            coord_sys: CoordSys::ArrayMm,
            glass_mode: None,
            annotations: false,
            resizing: Vec::new(),
            cmap: Vec::new(),
            transp_if: Vec::new(),
            qrange: Vec::new(),
            vrange: Vec::new(),
            equal_hist: false,
            is_atlas: Vec::new(),
            alpha: 0.5,
            crosshair: false,
            fpath: 0,
            coordinates: false,
            header: false,
            histogram: false,
            cbar: false,
            title: None,
            fontsize: 20,
            linecolor: "white".to_string(),
            linewidth: 2,
            tmp_height: Some(360),
            nrows: None,
            cbar_vertical: true,
            cbar_pad: 0,
            cbar_pad_color: "black".to_string(),
            cbar_x: 0.9,
            cbar_y: 0.5,
            cbar_width: 0.05,
            cbar_length: 0.8,
            cbar_label: None,
            cbar_ticks: None,
            annotation_dict: BTreeMap::new(),
        };
        config.normalize();
        config
    }
}

impl Config {
    /// Fill in per-layer lists and annotations missing from a loaded file.
    fn normalize(&mut self) {
        if !(1..=2).contains(&self.view) {
            self.view = 1;
        }
        self.max_samples = self.max_samples.max(1);
        let n = self.n_layers();
        let mask_default = |i: usize| i > 0;
        fill(&mut self.resizing, n, |i| usize::from(!mask_default(i)));
        fill(&mut self.cmap, n, |i| {
            if mask_default(i) { CMAP_MASK } else { CMAP }.to_string()
        });
        fill(&mut self.transp_if, n, |i| {
            mask_default(i).then(|| "=0".to_string())
        });
        fill(&mut self.qrange, n, |_| None);
        fill(&mut self.vrange, n, |_| None);
        fill(&mut self.is_atlas, n, |_| false);
        if self.annotation_dict.is_empty() {
            self.annotation_dict = self
                .filepaths_view1
                .iter()
                .filter_map(|fps| fps.first())
                .map(|fp| (fp.clone(), 0))
                .collect();
        }
    }

    /// Samples of the current view; each sample is image + mask paths.
    pub fn filepaths(&self) -> &[Vec<String>] {
        self.filepaths_of(self.view)
    }

    fn filepaths_of(&self, view: u8) -> &[Vec<String>] {
        if view == 2 {
            &self.filepaths_view2
        } else {
            &self.filepaths_view1
        }
    }

    fn filepaths_mut(&mut self) -> &mut Vec<Vec<String>> {
        if self.view == 2 {
            &mut self.filepaths_view2
        } else {
            &mut self.filepaths_view1
        }
    }

    /// Top-most layer of every sample.
    pub fn toplevel_filepaths(&self) -> Vec<&str> {
        self.filepaths()
            .iter()
            .filter_map(|fps| fps.last().map(String::as_str))
            .collect()
    }

    pub fn n_layers(&self) -> usize {
        self.filepaths().first().map_or(1, Vec::len).max(1)
    }

    pub fn n_pages(&self) -> usize {
        self.filepaths().len().saturating_sub(1) / self.max_samples.max(1) + 1
    }

    /// Samples shown on the current page of `view` (current view if `None`).
    pub fn get_filepaths(&self, view: Option<u8>) -> &[Vec<String>] {
        let fpaths = self.filepaths_of(view.unwrap_or(self.view));
        let max_samples = self.max_samples.max(1);
        let n_pages = fpaths.len().saturating_sub(1) / max_samples + 1;
        let start = self.page.min(n_pages - 1) * max_samples;
        let end = (start + max_samples).min(fpaths.len());
        &fpaths[start.min(end)..end]
    }

    /// Expand `pattern` as a glob and add the matches.
    pub fn add_filepaths_glob(&mut self, pattern: &str, is_mask: bool) -> Result<()> {
        let fpaths = expand_glob(pattern)?;
        if fpaths.is_empty() {
            log::warn!("no files match {pattern}");
        }
        self.add_filepaths(fpaths, is_mask)
    }

    /// Replace the images of the current view, or add one mask layer.
    pub fn add_filepaths(&mut self, fpaths: Vec<String>, is_mask: bool) -> Result<()> {
        if fpaths.is_empty() {
            return Ok(());
        }
        if is_mask {
            let n_samples = self.filepaths().len();
            if n_samples == 0 {
                return Err(Error::NoVolumes);
            }
            if !(fpaths.len() == n_samples || fpaths.len() == 1 || n_samples == 1) {
                return Err(Error::MaskCount {
                    given: fpaths.len(),
                    expected: n_samples,
                });
            }
            if fpaths.len() > 1 && n_samples == 1 {
                let sample = self.filepaths()[0].clone();
                *self.filepaths_mut() = vec![sample; fpaths.len()];
            }
            self.add_mask_layer();
            let n_samples = self.filepaths().len();
            let fpaths = if fpaths.len() == 1 {
                vec![fpaths[0].clone(); n_samples]
            } else {
                fpaths
            };
            for (sample, fp) in self.filepaths_mut().iter_mut().zip(fpaths) {
                sample.push(fp);
            }
        } else {
            self.remove_mask_layers();
            *self.filepaths_mut() = fpaths.iter().map(|fp| vec![fp.clone()]).collect();
            self.page = 0;
            if self.view == 1 {
                self.annotation_dict = fpaths.into_iter().map(|fp| (fp, 0)).collect();
            }
        }
        Ok(())
    }

    pub fn set_max_samples(&mut self, max_samples: usize) {
        self.max_samples = max_samples.max(1);
        self.nrows = None;
    }

    /// `a|b|c` sets one title per sample, anything else a single title.
    pub fn set_title(&mut self, title: &str) {
        self.title = if title.is_empty() {
            None
        } else if title.contains('|') {
            let mut titles: Vec<Option<String>> =
                title.split('|').map(|t| Some(t.to_string())).collect();
            let n_shown = self.get_filepaths(None).len();
            if titles.len() < n_shown {
                titles.resize(n_shown, None);
            }
            Some(Title::PerSample(titles))
        } else {
            Some(Title::Single(title.to_string()))
        };
    }

    /// Parse `1|2|3` or `0:low|1:high`; empty clears the ticks.
    pub fn set_cbar_ticks(&mut self, ticks: &str) -> Result<()> {
        let parse = |s: &str| {
            s.trim()
                .parse::<f32>()
                .map_err(|_| Error::InvalidTicks(ticks.to_string()))
        };
        self.cbar_ticks = if ticks.trim().is_empty() {
            None
        } else if ticks.contains(':') {
            let labeled = ticks
                .split('|')
                .map(|item| {
                    let (value, label) = item
                        .split_once(':')
                        .ok_or_else(|| Error::InvalidTicks(ticks.to_string()))?;
                    Ok((parse(value)?, label.to_string()))
                })
                .collect::<Result<Vec<_>>>()?;
            Some(CbarTicks::Labeled(labeled))
        } else {
            Some(CbarTicks::Values(
                ticks.split('|').map(parse).collect::<Result<Vec<_>>>()?,
            ))
        };
        Ok(())
    }

    /// Extend every per-layer list by one mask layer.
    ///
    /// The first mask gets the mask defaults, later ones copy the
    /// settings of the previous mask.
    pub fn add_mask_layer(&mut self) {
        let first_mask = self.n_layers() == 1;
        let resizing = if first_mask { 0 } else { last(&self.resizing, 0) };
        let cmap = if first_mask {
            CMAP_MASK.to_string()
        } else {
            last(&self.cmap, CMAP_MASK.to_string())
        };
        let transp_if = if first_mask {
            Some("=0".to_string())
        } else {
            last(&self.transp_if, None)
        };
        let qrange = if first_mask {
            Some(QRANGE[1])
        } else {
            last(&self.qrange, None)
        };
        self.resizing.push(resizing);
        self.cmap.push(cmap);
        self.transp_if.push(transp_if);
        self.qrange.push(qrange);
        self.vrange.push(None);
        self.is_atlas.push(true);
    }

    /// Drop all mask layers from the current view.
    pub fn remove_mask_layers(&mut self) {
        for sample in self.filepaths_mut().iter_mut() {
            sample.truncate(1);
        }
        self.resizing.truncate(1);
        self.cmap.truncate(1);
        self.transp_if.truncate(1);
        self.qrange.truncate(1);
        self.vrange.truncate(1);
        self.is_atlas.truncate(1);
    }

    /// Set an attribute of the image layer, or of the top mask layer.
    ///
    /// Setting a mask attribute while no mask is loaded does nothing.
    pub fn set_layer_attribute(&mut self, value: LayerValue, is_mask: bool) {
        if self.n_layers() == 1 && is_mask {
            log::debug!("no mask layer, ignoring {}", value.name());
            return;
        }
        let n = self.n_layers();
        let slot = |len: usize| if is_mask { len.saturating_sub(1) } else { 0 };
        match value {
            LayerValue::Resizing(v) => set_slot(&mut self.resizing, n, slot, v),
            LayerValue::Cmap(v) => set_slot(&mut self.cmap, n, slot, v),
            LayerValue::TranspIf(v) => set_slot(&mut self.transp_if, n, slot, v),
            LayerValue::Qrange(v) => set_slot(&mut self.qrange, n, slot, v),
            LayerValue::Vrange(v) => set_slot(&mut self.vrange, n, slot, v),
            LayerValue::IsAtlas(v) => set_slot(&mut self.is_atlas, n, slot, v),
        }
    }

    /// Current value of a per-layer list for the image or top mask layer.
    pub fn layer<'a, T>(&self, list: &'a [T], is_mask: bool) -> Option<&'a T> {
        if is_mask {
            if self.n_layers() > 1 {
                list.last()
            } else {
                None
            }
        } else {
            list.first()
        }
    }

    /// Write `filepath,annotation` rows for every annotated image.
    pub fn save_annotations(&self, path: &Path) -> Result<()> {
        let mut csv = String::from("filepath,annotation\n");
        for (filepath, annotation) in &self.annotation_dict {
            csv.push_str(&csv_field(filepath));
            csv.push(',');
            csv.push_str(&annotation.to_string());
            csv.push('\n');
        }
        fs::write(path, csv)?;
        log::info!("saved {} annotations to {}", self.annotation_dict.len(), path.display());
        Ok(())
    }

    /// Save display options; file lists, origin and layer settings are
    /// written as `null` so the file applies to any data.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut value = serde_json::to_value(self)?;
        if let Some(map) = value.as_object_mut() {
            for key in SAVE_RESET_ATTRIBUTES {
                map.insert(key.to_string(), serde_json::Value::Null);
            }
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(&value)?)?;
        log::info!("saved configuration to {}", path.display());
        Ok(())
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let mut config: Self = serde_json::from_value(value)?;
        config.normalize();
        Ok(config)
    }

    pub fn from_json(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&content)?;
        config.normalize();
        log::info!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Built-in defaults, overridden by the user's config file if present.
    pub fn load_default() -> Self {
        if let Some(path) = user_config_path().filter(|p| p.exists()) {
            match Self::from_json(&path) {
                Ok(config) => return config,
                Err(e) => log::warn!("ignoring {}: {e}", path.display()),
            }
        }
        serde_json::from_str::<serde_json::Value>(DEFAULT_CONFIG)
            .map_err(Error::from)
            .and_then(Self::from_value)
            .unwrap_or_else(|e| {
                log::warn!("built-in configuration is invalid: {e}");
                Self::default()
            })
    }

    /// Typed render options; `hd` disables the temporary low-res height.
    pub fn to_grid_options(&self, hd: bool) -> Result<GridOptions> {
        let n = self.n_layers();
        let layers = (0..n)
            .map(|i| {
                let is_mask = i > 0;
                let cmap = self
                    .cmap
                    .get(i)
                    .map_or(Ok(if is_mask { Colormap::Red } else { Colormap::Gray }), |c| {
                        c.parse::<Colormap>()
                    })?;
                let transp_if = self
                    .transp_if
                    .get(i)
                    .cloned()
                    .flatten()
                    .map(|rule| rule.parse::<TransparencyRule>())
                    .transpose()?;
                Ok(LayerOptions {
                    resizing: self.resizing.get(i).copied().unwrap_or(usize::from(!is_mask)),
                    cmap,
                    transp_if,
                    qrange: self
                        .qrange
                        .get(i)
                        .copied()
                        .flatten()
                        .unwrap_or(QRANGE[usize::from(is_mask)]),
                    vrange: self.vrange.get(i).copied().flatten(),
                    is_atlas: self.is_atlas.get(i).copied().unwrap_or(false),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(GridOptions {
            origin: self.origin,
            layout: self.layout.clone(),
            height: if hd {
                self.height
            } else {
                self.tmp_height.map_or(self.height, |h| h.min(self.height))
            },
            squeeze: self.squeeze,
            coord_sys: self.coord_sys,
            glass_mode: self.glass_mode,
            equal_hist: self.equal_hist,
            alpha: self.alpha.clamp(0.0, 1.0),
            crosshair: self.crosshair,
            histogram: self.histogram,
            cbar: self.cbar,
            linecolor: named_color(&self.linecolor).unwrap_or([255, 255, 255, 255]),
            linewidth: self.linewidth.max(1),
            nrows: self.nrows,
            cbar_vertical: self.cbar_vertical,
            cbar_pad: self.cbar_pad,
            cbar_pad_color: named_color(&self.cbar_pad_color).unwrap_or([0, 0, 0, 255]),
            cbar_x: self.cbar_x,
            cbar_y: self.cbar_y,
            cbar_width: self.cbar_width,
            cbar_length: self.cbar_length,
            layers,
        })
    }
}

/// Location of the user's default configuration file.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|mut path| {
        path.push(APP_NAME);
        path.push(CONFIG_FILE);
        path
    })
}

fn fill<T>(list: &mut Vec<T>, n: usize, default: impl Fn(usize) -> T) {
    while list.len() < n {
        list.push(default(list.len()));
    }
    list.truncate(n);
}

fn last<T: Clone>(list: &[T], fallback: T) -> T {
    list.last().cloned().unwrap_or(fallback)
}

fn set_slot<T: Default>(list: &mut Vec<T>, n: usize, slot: impl Fn(usize) -> usize, value: T) {
    if list.len() < n {
        list.resize_with(n, T::default);
    }
    let idx = slot(list.len());
    list[idx] = value;
}

fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    fn config_with_images(n: usize) -> Config {
        let mut config = Config::default();
        let images: Vec<String> = (0..n).map(|i| format!("img{i}.nii")).collect();
        config.add_filepaths(images, false).unwrap();
        config
    }

    #[test]
    fn test_default_layer_lists_match_layers() {
        let config = Config::default();
        assert_eq!(config.n_layers(), 1);
        assert_eq!(config.resizing, vec![1]);
        assert_eq!(config.cmap, vec!["gray".to_string()]);
        assert_eq!(config.transp_if, vec![None]);
        assert_eq!(config.n_pages(), 1);
        assert!(config.get_filepaths(None).is_empty());
    }

    #[test]
    fn test_builtin_config_loads() {
        let value: serde_json::Value = serde_json::from_str(DEFAULT_CONFIG).unwrap();
        let config = Config::from_value(value).unwrap();
        assert_eq!(config.layout, "sagittal++");
        assert_eq!(config.tmp_height, Some(360));
        assert_eq!(config.qrange.len(), 1);
    }

    #[test]
    fn test_pages() {
        let mut config = config_with_images(10);
        assert_eq!(config.n_pages(), 3);
        assert_eq!(config.get_filepaths(None).len(), 4);
        config.page = 2;
        assert_eq!(config.get_filepaths(None), &[vec!["img8.nii".to_string()], vec!["img9.nii".to_string()]]);
        config.page = 7;
        assert_eq!(config.get_filepaths(None).len(), 2);
        config.set_max_samples(5);
        assert_eq!(config.n_pages(), 2);
        assert_eq!(config.nrows, None);
    }

    #[test]
    fn test_add_images_resets_page_and_annotations() {
        let mut config = config_with_images(6);
        config.page = 1;
        config.add_filepaths(paths(&["a.nii", "b.nii"]), false).unwrap();
        assert_eq!(config.page, 0);
        assert_eq!(config.annotation_dict.len(), 2);
        assert_eq!(config.annotation_dict.get("a.nii"), Some(&0));
    }

    #[test]
    fn test_add_images_to_view2_keeps_annotations() {
        let mut config = config_with_images(2);
        config.view = 2;
        config.add_filepaths(paths(&["z.nii"]), false).unwrap();
        assert_eq!(config.filepaths(), &[vec!["z.nii".to_string()]]);
        assert_eq!(config.filepaths_view1.len(), 2);
        assert!(config.annotation_dict.contains_key("img0.nii"));
    }

    #[test]
    fn test_single_mask_broadcasts_to_all_images() {
        let mut config = config_with_images(3);
        config.add_filepaths(paths(&["mask.nii"]), true).unwrap();
        assert_eq!(config.n_layers(), 2);
        for sample in config.filepaths() {
            assert_eq!(sample[1], "mask.nii");
        }
        assert_eq!(config.cmap, vec!["gray".to_string(), "red".to_string()]);
        assert_eq!(config.transp_if, vec![None, Some("=0".to_string())]);
        assert_eq!(config.qrange, vec![None, Some(QRANGE[1])]);
        assert_eq!(config.resizing, vec![1, 0]);
        assert_eq!(config.is_atlas, vec![false, true]);
        assert_eq!(config.toplevel_filepaths(), vec!["mask.nii"; 3]);
    }

    #[test]
    fn test_many_masks_repeat_single_image() {
        let mut config = config_with_images(1);
        config
            .add_filepaths(paths(&["m1.nii", "m2.nii"]), true)
            .unwrap();
        assert_eq!(
            config.filepaths(),
            &[
                vec!["img0.nii".to_string(), "m1.nii".to_string()],
                vec!["img0.nii".to_string(), "m2.nii".to_string()],
            ]
        );
    }

    #[test]
    fn test_mask_count_mismatch_is_rejected() {
        let mut config = config_with_images(3);
        let err = config
            .add_filepaths(paths(&["m1.nii", "m2.nii"]), true)
            .unwrap_err();
        assert!(matches!(err, Error::MaskCount { given: 2, expected: 3 }));
        assert_eq!(config.n_layers(), 1);
        assert_eq!(config.cmap.len(), 1);
    }

    #[test]
    fn test_mask_without_images_is_rejected() {
        let mut config = Config::default();
        assert!(matches!(
            config.add_filepaths(paths(&["m.nii"]), true),
            Err(Error::NoVolumes)
        ));
    }

    #[test]
    fn test_second_mask_copies_previous_mask() {
        let mut config = config_with_images(2);
        config.add_filepaths(paths(&["m.nii"]), true).unwrap();
        config.set_layer_attribute(LayerValue::Cmap("jet".to_string()), true);
        config.set_layer_attribute(LayerValue::Resizing(2), true);
        config.set_layer_attribute(LayerValue::Vrange(Some((0.0, 3.0))), true);
        config.add_filepaths(paths(&["n.nii"]), true).unwrap();
        assert_eq!(config.n_layers(), 3);
        assert_eq!(config.cmap[2], "jet");
        assert_eq!(config.resizing[2], 2);
        assert_eq!(config.vrange[2], None);

        config.remove_mask_layers();
        assert_eq!(config.n_layers(), 1);
        assert_eq!(config.cmap, vec!["gray".to_string()]);
        assert_eq!(config.vrange.len(), 1);
    }

    #[test]
    fn test_new_images_drop_masks() {
        let mut config = config_with_images(2);
        config.add_filepaths(paths(&["m.nii"]), true).unwrap();
        config.add_filepaths(paths(&["x.nii"]), false).unwrap();
        assert_eq!(config.n_layers(), 1);
        assert_eq!(config.is_atlas, vec![false]);
    }

    #[test]
    fn test_set_layer_attribute_slots() {
        let mut config = config_with_images(1);
        config.set_layer_attribute(LayerValue::Cmap("hot".to_string()), true);
        assert_eq!(config.cmap, vec!["gray".to_string()]);
        config.set_layer_attribute(LayerValue::Cmap("hot".to_string()), false);
        assert_eq!(config.cmap, vec!["hot".to_string()]);

        config.add_filepaths(paths(&["m.nii"]), true).unwrap();
        config.set_layer_attribute(LayerValue::IsAtlas(false), true);
        config.set_layer_attribute(LayerValue::Qrange(Some((0.1, 0.9))), false);
        assert_eq!(config.is_atlas, vec![false, false]);
        assert_eq!(config.qrange[0], Some((0.1, 0.9)));
        assert_eq!(config.layer(&config.is_atlas, true), Some(&false));
        assert_eq!(config.layer(&config.cmap, false), Some(&"hot".to_string()));
    }

    #[test]
    fn test_set_title() {
        let mut config = config_with_images(3);
        config.set_title("a|b");
        assert_eq!(
            config.title,
            Some(Title::PerSample(vec![
                Some("a".to_string()),
                Some("b".to_string()),
                None
            ]))
        );
        assert_eq!(config.title.as_ref().unwrap().for_sample(1), Some("b"));
        config.set_title("brain");
        assert_eq!(config.title, Some(Title::Single("brain".to_string())));
        config.set_title("");
        assert_eq!(config.title, None);
    }

    #[test]
    fn test_set_cbar_ticks() {
        let mut config = Config::default();
        config.set_cbar_ticks("0|0.5|1").unwrap();
        assert_eq!(config.cbar_ticks, Some(CbarTicks::Values(vec![0.0, 0.5, 1.0])));
        config.set_cbar_ticks("0:low|1:high").unwrap();
        assert_eq!(
            config.cbar_ticks,
            Some(CbarTicks::Labeled(vec![
                (0.0, "low".to_string()),
                (1.0, "high".to_string())
            ]))
        );
        config.set_cbar_ticks("").unwrap();
        assert_eq!(config.cbar_ticks, None);
        assert!(config.set_cbar_ticks("a|b").is_err());
    }

    #[test]
    fn test_save_resets_data_attributes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = config_with_images(2);
        config.add_filepaths(paths(&["m.nii"]), true).unwrap();
        config.height = 800;
        config.origin = [1.0, 2.0, 3.0, 0.0];
        config.save(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        for key in SAVE_RESET_ATTRIBUTES {
            assert!(raw[key].is_null(), "{key} should be null");
        }
        assert_eq!(raw["height"], 800);

        let loaded = Config::from_json(&path).unwrap();
        assert_eq!(loaded.height, 800);
        assert_eq!(loaded.origin, [0.0; 4]);
        assert!(loaded.filepaths().is_empty());
        assert_eq!(loaded.cmap, vec!["gray".to_string()]);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let value = serde_json::json!({"layout": "axial", "qrange": null, "title": ["a", null]});
        let config = Config::from_value(value).unwrap();
        assert_eq!(config.layout, "axial");
        assert_eq!(config.height, 600);
        assert_eq!(config.qrange, vec![None]);
        assert_eq!(
            config.title,
            Some(Title::PerSample(vec![Some("a".to_string()), None]))
        );
    }

    #[test]
    fn test_cbar_ticks_accept_label_map() {
        let value = serde_json::json!({"cbar_ticks": {"10.0": "high", "0.0": "low", "2.5": "mid"}});
        let config = Config::from_value(value).unwrap();
        assert_eq!(
            config.cbar_ticks,
            Some(CbarTicks::Labeled(vec![
                (0.0, "low".to_string()),
                (2.5, "mid".to_string()),
                (10.0, "high".to_string())
            ]))
        );

        let saved = serde_json::to_value(&config).unwrap();
        let reloaded = Config::from_value(saved).unwrap();
        assert_eq!(reloaded.cbar_ticks, config.cbar_ticks);

        let values = Config::from_value(serde_json::json!({"cbar_ticks": [0.0, 1.0]})).unwrap();
        assert_eq!(values.cbar_ticks, Some(CbarTicks::Values(vec![0.0, 1.0])));
        assert!(Config::from_value(serde_json::json!({"cbar_ticks": {"x": "low"}})).is_err());
    }

    #[test]
    fn test_save_annotations_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("annotations.csv");
        let mut config = Config::default();
        config
            .add_filepaths(paths(&["a.nii", "b,c.nii"]), false)
            .unwrap();
        config.annotation_dict.insert("a.nii".to_string(), 2);
        config.save_annotations(&path).unwrap();
        let csv = fs::read_to_string(&path).unwrap();
        assert_eq!(csv, "filepath,annotation\na.nii,2\n\"b,c.nii\",0\n");
    }

    #[test]
    fn test_grid_options_from_config() {
        let mut config = config_with_images(1);
        config.add_filepaths(paths(&["m.nii"]), true).unwrap();
        config.height = 500;
        let hd = config.to_grid_options(true).unwrap();
        assert_eq!(hd.height, 500);
        assert_eq!(hd.layers.len(), 2);
        assert_eq!(hd.layers[1].cmap, Colormap::Red);
        assert!(hd.layers[1].transp_if.unwrap().is_transparent(0.0));
        assert_eq!(hd.layers[0].qrange, QRANGE[0]);
        let fast = config.to_grid_options(false).unwrap();
        assert_eq!(fast.height, 360);

        config.set_layer_attribute(LayerValue::Cmap("nope".to_string()), false);
        assert!(matches!(
            config.to_grid_options(true),
            Err(Error::UnknownColormap(_))
        ));
    }
}
