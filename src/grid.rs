//! Renders a page of samples into one RGBA image.
//!
//! Each sample is a stack of layers (an image followed by masks) and is
//! drawn as a row of plane tiles. Samples are packed into `nrows` rows.

use std::collections::HashMap;
use std::path::Path;

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use ndarray::Array2;

use crate::colormap::{label_color, Colormap, TransparencyRule, QRANGE};
use crate::error::{Error, Result};
use crate::layout::{filter_type, parse_layout, CoordSys, GlassMode, Plane};
use crate::util::{f32_to_u32, f32_to_u8, usize_to_f32};
use crate::volume::{Extent, Volume};

const HISTOGRAM_BINS: usize = 32;
/// Largest canvas `get_image` allocates, in pixels.
pub const MAX_IMAGE_PIXELS: u64 = 1 << 28;

/// Cache key: sample, layer, frame and the bits of the percentile window.
type QuantileKey = (usize, usize, usize, u32, u32);

/// Render settings for one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerOptions {
    pub resizing: usize,
    pub cmap: Colormap,
    pub transp_if: Option<TransparencyRule>,
    /// Percentile window used when `vrange` is unset.
    pub qrange: (f32, f32),
    pub vrange: Option<(f32, f32)>,
    pub is_atlas: bool,
}

impl LayerOptions {
    pub fn image() -> Self {
        Self {
            resizing: 1,
            cmap: Colormap::Gray,
            transp_if: None,
            qrange: QRANGE[0],
            vrange: None,
            is_atlas: false,
        }
    }
}

/// Everything [`NiftiImageGrid::get_image`] needs to draw a page.
#[derive(Debug, Clone, PartialEq)]
pub struct GridOptions {
    /// Three spatial coordinates and the time frame.
    pub origin: [f32; 4],
    pub layout: String,
    pub height: u32,
    pub squeeze: bool,
    pub coord_sys: CoordSys,
    pub glass_mode: Option<GlassMode>,
    pub equal_hist: bool,
    /// Opacity of mask layers.
    pub alpha: f32,
    pub crosshair: bool,
    pub histogram: bool,
    pub cbar: bool,
    pub linecolor: [u8; 4],
    pub linewidth: u32,
    pub nrows: Option<usize>,
    pub cbar_vertical: bool,
    pub cbar_pad: u32,
    pub cbar_pad_color: [u8; 4],
    pub cbar_x: f32,
    pub cbar_y: f32,
    pub cbar_width: f32,
    pub cbar_length: f32,
    pub layers: Vec<LayerOptions>,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            origin: [0.0; 4],
            layout: "sagittal++".to_string(),
            height: 600,
            squeeze: false,
            coord_sys: CoordSys::ArrayMm,
            glass_mode: None,
            equal_hist: false,
            alpha: 0.5,
            crosshair: false,
            histogram: false,
            cbar: false,
            linecolor: [255, 255, 255, 255],
            linewidth: 2,
            nrows: None,
            cbar_vertical: true,
            cbar_pad: 0,
            cbar_pad_color: [0, 0, 0, 255],
            cbar_x: 0.9,
            cbar_y: 0.5,
            cbar_width: 0.05,
            cbar_length: 0.8,
            layers: vec![LayerOptions::image()],
        }
    }
}

/// Pixel rectangle in the rendered image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl PixelRect {
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x as f32
            && y >= self.y as f32
            && x < (self.x + self.w) as f32
            && y < (self.y + self.h) as f32
    }
}

/// One plane of one sample in the last render.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub sample: usize,
    pub plane: Plane,
    pub rect: PixelRect,
    extent: Extent,
}

/// Colorbar placement and the window it represents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Colorbar {
    pub rect: PixelRect,
    pub vrange: (f32, f32),
    pub vertical: bool,
}

/// Layers of each sample plus the geometry of the last render.
#[derive(Debug, Default)]
pub struct NiftiImageGrid {
    samples: Vec<Vec<Volume>>,
    boxes: Vec<PixelRect>,
    tiles: Vec<Tile>,
    vranges: Vec<Vec<(f32, f32)>>,
    colorbar: Option<Colorbar>,
    coord_sys: CoordSys,
    size: (u32, u32),
    quantiles: HashMap<QuantileKey, (f32, f32)>,
}

impl NiftiImageGrid {
    /// Load every layer of every sample.
    pub fn open(filepaths: &[Vec<String>]) -> Result<Self> {
        let samples = filepaths
            .iter()
            .map(|layers| {
                layers
                    .iter()
                    .map(|fp| {
                        Volume::open(Path::new(fp)).inspect_err(|e| {
                            log::error!("failed to load {fp}: {e}");
                        })
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        Self::from_volumes(samples)
    }

    pub fn from_volumes(samples: Vec<Vec<Volume>>) -> Result<Self> {
        if samples.is_empty() || samples.iter().any(Vec::is_empty) {
            return Err(Error::NoVolumes);
        }
        Ok(Self {
            samples,
            ..Self::default()
        })
    }

    pub fn samples(&self) -> &[Vec<Volume>] {
        &self.samples
    }

    /// Pixel box of each sample in the last render.
    pub fn boxes(&self) -> &[PixelRect] {
        &self.boxes
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn colorbar(&self) -> Option<&Colorbar> {
        self.colorbar.as_ref()
    }

    /// Size of the last rendered image.
    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Window used for a layer in the last render.
    pub fn layer_vrange(&self, sample: usize, layer: usize) -> Option<(f32, f32)> {
        self.vranges.get(sample)?.get(layer).copied()
    }

    /// Index of the sample drawn at pixel (x, y).
    pub fn sample_at(&self, x: f32, y: f32) -> Option<usize> {
        self.boxes.iter().position(|b| b.contains(x, y))
    }

    /// Coordinates under pixel (x, y).
    ///
    /// The axis perpendicular to the hit tile is `None` so callers keep
    /// the current through-plane coordinate.
    pub fn origin_at(&self, x: f32, y: f32) -> Option<[Option<f32>; 3]> {
        let tile = self.tiles.iter().find(|t| t.rect.contains(x, y))?;
        let volume = self.samples.get(tile.sample)?.first()?;
        let (h_axis, v_axis) = tile.plane.display_axes();
        let h_range = &tile.extent[h_axis];
        let v_range = &tile.extent[v_axis];
        let fx = (x - tile.rect.x as f32) / tile.rect.w.max(1) as f32;
        let fy = (y - tile.rect.y as f32) / tile.rect.h.max(1) as f32;
        let h_idx = usize_to_f32(h_range.start) + fx * usize_to_f32(h_range.len()) - 0.5;
        let v_idx = usize_to_f32(v_range.end) - fy * usize_to_f32(v_range.len()) - 0.5;
        let mut origin = [None; 3];
        origin[h_axis] = Some(volume.index_to_coord(self.coord_sys, h_axis, h_idx));
        origin[v_axis] = Some(volume.index_to_coord(self.coord_sys, v_axis, v_idx));
        Some(origin)
    }

    /// Percentile window of one layer, computed once per frame and window.
    fn cached_quantiles(
        &mut self,
        sample: usize,
        layer: usize,
        frame: usize,
        qrange: (f32, f32),
    ) -> (f32, f32) {
        let volume = &self.samples[sample][layer];
        let frame = frame.min(volume.n_frames() - 1);
        *self
            .quantiles
            .entry((sample, layer, frame, qrange.0.to_bits(), qrange.1.to_bits()))
            .or_insert_with(|| volume.quantiles(frame, qrange))
    }

    /// Composite all samples into one image and remember its geometry.
    ///
    /// Fails with [`Error::ImageTooLarge`] instead of allocating a canvas
    /// above [`MAX_IMAGE_PIXELS`].
    pub fn get_image(&mut self, opts: &GridOptions) -> Result<RgbaImage> {
        let planes = parse_layout(&opts.layout);
        let n_samples = self.samples.len();
        let frame = f32_to_u32(opts.origin[3]) as usize;
        let extents: Vec<Extent> = self
            .samples
            .iter()
            .map(|layers| {
                let image = &layers[0];
                if opts.squeeze {
                    image.nonzero_extent(frame)
                } else {
                    image.full_extent()
                }
            })
            .collect();
        // widths of each sample at unit height, per plane
        let aspects: Vec<Vec<f32>> = self
            .samples
            .iter()
            .zip(&extents)
            .map(|(layers, extent)| {
                planes
                    .iter()
                    .map(|plane| tile_aspect(&layers[0], *plane, extent))
                    .collect()
            })
            .collect();
        let mean_aspect = aspects.iter().map(|a| a.iter().sum::<f32>()).sum::<f32>()
            / usize_to_f32(n_samples);
        let nrows = opts
            .nrows
            .unwrap_or_else(|| auto_nrows(n_samples, mean_aspect))
            .clamp(1, n_samples);
        let ncols = n_samples.div_ceil(nrows);
        let row_height = (opts.height / nrows as u32).max(1);
        let (pad_w, pad_h) = match (opts.cbar, opts.cbar_vertical) {
            (true, true) => (opts.cbar_pad, 0),
            (true, false) => (0, opts.cbar_pad),
            _ => (0, 0),
        };
        let tile_widths: Vec<Vec<u32>> = aspects
            .iter()
            .map(|a| {
                a.iter()
                    .map(|aspect| f32_to_u32(aspect * row_height as f32).max(1))
                    .collect()
            })
            .collect();
        let total_width = tile_widths
            .chunks(ncols)
            .map(|row| row.iter().flatten().map(|w| u64::from(*w)).sum::<u64>())
            .max()
            .unwrap_or(0)
            + u64::from(pad_w);
        let total_height = u64::from(row_height) * nrows as u64 + u64::from(pad_h);
        if total_width.saturating_mul(total_height) > MAX_IMAGE_PIXELS {
            return Err(Error::ImageTooLarge {
                width: total_width,
                height: total_height,
            });
        }

        let mut vranges = Vec::with_capacity(n_samples);
        for sample in 0..n_samples {
            let mut sample_vranges = Vec::new();
            for i in 0..self.samples[sample].len() {
                let layer = layer_options(opts, i);
                sample_vranges.push(match layer.vrange {
                    Some(vrange) => vrange,
                    None => self.cached_quantiles(sample, i, frame, layer.qrange),
                });
            }
            vranges.push(sample_vranges);
        }
        self.vranges = vranges;

        let mut boxes = Vec::with_capacity(n_samples);
        let mut tiles = Vec::new();
        let mut width = 0;
        for (sample, widths) in tile_widths.iter().enumerate() {
            let row = sample / ncols;
            let x0 = if sample % ncols == 0 {
                0
            } else {
                boxes.last().map_or(0, |b: &PixelRect| b.x + b.w)
            };
            let y = row as u32 * row_height;
            let mut x = x0;
            for (plane, &w) in planes.iter().zip(widths) {
                tiles.push(Tile {
                    sample,
                    plane: *plane,
                    rect: PixelRect { x, y, w, h: row_height },
                    extent: extents[sample].clone(),
                });
                x += w;
            }
            boxes.push(PixelRect {
                x: x0,
                y,
                w: x - x0,
                h: row_height,
            });
            width = width.max(x);
        }
        let grid_height = row_height * nrows as u32;
        let mut canvas = RgbaImage::from_pixel(width + pad_w, grid_height + pad_h, Rgba([0, 0, 0, 255]));
        if pad_w > 0 {
            fill_rect(
                &mut canvas,
                PixelRect { x: width, y: 0, w: pad_w, h: grid_height + pad_h },
                opts.cbar_pad_color,
            );
        }
        if pad_h > 0 {
            fill_rect(
                &mut canvas,
                PixelRect { x: 0, y: grid_height, w: width + pad_w, h: pad_h },
                opts.cbar_pad_color,
            );
        }

        for tile in &tiles {
            let rendered = self.render_tile(tile, frame, opts);
            imageops::replace(&mut canvas, &rendered, i64::from(tile.rect.x), i64::from(tile.rect.y));
            if opts.crosshair {
                self.draw_crosshair(&mut canvas, tile, opts);
            }
        }
        if opts.histogram {
            for (sample, b) in boxes.iter().enumerate() {
                self.draw_histogram(&mut canvas, sample, *b, frame);
            }
        }
        self.coord_sys = opts.coord_sys;
        self.colorbar = if opts.cbar {
            Some(self.draw_colorbar(&mut canvas, opts))
        } else {
            None
        };
        log::debug!(
            "rendered {n_samples} samples in {nrows} rows at {}x{}",
            canvas.width(),
            canvas.height()
        );
        self.size = canvas.dimensions();
        self.boxes = boxes;
        self.tiles = tiles;
        Ok(canvas)
    }

    fn render_tile(&self, tile: &Tile, frame: usize, opts: &GridOptions) -> RgbaImage {
        let layers = &self.samples[tile.sample];
        let image = &layers[0];
        let mut out = RgbaImage::from_pixel(tile.rect.w, tile.rect.h, Rgba([0, 0, 0, 255]));
        for (i, vol) in layers.iter().enumerate() {
            let layer = layer_options(opts, i);
            let vol_frame = frame.min(vol.n_frames() - 1);
            let extent = if vol.shape() == image.shape() {
                tile.extent.clone()
            } else {
                vol.full_extent()
            };
            let values = match opts.glass_mode {
                Some(mode) => vol.projection(tile.plane, vol_frame, mode, &extent),
                None => {
                    let axis = tile.plane.axis();
                    let index = vol.coord_to_voxel(opts.coord_sys, axis, opts.origin[axis]);
                    vol.slice(tile.plane, index, vol_frame, &extent)
                }
            };
            let vrange = self.vranges[tile.sample][i];
            let equalizer = (i == 0 && opts.equal_hist && !layer.is_atlas)
                .then(|| Equalizer::new(vol.sorted_values(vol_frame)));
            let alpha = if i == 0 { 1.0 } else { opts.alpha };
            let colored = colorize(&values, &layer, vrange, equalizer.as_ref(), alpha);
            let filter = if layer.is_atlas {
                FilterType::Nearest
            } else {
                filter_type(layer.resizing)
            };
            let resized = imageops::resize(&colored, tile.rect.w, tile.rect.h, filter);
            for (dst, src) in out.pixels_mut().zip(resized.pixels()) {
                blend(dst, src.0);
            }
        }
        out
    }

    fn draw_crosshair(&self, canvas: &mut RgbaImage, tile: &Tile, opts: &GridOptions) {
        let volume = &self.samples[tile.sample][0];
        let (h_axis, v_axis) = tile.plane.display_axes();
        let h_range = &tile.extent[h_axis];
        let v_range = &tile.extent[v_axis];
        let h_idx = volume.coord_to_index(opts.coord_sys, h_axis, opts.origin[h_axis]);
        let v_idx = volume.coord_to_index(opts.coord_sys, v_axis, opts.origin[v_axis]);
        let fx = (h_idx - usize_to_f32(h_range.start) + 0.5) / usize_to_f32(h_range.len().max(1));
        let fy = (usize_to_f32(v_range.end) - v_idx - 0.5) / usize_to_f32(v_range.len().max(1));
        let r = tile.rect;
        let half = opts.linewidth / 2;
        if (0.0..=1.0).contains(&fx) {
            let x = r.x + f32_to_u32((fx * r.w as f32).floor()).min(r.w - 1);
            let x0 = x.saturating_sub(half).max(r.x);
            let w = opts.linewidth.min(r.x + r.w - x0);
            fill_rect(canvas, PixelRect { x: x0, y: r.y, w, h: r.h }, opts.linecolor);
        }
        if (0.0..=1.0).contains(&fy) {
            let y = r.y + f32_to_u32((fy * r.h as f32).floor()).min(r.h - 1);
            let y0 = y.saturating_sub(half).max(r.y);
            let h = opts.linewidth.min(r.y + r.h - y0);
            fill_rect(canvas, PixelRect { x: r.x, y: y0, w: r.w, h }, opts.linecolor);
        }
    }

    /// Bars of the image layer's histogram in the lower left of a sample.
    fn draw_histogram(&self, canvas: &mut RgbaImage, sample: usize, sample_box: PixelRect, frame: usize) {
        let image = &self.samples[sample][0];
        let vrange = self.vranges[sample][0];
        let counts = image.histogram(frame.min(image.n_frames() - 1), HISTOGRAM_BINS, vrange);
        let max = counts.iter().copied().max().unwrap_or(0);
        if max == 0 {
            return;
        }
        let inset_w = (sample_box.w / 4).max(HISTOGRAM_BINS as u32);
        let inset_h = (sample_box.h / 5).max(1);
        let bar_w = (inset_w / HISTOGRAM_BINS as u32).max(1);
        let bottom = sample_box.y + sample_box.h;
        for (i, count) in counts.iter().enumerate() {
            let h = f32_to_u32(*count as f32 / max as f32 * inset_h as f32);
            let rect = PixelRect {
                x: sample_box.x + i as u32 * bar_w,
                y: bottom - h,
                w: bar_w,
                h,
            };
            fill_rect(canvas, rect, [255, 255, 255, 160]);
        }
    }

    /// Gradient of the top layer at the configured position.
    fn draw_colorbar(&self, canvas: &mut RgbaImage, opts: &GridOptions) -> Colorbar {
        let top = self.samples[0].len() - 1;
        let layer = layer_options(opts, top);
        let vrange = self.vranges[0][top];
        let (cw, ch) = (canvas.width() as f32, canvas.height() as f32);
        let (w, h) = if opts.cbar_vertical {
            (opts.cbar_width * cw, opts.cbar_length * ch)
        } else {
            (opts.cbar_length * cw, opts.cbar_width * ch)
        };
        let w = f32_to_u32(w).clamp(1, canvas.width());
        let h = f32_to_u32(h).clamp(1, canvas.height());
        let x = f32_to_u32(opts.cbar_x * cw - w as f32 / 2.0).min(canvas.width() - w);
        let y = f32_to_u32(opts.cbar_y * ch - h as f32 / 2.0).min(canvas.height() - h);
        let rect = PixelRect { x, y, w, h };
        for py in 0..h {
            for px in 0..w {
                let t = if opts.cbar_vertical {
                    1.0 - py as f32 / (h.max(2) - 1) as f32
                } else {
                    px as f32 / (w.max(2) - 1) as f32
                };
                let color = if layer.is_atlas {
                    let value = vrange.0 + t * (vrange.1 - vrange.0);
                    label_color(value).unwrap_or([0, 0, 0])
                } else {
                    layer.cmap.apply(t)
                };
                canvas.put_pixel(x + px, y + py, Rgba([color[0], color[1], color[2], 255]));
            }
        }
        Colorbar {
            rect,
            vrange,
            vertical: opts.cbar_vertical,
        }
    }
}

fn layer_options(opts: &GridOptions, layer: usize) -> LayerOptions {
    opts.layers.get(layer).cloned().unwrap_or_else(|| LayerOptions {
        resizing: 0,
        cmap: Colormap::Red,
        transp_if: "=0".parse().ok(),
        qrange: QRANGE[1],
        vrange: None,
        is_atlas: true,
    })
}

/// Physical width over height of a plane tile.
fn tile_aspect(volume: &Volume, plane: Plane, extent: &Extent) -> f32 {
    let (h_axis, v_axis) = plane.display_axes();
    let voxdim = volume.voxdim();
    let phys_w = usize_to_f32(extent[h_axis].len().max(1)) * voxdim[h_axis];
    let phys_h = usize_to_f32(extent[v_axis].len().max(1)) * voxdim[v_axis];
    phys_w / phys_h
}

/// Row count that makes the grid closest to square.
fn auto_nrows(n_samples: usize, sample_aspect: f32) -> usize {
    (1..=n_samples.max(1))
        .min_by(|a, b| {
            let score = |rows: usize| {
                let cols = n_samples.div_ceil(rows);
                (usize_to_f32(cols) * sample_aspect / usize_to_f32(rows)).ln().abs()
            };
            score(*a).total_cmp(&score(*b))
        })
        .unwrap_or(1)
}

/// Maps values to their rank in a sorted sample of the volume.
struct Equalizer {
    sorted: Vec<f32>,
}

impl Equalizer {
    fn new(sorted: Vec<f32>) -> Self {
        Self { sorted }
    }

    fn rank(&self, value: f32) -> f32 {
        if self.sorted.is_empty() {
            return 0.0;
        }
        let below = self.sorted.partition_point(|v| *v < value);
        usize_to_f32(below) / usize_to_f32(self.sorted.len())
    }
}

fn colorize(
    values: &Array2<f32>,
    layer: &LayerOptions,
    vrange: (f32, f32),
    equalizer: Option<&Equalizer>,
    alpha: f32,
) -> RgbaImage {
    let (rows, cols) = values.dim();
    let (lo, hi) = match equalizer {
        Some(eq) => (eq.rank(vrange.0), eq.rank(vrange.1)),
        None => vrange,
    };
    let span = if hi > lo { hi - lo } else { 1.0 };
    let opaque = f32_to_u8(alpha * 255.0);
    RgbaImage::from_fn(cols as u32, rows as u32, |x, y| {
        let v = values[[y as usize, x as usize]];
        if !v.is_finite() || layer.transp_if.is_some_and(|rule| rule.is_transparent(v)) {
            return Rgba([0, 0, 0, 0]);
        }
        if layer.is_atlas {
            return match label_color(v) {
                Some([r, g, b]) => Rgba([r, g, b, opaque]),
                None => Rgba([0, 0, 0, 0]),
            };
        }
        let v = equalizer.map_or(v, |eq| eq.rank(v));
        let [r, g, b] = layer.cmap.apply((v - lo) / span);
        Rgba([r, g, b, opaque])
    })
}

/// Source-over blend onto an opaque destination.
fn blend(dst: &mut Rgba<u8>, src: [u8; 4]) {
    let a = f32::from(src[3]) / 255.0;
    for c in 0..3 {
        dst.0[c] = f32_to_u8(f32::from(src[c]) * a + f32::from(dst.0[c]) * (1.0 - a));
    }
    dst.0[3] = dst.0[3].max(src[3]);
}

fn fill_rect(canvas: &mut RgbaImage, rect: PixelRect, color: [u8; 4]) {
    let x_end = (rect.x + rect.w).min(canvas.width());
    let y_end = (rect.y + rect.h).min(canvas.height());
    for y in rect.y..y_end {
        for x in rect.x..x_end {
            if color[3] == 255 || color[3] == 0 {
                // opaque colors and "transparent" padding are written as-is
                canvas.put_pixel(x, y, Rgba(color));
            } else {
                blend(canvas.get_pixel_mut(x, y), color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    fn cube(n: usize, value: impl Fn(usize, usize, usize) -> f32) -> Volume {
        let data = Array4::from_shape_fn((n, n, n, 1), |(x, y, z, _)| value(x, y, z));
        Volume::from_array("cube.nii", data, [1.0; 3], [0.0; 3])
    }

    fn ramp_grid(n_samples: usize) -> NiftiImageGrid {
        let samples = (0..n_samples)
            .map(|_| vec![cube(10, |x, _, _| usize_to_f32(x))])
            .collect();
        NiftiImageGrid::from_volumes(samples).unwrap()
    }

    #[test]
    fn test_single_sample_layout() {
        let mut grid = ramp_grid(1);
        let opts = GridOptions {
            height: 100,
            ..GridOptions::default()
        };
        let img = grid.get_image(&opts).unwrap();
        assert_eq!(img.dimensions(), (300, 100));
        assert_eq!(grid.tiles().len(), 3);
        assert_eq!(grid.boxes(), &[PixelRect { x: 0, y: 0, w: 300, h: 100 }]);
        assert_eq!(grid.tiles()[1].plane, Plane::Coronal);
        assert_eq!(grid.tiles()[1].rect.x, 100);
        assert_eq!(grid.size(), (300, 100));
    }

    #[test]
    fn test_rows_and_sample_lookup() {
        let mut grid = ramp_grid(4);
        let opts = GridOptions {
            height: 200,
            layout: "axial".to_string(),
            nrows: Some(2),
            ..GridOptions::default()
        };
        let img = grid.get_image(&opts).unwrap();
        assert_eq!(img.dimensions(), (200, 200));
        assert_eq!(grid.sample_at(10.0, 10.0), Some(0));
        assert_eq!(grid.sample_at(150.0, 10.0), Some(1));
        assert_eq!(grid.sample_at(10.0, 150.0), Some(2));
        assert_eq!(grid.sample_at(500.0, 10.0), None);
    }

    #[test]
    fn test_auto_rows_near_square() {
        assert_eq!(auto_nrows(1, 3.0), 1);
        assert_eq!(auto_nrows(4, 1.0), 2);
        assert_eq!(auto_nrows(9, 1.0), 3);
        assert_eq!(auto_nrows(3, 3.0), 3);
    }

    #[test]
    fn test_windowing_maps_range_to_gray() {
        let mut grid = ramp_grid(1);
        let opts = GridOptions {
            height: 10,
            layout: "axial".to_string(),
            layers: vec![LayerOptions {
                resizing: 0,
                vrange: Some((0.0, 9.0)),
                ..LayerOptions::image()
            }],
            ..GridOptions::default()
        };
        let img = grid.get_image(&opts).unwrap();
        assert_eq!(img.get_pixel(0, 5).0, [0, 0, 0, 255]);
        assert_eq!(img.get_pixel(9, 5).0, [255, 255, 255, 255]);
        assert_eq!(grid.layer_vrange(0, 0), Some((0.0, 9.0)));
    }

    #[test]
    fn test_quantile_window_when_vrange_unset() {
        let mut grid = ramp_grid(1);
        let opts = GridOptions {
            height: 10,
            layers: vec![LayerOptions {
                qrange: (0.0, 1.0),
                ..LayerOptions::image()
            }],
            ..GridOptions::default()
        };
        grid.get_image(&opts).unwrap();
        assert_eq!(grid.layer_vrange(0, 0), Some((0.0, 9.0)));
    }

    #[test]
    fn test_mask_blends_with_alpha_and_transparency() {
        let image = cube(10, |_, _, _| 0.0);
        let mask = cube(10, |x, _, _| if x < 5 { 0.0 } else { 1.0 });
        let mut grid = NiftiImageGrid::from_volumes(vec![vec![image, mask]]).unwrap();
        let opts = GridOptions {
            height: 10,
            layout: "axial".to_string(),
            alpha: 1.0,
            layers: vec![
                LayerOptions {
                    resizing: 0,
                    vrange: Some((0.0, 1.0)),
                    ..LayerOptions::image()
                },
                LayerOptions {
                    resizing: 0,
                    cmap: Colormap::Red,
                    transp_if: "=0".parse().ok(),
                    qrange: QRANGE[1],
                    vrange: None,
                    is_atlas: false,
                },
            ],
            ..GridOptions::default()
        };
        let img = grid.get_image(&opts).unwrap();
        assert_eq!(img.get_pixel(2, 5).0, [0, 0, 0, 255]);
        assert_eq!(img.get_pixel(8, 5).0, [255, 0, 0, 255]);
    }

    #[test]
    fn test_crosshair_drawn_at_origin() {
        let mut grid = ramp_grid(1);
        let opts = GridOptions {
            height: 10,
            layout: "axial".to_string(),
            crosshair: true,
            linewidth: 1,
            coord_sys: CoordSys::ArrayIdx,
            origin: [-4.5, 0.0, 0.0, 0.0],
            linecolor: [0, 255, 0, 255],
            layers: vec![LayerOptions {
                vrange: Some((100.0, 200.0)),
                ..LayerOptions::image()
            }],
            ..GridOptions::default()
        };
        let img = grid.get_image(&opts).unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [0, 255, 0, 255]);
        assert_eq!(img.get_pixel(5, 0).0, [0, 0, 0, 255]);
    }

    #[test]
    fn test_origin_at_maps_pixel_to_coordinates() {
        let mut grid = ramp_grid(1);
        let opts = GridOptions {
            height: 10,
            layout: "axial".to_string(),
            coord_sys: CoordSys::ArrayIdx,
            ..GridOptions::default()
        };
        grid.get_image(&opts).unwrap();
        let origin = grid.origin_at(0.5, 0.5).unwrap();
        assert_eq!(origin[2], None);
        approx::assert_relative_eq!(origin[0].unwrap(), -4.5);
        approx::assert_relative_eq!(origin[1].unwrap(), 4.5);
        assert!(grid.origin_at(50.0, 50.0).is_none());
    }

    #[test]
    fn test_squeeze_crops_to_nonzero() {
        let vol = cube(10, |x, y, z| {
            if (2..6).contains(&x) && (2..6).contains(&y) && (2..6).contains(&z) {
                1.0
            } else {
                0.0
            }
        });
        let mut grid = NiftiImageGrid::from_volumes(vec![vec![vol]]).unwrap();
        let opts = GridOptions {
            height: 40,
            layout: "axial".to_string(),
            squeeze: true,
            ..GridOptions::default()
        };
        grid.get_image(&opts).unwrap();
        assert_eq!(grid.tiles()[0].extent, [2..6, 2..6, 2..6]);
    }

    #[test]
    fn test_colorbar_padding() {
        let mut grid = ramp_grid(1);
        let opts = GridOptions {
            height: 100,
            layout: "axial".to_string(),
            cbar: true,
            cbar_pad: 20,
            cbar_pad_color: [255, 255, 255, 255],
            cbar_x: 0.95,
            ..GridOptions::default()
        };
        let img = grid.get_image(&opts).unwrap();
        assert_eq!(img.dimensions(), (120, 100));
        assert_eq!(img.get_pixel(110, 1).0, [255, 255, 255, 255]);
        let cbar = grid.colorbar().unwrap();
        assert!(cbar.vertical);
        assert_eq!(cbar.rect.h, 80);
    }

    #[test]
    fn test_oversized_render_is_rejected() {
        let mut grid = ramp_grid(1);
        for height in [200_000, u32::MAX] {
            let opts = GridOptions {
                height,
                ..GridOptions::default()
            };
            assert!(matches!(
                grid.get_image(&opts),
                Err(Error::ImageTooLarge { .. })
            ));
        }
        let opts = GridOptions {
            height: 100,
            ..GridOptions::default()
        };
        assert_eq!(grid.get_image(&opts).unwrap().dimensions(), (300, 100));
    }

    #[test]
    fn test_quantiles_cached_per_window() {
        let mut grid = ramp_grid(1);
        let mut opts = GridOptions {
            height: 10,
            layers: vec![LayerOptions {
                qrange: (0.0, 1.0),
                ..LayerOptions::image()
            }],
            ..GridOptions::default()
        };
        grid.get_image(&opts).unwrap();
        grid.get_image(&opts).unwrap();
        assert_eq!(grid.quantiles.len(), 1);
        opts.layers[0].qrange = (0.5, 1.0);
        grid.get_image(&opts).unwrap();
        assert_eq!(grid.quantiles.len(), 2);
        assert_eq!(grid.layer_vrange(0, 0).map(|v| v.1), Some(9.0));
    }

    #[test]
    fn test_empty_grid_is_rejected() {
        assert!(matches!(
            NiftiImageGrid::from_volumes(Vec::new()),
            Err(Error::NoVolumes)
        ));
    }

    #[test]
    fn test_equalizer_rank() {
        let eq = Equalizer::new(vec![0.0, 1.0, 1.0, 100.0]);
        approx::assert_relative_eq!(eq.rank(0.0), 0.0);
        approx::assert_relative_eq!(eq.rank(1.0), 0.25);
        approx::assert_relative_eq!(eq.rank(50.0), 0.75);
    }
}
