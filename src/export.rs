//! Writing rendered pages to image files and animated GIFs.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, DynamicImage, Frame, ImageFormat};

use crate::error::Result;
use crate::grid::{GridOptions, NiftiImageGrid};
use crate::layout::parse_layout;
use crate::util::usize_to_f32;

/// Frame duration used by the save menu, in milliseconds.
pub const GIF_DURATION_MS: u32 = 50;

/// Render the grid and save it; the format follows the file extension.
pub fn save_image(grid: &mut NiftiImageGrid, path: &Path, opts: &GridOptions) -> Result<()> {
    let image = grid.get_image(opts)?;
    let format = ImageFormat::from_path(path)?;
    match format {
        // no alpha channel in these formats
        ImageFormat::Jpeg | ImageFormat::Bmp => {
            DynamicImage::ImageRgba8(image).to_rgb8().save_with_format(path, format)?;
        }
        _ => image.save_with_format(path, format)?,
    }
    log::info!("saved image to {}", path.display());
    Ok(())
}

/// Sweep the origin through the first plane of the layout and save the
/// frames as an animated GIF.
///
/// `loop_count` 0 repeats forever.
pub fn save_gif(
    grid: &mut NiftiImageGrid,
    path: &Path,
    opts: &GridOptions,
    duration_ms: u32,
    loop_count: u16,
) -> Result<()> {
    let plane = parse_layout(&opts.layout)[0];
    let axis = plane.axis();
    let Some(volume) = grid.samples().first().and_then(|layers| layers.first()) else {
        return Ok(());
    };
    let n = volume.shape()[axis];
    let coords: Vec<f32> = (0..n)
        .map(|idx| volume.index_to_coord(opts.coord_sys, axis, usize_to_f32(idx)))
        .collect();

    let mut encoder = GifEncoder::new(BufWriter::new(File::create(path)?));
    encoder.set_repeat(if loop_count == 0 {
        Repeat::Infinite
    } else {
        Repeat::Finite(loop_count)
    })?;
    let delay = Delay::from_numer_denom_ms(duration_ms, 1);
    let mut frame_opts = opts.clone();
    for coord in coords {
        frame_opts.origin[axis] = coord;
        let image = grid.get_image(&frame_opts)?;
        encoder.encode_frame(Frame::from_parts(image, 0, 0, delay))?;
    }
    log::info!("saved {n} frame GIF along {plane} to {}", path.display());
    Ok(())
}

/// Save every page of `filepaths` into `dir`, as GIFs or PNGs.
pub fn save_images_or_gifs(
    filepaths: &[Vec<String>],
    dir: &Path,
    gif: bool,
    max_samples: usize,
    opts: &GridOptions,
) -> Result<Vec<PathBuf>> {
    let extension = if gif { "gif" } else { "png" };
    let mut saved = Vec::new();
    for (page, samples) in filepaths.chunks(max_samples.max(1)).enumerate() {
        let mut grid = NiftiImageGrid::open(samples)?;
        let stem = samples
            .first()
            .and_then(|layers| layers.first())
            .and_then(|fp| Path::new(fp).file_name())
            .map_or_else(|| "image".to_string(), |name| strip_nifti_extension(&name.to_string_lossy()));
        let path = dir.join(format!("{page:03}_{stem}.{extension}"));
        if gif {
            save_gif(&mut grid, &path, opts, GIF_DURATION_MS, 0)?;
        } else {
            save_image(&mut grid, &path, opts)?;
        }
        saved.push(path);
    }
    Ok(saved)
}

fn strip_nifti_extension(name: &str) -> String {
    name.strip_suffix(".nii.gz")
        .or_else(|| name.strip_suffix(".nii"))
        .unwrap_or(name)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::Volume;
    use ndarray::{Array3, Array4};

    fn grid() -> NiftiImageGrid {
        let data = Array4::from_shape_fn((6, 6, 6, 1), |(x, y, z, _)| usize_to_f32(x + y + z));
        let volume = Volume::from_array("cube.nii", data, [1.0; 3], [0.0; 3]);
        NiftiImageGrid::from_volumes(vec![vec![volume]]).unwrap()
    }

    fn small_opts() -> GridOptions {
        GridOptions {
            height: 24,
            layout: "axial|sagittal".to_string(),
            ..GridOptions::default()
        }
    }

    #[test]
    fn test_save_png_and_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let mut grid = grid();
        for name in ["out.png", "out.jpg"] {
            let path = dir.path().join(name);
            save_image(&mut grid, &path, &small_opts()).unwrap();
            let saved = image::open(&path).unwrap();
            assert_eq!((saved.width(), saved.height()), (48, 24));
        }
    }

    #[test]
    fn test_unknown_extension_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut grid = grid();
        assert!(save_image(&mut grid, &dir.path().join("out.xyz"), &small_opts()).is_err());
    }

    #[test]
    fn test_gif_has_frame_per_slice() {
        use image::AnimationDecoder;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweep.gif");
        let mut grid = grid();
        save_gif(&mut grid, &path, &small_opts(), GIF_DURATION_MS, 0).unwrap();
        let file = std::io::BufReader::new(File::open(&path).unwrap());
        let decoder = image::codecs::gif::GifDecoder::new(file).unwrap();
        let frames = decoder.into_frames().collect_frames().unwrap();
        assert_eq!(frames.len(), 6);
    }

    #[test]
    fn test_save_all_pages() {
        let dir = tempfile::tempdir().unwrap();
        let mut filepaths = Vec::new();
        for i in 0..3 {
            let path = dir.path().join(format!("scan{i}.nii"));
            let data = Array3::from_shape_fn((4, 4, 4), |(x, _, _)| usize_to_f32(x));
            nifti::writer::WriterOptions::new(&path).write_nifti(&data).unwrap();
            filepaths.push(vec![path.to_string_lossy().into_owned()]);
        }
        let out = tempfile::tempdir().unwrap();
        let saved = save_images_or_gifs(&filepaths, out.path(), false, 2, &small_opts()).unwrap();
        assert_eq!(saved.len(), 2);
        assert!(saved[0].ends_with("000_scan0.png"));
        assert!(saved[1].ends_with("001_scan2.png"));
        assert!(saved.iter().all(|p| p.exists()));
    }

    #[test]
    fn test_strip_extension() {
        assert_eq!(strip_nifti_extension("a.nii.gz"), "a");
        assert_eq!(strip_nifti_extension("b.nii"), "b");
        assert_eq!(strip_nifti_extension("c"), "c");
    }
}
