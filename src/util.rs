//! Small helpers shared by the UI and the renderer.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use image::GrayImage;

use crate::error::{Error, Result};

/// Convert usize to f32 with allowed precision loss.
#[allow(clippy::cast_precision_loss)]
pub fn usize_to_f32(value: usize) -> f32 {
    value as f32
}

/// Convert f32 to u8 with clamping to [0, 255].
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn f32_to_u8(value: f32) -> u8 {
    let clamped = value.clamp(0.0, 255.0);
    clamped.round() as u8
}

/// Convert f32 to u32, saturating at zero and rounding to nearest.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn f32_to_u32(value: f32) -> u32 {
    if value.is_finite() && value > 0.0 {
        value.round() as u32
    } else {
        0
    }
}

/// Convert f32 to an index in `0..len`, clamping out-of-range values.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn f32_to_index(value: f32, len: usize) -> usize {
    if len == 0 || !value.is_finite() || value <= 0.0 {
        return 0;
    }
    (value.round() as usize).min(len - 1)
}

/// Split the payload of a drop event into paths.
///
/// Paths containing spaces arrive wrapped in braces, e.g.
/// `{/tmp/my scan.nii} /tmp/other.nii`.
pub fn parse_dnd_filepaths(data: &str) -> Vec<String> {
    let mut paths = Vec::new();
    let mut chars = data.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        if c.is_whitespace() {
            continue;
        }
        if c == '{' {
            let mut end = data.len();
            for (i, c) in chars.by_ref() {
                if c == '}' {
                    end = i;
                    break;
                }
            }
            paths.push(data[start + 1..end].to_string());
        } else {
            let mut end = data.len();
            while let Some(&(i, c)) = chars.peek() {
                if c.is_whitespace() {
                    end = i;
                    break;
                }
                chars.next();
            }
            paths.push(data[start..end].trim_matches(|c| c == '{' || c == '}').to_string());
        }
    }
    paths
}

/// Alpha mask that fades towards the border of a box of `size` (w, h).
///
/// Used to highlight the sample under the pointer. The centre is opaque
/// (255) and the edges drop to 0; `exp` controls how sharp the falloff is.
pub fn window_frame(size: (u32, u32), exp: i32) -> GrayImage {
    let (w, h) = size;
    let coord = |i: u32, n: u32| {
        if n <= 1 {
            0.0
        } else {
            -1.0 + 2.0 * i as f32 / (n - 1) as f32
        }
    };
    GrayImage::from_fn(w, h, |x, y| {
        let frame = (coord(x, w).powi(exp) + coord(y, h).powi(exp)) / 2.0;
        image::Luma([f32_to_u8(255.0 * (1.0 - frame))])
    })
}

/// Fires once after events stop arriving for `wait`.
#[derive(Debug)]
pub struct Debouncer {
    wait: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(wait: Duration) -> Self {
        Self {
            wait,
            deadline: None,
        }
    }

    /// Register an event, pushing the deadline back.
    pub fn trigger(&mut self, now: Instant) {
        self.deadline = Some(now + self.wait);
    }

    /// Returns true exactly once when the deadline has passed.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }
}

/// Expand a glob pattern into a sorted list of paths.
pub fn expand_glob(pattern: &str) -> Result<Vec<String>> {
    let mut paths: Vec<String> = glob::glob(pattern)?
        .filter_map(std::result::Result::ok)
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
    paths.sort();
    Ok(paths)
}

/// Convert a DICOM file or series directory with `dcm2niix`.
///
/// Returns the NIfTI files found in `output_dir` afterwards.
pub fn dcm2nii(input: &Path, output_dir: &Path) -> Result<Vec<PathBuf>> {
    let is_dicom = input.is_dir()
        || (input.is_file() && input.extension().is_some_and(|ext| ext == "dcm"));
    if !is_dicom {
        return Err(Error::NotDicom(input.to_path_buf()));
    }
    if !output_dir.is_dir() {
        return Err(Error::NotDirectory(output_dir.to_path_buf()));
    }
    log::info!("converting {} with dcm2niix", input.display());
    let output = Command::new("dcm2niix")
        .arg("-o")
        .arg(output_dir)
        .arg(input)
        .output()?;
    if !output.status.success() {
        return Err(Error::Dicom(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    let pattern = output_dir.join("*.ni*");
    Ok(expand_glob(&pattern.to_string_lossy())?
        .into_iter()
        .map(PathBuf::from)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dnd_plain_and_braced() {
        let paths = parse_dnd_filepaths("{/tmp/my scan.nii} /tmp/b.nii.gz   /tmp/c.nii");
        assert_eq!(paths, vec!["/tmp/my scan.nii", "/tmp/b.nii.gz", "/tmp/c.nii"]);
    }

    #[test]
    fn test_parse_dnd_empty() {
        assert!(parse_dnd_filepaths("   ").is_empty());
    }

    #[test]
    fn test_window_frame_center_and_corner() {
        let frame = window_frame((21, 11), 12);
        assert_eq!(frame.dimensions(), (21, 11));
        assert_eq!(frame.get_pixel(10, 5)[0], 255);
        assert_eq!(frame.get_pixel(0, 0)[0], 0);
        // edge midpoint is half transparent
        let edge = frame.get_pixel(0, 5)[0];
        assert!((120..=135).contains(&edge));
    }

    #[test]
    fn test_debouncer_fires_once_after_wait() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(100));
        assert!(!debouncer.poll(start));
        debouncer.trigger(start);
        assert!(debouncer.is_pending());
        assert!(!debouncer.poll(start + Duration::from_millis(50)));
        debouncer.trigger(start + Duration::from_millis(50));
        assert!(!debouncer.poll(start + Duration::from_millis(120)));
        assert!(debouncer.poll(start + Duration::from_millis(151)));
        assert!(!debouncer.poll(start + Duration::from_millis(300)));
    }

    #[test]
    fn test_expand_glob_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.nii", "a.nii", "c.txt"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let pattern = dir.path().join("*.nii");
        let paths = expand_glob(&pattern.to_string_lossy()).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("a.nii"));
        assert!(paths[1].ends_with("b.nii"));
    }

    #[test]
    fn test_dcm2nii_rejects_non_dicom() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("scan.nii");
        std::fs::write(&file, b"").unwrap();
        assert!(matches!(
            dcm2nii(&file, dir.path()),
            Err(Error::NotDicom(_))
        ));
    }

    #[test]
    fn test_f32_to_index_clamps() {
        assert_eq!(f32_to_index(-3.0, 10), 0);
        assert_eq!(f32_to_index(4.4, 10), 4);
        assert_eq!(f32_to_index(42.0, 10), 9);
        assert_eq!(f32_to_index(f32::NAN, 10), 0);
    }
}
