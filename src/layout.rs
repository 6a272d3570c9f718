//! Planes, layout strings and the coordinate systems offered to the user.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Anatomical planes in RAS axis order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Plane {
    Sagittal,
    Coronal,
    Axial,
}

pub const PLANES: [Plane; 3] = [Plane::Sagittal, Plane::Coronal, Plane::Axial];
/// Slider labels: the three planes followed by the time axis.
pub const PLANES_4D: [&str; 4] = ["sagittal", "coronal", "axial", "time"];

/// Preset layouts and the plane lists they expand to.
pub const LAYOUT_STRINGS: [(&str, &str); 7] = [
    ("sagittal++", "sagittal|coronal|axial"),
    ("coronal++", "coronal|sagittal|axial"),
    ("axial++", "axial|sagittal|coronal"),
    ("sagittal", "sagittal"),
    ("coronal", "coronal"),
    ("axial", "axial"),
    ("all", "sagittal|coronal|axial|sagittal|coronal|axial"),
];

impl Plane {
    /// RAS axis held fixed by this plane.
    pub fn axis(self) -> usize {
        match self {
            Plane::Sagittal => 0,
            Plane::Coronal => 1,
            Plane::Axial => 2,
        }
    }

    /// RAS axes shown horizontally and vertically.
    pub fn display_axes(self) -> (usize, usize) {
        match self {
            Plane::Sagittal => (1, 2),
            Plane::Coronal => (0, 2),
            Plane::Axial => (0, 1),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Plane::Sagittal => "sagittal",
            Plane::Coronal => "coronal",
            Plane::Axial => "axial",
        }
    }
}

impl fmt::Display for Plane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Plane {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sagittal" | "s" => Ok(Plane::Sagittal),
            "coronal" | "c" => Ok(Plane::Coronal),
            "axial" | "a" => Ok(Plane::Axial),
            other => Err(format!("unknown plane '{other}'")),
        }
    }
}

/// Expanded layout string for a preset, if `name` is one.
pub fn preset(name: &str) -> Option<&'static str> {
    LAYOUT_STRINGS
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, value)| *value)
}

/// Planes of a preset name or a free-form `|`-separated layout.
///
/// Unknown tokens are skipped; an empty result falls back to the
/// default three-plane layout.
pub fn parse_layout(layout: &str) -> Vec<Plane> {
    let expanded = preset(layout).unwrap_or(layout);
    let planes: Vec<Plane> = expanded
        .split(['|', ','])
        .filter_map(|token| token.parse().ok())
        .collect();
    if planes.is_empty() {
        log::warn!("layout '{layout}' has no valid planes, using default");
        PLANES.to_vec()
    } else {
        planes
    }
}

/// Units of the origin shown by the sliders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CoordSys {
    /// Voxel index relative to the array centre.
    ArrayIdx,
    /// Millimetres relative to the array centre.
    #[default]
    ArrayMm,
    /// World millimetres from the header affine.
    ScannerMm,
}

pub const COORDINATE_SYSTEMS: [CoordSys; 3] =
    [CoordSys::ArrayIdx, CoordSys::ArrayMm, CoordSys::ScannerMm];

impl CoordSys {
    pub fn name(self) -> &'static str {
        match self {
            CoordSys::ArrayIdx => "array_idx",
            CoordSys::ArrayMm => "array_mm",
            CoordSys::ScannerMm => "scanner_mm",
        }
    }
}

/// Projection used instead of a single slice ("glass brain").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlassMode {
    Max,
    Min,
}

pub const GLASS_MODES: [GlassMode; 2] = [GlassMode::Max, GlassMode::Min];

impl GlassMode {
    pub fn name(self) -> &'static str {
        match self {
            GlassMode::Max => "max",
            GlassMode::Min => "min",
        }
    }
}

/// Interpolation used when scaling slices to the tile size.
pub const RESIZINGS: [&str; 3] = ["nearest", "linear", "cubic"];

pub fn filter_type(resizing: usize) -> image::imageops::FilterType {
    match resizing {
        0 => image::imageops::FilterType::Nearest,
        1 => image::imageops::FilterType::Triangle,
        _ => image::imageops::FilterType::CatmullRom,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_expands() {
        assert_eq!(
            parse_layout("sagittal++"),
            vec![Plane::Sagittal, Plane::Coronal, Plane::Axial]
        );
        assert_eq!(parse_layout("axial"), vec![Plane::Axial]);
    }

    #[test]
    fn test_free_form_layout() {
        assert_eq!(
            parse_layout("axial | axial|bogus|coronal"),
            vec![Plane::Axial, Plane::Axial, Plane::Coronal]
        );
    }

    #[test]
    fn test_empty_layout_falls_back() {
        assert_eq!(parse_layout(""), PLANES.to_vec());
    }

    #[test]
    fn test_coord_sys_serde_names() {
        let json = serde_json::to_string(&CoordSys::ScannerMm).unwrap();
        assert_eq!(json, "\"scanner_mm\"");
        for sys in COORDINATE_SYSTEMS {
            assert_eq!(
                serde_json::to_string(&sys).unwrap(),
                format!("\"{}\"", sys.name())
            );
        }
    }

    #[test]
    fn test_display_axes_exclude_fixed_axis() {
        for plane in PLANES {
            let (h, v) = plane.display_axes();
            assert_ne!(h, plane.axis());
            assert_ne!(v, plane.axis());
        }
    }
}
