//! Colormap table, intensity windows and transparency rules.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::util::f32_to_u8;

/// Default percentile windows for the image layer and mask layers.
pub const QRANGE: [(f32, f32); 2] = [(0.01, 0.999), (0.0, 1.0)];

pub const CMAP: &str = "gray";
pub const CMAP_MASK: &str = "red";

/// Colormaps offered for the image layer.
pub const CMAPS_IMAGE: [&str; 6] = ["gray", "hot", "viridis", "jet", "cool", "bone"];
/// Colormaps offered for mask layers.
pub const CMAPS_MASK: [&str; 7] = ["red", "green", "blue", "hot", "jet", "viridis", "gray"];

/// Available colormaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colormap {
    /// Black to white.
    Gray,
    /// Black to red to yellow to white.
    Hot,
    /// Approximate viridis, blue to teal to yellow.
    Viridis,
    /// Blue to cyan to yellow to red.
    Jet,
    /// Cyan to magenta.
    Cool,
    /// Gray with a blue tint.
    Bone,
    /// Black to red.
    Red,
    /// Black to green.
    Green,
    /// Black to blue.
    Blue,
}

impl Colormap {
    /// Apply the colormap to a normalized value in [0, 1] and return RGB bytes.
    #[must_use]
    pub fn apply(self, val: f32) -> [u8; 3] {
        let val = if val.is_nan() { 0.0 } else { val.clamp(0.0, 1.0) };
        let b = |v: f32| f32_to_u8(v * 255.0);
        match self {
            Colormap::Gray => [b(val); 3],
            Colormap::Hot => [
                b((val * 3.0).min(1.0)),
                b((val * 3.0 - 1.0).clamp(0.0, 1.0)),
                b((val * 3.0 - 2.0).clamp(0.0, 1.0)),
            ],
            Colormap::Viridis => [b(val.powf(2.0)), b(val), b(1.0 - val)],
            Colormap::Jet => {
                let channel = |offset: f32| (1.5 - (4.0 * val - offset).abs()).clamp(0.0, 1.0);
                [b(channel(3.0)), b(channel(2.0)), b(channel(1.0))]
            }
            Colormap::Cool => [b(val), b(1.0 - val), 255],
            Colormap::Bone => {
                let blue = (val * 1.1).min(1.0);
                [b(val * 0.9), b(val * 0.95), b(blue)]
            }
            Colormap::Red => [b(val), 0, 0],
            Colormap::Green => [0, b(val), 0],
            Colormap::Blue => [0, 0, b(val)],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Colormap::Gray => "gray",
            Colormap::Hot => "hot",
            Colormap::Viridis => "viridis",
            Colormap::Jet => "jet",
            Colormap::Cool => "cool",
            Colormap::Bone => "bone",
            Colormap::Red => "red",
            Colormap::Green => "green",
            Colormap::Blue => "blue",
        }
    }
}

impl fmt::Display for Colormap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Colormap {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gray" | "grey" | "grayscale" => Ok(Colormap::Gray),
            "hot" => Ok(Colormap::Hot),
            "viridis" => Ok(Colormap::Viridis),
            "jet" => Ok(Colormap::Jet),
            "cool" => Ok(Colormap::Cool),
            "bone" => Ok(Colormap::Bone),
            "red" => Ok(Colormap::Red),
            "green" => Ok(Colormap::Green),
            "blue" => Ok(Colormap::Blue),
            _ => Err(Error::UnknownColormap(s.to_string())),
        }
    }
}

/// RGBA for the line and padding color names used in the options.
pub fn named_color(name: &str) -> Option<[u8; 4]> {
    match name.trim().to_ascii_lowercase().as_str() {
        "white" | "w" => Some([255, 255, 255, 255]),
        "gray" | "grey" => Some([128, 128, 128, 255]),
        "black" | "k" => Some([0, 0, 0, 255]),
        "transparent" => Some([0, 0, 0, 0]),
        _ => None,
    }
}

/// Distinct color for an atlas label. Label 0 is background.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn label_color(label: f32) -> Option<[u8; 3]> {
    let label = label.round();
    if label == 0.0 || !label.is_finite() {
        return None;
    }
    // golden-angle hue walk keeps neighbouring labels apart
    let hue = (label.abs() as u32 as f32 * 137.508) % 360.0;
    Some(hsv_to_rgb(hue, 0.75, 0.95))
}

fn hsv_to_rgb(hue: f32, sat: f32, val: f32) -> [u8; 3] {
    let c = val * sat;
    let h = hue / 60.0;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = val - c;
    [
        f32_to_u8((r + m) * 255.0),
        f32_to_u8((g + m) * 255.0),
        f32_to_u8((b + m) * 255.0),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Rule such as `=0` or `<0.5` marking voxels as transparent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransparencyRule {
    op: Comparison,
    threshold: f32,
}

impl TransparencyRule {
    #[must_use]
    pub fn is_transparent(&self, value: f32) -> bool {
        match self.op {
            Comparison::Eq => value == self.threshold,
            Comparison::Ne => value != self.threshold,
            Comparison::Lt => value < self.threshold,
            Comparison::Le => value <= self.threshold,
            Comparison::Gt => value > self.threshold,
            Comparison::Ge => value >= self.threshold,
        }
    }
}

impl FromStr for TransparencyRule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (op, rest) = if let Some(rest) = s.strip_prefix("<=") {
            (Comparison::Le, rest)
        } else if let Some(rest) = s.strip_prefix(">=") {
            (Comparison::Ge, rest)
        } else if let Some(rest) = s.strip_prefix("!=") {
            (Comparison::Ne, rest)
        } else if let Some(rest) = s.strip_prefix("==") {
            (Comparison::Eq, rest)
        } else if let Some(rest) = s.strip_prefix('=') {
            (Comparison::Eq, rest)
        } else if let Some(rest) = s.strip_prefix('<') {
            (Comparison::Lt, rest)
        } else if let Some(rest) = s.strip_prefix('>') {
            (Comparison::Gt, rest)
        } else {
            return Err(Error::InvalidRule(s.to_string()));
        };
        let threshold = rest
            .trim()
            .parse::<f32>()
            .map_err(|_| Error::InvalidRule(s.to_string()))?;
        Ok(Self { op, threshold })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_listed_colormaps_parse() {
        for name in CMAPS_IMAGE.iter().chain(CMAPS_MASK.iter()) {
            let cmap: Colormap = name.parse().unwrap();
            assert_eq!(cmap.name(), *name);
        }
        assert!("magma-ish".parse::<Colormap>().is_err());
    }

    #[test]
    fn test_gray_endpoints() {
        assert_eq!(Colormap::Gray.apply(0.0), [0, 0, 0]);
        assert_eq!(Colormap::Gray.apply(1.0), [255, 255, 255]);
        assert_eq!(Colormap::Gray.apply(7.0), [255, 255, 255]);
        assert_eq!(Colormap::Gray.apply(f32::NAN), [0, 0, 0]);
    }

    #[test]
    fn test_hot_ramps_red_first() {
        assert_eq!(Colormap::Hot.apply(1.0 / 3.0), [255, 0, 0]);
        assert_eq!(Colormap::Hot.apply(1.0), [255, 255, 255]);
    }

    #[test]
    fn test_named_colors() {
        assert_eq!(named_color("White"), Some([255, 255, 255, 255]));
        assert_eq!(named_color("transparent").unwrap()[3], 0);
        assert_eq!(named_color("mauve"), None);
    }

    #[test]
    fn test_label_color_background_and_distinct() {
        assert_eq!(label_color(0.0), None);
        let a = label_color(1.0).unwrap();
        let b = label_color(2.0).unwrap();
        assert_ne!(a, b);
        assert_eq!(label_color(1.2), Some(a));
    }

    #[test]
    fn test_transparency_rules() {
        let eq: TransparencyRule = "=0".parse().unwrap();
        assert!(eq.is_transparent(0.0));
        assert!(!eq.is_transparent(1.0));

        let lt: TransparencyRule = "<0.5".parse().unwrap();
        assert!(lt.is_transparent(0.2));
        assert!(!lt.is_transparent(0.5));

        let le: TransparencyRule = " <= 0.5 ".parse().unwrap();
        assert!(le.is_transparent(0.5));

        let ne: TransparencyRule = "!=3".parse().unwrap();
        assert!(ne.is_transparent(2.0));
        assert!(!ne.is_transparent(3.0));

        let ge: TransparencyRule = ">=10".parse().unwrap();
        assert!(ge.is_transparent(10.0));
    }

    #[test]
    fn test_transparency_rule_rejects_garbage() {
        assert!("0.5".parse::<TransparencyRule>().is_err());
        assert!("<abc".parse::<TransparencyRule>().is_err());
    }
}
