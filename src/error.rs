//! Error type shared by the model, loader and renderer modules.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("could not read NIfTI: {0}")]
    Nifti(#[from] nifti::error::NiftiError),

    #[error("unexpected volume shape: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("{given} filepaths given. Must be 1 or {expected} (no. of images) to be added as masks")]
    MaskCount { given: usize, expected: usize },

    #[error("unknown colormap '{0}'")]
    UnknownColormap(String),

    #[error("invalid transparency rule '{0}'")]
    InvalidRule(String),

    #[error("invalid colorbar ticks '{0}'")]
    InvalidTicks(String),

    #[error("unsupported {0}D volume")]
    Dimensions(usize),

    #[error("rendered image would be {width}x{height} pixels, lower the height")]
    ImageTooLarge { width: u64, height: u64 },

    #[error("nothing to render")]
    NoVolumes,

    #[error("{0} is not a DICOM file or directory")]
    NotDicom(PathBuf),

    #[error("{0} is not an existing directory")]
    NotDirectory(PathBuf),

    #[error("dcm2niix failed: {0}")]
    Dicom(String),
}
