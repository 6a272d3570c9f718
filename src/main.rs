mod app;
mod colormap;
mod config;
mod error;
mod export;
mod grid;
mod layout;
mod spinbox;
mod ui;
mod util;
mod volume;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use eframe::egui;

use crate::app::NiftiView;
use crate::config::{Appearance, Config};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Images to open, or one quoted glob pattern
    paths: Vec<String>,

    /// Masks drawn over the images, one per image or one for all;
    /// a single argument is expanded as a glob
    #[arg(short, long, num_args = 1..)]
    mask: Vec<String>,

    /// Configuration file to start from instead of the saved default
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Widget scaling, e.g. 1.5
    #[arg(long)]
    scaling: Option<f32>,

    /// Appearance mode, dark or light
    #[arg(long, value_parser = parse_appearance)]
    appearance: Option<Appearance>,
}

fn parse_appearance(s: &str) -> std::result::Result<Appearance, String> {
    match s.to_ascii_lowercase().as_str() {
        "dark" => Ok(Appearance::Dark),
        "light" => Ok(Appearance::Light),
        other => Err(format!("unknown appearance '{other}', expected dark or light")),
    }
}

/// Add images or masks; a single argument is expanded as a glob.
fn add_paths(config: &mut Config, paths: &[String], is_mask: bool) -> Result<()> {
    match paths {
        [] => Ok(()),
        [pattern] => Ok(config.add_filepaths_glob(pattern, is_mask)?),
        paths => Ok(config.add_filepaths(paths.to_vec(), is_mask)?),
    }
}

fn build_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_json(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::load_default(),
    };
    add_paths(&mut config, &args.paths, false)?;
    add_paths(&mut config, &args.mask, true)?;
    if args.scaling.is_some() {
        config.scaling = args.scaling;
    }
    if args.appearance.is_some() {
        config.appearance_mode = args.appearance;
    }
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = build_config(&args)?;
    log::info!(
        "starting with {} samples in view {}",
        config.filepaths().len(),
        config.view
    );
    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("NiftiView")
            .with_inner_size([1200.0, 700.0])
            .with_drag_and_drop(true),
        ..Default::default()
    };
    eframe::run_native(
        "NiftiView",
        native_options,
        Box::new(|cc| Ok(Box::new(NiftiView::new(cc, config)))),
    )
    .map_err(|e| anyhow::anyhow!("{e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_build_config() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("t1.nii");
        let data = ndarray::Array3::<f32>::zeros((4, 4, 4));
        nifti::writer::WriterOptions::new(&image)
            .write_nifti(&data)
            .unwrap();
        let config_path = dir.path().join("config.json");
        Config::default().save(&config_path).unwrap();
        let config_arg = config_path.to_string_lossy().into_owned();
        let pattern = dir.path().join("*.nii").to_string_lossy().into_owned();
        let args = Args::parse_from([
            "niftiview",
            &pattern,
            "--config",
            &config_arg,
            "--appearance",
            "light",
        ]);
        let config = build_config(&args).unwrap();
        assert_eq!(config.filepaths().len(), 1);
        assert_eq!(config.appearance_mode, Some(Appearance::Light));
    }

    #[test]
    fn test_rejects_unknown_appearance() {
        assert!(Args::try_parse_from(["niftiview", "--appearance", "blue"]).is_err());
    }
}
