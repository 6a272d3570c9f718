//! NIfTI loading, RAS reorientation and slice extraction.

use std::io::{Cursor, Read};
use std::ops::Range;
use std::path::Path;

use flate2::read::GzDecoder;
use ndarray::{s, Array2, Array4, ArrayD, ArrayView3, Axis, Ix4};
use nifti::{InMemNiftiVolume, IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use crate::error::{Error, Result};
use crate::layout::{CoordSys, GlassMode, Plane};
use crate::util::{f32_to_index, usize_to_f32};

/// Index range kept along each RAS axis.
pub type Extent = [Range<usize>; 3];

/// Build the 3x3 direction part of the affine from sform, qform, or pixdims.
fn get_affine_3x3(hdr: &NiftiHeader) -> [[f32; 3]; 3] {
    if hdr.sform_code > 0 {
        [
            [hdr.srow_x[0], hdr.srow_x[1], hdr.srow_x[2]],
            [hdr.srow_y[0], hdr.srow_y[1], hdr.srow_y[2]],
            [hdr.srow_z[0], hdr.srow_z[1], hdr.srow_z[2]],
        ]
    } else if hdr.qform_code > 0 {
        let b = f64::from(hdr.quatern_b);
        let c = f64::from(hdr.quatern_c);
        let d = f64::from(hdr.quatern_d);
        let a = (1.0 - b * b - c * c - d * d).max(0.0).sqrt();
        #[allow(clippy::cast_possible_truncation)]
        let r = [
            [
                (a * a + b * b - c * c - d * d) as f32,
                (2.0 * (b * c - a * d)) as f32,
                (2.0 * (b * d + a * c)) as f32,
            ],
            [
                (2.0 * (b * c + a * d)) as f32,
                (a * a + c * c - b * b - d * d) as f32,
                (2.0 * (c * d - a * b)) as f32,
            ],
            [
                (2.0 * (b * d - a * c)) as f32,
                (2.0 * (c * d + a * b)) as f32,
                (a * a + d * d - b * b - c * c) as f32,
            ],
        ];
        let qfac: f32 = if hdr.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        let (px, py, pz) = (hdr.pixdim[1], hdr.pixdim[2], hdr.pixdim[3] * qfac);
        [
            [r[0][0] * px, r[0][1] * py, r[0][2] * pz],
            [r[1][0] * px, r[1][1] * py, r[1][2] * pz],
            [r[2][0] * px, r[2][1] * py, r[2][2] * pz],
        ]
    } else {
        // No orientation info, assume identity with voxel sizes
        [
            [hdr.pixdim[1], 0.0, 0.0],
            [0.0, hdr.pixdim[2], 0.0],
            [0.0, 0.0, hdr.pixdim[3]],
        ]
    }
}

/// Extract the translation (origin at voxel 0,0,0) from the header affine.
fn get_translation(hdr: &NiftiHeader) -> [f32; 3] {
    if hdr.sform_code > 0 {
        [hdr.srow_x[3], hdr.srow_y[3], hdr.srow_z[3]]
    } else if hdr.qform_code > 0 {
        [hdr.quatern_x, hdr.quatern_y, hdr.quatern_z]
    } else {
        [0.0, 0.0, 0.0]
    }
}

/// Reorient a (x, y, z, t) volume to RAS using the header affine.
///
/// Returns the reoriented volume, voxel spacings in RAS order, and the RAS
/// coordinate (in mm) of voxel (0,0,0) in the reoriented volume.
fn reorient_to_ras(volume: Array4<f32>, hdr: &NiftiHeader) -> (Array4<f32>, [f32; 3], [f32; 3]) {
    let affine = get_affine_3x3(hdr);
    let translation = get_translation(hdr);
    let orig_shape = [volume.shape()[0], volume.shape()[1], volume.shape()[2]];

    // For each voxel axis (column), find which world axis (row) dominates.
    let mut voxel_to_world = [0usize; 3];
    let mut voxel_flip = [false; 3];
    for col in 0..3 {
        let mut best_row = 0;
        let mut best_val = 0.0f32;
        for (row, affine_row) in affine.iter().enumerate() {
            let v = affine_row[col].abs();
            if v > best_val {
                best_val = v;
                best_row = row;
            }
        }
        voxel_to_world[col] = best_row;
        voxel_flip[col] = affine[best_row][col] < 0.0;
    }

    // Oblique affines can map two voxel axes onto one world axis; keep the
    // array order in that case.
    let mut seen = [false; 3];
    for &world in &voxel_to_world {
        seen[world] = true;
    }
    if seen.iter().any(|s| !s) {
        log::warn!("ambiguous orientation in header, keeping array axes");
        voxel_to_world = [0, 1, 2];
    }

    let mut world_to_voxel = [0usize; 3];
    for col in 0..3 {
        world_to_voxel[voxel_to_world[col]] = col;
    }

    let orig_spacing = [hdr.pixdim[1], hdr.pixdim[2], hdr.pixdim[3]];
    let ras_spacing = world_to_voxel.map(|v| sanitize_spacing(orig_spacing[v]));

    let vol = volume
        .permuted_axes([world_to_voxel[0], world_to_voxel[1], world_to_voxel[2], 3])
        .to_owned();

    let needs_flip = world_to_voxel.map(|v| voxel_flip[v]);
    let vol = if needs_flip[0] {
        vol.slice(s![..;-1, .., .., ..]).to_owned()
    } else {
        vol
    };
    let vol = if needs_flip[1] {
        vol.slice(s![.., ..;-1, .., ..]).to_owned()
    } else {
        vol
    };
    let vol = if needs_flip[2] {
        vol.slice(s![.., .., ..;-1, ..]).to_owned()
    } else {
        vol
    };

    // After permutation + flip, new voxel 0 along axis a came from original
    // axis world_to_voxel[a] at index (shape-1 if flipped, 0 otherwise).
    let mut orig_ijk = [0.0f32; 3];
    for a in 0..3 {
        let v = world_to_voxel[a];
        orig_ijk[v] = if needs_flip[a] {
            usize_to_f32(orig_shape[v].saturating_sub(1))
        } else {
            0.0
        };
    }
    let ras_origin = [0, 1, 2].map(|row| {
        affine[row][0] * orig_ijk[0]
            + affine[row][1] * orig_ijk[1]
            + affine[row][2] * orig_ijk[2]
            + translation[row]
    });

    (vol, ras_spacing, ras_origin)
}

fn sanitize_spacing(spacing: f32) -> f32 {
    let spacing = spacing.abs();
    if spacing.is_finite() && spacing > 0.0 {
        spacing
    } else {
        1.0
    }
}

/// A loaded volume in RAS orientation.
///
/// Axis 0 = L→R, axis 1 = P→A, axis 2 = I→S, axis 3 = time.
#[derive(Debug, Clone)]
pub struct Volume {
    filepath: String,
    data: Array4<f32>,
    /// Voxel spacings in mm for RAS axes [R, A, S]
    voxdim: [f32; 3],
    /// RAS coordinate (mm) at voxel (0,0,0)
    ras_origin: [f32; 3],
    header_lines: Vec<String>,
}

impl Volume {
    pub fn open(path: &Path) -> Result<Self> {
        let obj = ReaderOptions::new().read_file(path)?;
        let header = obj.header().clone();
        let volume = obj.into_volume().into_ndarray::<f32>()?;
        log::info!("loaded {} {:?}", path.display(), volume.shape());
        Self::from_dyn(path.to_string_lossy().into_owned(), volume, &header)
    }

    /// Load from raw (optionally gzipped) bytes, e.g. a dropped file
    /// without a path.
    pub fn from_bytes(name: &str, bytes: &[u8]) -> Result<Self> {
        let is_gz = bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b;
        let cursor = Cursor::new(bytes);
        if is_gz {
            Self::from_reader(name, GzDecoder::new(cursor))
        } else {
            Self::from_reader(name, cursor)
        }
    }

    fn from_reader<R: Read>(name: &str, mut reader: R) -> Result<Self> {
        let header = NiftiHeader::from_reader(&mut reader)?;
        // vox_offset is a float in the header; 348 is the fixed NIfTI-1 size
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let vox_offset = header.vox_offset.max(348.0) as usize;
        let skip = vox_offset.saturating_sub(348);
        if skip > 0 {
            let mut discard = vec![0u8; skip];
            reader.read_exact(&mut discard)?;
        }
        let volume = InMemNiftiVolume::from_reader(reader, &header)?;
        let volume = volume.into_ndarray::<f32>()?;
        Self::from_dyn(name.to_string(), volume, &header)
    }

    fn from_dyn(filepath: String, volume: ArrayD<f32>, header: &NiftiHeader) -> Result<Self> {
        let volume = match volume.ndim() {
            3 => volume.insert_axis(Axis(3)).into_dimensionality::<Ix4>()?,
            4 => volume.into_dimensionality::<Ix4>()?,
            n => return Err(Error::Dimensions(n)),
        };
        let (data, voxdim, ras_origin) = reorient_to_ras(volume, header);
        let header_lines = vec![
            format!(
                "dim: {} x {} x {} x {}",
                header.dim[1], header.dim[2], header.dim[3], header.dim[4].max(1)
            ),
            format!(
                "pixdim: {:.2} x {:.2} x {:.2}",
                header.pixdim[1], header.pixdim[2], header.pixdim[3]
            ),
            format!("datatype: {}", header.datatype),
            format!(
                "sform/qform: {}/{}",
                header.sform_code, header.qform_code
            ),
        ];
        Ok(Self {
            filepath,
            data,
            voxdim,
            ras_origin,
            header_lines,
        })
    }

    /// Build a volume directly from RAS-ordered data.
    #[cfg(test)]
    pub fn from_array(
        filepath: &str,
        data: Array4<f32>,
        voxdim: [f32; 3],
        ras_origin: [f32; 3],
    ) -> Self {
        let shape = data.shape().to_vec();
        Self {
            filepath: filepath.to_string(),
            header_lines: vec![format!(
                "dim: {} x {} x {} x {}",
                shape[0], shape[1], shape[2], shape[3]
            )],
            data,
            voxdim: voxdim.map(sanitize_spacing),
            ras_origin,
        }
    }

    pub fn filepath(&self) -> &str {
        &self.filepath
    }

    pub fn shape(&self) -> [usize; 3] {
        [self.data.shape()[0], self.data.shape()[1], self.data.shape()[2]]
    }

    pub fn n_frames(&self) -> usize {
        self.data.shape()[3]
    }

    pub fn voxdim(&self) -> [f32; 3] {
        self.voxdim
    }

    pub fn header_lines(&self) -> &[String] {
        &self.header_lines
    }

    pub fn full_extent(&self) -> Extent {
        let [x, y, z] = self.shape();
        [0..x, 0..y, 0..z]
    }

    fn frame(&self, frame: usize) -> ArrayView3<'_, f32> {
        self.data
            .index_axis(Axis(3), frame.min(self.n_frames().saturating_sub(1)))
    }

    fn center(&self, axis: usize) -> f32 {
        usize_to_f32(self.shape()[axis].saturating_sub(1)) / 2.0
    }

    /// Coordinate of a (fractional) voxel index along `axis`.
    pub fn index_to_coord(&self, sys: CoordSys, axis: usize, idx: f32) -> f32 {
        match sys {
            CoordSys::ArrayIdx => idx - self.center(axis),
            CoordSys::ArrayMm => (idx - self.center(axis)) * self.voxdim[axis],
            CoordSys::ScannerMm => self.ras_origin[axis] + idx * self.voxdim[axis],
        }
    }

    /// Fractional voxel index of a coordinate along `axis`.
    pub fn coord_to_index(&self, sys: CoordSys, axis: usize, coord: f32) -> f32 {
        match sys {
            CoordSys::ArrayIdx => coord + self.center(axis),
            CoordSys::ArrayMm => coord / self.voxdim[axis] + self.center(axis),
            CoordSys::ScannerMm => (coord - self.ras_origin[axis]) / self.voxdim[axis],
        }
    }

    /// Nearest voxel index for a coordinate, clamped to the volume.
    pub fn coord_to_voxel(&self, sys: CoordSys, axis: usize, coord: f32) -> usize {
        f32_to_index(self.coord_to_index(sys, axis, coord), self.shape()[axis])
    }

    /// Lower and upper coordinate of the given index ranges.
    pub fn origin_bounds(&self, sys: CoordSys, extent: &Extent) -> [[f32; 3]; 2] {
        let mut bounds = [[0.0; 3]; 2];
        for axis in 0..3 {
            let lo = self.index_to_coord(sys, axis, usize_to_f32(extent[axis].start));
            let hi = self.index_to_coord(
                sys,
                axis,
                usize_to_f32(extent[axis].end.saturating_sub(1)),
            );
            bounds[0][axis] = lo.min(hi);
            bounds[1][axis] = lo.max(hi);
        }
        bounds
    }

    /// Display-oriented slice through `index` along the plane's axis.
    ///
    /// Rows run from the top (high coordinate) down, columns from low to
    /// high coordinate of the horizontal axis.
    pub fn slice(&self, plane: Plane, index: usize, frame: usize, extent: &Extent) -> Array2<f32> {
        let axis = plane.axis();
        let view = self.frame(frame);
        let view = view.slice(s![
            extent[0].clone(),
            extent[1].clone(),
            extent[2].clone()
        ]);
        let local = index
            .clamp(extent[axis].start, extent[axis].end.saturating_sub(1))
            .saturating_sub(extent[axis].start);
        let plane_view = view.index_axis(Axis(axis), local);
        plane_view.t().slice(s![..;-1, ..]).to_owned()
    }

    /// Maximum or minimum intensity projection along the plane's axis.
    pub fn projection(&self, plane: Plane, frame: usize, mode: GlassMode, extent: &Extent) -> Array2<f32> {
        let view = self.frame(frame);
        let view = view.slice(s![
            extent[0].clone(),
            extent[1].clone(),
            extent[2].clone()
        ]);
        let projected = match mode {
            GlassMode::Max => {
                view.fold_axis(Axis(plane.axis()), f32::NEG_INFINITY, |a, &b| a.max(b))
            }
            GlassMode::Min => view.fold_axis(Axis(plane.axis()), f32::INFINITY, |a, &b| a.min(b)),
        };
        projected.t().slice(s![..;-1, ..]).to_owned()
    }

    /// Bounding box of non-zero voxels, or the full extent if there are none.
    pub fn nonzero_extent(&self, frame: usize) -> Extent {
        let mut lo = [usize::MAX; 3];
        let mut hi = [0usize; 3];
        let mut any = false;
        for ((x, y, z), &v) in self.frame(frame).indexed_iter() {
            if v != 0.0 && v.is_finite() {
                any = true;
                for (axis, idx) in [x, y, z].into_iter().enumerate() {
                    lo[axis] = lo[axis].min(idx);
                    hi[axis] = hi[axis].max(idx);
                }
            }
        }
        if any {
            [lo[0]..hi[0] + 1, lo[1]..hi[1] + 1, lo[2]..hi[2] + 1]
        } else {
            self.full_extent()
        }
    }

    pub fn value_at(&self, voxel: [usize; 3], frame: usize) -> Option<f32> {
        self.frame(frame).get(voxel).copied()
    }

    /// Sorted finite values of a frame.
    ///
    /// Large volumes are subsampled with a fixed stride.
    pub fn sorted_values(&self, frame: usize) -> Vec<f32> {
        const MAX_SAMPLES: usize = 1 << 20;
        let view = self.frame(frame);
        let step = (view.len() / MAX_SAMPLES).max(1);
        let mut values: Vec<f32> = view
            .iter()
            .step_by(step)
            .copied()
            .filter(|v| v.is_finite())
            .collect();
        values.sort_unstable_by(f32::total_cmp);
        values
    }

    /// Values at two quantiles of a frame, ignoring NaNs.
    pub fn quantiles(&self, frame: usize, qrange: (f32, f32)) -> (f32, f32) {
        let values = self.sorted_values(frame);
        if values.is_empty() {
            return (0.0, 1.0);
        }
        let last = usize_to_f32(values.len() - 1);
        let pick = |q: f32| values[f32_to_index(q.clamp(0.0, 1.0) * last, values.len())];
        (pick(qrange.0), pick(qrange.1))
    }

    /// Counts of a frame's values in `bins` equal bins over `range`.
    pub fn histogram(&self, frame: usize, bins: usize, range: (f32, f32)) -> Vec<u32> {
        let mut counts = vec![0u32; bins.max(1)];
        let width = range.1 - range.0;
        if width <= 0.0 || !width.is_finite() {
            return counts;
        }
        let n_bins = usize_to_f32(counts.len());
        for &v in self.frame(frame) {
            if v.is_finite() && v >= range.0 && v <= range.1 {
                let bin = f32_to_index(((v - range.0) / width * n_bins).floor(), counts.len());
                counts[bin] += 1;
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array3;

    /// 4 x 5 x 6 volume where value = 100x + 10y + z.
    fn ramp() -> Volume {
        let data = Array4::from_shape_fn((4, 5, 6, 1), |(x, y, z, _)| {
            usize_to_f32(100 * x + 10 * y + z)
        });
        Volume::from_array("ramp.nii", data, [2.0, 1.0, 1.0], [-10.0, 0.0, 5.0])
    }

    #[test]
    fn test_coord_round_trip_per_system() {
        let vol = ramp();
        for sys in crate::layout::COORDINATE_SYSTEMS {
            for axis in 0..3 {
                let c = vol.index_to_coord(sys, axis, 2.0);
                assert_relative_eq!(vol.coord_to_index(sys, axis, c), 2.0);
            }
        }
        assert_relative_eq!(vol.index_to_coord(CoordSys::ArrayMm, 0, 0.0), -3.0);
        assert_relative_eq!(vol.index_to_coord(CoordSys::ScannerMm, 0, 1.0), -8.0);
        assert_eq!(vol.coord_to_voxel(CoordSys::ArrayIdx, 2, 100.0), 5);
    }

    #[test]
    fn test_origin_bounds() {
        let vol = ramp();
        let bounds = vol.origin_bounds(CoordSys::ArrayIdx, &vol.full_extent());
        assert_relative_eq!(bounds[0][0], -1.5);
        assert_relative_eq!(bounds[1][0], 1.5);
        assert_relative_eq!(bounds[0][2], -2.5);
    }

    #[test]
    fn test_axial_slice_orientation() {
        let vol = ramp();
        let slice = vol.slice(Plane::Axial, 3, 0, &vol.full_extent());
        // rows = A reversed (5), cols = R (4)
        assert_eq!(slice.dim(), (5, 4));
        // top-left is x=0, y=4 (most anterior)
        assert_relative_eq!(slice[[0, 0]], 43.0);
        assert_relative_eq!(slice[[4, 3]], 303.0);
    }

    #[test]
    fn test_sagittal_slice_with_extent() {
        let vol = ramp();
        let extent = [0..4, 1..3, 2..5];
        let slice = vol.slice(Plane::Sagittal, 1, 0, &extent);
        assert_eq!(slice.dim(), (3, 2));
        assert_relative_eq!(slice[[0, 0]], 114.0);
    }

    #[test]
    fn test_max_projection() {
        let vol = ramp();
        let mip = vol.projection(Plane::Coronal, 0, GlassMode::Max, &vol.full_extent());
        assert_eq!(mip.dim(), (6, 4));
        assert_relative_eq!(mip[[0, 0]], 45.0);
    }

    #[test]
    fn test_nonzero_extent() {
        let mut data = Array4::<f32>::zeros((6, 6, 6, 1));
        data[[2, 3, 1, 0]] = 1.0;
        data[[4, 3, 2, 0]] = 1.0;
        let vol = Volume::from_array("blob.nii", data, [1.0; 3], [0.0; 3]);
        assert_eq!(vol.nonzero_extent(0), [2..5, 3..4, 1..3]);

        let empty = Volume::from_array("empty.nii", Array4::zeros((2, 2, 2, 1)), [1.0; 3], [0.0; 3]);
        assert_eq!(empty.nonzero_extent(0), empty.full_extent());
    }

    #[test]
    fn test_quantiles_and_histogram() {
        let data = Array4::from_shape_fn((10, 10, 1, 1), |(x, y, _, _)| usize_to_f32(x * 10 + y));
        let vol = Volume::from_array("q.nii", data, [1.0; 3], [0.0; 3]);
        assert_eq!(vol.quantiles(0, (0.0, 1.0)), (0.0, 99.0));
        let (lo, hi) = vol.quantiles(0, (0.1, 0.9));
        assert_relative_eq!(lo, 10.0);
        assert_relative_eq!(hi, 89.0);
        let hist = vol.histogram(0, 4, (0.0, 100.0));
        assert_eq!(hist, vec![25, 25, 25, 25]);
    }

    #[test]
    fn test_open_written_file_and_flip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.nii");
        let data = Array3::from_shape_fn((3, 4, 5), |(x, y, z)| usize_to_f32(x + y + z));
        nifti::writer::WriterOptions::new(&path)
            .write_nifti(&data)
            .unwrap();
        let vol = Volume::open(&path).unwrap();
        assert_eq!(vol.shape(), [3, 4, 5]);
        assert_eq!(vol.n_frames(), 1);
        assert_eq!(vol.value_at([2, 3, 4], 0), Some(9.0));

        let bytes = std::fs::read(&path).unwrap();
        let from_bytes = Volume::from_bytes("dropped.nii", &bytes).unwrap();
        assert_eq!(from_bytes.shape(), [3, 4, 5]);
        assert_eq!(from_bytes.filepath(), "dropped.nii");
    }
}
