//! Principal Point Projection over the Intrinsic Blocks

use crate::error::TableError;
use crate::layout::TableLayout;
use crate::table::{CalibrationTable, Eye};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Index of normalized ppx inside the intrinsic block
const PPX_INDEX: usize = 2;
/// Index of normalized ppy inside the intrinsic block
const PPY_INDEX: usize = 3;

/// Principal point axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Ppx,
    Ppy,
}

impl Axis {
    fn index(self) -> usize {
        match self {
            Axis::Ppx => PPX_INDEX,
            Axis::Ppy => PPY_INDEX,
        }
    }

    fn dimension(self, layout: &TableLayout) -> f64 {
        match self {
            Axis::Ppx => layout.nominal_width,
            Axis::Ppy => layout.nominal_height,
        }
    }
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Axis::Ppx => write!(f, "ppx"),
            Axis::Ppy => write!(f, "ppy"),
        }
    }
}

/// Principal point in pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PrincipalPoint {
    pub ppx: f64,
    pub ppy: f64,
}

impl PrincipalPoint {
    /// Value along one axis
    pub fn axis(&self, axis: Axis) -> f64 {
        match axis {
            Axis::Ppx => self.ppx,
            Axis::Ppy => self.ppy,
        }
    }

    fn from_intrinsics(values: &[f32], layout: &TableLayout) -> Self {
        Self {
            ppx: values[PPX_INDEX] as f64 * layout.nominal_width,
            ppy: values[PPY_INDEX] as f64 * layout.nominal_height,
        }
    }
}

/// Byte offsets of the intrinsic blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntrinsicOffsets {
    pub left: usize,
    pub right: usize,
}

/// Principal points of both eyes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrincipalPoints {
    pub left: PrincipalPoint,
    pub right: PrincipalPoint,
    pub offsets: IntrinsicOffsets,
}

/// Result of patching one axis of the right-eye principal point
#[derive(Debug, Clone, PartialEq)]
pub struct PrincipalPointPatch {
    /// Patched table with a freshly computed CRC
    pub table: CalibrationTable,
    /// Right-eye principal point before the patch
    pub original: PrincipalPoint,
    /// Right-eye principal point decoded from the patched floats
    pub patched: PrincipalPoint,
}

/// Read left and right principal points.
///
/// Missing or undersized tables are logged and reported as errors rather
/// than decoded.
pub fn read_principal_points(
    table: Option<&CalibrationTable>,
    layout: &TableLayout,
) -> Result<PrincipalPoints, TableError> {
    let table = match table {
        Some(t) => t,
        None => {
            error!("No calibration table to read principal points from");
            return Err(TableError::Missing);
        }
    };

    if let Err(e) = table.ensure_min_size(layout) {
        error!("Calibration table is too small: {}", e);
        return Err(e);
    }

    let read = || -> Result<PrincipalPoints, TableError> {
        let left = table.intrinsics(Eye::Left, layout)?;
        let right = table.intrinsics(Eye::Right, layout)?;
        Ok(PrincipalPoints {
            left: PrincipalPoint::from_intrinsics(&left, layout),
            right: PrincipalPoint::from_intrinsics(&right, layout),
            offsets: IntrinsicOffsets {
                left: layout.left_intrinsics_offset,
                right: layout.right_intrinsics_offset,
            },
        })
    };

    read().map_err(|e| {
        error!("Error reading principal points: {}", e);
        e
    })
}

/// Shift one axis of the right-eye principal point by `delta_px` pixels.
///
/// Only the right-eye block is modified. The returned table carries a CRC
/// recomputed over the patched payload.
pub fn patch_principal_point(
    table: &CalibrationTable,
    delta_px: f64,
    axis: Axis,
    layout: &TableLayout,
) -> Result<PrincipalPointPatch, TableError> {
    let mut patched_table = table.clone();
    let mut right = patched_table.intrinsics(Eye::Right, layout)?;
    let original = PrincipalPoint::from_intrinsics(&right, layout);

    let dimension = axis.dimension(layout);
    let idx = axis.index();
    let corrected_px = original.axis(axis) + delta_px;
    right[idx] = (corrected_px / dimension) as f32;

    info!(
        "  Raw Right {} original={:.6} modified={:.6}",
        axis,
        original.axis(axis),
        corrected_px
    );

    patched_table.set_intrinsics(Eye::Right, &right, layout)?;
    patched_table.finalize_crc(layout)?;

    Ok(PrincipalPointPatch {
        table: patched_table,
        original,
        patched: PrincipalPoint::from_intrinsics(&right, layout),
    })
}
