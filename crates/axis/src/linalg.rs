//! Small dense helpers shared by the axis strategies.

use nalgebra::DMatrix;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};

use crate::error::AxisError;

/// Mean of the rows of `emb` whose id equals `group`.
pub(crate) fn group_mean(
    emb: ArrayView2<'_, f64>,
    ids: &[u8],
    group: u8,
) -> Result<Array1<f64>, AxisError> {
    let mut sum = Array1::<f64>::zeros(emb.ncols());
    let mut count = 0usize;
    for (row, &id) in emb.axis_iter(Axis(0)).zip(ids) {
        if id == group {
            sum += &row;
            count += 1;
        }
    }
    if count == 0 {
        return Err(AxisError::InvalidGroupComposition(format!(
            "group {group} has no members; its centroid is undefined"
        )));
    }
    sum /= count as f64;
    Ok(sum)
}

pub(crate) fn l2_norm(v: ArrayView1<'_, f64>) -> f64 {
    v.dot(&v).sqrt()
}

/// `(row · axis) / max(‖row‖·‖axis‖, eps)` for every row of `rows`.
pub(crate) fn cosine_projection(
    rows: ArrayView2<'_, f64>,
    axis: ArrayView1<'_, f64>,
    eps: f64,
    parallel: bool,
) -> Array1<f64> {
    let axis_norm = l2_norm(axis);
    let project = |row: ArrayView1<'_, f64>| {
        let denom = (l2_norm(row) * axis_norm).max(eps);
        row.dot(&axis) / denom
    };

    let mut out = Array1::<f64>::zeros(rows.nrows());
    let zip = Zip::from(&mut out).and(rows.rows());
    if parallel {
        zip.par_for_each(|o, row| *o = project(row));
    } else {
        zip.for_each(|o, row| *o = project(row));
    }
    out
}

pub(crate) fn to_dmatrix(m: ArrayView2<'_, f64>) -> DMatrix<f64> {
    DMatrix::from_fn(m.nrows(), m.ncols(), |i, j| m[[i, j]])
}

pub(crate) fn from_dmatrix(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}
