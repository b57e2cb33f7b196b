//! Two-class linear discriminant analysis.
//!
//! The estimator solves the generalized eigenproblem `Sb·w = λ·Sw·w` by
//! whitening the within-class scatter `Sw` and diagonalizing the whitened
//! between-class scatter `Sb`. Directions of `Sw` whose eigenvalue falls below
//! `tol · λ_max` are dropped, so rank-deficient inputs (fewer rows than
//! dimensions) still produce a usable subspace.
//!
//! With two classes `Sb` has rank one: the first component is the only one
//! with a non-zero eigenvalue. Further components are orthogonal (in the
//! whitened metric) to it and carry no separating information. They are still
//! returned when requested.

use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::centroid::check_degenerate;
use crate::config::{AxisConfig, DiscriminantConfig, Shrinkage};
use crate::error::AxisError;
use crate::linalg::{from_dmatrix, group_mean, to_dmatrix};
use crate::model::ReferenceState;
use crate::strategy::{AxisProjection, AxisStrategy};

/// A fitted two-class discriminant.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearDiscriminant {
    /// Class means, `2 x D`.
    means: Array2<f64>,
    /// Normalized class priors.
    priors: [f64; 2],
    /// Prior-weighted grand mean; rows are centred on it before projection.
    xbar: Array1<f64>,
    /// Projection matrix, `D x k`.
    scalings: Array2<f64>,
    /// Share of between-class variance carried by each kept component.
    explained_variance_ratio: Array1<f64>,
}

impl LinearDiscriminant {
    /// Fit on `x` (`N x D`) with group ids `y` in `{0, 1}`.
    pub fn fit(
        x: ArrayView2<'_, f64>,
        y: &[u8],
        cfg: &DiscriminantConfig,
    ) -> Result<Self, AxisError> {
        cfg.validate()?;
        let (n, d) = x.dim();
        if y.len() != n {
            return Err(AxisError::DimensionMismatch(format!(
                "{} group ids for {n} rows",
                y.len()
            )));
        }
        if d == 0 {
            return Err(AxisError::DimensionMismatch(
                "embeddings have zero columns".to_string(),
            ));
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(AxisError::Linalg(
                "embeddings contain non-finite values".to_string(),
            ));
        }
        if y.iter().any(|&id| id > 1) {
            return Err(AxisError::InvalidGroupComposition(
                "group ids must be 0 or 1".to_string(),
            ));
        }

        let mean0 = group_mean(x, y, 0)?;
        let mean1 = group_mean(x, y, 1)?;
        let priors = resolve_priors(cfg, y)?;
        let xbar = &mean0 * priors[0] + &mean1 * priors[1];

        // Within-class scatter: prior-weighted class covariances.
        let mut sw = Array2::<f64>::zeros((d, d));
        for (group, mean) in [(0u8, &mean0), (1u8, &mean1)] {
            let centered = class_rows(x, y, group) - mean;
            let cov = class_covariance(centered.view(), cfg.shrinkage);
            sw.scaled_add(priors[group as usize], &cov);
        }

        // Between-class scatter.
        let mut sb = Array2::<f64>::zeros((d, d));
        for (group, mean) in [(0usize, &mean0), (1usize, &mean1)] {
            let diff = (mean - &xbar).insert_axis(Axis(1));
            sb.scaled_add(priors[group], &diff.dot(&diff.t()));
        }

        let whitening = whitening_basis(&sw, cfg.tol)?;
        let rank = whitening.ncols();
        if cfg.n_components > rank {
            return Err(AxisError::DimensionMismatch(format!(
                "requested {} discriminant components but the within-class scatter has rank {rank}",
                cfg.n_components
            )));
        }

        let whitened_sb = whitening.t().dot(&sb).dot(&whitening);
        let (eigenvalues, eigenvectors) = sorted_eigen(&whitened_sb)?;
        let k = cfg.n_components;
        let mut scalings = whitening.dot(&eigenvectors.slice(ndarray::s![.., ..k]));

        // Group 1 projects above group 0 on the first component; the rest get
        // a deterministic sign.
        let direction = &mean1 - &mean0;
        for (c, mut col) in scalings.axis_iter_mut(Axis(1)).enumerate() {
            let flip = if c == 0 {
                col.dot(&direction) < 0.0
            } else {
                col.iter()
                    .copied()
                    .fold(0.0f64, |best, v| if v.abs() > best.abs() { v } else { best })
                    < 0.0
            };
            if flip {
                col.mapv_inplace(|v| -v);
            }
        }

        let clamped = eigenvalues.mapv(|v| v.max(0.0));
        let total = clamped.sum();
        let explained_variance_ratio = if total > 0.0 {
            clamped.slice(ndarray::s![..k]).mapv(|v| v / total)
        } else {
            Array1::zeros(k)
        };

        let mut means = Array2::<f64>::zeros((2, d));
        means.row_mut(0).assign(&mean0);
        means.row_mut(1).assign(&mean1);

        Ok(Self {
            means,
            priors,
            xbar,
            scalings,
            explained_variance_ratio,
        })
    }

    /// Project `x` (`M x D`) into the discriminant subspace (`M x k`).
    pub fn transform(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, AxisError> {
        if x.ncols() != self.xbar.len() {
            return Err(AxisError::DimensionMismatch(format!(
                "expected {} columns, got {}",
                self.xbar.len(),
                x.ncols()
            )));
        }
        Ok((&x - &self.xbar).dot(&self.scalings))
    }

    pub fn scalings(&self) -> &Array2<f64> {
        &self.scalings
    }

    pub fn means(&self) -> &Array2<f64> {
        &self.means
    }

    pub fn xbar(&self) -> &Array1<f64> {
        &self.xbar
    }

    pub fn priors(&self) -> [f64; 2] {
        self.priors
    }

    pub fn explained_variance_ratio(&self) -> &Array1<f64> {
        &self.explained_variance_ratio
    }

    pub fn n_components(&self) -> usize {
        self.scalings.ncols()
    }
}

fn resolve_priors(cfg: &DiscriminantConfig, y: &[u8]) -> Result<[f64; 2], AxisError> {
    let raw = match &cfg.priors {
        Some(p) => [p[0], p[1]],
        None => {
            let ones = y.iter().filter(|&&id| id == 1).count() as f64;
            [y.len() as f64 - ones, ones]
        }
    };
    let total = raw[0] + raw[1];
    if total <= 0.0 {
        return Err(AxisError::InvalidConfig(
            "priors must have a positive sum".to_string(),
        ));
    }
    Ok([raw[0] / total, raw[1] / total])
}

fn class_rows(x: ArrayView2<'_, f64>, y: &[u8], group: u8) -> Array2<f64> {
    let rows: Vec<usize> = y
        .iter()
        .enumerate()
        .filter_map(|(i, &id)| (id == group).then_some(i))
        .collect();
    x.select(Axis(0), &rows)
}

/// Biased covariance of already-centred rows, optionally shrunk towards `μ·I`.
fn class_covariance(centered: ArrayView2<'_, f64>, shrinkage: Option<Shrinkage>) -> Array2<f64> {
    let n = centered.nrows() as f64;
    let mut cov = centered.t().dot(&centered) / n;
    let alpha = match shrinkage {
        None => return cov,
        Some(Shrinkage::Fixed(alpha)) => alpha,
        Some(Shrinkage::Auto) => ledoit_wolf_shrinkage(centered),
    };
    let d = cov.nrows();
    let mu = cov.diag().sum() / d as f64;
    cov *= 1.0 - alpha;
    for i in 0..d {
        cov[[i, i]] += alpha * mu;
    }
    cov
}

/// Ledoit-Wolf optimal shrinkage intensity for centred data.
pub(crate) fn ledoit_wolf_shrinkage(x: ArrayView2<'_, f64>) -> f64 {
    let (n, d) = x.dim();
    if n <= 1 || d == 0 {
        return 0.0;
    }
    let (n, d) = (n as f64, d as f64);
    let x2 = x.mapv(|v| v * v);
    let emp_cov_trace = x2.sum_axis(Axis(0)) / n;
    let trace_sum = emp_cov_trace.sum();
    let mu = trace_sum / d;

    let beta_ = x2.t().dot(&x2).sum();
    let delta_ = x.t().dot(&x).mapv(|v| v * v).sum() / (n * n);

    let beta = (beta_ / n - delta_) / (d * n);
    let delta = (delta_ - 2.0 * mu * trace_sum + d * mu * mu) / d;
    let beta = beta.min(delta);
    if beta <= 0.0 || delta <= 0.0 {
        0.0
    } else {
        beta / delta
    }
}

/// `V_r · Λ_r^{-1/2}` over the eigenpairs of `sw` kept by the tolerance.
fn whitening_basis(sw: &Array2<f64>, tol: f64) -> Result<Array2<f64>, AxisError> {
    let (values, vectors) = sorted_eigen(sw)?;
    let max = values.iter().copied().fold(0.0f64, f64::max);
    if max <= 0.0 {
        return Err(AxisError::Linalg(
            "within-class scatter is zero; every group is a single point".to_string(),
        ));
    }
    let kept: Vec<usize> = values
        .iter()
        .enumerate()
        .filter_map(|(i, &v)| (v > tol * max).then_some(i))
        .collect();
    let mut basis = vectors.select(Axis(1), &kept);
    for (mut col, &i) in basis.axis_iter_mut(Axis(1)).zip(&kept) {
        col /= values[i].sqrt();
    }
    Ok(basis)
}

/// Symmetric eigen-decomposition with eigenvalues in descending order.
fn sorted_eigen(m: &Array2<f64>) -> Result<(Array1<f64>, Array2<f64>), AxisError> {
    let dm: DMatrix<f64> = to_dmatrix(m.view());
    let eig = SymmetricEigen::try_new(dm, f64::EPSILON, 0)
        .ok_or_else(|| AxisError::Linalg("symmetric eigen-decomposition did not converge".into()))?;
    let mut order: Vec<usize> = (0..eig.eigenvalues.len()).collect();
    order.sort_by(|&a, &b| eig.eigenvalues[b].total_cmp(&eig.eigenvalues[a]));
    let values = Array1::from_iter(order.iter().map(|&i| eig.eigenvalues[i]));
    let vectors = from_dmatrix(&eig.eigenvectors).select(Axis(1), &order);
    Ok((values, vectors))
}

/// Discriminant-subspace strategy.
#[derive(Clone, Debug, Default)]
pub struct DiscriminantAxis {
    axis: AxisConfig,
    config: DiscriminantConfig,
}

impl DiscriminantAxis {
    pub fn new(axis: AxisConfig, config: DiscriminantConfig) -> Self {
        Self { axis, config }
    }

    pub fn config(&self) -> &DiscriminantConfig {
        &self.config
    }
}

impl AxisStrategy for DiscriminantAxis {
    fn name(&self) -> &'static str {
        "discriminant"
    }

    fn axis_config(&self) -> &AxisConfig {
        &self.axis
    }

    fn project(
        &self,
        reference: &ReferenceState,
        targets: ArrayView2<'_, f64>,
    ) -> Result<AxisProjection, AxisError> {
        let emb = reference.embeddings.view();
        let lda = LinearDiscriminant::fit(emb, &reference.groups.ids, &self.config)?;

        // Distance between the projected class means along the first component.
        let diff = &lda.means.row(1) - &lda.means.row(0);
        let separation = diff.dot(&lda.scalings.column(0)).abs();
        check_degenerate(separation, &self.axis, self.name())?;

        let projected_targets = lda.transform(targets)?;
        let projected_reference = lda.transform(emb)?;
        let axis = lda.scalings.column(0).to_owned();

        Ok(AxisProjection {
            targets: projected_targets,
            reference: projected_reference,
            axis,
            discriminant: Some(lda),
        })
    }
}
