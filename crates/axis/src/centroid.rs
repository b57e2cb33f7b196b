//! Difference-of-centroids axis.
//!
//! The axis runs from the mean of group 0 to the mean of group 1, and every
//! row is scored by its cosine with that axis.

use ndarray::{Array1, ArrayView2, Axis};
use tracing::warn;

use crate::config::{AxisConfig, DegeneratePolicy};
use crate::error::AxisError;
use crate::linalg::{cosine_projection, group_mean, l2_norm};
use crate::model::ReferenceState;
use crate::strategy::{AxisProjection, AxisStrategy};

/// `right_center - left_center` over the reference rows.
pub fn centroid_axis(emb: ArrayView2<'_, f64>, ids: &[u8]) -> Result<Array1<f64>, AxisError> {
    let left_center = group_mean(emb, ids, 0)?;
    let right_center = group_mean(emb, ids, 1)?;
    Ok(right_center - left_center)
}

/// Applies the configured policy to a near-zero axis norm.
pub(crate) fn check_degenerate(norm: f64, cfg: &AxisConfig, strategy: &str) -> Result<(), AxisError> {
    if norm > cfg.degenerate_tolerance {
        return Ok(());
    }
    match cfg.degenerate_policy {
        DegeneratePolicy::Reject => Err(AxisError::DegenerateAxis {
            norm,
            tolerance: cfg.degenerate_tolerance,
        }),
        DegeneratePolicy::EpsilonFloor => {
            warn!(
                strategy,
                norm,
                tolerance = cfg.degenerate_tolerance,
                "degenerate_axis"
            );
            Ok(())
        }
    }
}

/// The classic SemAxis strategy.
#[derive(Clone, Debug, Default)]
pub struct CentroidAxis {
    config: AxisConfig,
}

impl CentroidAxis {
    pub fn new(config: AxisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AxisConfig {
        &self.config
    }
}

impl AxisStrategy for CentroidAxis {
    fn name(&self) -> &'static str {
        "centroid"
    }

    fn axis_config(&self) -> &AxisConfig {
        &self.config
    }

    fn project(
        &self,
        reference: &ReferenceState,
        targets: ArrayView2<'_, f64>,
    ) -> Result<AxisProjection, AxisError> {
        let emb = reference.embeddings.view();
        let axis = centroid_axis(emb, &reference.groups.ids)?;
        check_degenerate(l2_norm(axis.view()), &self.config, self.name())?;

        let eps = self.config.epsilon;
        let parallel = self.config.parallel;
        let projected_targets = cosine_projection(targets, axis.view(), eps, parallel);
        let projected_reference = cosine_projection(emb, axis.view(), eps, parallel);

        Ok(AxisProjection {
            targets: projected_targets.insert_axis(Axis(1)),
            reference: projected_reference.insert_axis(Axis(1)),
            axis,
            discriminant: None,
        })
    }
}
