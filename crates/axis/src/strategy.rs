use std::fmt;

use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::centroid::CentroidAxis;
use crate::config::{AxisConfig, DiscriminantConfig};
use crate::discriminant::{DiscriminantAxis, LinearDiscriminant};
use crate::error::AxisError;
use crate::model::ReferenceState;

/// Output of one strategy run.
#[derive(Clone, Debug)]
pub struct AxisProjection {
    /// Projected targets, `M x k`.
    pub targets: Array2<f64>,
    /// Projected reference rows, `N x k`.
    pub reference: Array2<f64>,
    /// Leading axis direction, length `D`.
    pub axis: Array1<f64>,
    /// The fitted estimator, for discriminant strategies.
    pub discriminant: Option<LinearDiscriminant>,
}

/// Turns a fitted reference state into an axis and projects onto it.
///
/// Implementations must be pure functions of `(reference, targets)` so that
/// repeated transforms agree.
pub trait AxisStrategy: fmt::Debug + Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Projection numerics this strategy runs with.
    fn axis_config(&self) -> &AxisConfig;

    /// Derive the axis from `reference` and project both `targets` and the
    /// reference rows onto it. `targets` has already been checked to share
    /// the reference width.
    fn project(
        &self,
        reference: &ReferenceState,
        targets: ArrayView2<'_, f64>,
    ) -> Result<AxisProjection, AxisError>;
}

/// Selects an axis strategy.
///
/// # Example
/// ```
/// use axis::{AxisConfig, DiscriminantConfig, StrategyConfig};
///
/// let centroid = StrategyConfig::centroid().build(&AxisConfig::default()).unwrap();
/// assert_eq!(centroid.name(), "centroid");
///
/// let lda = StrategyConfig::discriminant(DiscriminantConfig::new().with_components(2));
/// assert_eq!(lda.build(&AxisConfig::default()).unwrap().name(), "discriminant");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    /// Difference of the two group centroids.
    #[default]
    Centroid,
    /// Linear discriminant subspace.
    Discriminant(DiscriminantConfig),
}

impl StrategyConfig {
    pub fn centroid() -> Self {
        StrategyConfig::Centroid
    }

    pub fn discriminant(cfg: DiscriminantConfig) -> Self {
        StrategyConfig::Discriminant(cfg)
    }

    /// Validate and instantiate the strategy.
    pub fn build(&self, axis: &AxisConfig) -> Result<Box<dyn AxisStrategy>, AxisError> {
        axis.validate()?;
        match self {
            StrategyConfig::Centroid => Ok(Box::new(CentroidAxis::new(axis.clone()))),
            StrategyConfig::Discriminant(cfg) => {
                cfg.validate()?;
                Ok(Box::new(DiscriminantAxis::new(axis.clone(), cfg.clone())))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Shrinkage;

    #[test]
    fn default_is_centroid() {
        assert_eq!(StrategyConfig::default(), StrategyConfig::Centroid);
    }

    #[test]
    fn build_rejects_invalid_discriminant() {
        let cfg = StrategyConfig::discriminant(DiscriminantConfig::new().with_components(0));
        assert!(matches!(
            cfg.build(&AxisConfig::default()),
            Err(AxisError::InvalidConfig(_))
        ));
    }

    #[test]
    fn build_rejects_invalid_axis_config() {
        let axis = AxisConfig::new().with_epsilon(-1.0);
        assert!(StrategyConfig::centroid().build(&axis).is_err());
    }

    #[test]
    fn tagged_json_form() {
        let cfg = StrategyConfig::discriminant(
            DiscriminantConfig::new()
                .with_components(2)
                .with_shrinkage(Shrinkage::Auto),
        );
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["kind"], "discriminant");
        assert_eq!(json["n_components"], 2);
        assert_eq!(json["shrinkage"], "auto");
        let back: StrategyConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, cfg);

        let centroid: StrategyConfig = serde_json::from_str(r#"{"kind":"centroid"}"#).unwrap();
        assert_eq!(centroid, StrategyConfig::Centroid);
    }
}
