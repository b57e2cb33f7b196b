//! Configuration surface for axis fitting, discriminant estimation and bundle
//! encoding.
//!
//! Everything here is plain data. The structs deserialize from the `axis`,
//! `strategy` and `bundle` sections of the umbrella YAML file and can also be
//! assembled in code with the `with_*` setters.

use serde::{Deserialize, Serialize};

use crate::error::AxisError;

/// Floor applied to the projection denominator `‖row‖·‖axis‖`.
pub const DEFAULT_EPSILON: f64 = 1e-20;

/// Axis norms at or below this value are treated as degenerate.
pub const DEFAULT_DEGENERATE_TOLERANCE: f64 = 1e-12;

/// What to do when both centroids coincide and the axis norm is numerically zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegeneratePolicy {
    /// Keep going with the epsilon-floored denominator; projections collapse to zero.
    #[default]
    EpsilonFloor,
    /// Fail with [`AxisError::DegenerateAxis`].
    Reject,
}

/// Numeric behaviour of the projection step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxisConfig {
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    #[serde(default = "default_degenerate_tolerance")]
    pub degenerate_tolerance: f64,
    #[serde(default)]
    pub degenerate_policy: DegeneratePolicy,
    /// Project rows on the rayon pool instead of the calling thread. Defaults
    /// to on when the crate is built with the `parallel` feature.
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

fn default_epsilon() -> f64 {
    DEFAULT_EPSILON
}

fn default_degenerate_tolerance() -> f64 {
    DEFAULT_DEGENERATE_TOLERANCE
}

fn default_parallel() -> bool {
    cfg!(feature = "parallel")
}

impl Default for AxisConfig {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
            degenerate_tolerance: DEFAULT_DEGENERATE_TOLERANCE,
            degenerate_policy: DegeneratePolicy::default(),
            parallel: default_parallel(),
        }
    }
}

impl AxisConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_degenerate_policy(mut self, policy: DegeneratePolicy) -> Self {
        self.degenerate_policy = policy;
        self
    }

    pub fn with_degenerate_tolerance(mut self, tolerance: f64) -> Self {
        self.degenerate_tolerance = tolerance;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn validate(&self) -> Result<(), AxisError> {
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(AxisError::InvalidConfig(format!(
                "epsilon must be a positive finite number, got {}",
                self.epsilon
            )));
        }
        if !(self.degenerate_tolerance.is_finite() && self.degenerate_tolerance >= 0.0) {
            return Err(AxisError::InvalidConfig(format!(
                "degenerate_tolerance must be >= 0, got {}",
                self.degenerate_tolerance
            )));
        }
        Ok(())
    }
}

/// Covariance shrinkage applied to the within-class scatter.
///
/// Serialized as the string `"auto"` or a bare number in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ShrinkageRepr", into = "ShrinkageRepr")]
pub enum Shrinkage {
    /// Ledoit-Wolf estimate of the shrinkage intensity.
    Auto,
    /// Fixed intensity: `(1 - α)·Σ + α·(tr Σ / d)·I`.
    Fixed(f64),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum ShrinkageRepr {
    Fixed(f64),
    Keyword(String),
}

impl TryFrom<ShrinkageRepr> for Shrinkage {
    type Error = String;

    fn try_from(repr: ShrinkageRepr) -> Result<Self, Self::Error> {
        match repr {
            ShrinkageRepr::Fixed(alpha) => Ok(Shrinkage::Fixed(alpha)),
            ShrinkageRepr::Keyword(word) if word.eq_ignore_ascii_case("auto") => {
                Ok(Shrinkage::Auto)
            }
            ShrinkageRepr::Keyword(word) => Err(format!(
                "unknown shrinkage '{word}', expected \"auto\" or a number"
            )),
        }
    }
}

impl From<Shrinkage> for ShrinkageRepr {
    fn from(value: Shrinkage) -> Self {
        match value {
            Shrinkage::Auto => ShrinkageRepr::Keyword("auto".into()),
            Shrinkage::Fixed(alpha) => ShrinkageRepr::Fixed(alpha),
        }
    }
}

/// Knobs forwarded to [`LinearDiscriminant`](crate::LinearDiscriminant).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiscriminantConfig {
    /// Number of discriminant components to keep.
    ///
    /// Two classes yield a single informative direction. Further components
    /// come from the null space of the between-class scatter and carry no
    /// separating information; they are returned rather than rejected.
    #[serde(default = "default_components")]
    pub n_components: usize,
    #[serde(default)]
    pub shrinkage: Option<Shrinkage>,
    /// Class priors for groups 0 and 1. Empirical frequencies when absent.
    #[serde(default)]
    pub priors: Option<Vec<f64>>,
    /// Relative eigenvalue threshold below which within-class directions are dropped.
    #[serde(default = "default_tol")]
    pub tol: f64,
}

fn default_components() -> usize {
    1
}

fn default_tol() -> f64 {
    1e-4
}

impl Default for DiscriminantConfig {
    fn default() -> Self {
        Self {
            n_components: default_components(),
            shrinkage: None,
            priors: None,
            tol: default_tol(),
        }
    }
}

impl DiscriminantConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_components(mut self, n_components: usize) -> Self {
        self.n_components = n_components;
        self
    }

    pub fn with_shrinkage(mut self, shrinkage: Shrinkage) -> Self {
        self.shrinkage = Some(shrinkage);
        self
    }

    pub fn with_priors(mut self, group0: f64, group1: f64) -> Self {
        self.priors = Some(vec![group0, group1]);
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn validate(&self) -> Result<(), AxisError> {
        if self.n_components == 0 {
            return Err(AxisError::InvalidConfig(
                "n_components must be >= 1".to_string(),
            ));
        }
        if let Some(Shrinkage::Fixed(alpha)) = self.shrinkage {
            if !(0.0..=1.0).contains(&alpha) {
                return Err(AxisError::InvalidConfig(format!(
                    "shrinkage must lie in [0, 1], got {alpha}"
                )));
            }
        }
        if let Some(priors) = &self.priors {
            if priors.len() != 2 {
                return Err(AxisError::InvalidConfig(format!(
                    "priors must have exactly 2 entries, got {}",
                    priors.len()
                )));
            }
            if priors.iter().any(|p| !p.is_finite() || *p < 0.0) || priors.iter().sum::<f64>() <= 0.0
            {
                return Err(AxisError::InvalidConfig(
                    "priors must be non-negative with a positive sum".to_string(),
                ));
            }
        }
        if !(self.tol.is_finite() && self.tol >= 0.0) {
            return Err(AxisError::InvalidConfig(format!(
                "tol must be >= 0, got {}",
                self.tol
            )));
        }
        Ok(())
    }
}

/// Compression codec for the bundle archive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionCodec {
    /// Plain bincode; the archive is written as `emb.bin`.
    #[default]
    None,
    /// Zstd-compressed bincode; the archive is written as `emb.bin.zst`.
    Zstd,
}

/// How bundles are encoded on disk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BundleConfig {
    #[serde(default)]
    pub compression: CompressionCodec,
    /// Zstd level (1-22). Ignored for [`CompressionCodec::None`].
    #[serde(default = "default_level")]
    pub level: i32,
}

fn default_level() -> i32 {
    3
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            compression: CompressionCodec::default(),
            level: default_level(),
        }
    }
}

impl BundleConfig {
    pub fn new(compression: CompressionCodec, level: i32) -> Self {
        Self { compression, level }
    }

    pub fn with_compression(mut self, compression: CompressionCodec) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_config_defaults() {
        let cfg = AxisConfig::default();
        assert_eq!(cfg.epsilon, 1e-20);
        assert_eq!(cfg.degenerate_tolerance, 1e-12);
        assert_eq!(cfg.degenerate_policy, DegeneratePolicy::EpsilonFloor);
        assert_eq!(cfg.parallel, cfg!(feature = "parallel"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn omitted_parallel_follows_feature_default() {
        let cfg: AxisConfig =
            serde_json::from_str(r#"{"degenerate_policy":"reject"}"#).unwrap();
        assert_eq!(cfg.degenerate_policy, DegeneratePolicy::Reject);
        assert_eq!(cfg.parallel, cfg!(feature = "parallel"));

        let cfg: AxisConfig = serde_json::from_str(r#"{"parallel":true}"#).unwrap();
        assert!(cfg.parallel);
    }

    #[test]
    fn axis_config_rejects_non_positive_epsilon() {
        let cfg = AxisConfig::new().with_epsilon(0.0);
        assert!(matches!(cfg.validate(), Err(AxisError::InvalidConfig(_))));
    }

    #[test]
    fn discriminant_defaults_validate() {
        let cfg = DiscriminantConfig::default();
        assert_eq!(cfg.n_components, 1);
        assert!(cfg.shrinkage.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn discriminant_rejects_bad_values() {
        assert!(DiscriminantConfig::new().with_components(0).validate().is_err());
        assert!(DiscriminantConfig::new()
            .with_shrinkage(Shrinkage::Fixed(1.5))
            .validate()
            .is_err());
        assert!(DiscriminantConfig::new()
            .with_priors(-1.0, 2.0)
            .validate()
            .is_err());
        let three_priors = DiscriminantConfig {
            priors: Some(vec![0.2, 0.3, 0.5]),
            ..Default::default()
        };
        assert!(three_priors.validate().is_err());
    }

    #[test]
    fn shrinkage_serde_forms() {
        let auto: Shrinkage = serde_json::from_str("\"auto\"").unwrap();
        assert_eq!(auto, Shrinkage::Auto);
        let fixed: Shrinkage = serde_json::from_str("0.25").unwrap();
        assert_eq!(fixed, Shrinkage::Fixed(0.25));
        assert!(serde_json::from_str::<Shrinkage>("\"lots\"").is_err());
        assert_eq!(serde_json::to_string(&Shrinkage::Auto).unwrap(), "\"auto\"");
    }

    #[test]
    fn bundle_config_builders() {
        let cfg = BundleConfig::default()
            .with_compression(CompressionCodec::Zstd)
            .with_level(9);
        assert_eq!(cfg.compression, CompressionCodec::Zstd);
        assert_eq!(cfg.level, 9);
    }
}
