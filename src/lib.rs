//! Umbrella crate for SemAxis.
//!
//! Re-exports the axis core and adds the pieces an application needs around
//! it: a YAML [`config`] file that picks the strategy, numerics and bundle
//! location, and (behind the default `logging` feature) a one-call tracing
//! subscriber.
//!
//! ```
//! use semaxis::{AxisModel, SemaxisConfig};
//! use ndarray::array;
//!
//! let cfg = SemaxisConfig::from_yaml("version: \"1.0\"\nstrategy:\n  kind: centroid\n").unwrap();
//! let mut model: AxisModel = cfg.build_model().unwrap();
//! model
//!     .fit(array![[0.0, 1.0], [1.0, 0.0]], &["cold", "hot"], None)
//!     .unwrap();
//! let scores = model.transform(&array![[1.0, 0.0], [0.0, 1.0]]).unwrap();
//! assert!(scores[[0, 0]] > scores[[1, 0]]);
//! ```

use std::time::Instant;

use tracing::{info, warn, Level};

pub mod config;
#[cfg(feature = "logging")]
pub mod logging;

pub use axis::{
    bundle, centroid_axis, load_bundle, save_bundle, AxisConfig, AxisError, AxisModel,
    AxisProjection, AxisStrategy, Bundle, BundleConfig, BundleParams, CentroidAxis,
    CompressionCodec, DegeneratePolicy, DiscriminantAxis, DiscriminantConfig, GroupEncoding,
    GroupLabel, LinearDiscriminant, ReferenceState, Shrinkage, StrategyConfig,
    BUNDLE_FORMAT_VERSION, N_GROUPS,
};

pub use crate::config::{BundleYamlConfig, ConfigLoadError, SemaxisConfig};
#[cfg(feature = "logging")]
pub use crate::logging::{init_tracing, LogFormat};

/// Fit a model described by `cfg` and save it under `cfg.bundle.root/name`.
///
/// The axis is computed once against the reference rows themselves so the
/// saved bundle carries it.
pub fn fit_and_save<L>(
    cfg: &SemaxisConfig,
    name: &str,
    embeddings: ndarray::Array2<f64>,
    labels: &[L],
    group_order: Option<&[L]>,
) -> Result<AxisModel, SemaxisError>
where
    L: Clone + Into<GroupLabel>,
{
    let start = Instant::now();
    let span = tracing::span!(Level::INFO, "semaxis.fit_and_save", bundle = name);
    let _guard = span.enter();

    let result = fit_and_save_inner(cfg, name, embeddings, labels, group_order);

    let elapsed_micros = start.elapsed().as_micros();
    match &result {
        Ok(model) => info!(
            strategy = model.strategy().name(),
            elapsed_micros, "fit_and_save_success"
        ),
        Err(err) => warn!(error = %err, elapsed_micros, "fit_and_save_failure"),
    }
    result
}

fn fit_and_save_inner<L>(
    cfg: &SemaxisConfig,
    name: &str,
    embeddings: ndarray::Array2<f64>,
    labels: &[L],
    group_order: Option<&[L]>,
) -> Result<AxisModel, SemaxisError>
where
    L: Clone + Into<GroupLabel>,
{
    let mut model = cfg.build_model()?;
    model.fit(embeddings, labels, group_order)?;
    if let Some(reference) = model.embeddings().cloned() {
        model.transform(&reference)?;
    }
    model.save(cfg.bundle_path(name))?;
    Ok(model)
}

/// Load the bundle `name` from `cfg.bundle.root` with the configured strategy.
pub fn load_named(cfg: &SemaxisConfig, name: &str) -> Result<AxisModel, SemaxisError> {
    let start = Instant::now();
    let span = tracing::span!(Level::INFO, "semaxis.load_named", bundle = name);
    let _guard = span.enter();

    let result = cfg
        .strategy
        .build(&cfg.axis)
        .and_then(|strategy| AxisModel::load_with(cfg.bundle_path(name), strategy))
        .map(|model| model.with_bundle_config(cfg.bundle.encoding()))
        .map_err(SemaxisError::from);

    let elapsed_micros = start.elapsed().as_micros();
    match &result {
        Ok(_) => info!(elapsed_micros, "load_named_success"),
        Err(err) => warn!(error = %err, elapsed_micros, "load_named_failure"),
    }
    result
}

/// Errors from the umbrella helpers.
#[derive(Debug, thiserror::Error)]
pub enum SemaxisError {
    #[error(transparent)]
    Config(#[from] ConfigLoadError),
    #[error(transparent)]
    Axis(#[from] AxisError),
}
