//! # SemAxis core
//!
//! Finds an interpretable direction in an embedding space from two labelled
//! reference groups and scores arbitrary vectors along it.
//!
//! ## How it works
//!
//! - **Fit** - [`AxisModel::fit`] records the reference embeddings and maps the
//!   two group labels onto ids 0 and 1 (ascending, or in an explicit order).
//!   Nothing else is computed yet.
//! - **Transform** - [`AxisModel::transform`] rebuilds the axis from the stored
//!   reference state and projects the targets onto it. Two strategies ship
//!   out of the box:
//!   - [`CentroidAxis`]: `axis = mean(group 1) - mean(group 0)`, and every row
//!     is scored by its cosine with the axis (denominator floored at `1e-20`).
//!   - [`DiscriminantAxis`]: a two-class [`LinearDiscriminant`] whose leading
//!     components span the projection subspace.
//! - **Persist** - [`AxisModel::save`] / [`AxisModel::load`] move the reference
//!   state and last axis through an on-disk [`bundle`].
//!
//! ## Example
//!
//! ```
//! use axis::{AxisModel, DiscriminantConfig};
//! use ndarray::array;
//!
//! let emb = array![[0.0, 0.0], [0.0, 1.0], [5.0, 5.0], [5.0, 6.0]];
//! let targets = array![[2.5, 2.5], [0.0, 0.5]];
//!
//! let mut model = AxisModel::centroid();
//! model.fit(emb.clone(), &["neg", "neg", "pos", "pos"], None).unwrap();
//! let scores = model.transform(&targets).unwrap();
//! assert!(scores[[0, 0]] > 0.0);
//!
//! let mut lda = AxisModel::discriminant(DiscriminantConfig::default());
//! lda.fit(emb, &["neg", "neg", "pos", "pos"], None).unwrap();
//! let z = lda.transform(&targets).unwrap();
//! assert!(z[[0, 0]] > z[[1, 0]]);
//! ```

pub mod bundle;
pub mod centroid;
pub mod config;
pub mod discriminant;
pub mod error;
pub mod groups;
pub mod model;
pub mod strategy;

mod linalg;

pub use crate::bundle::{load_bundle, save_bundle, Bundle, BundleParams, BUNDLE_FORMAT_VERSION};
pub use crate::centroid::{centroid_axis, CentroidAxis};
pub use crate::config::{
    AxisConfig, BundleConfig, CompressionCodec, DegeneratePolicy, DiscriminantConfig, Shrinkage,
};
pub use crate::discriminant::{DiscriminantAxis, LinearDiscriminant};
pub use crate::error::AxisError;
pub use crate::groups::{GroupEncoding, GroupLabel, N_GROUPS};
pub use crate::model::{AxisModel, ReferenceState};
pub use crate::strategy::{AxisProjection, AxisStrategy, StrategyConfig};
