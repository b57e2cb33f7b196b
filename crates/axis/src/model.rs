use std::path::Path;
use std::time::Instant;

use ndarray::{Array1, Array2, ArrayBase, ArrayView2, Data, Ix2};
use tracing::{info, warn, Level};

use crate::bundle::{load_bundle, save_bundle};
use crate::centroid::CentroidAxis;
use crate::config::{AxisConfig, BundleConfig, DiscriminantConfig};
use crate::discriminant::{DiscriminantAxis, LinearDiscriminant};
use crate::error::AxisError;
use crate::groups::{GroupEncoding, GroupLabel, N_GROUPS};
use crate::strategy::{AxisProjection, AxisStrategy, StrategyConfig};

/// The fitted inputs every strategy reads from.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceState {
    /// Reference embeddings, `N x D`.
    pub embeddings: Array2<f64>,
    /// Group encoding of the reference rows.
    pub groups: GroupEncoding,
}

impl ReferenceState {
    pub fn dim(&self) -> usize {
        self.embeddings.ncols()
    }
}

/// Reference state plus a pluggable axis strategy.
///
/// ```
/// use axis::AxisModel;
/// use ndarray::array;
///
/// let emb = array![[0.0, 0.0], [0.0, 1.0], [5.0, 5.0], [5.0, 6.0]];
/// let mut model = AxisModel::centroid();
/// let scores = model
///     .fit(emb, &["A", "A", "B", "B"], None)
///     .unwrap()
///     .transform(&array![[2.5, 2.5]])
///     .unwrap();
/// assert_eq!(scores.dim(), (1, 1));
/// ```
#[derive(Debug)]
pub struct AxisModel {
    strategy: Box<dyn AxisStrategy>,
    bundle: BundleConfig,
    reference: Option<ReferenceState>,
    axis: Option<Array1<f64>>,
    projected_reference: Option<Array2<f64>>,
    discriminant: Option<LinearDiscriminant>,
}

impl Default for AxisModel {
    fn default() -> Self {
        Self::centroid()
    }
}

impl AxisModel {
    pub fn new(strategy: Box<dyn AxisStrategy>) -> Self {
        Self {
            strategy,
            bundle: BundleConfig::default(),
            reference: None,
            axis: None,
            projected_reference: None,
            discriminant: None,
        }
    }

    /// Difference-of-centroids axis with default numerics.
    pub fn centroid() -> Self {
        Self::new(Box::new(CentroidAxis::default()))
    }

    /// Discriminant subspace with the given estimator settings.
    pub fn discriminant(cfg: DiscriminantConfig) -> Self {
        Self::new(Box::new(DiscriminantAxis::new(AxisConfig::default(), cfg)))
    }

    /// Build from serialized strategy and axis settings.
    pub fn from_config(strategy: &StrategyConfig, axis: &AxisConfig) -> Result<Self, AxisError> {
        Ok(Self::new(strategy.build(axis)?))
    }

    pub fn with_strategy(mut self, strategy: Box<dyn AxisStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_bundle_config(mut self, bundle: BundleConfig) -> Self {
        self.bundle = bundle;
        self
    }

    /// Record the reference embeddings and their two-group labels.
    ///
    /// No axis is computed here. `group_order`, when given, decides which label
    /// becomes group 0 and which becomes group 1; otherwise labels are taken in
    /// ascending order.
    pub fn fit<L>(
        &mut self,
        embeddings: Array2<f64>,
        labels: &[L],
        group_order: Option<&[L]>,
    ) -> Result<&mut Self, AxisError>
    where
        L: Clone + Into<GroupLabel>,
    {
        let start = Instant::now();
        let span = tracing::span!(
            Level::INFO,
            "axis.fit",
            strategy = self.strategy.name(),
            rows = embeddings.nrows(),
            dim = embeddings.ncols()
        );
        let _guard = span.enter();

        match fit_reference(embeddings, labels, group_order) {
            Ok(reference) => {
                let counts = reference.groups.counts();
                info!(
                    group0 = %reference.groups.order[0],
                    group1 = %reference.groups.order[1],
                    group0_rows = counts[0],
                    group1_rows = counts[1],
                    elapsed_micros = start.elapsed().as_micros(),
                    "axis_fit"
                );
                self.reference = Some(reference);
                self.axis = None;
                self.projected_reference = None;
                self.discriminant = None;
                Ok(self)
            }
            Err(err) => {
                warn!(error = %err, elapsed_micros = start.elapsed().as_micros(), "axis_fit_failure");
                Err(err)
            }
        }
    }

    /// Project `targets` with the model's strategy.
    ///
    /// The axis is rebuilt from the reference state on every call; the axis,
    /// the projected reference rows and (for discriminant strategies) the
    /// fitted estimator are kept for inspection.
    pub fn transform<S>(&mut self, targets: &ArrayBase<S, Ix2>) -> Result<Array2<f64>, AxisError>
    where
        S: Data<Elem = f64>,
    {
        let projection = run_strategy(
            self.strategy.as_ref(),
            self.reference.as_ref(),
            targets.view(),
        )?;
        Ok(self.apply(projection))
    }

    /// Project `targets` with a one-off strategy, e.g. a discriminant with a
    /// different number of components. The stored state is updated exactly as
    /// in [`transform`](Self::transform).
    pub fn transform_with<S>(
        &mut self,
        strategy: &dyn AxisStrategy,
        targets: &ArrayBase<S, Ix2>,
    ) -> Result<Array2<f64>, AxisError>
    where
        S: Data<Elem = f64>,
    {
        let projection = run_strategy(strategy, self.reference.as_ref(), targets.view())?;
        Ok(self.apply(projection))
    }

    /// Discriminant projection onto `dim` components, whatever the model's
    /// strategy. The model strategy's [`AxisConfig`] carries over.
    pub fn transform_discriminant<S>(
        &mut self,
        targets: &ArrayBase<S, Ix2>,
        dim: usize,
        options: DiscriminantConfig,
    ) -> Result<Array2<f64>, AxisError>
    where
        S: Data<Elem = f64>,
    {
        let strategy = DiscriminantAxis::new(
            self.strategy.axis_config().clone(),
            options.with_components(dim),
        );
        self.transform_with(&strategy, targets)
    }

    fn apply(&mut self, projection: AxisProjection) -> Array2<f64> {
        let AxisProjection {
            targets,
            reference,
            axis,
            discriminant,
        } = projection;
        self.axis = Some(axis);
        self.projected_reference = Some(reference);
        self.discriminant = discriminant;
        targets
    }

    /// Persist the reference state and last axis as a bundle at `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), AxisError> {
        let reference = self.reference.as_ref().ok_or(AxisError::NotFitted)?;
        save_bundle(
            path.as_ref(),
            &reference.embeddings,
            &reference.groups,
            self.axis.as_ref(),
            &self.bundle,
        )
    }

    /// Restore a model from the bundle at `path`, using the centroid strategy.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AxisError> {
        Self::load_with(path, Box::new(CentroidAxis::default()))
    }

    /// Restore a model from the bundle at `path` with the given strategy.
    pub fn load_with(
        path: impl AsRef<Path>,
        strategy: Box<dyn AxisStrategy>,
    ) -> Result<Self, AxisError> {
        let bundle = load_bundle(path.as_ref())?;
        let mut model = Self::new(strategy);
        model.reference = Some(ReferenceState {
            embeddings: bundle.embeddings,
            groups: bundle.groups,
        });
        model.axis = bundle.axis;
        Ok(model)
    }

    pub fn strategy(&self) -> &dyn AxisStrategy {
        self.strategy.as_ref()
    }

    pub fn is_fitted(&self) -> bool {
        self.reference.is_some()
    }

    pub fn reference(&self) -> Option<&ReferenceState> {
        self.reference.as_ref()
    }

    pub fn embeddings(&self) -> Option<&Array2<f64>> {
        self.reference.as_ref().map(|r| &r.embeddings)
    }

    /// Canonical ids (0 or 1) of the reference rows.
    pub fn group_ids(&self) -> Option<&[u8]> {
        self.reference.as_ref().map(|r| r.groups.ids.as_slice())
    }

    pub fn group_order(&self) -> Option<&[GroupLabel; 2]> {
        self.reference.as_ref().map(|r| &r.groups.order)
    }

    pub fn n_group(&self) -> Option<usize> {
        self.reference.as_ref().map(|_| N_GROUPS)
    }

    /// Axis from the last transform (or from the loaded bundle).
    pub fn axis(&self) -> Option<&Array1<f64>> {
        self.axis.as_ref()
    }

    /// Reference rows in axis coordinates from the last transform.
    pub fn projected_reference(&self) -> Option<&Array2<f64>> {
        self.projected_reference.as_ref()
    }

    /// Estimator fitted by the last discriminant transform.
    pub fn discriminant_model(&self) -> Option<&LinearDiscriminant> {
        self.discriminant.as_ref()
    }
}

fn fit_reference<L>(
    embeddings: Array2<f64>,
    labels: &[L],
    group_order: Option<&[L]>,
) -> Result<ReferenceState, AxisError>
where
    L: Clone + Into<GroupLabel>,
{
    let (n, d) = embeddings.dim();
    if labels.len() != n {
        return Err(AxisError::DimensionMismatch(format!(
            "{} labels for {n} embedding rows",
            labels.len()
        )));
    }
    if d == 0 {
        return Err(AxisError::DimensionMismatch(
            "embeddings have zero columns".to_string(),
        ));
    }
    let groups = GroupEncoding::encode(labels, group_order)?;
    Ok(ReferenceState { embeddings, groups })
}

fn run_strategy(
    strategy: &dyn AxisStrategy,
    reference: Option<&ReferenceState>,
    targets: ArrayView2<'_, f64>,
) -> Result<AxisProjection, AxisError> {
    let start = Instant::now();
    let span = tracing::span!(
        Level::INFO,
        "axis.transform",
        strategy = strategy.name(),
        targets = targets.nrows()
    );
    let _guard = span.enter();

    let result = reference.ok_or(AxisError::NotFitted).and_then(|reference| {
        if targets.ncols() != reference.dim() {
            return Err(AxisError::DimensionMismatch(format!(
                "targets have {} columns, fitted embeddings have {}",
                targets.ncols(),
                reference.dim()
            )));
        }
        reference.groups.require_both_groups()?;
        strategy.project(reference, targets)
    });

    match result {
        Ok(projection) => {
            info!(
                components = projection.targets.ncols(),
                reference_rows = projection.reference.nrows(),
                elapsed_micros = start.elapsed().as_micros(),
                "axis_transform"
            );
            Ok(projection)
        }
        Err(err) => {
            warn!(error = %err, elapsed_micros = start.elapsed().as_micros(), "axis_transform_failure");
            Err(err)
        }
    }
}
