use crate::io::etad::{BurstIndex, CorrectionLayer, CorrectionProvider};
use crate::types::{SarError, SarResult};
use ndarray::Array2;
use std::sync::OnceLock;

/// Least-squares slope of `correction` against `height`.
///
/// The fit uses differences between horizontally adjacent cells, which
/// removes any constant offset per row, and solves the 2x2 normal equations
/// for `dt = slope * dh + intercept`. The intercept is discarded.
pub fn estimate_gradient(correction: &Array2<f64>, height: &Array2<f64>) -> SarResult<f64> {
    if correction.dim() != height.dim() {
        return Err(SarError::GridSizeMismatch {
            what: "Correction layer".to_string(),
            expected: height.len(),
            actual: correction.len(),
        });
    }

    let (rows, cols) = correction.dim();
    if rows == 0 || cols < 2 {
        return Err(SarError::SingularRegression(format!(
            "need at least 2 columns of adjacent samples, got {}x{}",
            rows, cols
        )));
    }

    let mut sum_dh = 0.0;
    let mut sum_dh2 = 0.0;
    let mut sum_dt = 0.0;
    let mut sum_dh_dt = 0.0;

    for r in 0..rows {
        for c in 0..cols - 1 {
            let dh = height[[r, c + 1]] - height[[r, c]];
            let dt = correction[[r, c + 1]] - correction[[r, c]];
            sum_dh += dh;
            sum_dh2 += dh * dh;
            sum_dt += dt;
            sum_dh_dt += dh * dt;
        }
    }

    let n = (rows * (cols - 1)) as f64;
    let det = sum_dh2 * n - sum_dh * sum_dh;

    if !det.is_finite() || !sum_dh_dt.is_finite() || !sum_dt.is_finite() {
        return Err(SarError::SingularRegression(
            "non-finite values in correction or height layer".to_string(),
        ));
    }
    if det.abs() <= f64::EPSILON * (sum_dh2 * n).abs() {
        return Err(SarError::SingularRegression(format!(
            "height differences do not vary over {} sample pairs",
            n
        )));
    }

    Ok((sum_dh_dt * n - sum_dh * sum_dt) / det)
}

/// Correction-to-height gradient of one product, computed at most once.
///
/// The first caller runs the regression while concurrent callers block on
/// the latch; the outcome, success or failure, is kept for the lifetime of
/// the estimator.
#[derive(Debug)]
pub struct GradientEstimator {
    layer: CorrectionLayer,
    reference_burst: BurstIndex,
    cached: OnceLock<SarResult<f64>>,
}

impl GradientEstimator {
    pub fn new(layer: CorrectionLayer, reference_burst: BurstIndex) -> Self {
        Self {
            layer,
            reference_burst,
            cached: OnceLock::new(),
        }
    }

    /// Gradient of the configured layer against height (layer units per metre)
    pub fn gradient(&self, provider: &dyn CorrectionProvider) -> SarResult<f64> {
        self.cached
            .get_or_init(|| self.compute(provider))
            .clone()
    }

    pub fn is_computed(&self) -> bool {
        self.cached.get().is_some()
    }

    fn compute(&self, provider: &dyn CorrectionProvider) -> SarResult<f64> {
        log::info!(
            "Estimating {} to height gradient from burst {}",
            self.layer,
            self.reference_burst
        );

        let burst = provider.burst(self.reference_burst)?;
        let correction = provider.burst_layer(self.layer, &burst)?;
        let height = provider.burst_layer(CorrectionLayer::Height, &burst)?;

        let result = estimate_gradient(&correction, &height);
        match &result {
            Ok(gradient) => log::info!("{} to height gradient: {:.6e} per m", self.layer, gradient),
            Err(e) => log::warn!("Gradient estimation failed: {}", e),
        }
        result
    }
}
