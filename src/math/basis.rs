//! Basis functions for spectral reconstruction.
//!
//! - a normalized channel coordinate spanning `[-1, 1]`
//! - a polynomial baseline evaluated through a Vandermonde design matrix
//! - a Gaussian line profile parameterized by FWHM
//!
//! Baseline coefficients are sampled in a scaled parameterization: coefficient
//! `i` is divided by `(i+1)^i` before use. This must match the fitting
//! convention exactly or the baseline comes back wrong.

use nalgebra::{DMatrix, DVector};

/// `4 ln 2`, relating a Gaussian's FWHM to its variance.
const FOUR_LN_2: f64 = 4.0 * std::f64::consts::LN_2;

/// Map `x` linearly onto `[-1, 1]` over its own extent.
///
/// A degenerate (single-valued) axis maps to all zeros.
pub fn normalize_channels(x: &[f64]) -> Vec<f64> {
    let (lo, hi) = x
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let half_span = (hi - lo) / 2.0;
    if !(half_span.is_finite() && half_span > 0.0) {
        return vec![0.0; x.len()];
    }
    let center = (hi + lo) / 2.0;
    x.iter().map(|&v| (v - center) / half_span).collect()
}

/// Denormalization factor for baseline coefficient `i`: `(i+1)^i`.
///
/// This is the upstream fit job's prior scaling. Reconstruction silently
/// drifts if that convention changes.
pub fn baseline_scale(i: usize) -> f64 {
    ((i + 1) as f64).powi(i as i32)
}

/// Vandermonde design matrix `V[j, i] = x_j^i` for `i` in `0..=degree`.
pub fn design_matrix(x_norm: &[f64], degree: usize) -> DMatrix<f64> {
    DMatrix::from_fn(x_norm.len(), degree + 1, |j, i| x_norm[j].powi(i as i32))
}

/// Evaluate the baseline polynomial in normalized units.
///
/// `coeffs` are the raw sampled coefficients; the `(i+1)^i` factor is applied here.
pub fn baseline_norm(x_norm: &[f64], coeffs: &[f64]) -> Vec<f64> {
    if coeffs.is_empty() {
        return vec![0.0; x_norm.len()];
    }
    let v = design_matrix(x_norm, coeffs.len() - 1);
    let c = DVector::from_iterator(
        coeffs.len(),
        coeffs.iter().enumerate().map(|(i, &c)| c / baseline_scale(i)),
    );
    (v * c).iter().copied().collect()
}

/// Gaussian line profile: `amplitude * exp(-4 ln2 (x - center)^2 / fwhm^2)`.
///
/// `fwhm <= 0` is not guarded; converged fits never produce it.
pub fn gaussian(x: f64, amplitude: f64, center: f64, fwhm: f64) -> f64 {
    let d = x - center;
    amplitude * (-FOUR_LN_2 * d * d / (fwhm * fwhm)).exp()
}
