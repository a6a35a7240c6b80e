//! Model spectrum reconstruction from posterior means.
//!
//! The reconstruction is a pure function of the selected solution's summary:
//! - baseline: polynomial in normalized channel units, mapped back to physical
//!   units with the spectrum's noise scale and offset
//! - per component: baseline plus one Gaussian per tracked species
//! - total: baseline plus every component's line profiles

use crate::domain::{FitProtocol, LineQuantity, ParamSummary};
use crate::math::{baseline_norm, gaussian, normalize_channels};

/// Reconstructed model curves on the channel grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconstruction {
    pub baseline: Vec<f64>,
    /// One curve per component (baseline included).
    pub components: Vec<Vec<f64>>,
    pub total: Vec<f64>,
}

/// A line profile's parameters pulled out of a summary.
#[derive(Debug, Clone, Copy, PartialEq)]
struct LineParams {
    amplitude: f64,
    center: f64,
    fwhm: f64,
}

/// Posterior mean of `name`, or an error naming the missing parameter.
fn mean_of(summary: &ParamSummary, name: &str) -> Result<f64, String> {
    summary
        .get(name)
        .map(|s| s.mean)
        .ok_or_else(|| format!("missing parameter '{name}'"))
}

fn line_params(summary: &ParamSummary, species: &str, c: usize) -> Result<LineParams, String> {
    let get = |q| mean_of(summary, &FitProtocol::line_name(species, q, c));
    Ok(LineParams {
        amplitude: get(LineQuantity::Amplitude)?,
        center: get(LineQuantity::Center)?,
        fwhm: get(LineQuantity::Fwhm)?,
    })
}

/// Evaluate the baseline in physical units.
pub fn baseline_curve(
    summary: &ParamSummary,
    channels: &[f64],
    protocol: &FitProtocol,
    noise_scale: f64,
    noise_offset: f64,
) -> Result<Vec<f64>, String> {
    let coeffs = (0..=protocol.baseline_degree)
        .map(|i| mean_of(summary, &protocol.baseline_name(i)))
        .collect::<Result<Vec<_>, _>>()?;
    let x_norm = normalize_channels(channels);
    Ok(baseline_norm(&x_norm, &coeffs)
        .into_iter()
        .map(|b| b * noise_scale + noise_offset)
        .collect())
}

/// Reconstruct baseline, per-component and total curves for `complexity` components.
///
/// Callers must only pass converged solutions.
pub fn reconstruct(
    summary: &ParamSummary,
    complexity: usize,
    channels: &[f64],
    protocol: &FitProtocol,
    noise_scale: f64,
    noise_offset: f64,
) -> Result<Reconstruction, String> {
    let baseline = baseline_curve(summary, channels, protocol, noise_scale, noise_offset)?;

    let mut total = baseline.clone();
    let mut components = Vec::with_capacity(complexity);
    for c in 0..complexity {
        let lines = protocol
            .species
            .iter()
            .map(|s| line_params(summary, s, c))
            .collect::<Result<Vec<_>, _>>()?;

        let mut curve = baseline.clone();
        for (j, &x) in channels.iter().enumerate() {
            let lines_sum: f64 = lines
                .iter()
                .map(|l| gaussian(x, l.amplitude, l.center, l.fwhm))
                .sum();
            curve[j] += lines_sum;
            total[j] += lines_sum;
        }
        components.push(curve);
    }

    Ok(Reconstruction {
        baseline,
        components,
        total,
    })
}
