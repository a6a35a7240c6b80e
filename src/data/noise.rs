//! Spectrum preprocessing: data-quality screening and robust noise estimates.
//!
//! The noise estimate mirrors what the fit job used:
//! - scale raw samples into fitted units
//! - per line-free window (both spectrum edges), take the median absolute
//!   deviation scaled by 1.4826 (Gaussian-consistent)
//! - average the per-window values

use crate::domain::{FitProtocol, NoiseEstimate};

/// MAD to standard deviation for Gaussian noise.
const MAD_TO_SIGMA: f64 = 1.4826;

/// `true` if the spectrum carries no usable data at all.
///
/// Either every sample is undefined, or every sample is exactly zero.
pub fn is_excluded(spectrum: &[Option<f64>]) -> bool {
    let all_undefined = spectrum.iter().all(|s| s.is_none_or(f64::is_nan));
    let all_zero = spectrum.iter().all(|s| *s == Some(0.0));
    all_undefined || all_zero
}

/// Median of finite values; NaN when empty.
pub fn median(values: &[f64]) -> f64 {
    let mut v: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
    if v.is_empty() {
        return f64::NAN;
    }
    v.sort_by(f64::total_cmp);
    let mid = v.len() / 2;
    if v.len() % 2 == 0 {
        (v[mid - 1] + v[mid]) / 2.0
    } else {
        v[mid]
    }
}

/// Scaled median absolute deviation of finite values.
fn robust_sigma(values: &[f64]) -> f64 {
    let m = median(values);
    let dev: Vec<f64> = values.iter().map(|x| (x - m).abs()).collect();
    MAD_TO_SIGMA * median(&dev)
}

/// Estimate spectral rms and brightness offset.
///
/// `channels` and `spectrum` are paired by index. Batches reject length
/// mismatches up front (`io::validate_dataset`).
pub fn estimate_noise(spectrum: &[Option<f64>], channels: &[f64], protocol: &FitProtocol) -> NoiseEstimate {
    let edge = protocol.line_free_edge;
    let mut low = Vec::new();
    let mut high = Vec::new();
    let mut all = Vec::new();

    for (&x, sample) in channels.iter().zip(spectrum.iter()) {
        let Some(raw) = sample else { continue };
        let y = raw * protocol.spectrum_scale;
        if !y.is_finite() {
            continue;
        }
        all.push(y);
        if x < -edge {
            low.push(y);
        } else if x > edge {
            high.push(y);
        }
    }

    let windows: Vec<f64> = [low, high]
        .iter()
        .filter(|w| !w.is_empty())
        .map(|w| robust_sigma(w))
        .collect();
    let rms = if windows.is_empty() {
        f64::NAN
    } else {
        windows.iter().sum::<f64>() / windows.len() as f64
    };

    NoiseEstimate {
        rms,
        offset: median(&all),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChannelGrid;

    fn protocol() -> FitProtocol {
        FitProtocol {
            grid: ChannelGrid {
                start: -10.0,
                end: 10.0,
                len: 21,
            },
            line_free_edge: 5.0,
            spectrum_scale: 1.0,
            ..FitProtocol::default()
        }
    }

    #[test]
    fn exclusion_rules() {
        assert!(is_excluded(&[None, None]));
        assert!(is_excluded(&[Some(0.0), Some(0.0)]));
        assert!(is_excluded(&[Some(f64::NAN), None]));
        assert!(!is_excluded(&[Some(0.0), None]));
        assert!(!is_excluded(&[Some(0.0), Some(1e-9)]));
    }

    #[test]
    fn median_handles_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
        assert!(median(&[]).is_nan());
    }

    #[test]
    fn noise_uses_line_free_windows_only() {
        let p = protocol();
        let x = p.grid.channels();
        // Alternating +-1 in the wings, a huge line in the middle.
        let spectrum: Vec<Option<f64>> = x
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                if c.abs() > 5.0 {
                    Some(if i % 2 == 0 { 1.0 } else { -1.0 })
                } else {
                    Some(1000.0)
                }
            })
            .collect();
        let n = estimate_noise(&spectrum, &x, &p);
        assert!(n.rms.is_finite());
        assert!(n.rms < 3.0, "rms {} polluted by line", n.rms);
        assert_eq!(n.offset, 1000.0);
    }

    #[test]
    fn noise_is_scaled_into_fitted_units() {
        let mut p = protocol();
        p.spectrum_scale = 1000.0;
        let x = p.grid.channels();
        let spectrum: Vec<Option<f64>> = x
            .iter()
            .enumerate()
            .map(|(i, _)| Some(i as f64 * 0.001))
            .collect();
        let n = estimate_noise(&spectrum, &x, &p);
        let unscaled = {
            p.spectrum_scale = 1.0;
            estimate_noise(&spectrum, &x, &p)
        };
        assert!((unscaled.rms - 1.4826e-3).abs() < 1e-12);
        assert!((n.rms - 1000.0 * unscaled.rms).abs() < 1e-9);
    }

    #[test]
    fn undefined_wings_give_nan_rms() {
        let p = protocol();
        let x = p.grid.channels();
        let spectrum: Vec<Option<f64>> = x.iter().map(|&c| if c.abs() > 5.0 { None } else { Some(2.0) }).collect();
        let n = estimate_noise(&spectrum, &x, &p);
        assert!(n.rms.is_nan());
        assert_eq!(n.offset, 2.0);
    }
}
