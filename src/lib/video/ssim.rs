//! Structural similarity between two equally sized luma planes.
//!
//! Whole-frame (single window) variant of Wang et al., "Image Quality
//! Assessment: From Error Visibility to Structural Similarity" (2004): the
//! luminance, contrast and structure terms are computed once over all samples
//! and multiplied together.

const DYNAMIC_RANGE: f64 = 255.0;
const K1: f64 = 0.01;
const K2: f64 = 0.03;

pub const C1: f64 = (K1 * DYNAMIC_RANGE) * (K1 * DYNAMIC_RANGE);
pub const C2: f64 = (K2 * DYNAMIC_RANGE) * (K2 * DYNAMIC_RANGE);
pub const C3: f64 = C2 / 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Moments {
    mean: f64,
    variance: f64,
}

fn moments(samples: &[f64]) -> Moments {
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let variance = samples
        .iter()
        .map(|sample| {
            let diff = sample - mean;
            diff * diff
        })
        .sum::<f64>()
        / n;

    Moments { mean, variance }
}

/// Returns the SSIM index of `x` and `y`.
///
/// Inputs of different length, or empty inputs, are not comparable and yield
/// `0.0`.
pub fn ssim(x: &[f64], y: &[f64]) -> f64 {
    if x.len() != y.len() || x.is_empty() {
        return 0.0;
    }

    let Moments {
        mean: mu_x,
        variance: sigma_x2,
    } = moments(x);
    let Moments {
        mean: mu_y,
        variance: sigma_y2,
    } = moments(y);
    let sigma_x = sigma_x2.sqrt();
    let sigma_y = sigma_y2.sqrt();

    let sigma_xy = x
        .iter()
        .zip(y)
        .map(|(a, b)| (a - mu_x) * (b - mu_y))
        .sum::<f64>()
        / x.len() as f64;

    let luminance = (2.0 * mu_x * mu_y + C1) / (mu_x * mu_x + mu_y * mu_y + C1);
    let contrast = (2.0 * sigma_x * sigma_y + C2) / (sigma_x2 + sigma_y2 + C2);
    let structure = (sigma_xy + C3) / (sigma_x * sigma_y + C3);

    luminance * contrast * structure
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(len: usize) -> Vec<f64> {
        (0..len).map(|i| (i * 7 % 256) as f64).collect()
    }

    #[test]
    fn identical_frames_are_similar() {
        let frame = gradient(640);
        assert!((ssim(&frame, &frame) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn different_lengths_are_not_comparable() {
        assert_eq!(ssim(&gradient(10), &gradient(11)), 0.0);
        assert_eq!(ssim(&[], &[]), 0.0);
    }

    #[test]
    fn inverted_frame_is_dissimilar() {
        let frame = gradient(640);
        let inverted: Vec<f64> = frame.iter().map(|v| 255.0 - v).collect();
        assert!(ssim(&frame, &inverted) < 0.5);
    }

    #[test]
    fn slight_noise_stays_above_frozen_threshold() {
        let frame = gradient(640);
        let noisy: Vec<f64> = frame
            .iter()
            .enumerate()
            .map(|(i, v)| if i % 2 == 0 { v + 0.5 } else { v - 0.5 })
            .collect();
        let index = ssim(&frame, &noisy);
        assert!(index > 0.985 && index < 1.0, "{index}");
    }

    #[test]
    fn symmetric() {
        let a = gradient(100);
        let b: Vec<f64> = a.iter().map(|v| (v * 0.8) + 10.0).collect();
        assert!((ssim(&a, &b) - ssim(&b, &a)).abs() < 1e-12);
    }
}
