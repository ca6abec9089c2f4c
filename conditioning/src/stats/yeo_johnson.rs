//! Yeo-Johnson power transform
//!
//! Like Box-Cox but defined for zero and negative inputs. The shape parameter
//! is fitted by maximising the profile log-likelihood of a normal model for
//! the transformed data.

const LAMBDA_RANGE: (f64, f64) = (-5.0, 5.0);
const GOLDEN_TOLERANCE: f64 = 1e-8;
const GOLDEN_MAX_ITER: usize = 200;

/// Transform a single value with shape parameter `lambda`
pub fn transform(x: f64, lambda: f64) -> f64 {
    if x >= 0.0 {
        if lambda.abs() < 1e-12 {
            x.ln_1p()
        } else {
            ((x + 1.0).powf(lambda) - 1.0) / lambda
        }
    } else if (lambda - 2.0).abs() < 1e-12 {
        -(-x).ln_1p()
    } else {
        -((1.0 - x).powf(2.0 - lambda) - 1.0) / (2.0 - lambda)
    }
}

/// Profile log-likelihood of `lambda` for the given finite data
pub fn log_likelihood(data: &[f64], lambda: f64) -> f64 {
    let n = data.len() as f64;
    let transformed: Vec<f64> = data.iter().map(|&x| transform(x, lambda)).collect();
    let mean = transformed.iter().sum::<f64>() / n;
    let variance = transformed.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / n;
    if !(variance > 0.0) || !variance.is_finite() {
        return f64::NEG_INFINITY;
    }
    let jacobian: f64 = data.iter().map(|&x| x.signum() * x.abs().ln_1p()).sum();
    -0.5 * n * variance.ln() + (lambda - 1.0) * jacobian
}

/// Maximum-likelihood shape parameter (golden-section search on [-5, 5])
///
/// Constant or single-value data has no defined optimum; `1.0` (the identity
/// transform) is returned.
pub fn fit_lambda(data: &[f64]) -> f64 {
    let finite: Vec<f64> = data.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.len() < 2 || finite.iter().all(|&v| v == finite[0]) {
        return 1.0;
    }

    let inv_phi = (5f64.sqrt() - 1.0) / 2.0;
    let (mut a, mut b) = LAMBDA_RANGE;
    let mut c = b - inv_phi * (b - a);
    let mut d = a + inv_phi * (b - a);
    let mut fc = log_likelihood(&finite, c);
    let mut fd = log_likelihood(&finite, d);

    for _ in 0..GOLDEN_MAX_ITER {
        if (b - a).abs() < GOLDEN_TOLERANCE {
            break;
        }
        if fc > fd {
            b = d;
            d = c;
            fd = fc;
            c = b - inv_phi * (b - a);
            fc = log_likelihood(&finite, c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + inv_phi * (b - a);
            fd = log_likelihood(&finite, d);
        }
    }
    (a + b) / 2.0
}

/// Fit lambda on the finite values and transform every value; NaN stays NaN
pub fn yeo_johnson(data: &[f64]) -> (Vec<f64>, f64) {
    let lambda = fit_lambda(data);
    let out = data
        .iter()
        .map(|&x| if x.is_nan() { x } else { transform(x, lambda) })
        .collect();
    (out, lambda)
}
