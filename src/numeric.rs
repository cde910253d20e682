use once_cell::sync::Lazy;

/// Largest k whose ln(k!) is tabulated. Beyond this the pmf is computed through
/// Stirling's series.
const LOG_FACTORIAL_MAX: usize = 170;

static LOG_FACTORIAL: Lazy<Vec<f64>> = Lazy::new(|| {
    let mut out = vec![0.0; LOG_FACTORIAL_MAX + 1];
    for k in 1..=LOG_FACTORIAL_MAX {
        out[k] = out[k - 1] + (k as f64).ln();
    }
    out
});

pub fn ln_factorial(k: u32) -> f64 {
    let k = k as usize;
    if k <= LOG_FACTORIAL_MAX {
        return LOG_FACTORIAL[k];
    }
    // Stirling with the 1/12n correction; exact enough far past any goal count.
    let n = k as f64;
    n * n.ln() - n + 0.5 * (2.0 * std::f64::consts::PI * n).ln() + 1.0 / (12.0 * n)
}

/// P(X = k) for X ~ Poisson(lambda), evaluated in log space.
pub fn poisson_pmf(k: u32, lambda: f64) -> f64 {
    if lambda <= 0.0 {
        return if k == 0 { 1.0 } else { 0.0 };
    }
    (k as f64 * lambda.ln() - lambda - ln_factorial(k)).exp()
}

/// Pmf over `0..=max_k` with the tail mass beyond `max_k` folded into the last bucket,
/// so the vector always sums to 1.
pub fn poisson_pmf_folded(lambda: f64, max_k: u32) -> Vec<f64> {
    let mut out: Vec<f64> = (0..=max_k).map(|k| poisson_pmf(k, lambda)).collect();
    let sum: f64 = out.iter().sum();
    if sum < 1.0 {
        if let Some(last) = out.last_mut() {
            *last += 1.0 - sum;
        }
    }
    out
}

/// P(X <= k) for X ~ Poisson(lambda).
pub fn poisson_cdf(k: u32, lambda: f64) -> f64 {
    (0..=k).map(|i| poisson_pmf(i, lambda)).sum::<f64>().min(1.0)
}

/// Complementary error function (Numerical Recipes `erfcc`, |rel err| < 1.2e-7).
pub fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -z * z - 1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98
                                + t * (1.488_515_87 + t * (-0.822_152_23 + t * 0.170_872_77))))))));
    let r = t * poly.exp();
    if x >= 0.0 { r } else { 2.0 - r }
}

/// Standard normal CDF.
pub fn normal_cdf(z: f64) -> f64 {
    (0.5 * erfc(-z / std::f64::consts::SQRT_2)).clamp(0.0, 1.0)
}

/// P(X > threshold) for X ~ Normal(mean, std). `std` must be positive.
pub fn normal_tail(threshold: f64, mean: f64, std: f64) -> f64 {
    1.0 - normal_cdf((threshold - mean) / std)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_factorial_matches_direct_product() {
        let direct = (1..=10).fold(1.0_f64, |acc, k| acc * k as f64).ln();
        assert!((ln_factorial(10) - direct).abs() < 1e-9);
        assert_eq!(ln_factorial(0), 0.0);
    }

    #[test]
    fn stirling_branch_is_continuous_with_table() {
        let tabulated = ln_factorial(170);
        let next = ln_factorial(171);
        assert!((next - tabulated - (171.0_f64).ln()).abs() < 1e-6);
    }

    #[test]
    fn pmf_matches_closed_form() {
        let lambda = 1.3_f64;
        let expected = lambda.powi(2) * (-lambda).exp() / 2.0;
        assert!((poisson_pmf(2, lambda) - expected).abs() < 1e-12);
    }

    #[test]
    fn pmf_is_stable_for_large_counts() {
        let p = poisson_pmf(60, 2.0);
        assert!(p.is_finite());
        assert!(p >= 0.0 && p < 1e-40);
    }

    #[test]
    fn zero_lambda_is_point_mass() {
        assert_eq!(poisson_pmf(0, 0.0), 1.0);
        assert_eq!(poisson_pmf(3, 0.0), 0.0);
    }

    #[test]
    fn folded_pmf_sums_to_one() {
        let pmf = poisson_pmf_folded(4.5, 6);
        let sum: f64 = pmf.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
        assert!(pmf[6] > poisson_pmf(6, 4.5));
    }

    #[test]
    fn normal_cdf_reference_points() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-7);
        assert!((normal_cdf(1.96) - 0.975_002).abs() < 1e-5);
        assert!((normal_cdf(-1.0) - 0.158_655).abs() < 1e-5);
    }

    #[test]
    fn normal_tail_is_complement() {
        let t = normal_tail(9.5, 10.0, 3.0);
        assert!((t - normal_cdf(1.0 / 6.0)).abs() < 1e-9);
    }
}
