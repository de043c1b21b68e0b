//! Streaming statistics for bootstrap aggregation.
//!
//! [`Welford`] keeps a numerically stable running mean and variance of one
//! statistic. [`TTest2`] keeps the paired aggregates of Welch's two-sample
//! t-test over `(test, control)` samples; missing samples are `NaN` and
//! update neither side. The t-distribution CDF is evaluated through the
//! regularized incomplete beta function using the identity
//! `P(T <= t; df) = I_{df/(df+t^2)}(df/2, 1/2) / 2` for `t < 0`, so a
//! two-sided p-value is `I_{df/(df+t^2)}(df/2, 1/2)`.

/// Running mean/variance aggregate (Welford's method).
#[derive(Debug, Clone, Copy, Default)]
pub struct Welford {
    mean: f64,
    m2: f64,
    count: u32,
}

impl Welford {
    /// Creates an empty aggregate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a sample into the aggregate. `NaN` samples are ignored.
    pub fn update(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / f64::from(self.count);
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    /// Number of non-`NaN` samples folded in.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Running mean, or `NaN` before the first sample.
    #[must_use]
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.mean
        }
    }

    /// Unbiased sample variance, or `NaN` with fewer than two samples.
    #[must_use]
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            f64::NAN
        } else {
            self.m2 / f64::from(self.count - 1)
        }
    }

    /// Sample standard deviation `sqrt(M2 / (n - 1))`, or `NaN` with fewer
    /// than two samples.
    #[must_use]
    pub fn stdev(&self) -> f64 {
        self.variance().sqrt()
    }
}

/// Result of finalizing a two-sample t-test aggregate.
#[derive(Debug, Clone, Copy)]
pub struct TTestResult {
    /// Welch's t statistic.
    pub t_stat: f64,
    /// Welch-Satterthwaite degrees of freedom.
    pub df: f64,
    /// Two-sided p-value.
    pub pval: f64,
}

/// Welch two-sample t-test aggregate over `(x, y)` sample pairs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TTest2 {
    x: Welford,
    y: Welford,
}

impl TTest2 {
    /// Creates an empty aggregate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one sample pair in. Pass `NaN` for a missing side; it updates
    /// neither the mean nor the variance of that side.
    pub fn update(&mut self, x_value: f64, y_value: f64) {
        self.x.update(x_value);
        self.y.update(y_value);
    }

    /// Computes Welch's t, the Welch-Satterthwaite degrees of freedom, and
    /// the two-sided p-value.
    ///
    /// With fewer than two valid samples on either side every field is
    /// `NaN`.
    #[must_use]
    pub fn finalize(&self) -> TTestResult {
        if self.x.count() < 2 || self.y.count() < 2 {
            return TTestResult {
                t_stat: f64::NAN,
                df: f64::NAN,
                pval: f64::NAN,
            };
        }

        let x_var_avg = self.x.variance() / f64::from(self.x.count());
        let y_var_avg = self.y.variance() / f64::from(self.y.count());
        let t_stat = (self.x.mean() - self.y.mean()) / (x_var_avg + y_var_avg).sqrt();

        let num = (x_var_avg + y_var_avg) * (x_var_avg + y_var_avg);
        let denom = x_var_avg * x_var_avg / f64::from(self.x.count() - 1)
            + y_var_avg * y_var_avg / f64::from(self.y.count() - 1);
        let df = num / denom;

        TTestResult {
            t_stat,
            df,
            pval: two_sided_p(t_stat, df),
        }
    }
}

/// Two-sided p-value of a t statistic with `df` degrees of freedom:
/// `2 * P(T <= -|t|) = I_{df/(df+t^2)}(df/2, 1/2)`.
#[must_use]
pub fn two_sided_p(t_stat: f64, df: f64) -> f64 {
    if !t_stat.is_finite() || !df.is_finite() || df <= 0.0 {
        return f64::NAN;
    }
    inc_beta(df / 2.0, 0.5, df / (df + t_stat * t_stat))
}

/// Natural log of the gamma function (Lanczos approximation).
#[must_use]
pub fn ln_gamma(x: f64) -> f64 {
    // g = 5, n = 7 coefficients.
    const COEFFS: [f64; 6] = [
        76.180_091_729_471_46,
        -86.505_320_329_416_77,
        24.014_098_240_830_91,
        -1.231_739_572_450_155,
        0.120_865_097_386_617_9e-2,
        -0.539_523_938_495_3e-5,
    ];
    let mut y = x;
    let tmp = x + 5.5;
    let tmp = tmp - (x + 0.5) * tmp.ln();
    let mut series = 1.000_000_000_190_015;
    for coeff in COEFFS {
        y += 1.0;
        series += coeff / y;
    }
    -tmp + (2.506_628_274_631_000_5 * series / x).ln()
}

/// Regularized incomplete beta function `I_x(a, b)`.
#[must_use]
pub fn inc_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let front =
        (ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln()).exp();
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_cf(a, b, x) / a
    } else {
        1.0 - front * beta_cf(b, a, 1.0 - x) / b
    }
}

/// Continued fraction for the incomplete beta function (modified Lentz).
fn beta_cf(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITER: usize = 200;
    const EPS: f64 = 3.0e-14;
    const FPMIN: f64 = 1.0e-300;

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;
    let mut c = 1.0;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < FPMIN {
        d = FPMIN;
    }
    d = 1.0 / d;
    let mut h = d;

    for m in 1..=MAX_ITER {
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 + aa * d;
        if d.abs() < FPMIN {
            d = FPMIN;
        }
        c = 1.0 + aa / c;
        if c.abs() < FPMIN {
            c = FPMIN;
        }
        d = 1.0 / d;
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 + aa * d;
        if d.abs() < FPMIN {
            d = FPMIN;
        }
        c = 1.0 + aa / c;
        if c.abs() < FPMIN {
            c = FPMIN;
        }
        d = 1.0 / d;
        let del = d * c;
        h *= del;

        if (del - 1.0).abs() < EPS {
            break;
        }
    }
    h
}
