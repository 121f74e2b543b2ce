//! # Quadrature Engine
//!
//! Adaptive Romberg integration used for every rate, range and tracking
//! integral, and as the sampling primitive of the interpolation tables.
//!
//! ## Theory
//!
//! Each panel is integrated with a sequence of refined base rules whose
//! leading error terms are removed by Richardson extrapolation:
//!
//! ```text
//! R(n, m) = R(n, m-1) + (R(n, m-1) - R(n-1, m-1)) / (r^m - 1)
//! ```
//!
//! - Closed rule: trapezoid with step halving, r = 4. Samples the endpoints.
//! - Open rule: midpoint with step tripling, r = 9. Never samples the
//!   endpoints, so integrable endpoint singularities are harmless.
//!
//! A panel that does not reach the requested precision within its level
//! cap is bisected, up to a fixed panel budget. Exhausting the budget
//! returns the best estimate; there is no failure mode.
//!
//! Substitutions:
//! - log: x = eᵗ, for integrands spanning decades (energies, loss fractions)
//! - power: x = t^(-p), for tails towards infinity
//! - infinity: x = a + (1 - t)/t, t ∈ (0, 1]
//!
//! ## References
//!
//! - Press et al., "Numerical Recipes", §4.3 (Romberg) and §4.4 (open rules)
//! - Stoer & Bulirsch, "Introduction to Numerical Analysis", §3.4

use tracing::debug;

use crate::constants::{MAX_STEPS, PRECISION, ROMBERG_ORDER};

/// Upper bound on the extrapolation columns kept per panel
const MAX_COLUMNS: usize = 16;

/// Levels a closed panel must compute before convergence is trusted
const MIN_CLOSED_LEVELS: usize = 3;

/// Levels an open panel must compute before convergence is trusted
const MIN_OPEN_LEVELS: usize = 2;

/// Tripling grows fast, 3^6 midpoints on the last open level
const MAX_OPEN_LEVELS: usize = 7;

/// Number of panels a single integral may be split into
const MAX_PANELS: usize = 128;

/// Iteration cap of the upper-limit search
const MAX_LIMIT_ITERATIONS: usize = 100;

// ============================================================================
// INTEGRATOR
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rule {
    Closed,
    Open,
}

#[derive(Debug, Clone, Copy)]
enum Tolerance {
    Relative(f64),
    Absolute(f64),
}

impl Tolerance {
    fn accepts(&self, value: f64, error: f64) -> bool {
        match *self {
            Tolerance::Relative(p) => error <= p * value.abs(),
            Tolerance::Absolute(t) => error <= t,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PanelEstimate {
    value: f64,
    error: f64,
}

/// Result of an integral with a bound on its running value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimitSolution {
    /// Full integral over the requested interval
    pub value: f64,
    /// Upper limit x* with |∫ₐ^{x*} f| = |bound|, or the interval end
    pub limit: f64,
    /// Whether the bound is reached inside the interval
    pub reached: bool,
}

/// Adaptive Romberg integrator
#[derive(Debug, Clone, PartialEq)]
pub struct Integrator {
    /// Extrapolation columns per panel
    order: usize,
    /// Refinement levels per panel
    max_steps: usize,
    /// Target relative precision
    precision: f64,
    /// Subdivision budget
    max_panels: usize,
}

impl Default for Integrator {
    fn default() -> Self {
        Self::new(ROMBERG_ORDER, MAX_STEPS, PRECISION)
    }
}

impl Integrator {
    pub fn new(order: usize, max_steps: usize, precision: f64) -> Self {
        Self {
            order: order.clamp(1, MAX_COLUMNS),
            max_steps: max_steps.max(MIN_CLOSED_LEVELS),
            precision: precision.abs().max(f64::EPSILON),
            max_panels: MAX_PANELS,
        }
    }

    pub fn precision(&self) -> f64 {
        self.precision
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// ∫ₐᵇ f dx with the closed rule (samples both endpoints)
    pub fn integrate_closed<F: Fn(f64) -> f64>(&self, a: f64, b: f64, f: F) -> f64 {
        self.adaptive(Rule::Closed, a, b, &f)
    }

    /// ∫ₐᵇ f dx with the open rule (never samples a or b)
    pub fn integrate_open<F: Fn(f64) -> f64>(&self, a: f64, b: f64, f: F) -> f64 {
        self.adaptive(Rule::Open, a, b, &f)
    }

    /// ∫ₐᵇ f dx in the variable t = ln x; requires a, b > 0
    pub fn integrate_log<F: Fn(f64) -> f64>(&self, a: f64, b: f64, f: F) -> f64 {
        if a == b {
            return 0.0;
        }
        if a <= 0.0 || b <= 0.0 {
            return self.adaptive(Rule::Closed, a, b, &f);
        }
        let g = |t: f64| {
            let x = t.exp();
            f(x) * x
        };
        self.adaptive(Rule::Closed, a.ln(), b.ln(), &g)
    }

    /// ∫ₐᵇ f dx with x = t^(-power). `b` may be infinite (or negative,
    /// which also means infinity). Requires a > 0.
    pub fn integrate_with_substitution<F: Fn(f64) -> f64>(
        &self,
        a: f64,
        b: f64,
        f: F,
        power: f64,
    ) -> f64 {
        let to_infinity = b < 0.0 || b.is_infinite();
        if !to_infinity && a == b {
            return 0.0;
        }
        if power == 0.0 || a <= 0.0 {
            if to_infinity {
                return self.integrate_to_infinity(a, f);
            }
            return self.adaptive(Rule::Closed, a, b, &f);
        }

        let exponent = -1.0 / power;
        let t_hi = a.powf(exponent);
        let t_lo = if to_infinity { 0.0 } else { b.powf(exponent) };
        let g = |t: f64| {
            let x = t.powf(-power);
            f(x) * power * x / t
        };
        self.adaptive(Rule::Open, t_lo, t_hi, &g)
    }

    /// ∫ₐ^∞ f dx with x = a + (1 - t)/t
    pub fn integrate_to_infinity<F: Fn(f64) -> f64>(&self, a: f64, f: F) -> f64 {
        let g = |t: f64| {
            let x = a + (1.0 - t) / t;
            f(x) / (t * t)
        };
        self.adaptive(Rule::Open, 0.0, 1.0, &g)
    }

    /// ∫ₐᵇ f dx together with the point x* where the running integral
    /// reaches `|bound|` in magnitude. The integrand must not change sign.
    /// Works in log space when both limits are positive.
    pub fn integrate_with_limit<F: Fn(f64) -> f64>(
        &self,
        a: f64,
        b: f64,
        f: F,
        bound: f64,
    ) -> LimitSolution {
        if a == b {
            return LimitSolution { value: 0.0, limit: b, reached: bound == 0.0 };
        }

        let log_space = a > 0.0 && b > 0.0;
        let (ta, tb) = if log_space { (a.ln(), b.ln()) } else { (a, b) };
        let g = |t: f64| {
            if log_space {
                let x = t.exp();
                f(x) * x
            } else {
                f(t)
            }
        };
        let back = |t: f64| if log_space { t.exp() } else { t };

        let value = self.adaptive(Rule::Closed, ta, tb, &g);
        let target = bound.abs();

        if target == 0.0 {
            return LimitSolution { value, limit: a, reached: true };
        }
        if value == 0.0 || target >= value.abs() {
            return LimitSolution { value, limit: b, reached: target == value.abs() };
        }

        // u ∈ [0, 1] parametrises the interval so reversed limits need no
        // special casing; G(u) is monotone increasing.
        let sign = value.signum();
        let span = tb - ta;
        let t_of = |u: f64| ta + u * span;

        let mut lo = 0.0;
        let mut hi = 1.0;
        let mut u = target / value.abs();
        let mut accumulated = sign * self.adaptive(Rule::Closed, ta, t_of(u), &g);

        for _ in 0..MAX_LIMIT_ITERATIONS {
            let residual = accumulated - target;
            if residual.abs() <= self.precision * target {
                break;
            }
            if residual < 0.0 {
                lo = u;
            } else {
                hi = u;
            }
            if hi - lo <= f64::EPSILON * 4.0 {
                break;
            }

            let slope = sign * g(t_of(u)) * span;
            let newton = u - residual / slope;
            let next = if slope > 0.0 && newton.is_finite() && newton > lo && newton < hi {
                newton
            } else {
                0.5 * (lo + hi)
            };

            accumulated += sign * self.adaptive(Rule::Closed, t_of(u), t_of(next), &g);
            u = next;
        }

        LimitSolution { value, limit: back(t_of(u)), reached: true }
    }

    // ------------------------------------------------------------------------
    // Panels
    // ------------------------------------------------------------------------

    fn adaptive(&self, rule: Rule, a: f64, b: f64, f: &dyn Fn(f64) -> f64) -> f64 {
        if a == b {
            return 0.0;
        }

        let relative = Tolerance::Relative(self.precision);
        let whole = self.romberg(rule, a, b, f, relative);
        if relative.accepts(whole.value, whole.error) {
            return whole.value;
        }

        let tolerance = self.precision * whole.value.abs().max(f64::MIN_POSITIVE);
        let density = tolerance / (b - a).abs();
        let mut budget = self.max_panels;
        self.refine(rule, a, b, f, whole, density, &mut budget)
    }

    #[allow(clippy::too_many_arguments)]
    fn refine(
        &self,
        rule: Rule,
        a: f64,
        b: f64,
        f: &dyn Fn(f64) -> f64,
        estimate: PanelEstimate,
        density: f64,
        budget: &mut usize,
    ) -> f64 {
        let local = density * (b - a).abs();
        if estimate.error <= local {
            return estimate.value;
        }
        if *budget < 2 {
            debug!(
                a,
                b,
                value = estimate.value,
                error = estimate.error,
                "quadrature panel budget exhausted, returning best estimate"
            );
            return estimate.value;
        }
        *budget -= 2;

        let mid = 0.5 * (a + b);
        let half = Tolerance::Absolute(0.5 * local);
        let left = self.romberg(rule, a, mid, f, half);
        let right = self.romberg(rule, mid, b, f, half);

        self.refine(rule, a, mid, f, left, density, budget)
            + self.refine(rule, mid, b, f, right, density, budget)
    }

    fn romberg(
        &self,
        rule: Rule,
        a: f64,
        b: f64,
        f: &dyn Fn(f64) -> f64,
        tolerance: Tolerance,
    ) -> PanelEstimate {
        let width = b - a;
        let (max_levels, min_levels, ratio) = match rule {
            Rule::Closed => (self.max_steps, MIN_CLOSED_LEVELS, 4.0),
            Rule::Open => (self.max_steps.min(MAX_OPEN_LEVELS), MIN_OPEN_LEVELS, 9.0),
        };

        let mut base = match rule {
            Rule::Closed => 0.5 * width * (f(a) + f(b)),
            Rule::Open => width * f(a + 0.5 * width),
        };

        let mut previous = [0.0; MAX_COLUMNS];
        let mut current = [0.0; MAX_COLUMNS];
        previous[0] = base;
        let mut previous_len = 1;
        let mut best = PanelEstimate { value: base, error: f64::INFINITY };

        for level in 1..max_levels {
            base = match rule {
                Rule::Closed => {
                    let n = 1usize << (level - 1);
                    let spacing = width / n as f64;
                    let sum: f64 = (0..n).map(|k| f(a + (k as f64 + 0.5) * spacing)).sum();
                    0.5 * (base + spacing * sum)
                }
                Rule::Open => {
                    let old_panels = 3usize.pow(level as u32 - 1);
                    let old_width = width / old_panels as f64;
                    let h = old_width / 3.0;
                    let sum: f64 = (0..old_panels)
                        .map(|j| {
                            let left = a + j as f64 * old_width;
                            f(left + 0.5 * h) + f(left + 2.5 * h)
                        })
                        .sum();
                    base / 3.0 + h * sum
                }
            };

            current[0] = base;
            let columns = level.min(self.order - 1);
            let mut factor = 1.0;
            for m in 1..=columns {
                factor *= ratio;
                current[m] = current[m - 1] + (current[m - 1] - previous[m - 1]) / (factor - 1.0);
            }

            let value = current[columns];
            let error = (value - previous[previous_len - 1]).abs();
            best = PanelEstimate { value, error };

            if level + 1 >= min_levels && tolerance.accepts(value, error) {
                break;
            }

            previous[..=columns].copy_from_slice(&current[..=columns]);
            previous_len = columns + 1;
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::E;

    #[test]
    fn test_zero_width_interval() {
        let integrator = Integrator::default();
        assert_eq!(integrator.integrate_closed(2.5, 2.5, |x| x.exp()), 0.0);
        assert_eq!(integrator.integrate_open(3.0, 3.0, |x| 1.0 / x), 0.0);
        assert_eq!(integrator.integrate_log(7.0, 7.0, |x| x), 0.0);
    }

    #[test]
    fn test_square_is_exact() {
        let integrator = Integrator::default();
        assert_eq!(integrator.integrate_closed(0.0, 3.0, |x| x * x), 9.0);
        assert_eq!(integrator.integrate_closed(3.0, 0.0, |x| x * x), -9.0);
    }

    #[test]
    fn test_exponential_default_precision() {
        let integrator = Integrator::default();
        let exact = E.powi(3) - 1.0;
        let calc = integrator.integrate_closed(0.0, 3.0, |x| x.exp());
        assert!(((calc - exact) / exact).abs() < 1e-6);
    }

    #[test]
    fn test_precision_decades() {
        let exact = E.powi(3) - 1.0;
        let floor = 4.0 * f64::EPSILON * exact;
        let mut previous = f64::INFINITY;
        for decade in 5..=15 {
            let precision = 10f64.powi(-decade);
            let integrator = Integrator::new(5, 20, precision);
            let calc = integrator.integrate_closed(0.0, 3.0, |x| x.exp());
            let error = (calc - exact).abs();
            assert!(error <= exact * precision, "precision {precision}: error {error}");
            assert!(error <= previous.max(floor), "precision {precision}: error {error} above {previous}");
            previous = error;
        }
    }

    #[test]
    fn test_open_rule_skips_endpoints() {
        let integrator = Integrator::default();
        let f = |x: f64| if x == 0.0 || x == 1.0 { f64::NAN } else { x * x };
        assert_relative_eq!(integrator.integrate_open(0.0, 1.0, f), 1.0 / 3.0, max_relative = 1e-6);
    }

    #[test]
    fn test_log_substitution() {
        let integrator = Integrator::default();
        let calc = integrator.integrate_log(1.0, E.powi(5), |x| 1.0 / x);
        assert_relative_eq!(calc, 5.0, max_relative = 1e-6);
        let reversed = integrator.integrate_log(1e4, 1.0, |x| x.sqrt());
        assert_relative_eq!(reversed, -(2.0 / 3.0) * (1e6 - 1.0), max_relative = 1e-6);
    }

    #[test]
    fn test_to_infinity() {
        let integrator = Integrator::default();
        let calc = integrator.integrate_to_infinity(1.0, |x| 1.0 / (x * x));
        assert_relative_eq!(calc, 1.0, max_relative = 1e-6);
    }

    #[test]
    fn test_power_substitution_tail() {
        let integrator = Integrator::default();
        let calc = integrator.integrate_with_substitution(1.0, -1.0, |x| (-x).exp(), 2.0);
        assert_relative_eq!(calc, (-1.0f64).exp(), max_relative = 1e-6);
        let finite = integrator.integrate_with_substitution(1.0, 4.0, |x| x, 2.0);
        assert_relative_eq!(finite, 7.5, max_relative = 1e-6);
    }

    #[test]
    fn test_limit_inside_interval() {
        let integrator = Integrator::default();
        let solution = integrator.integrate_with_limit(1.0, E.powi(3), |x| 1.0 / x, 2.0);
        assert!(solution.reached);
        assert_relative_eq!(solution.value, 3.0, max_relative = 1e-6);
        assert_relative_eq!(solution.limit, E.powi(2), max_relative = 1e-5);
    }

    #[test]
    fn test_limit_reversed_interval() {
        let integrator = Integrator::default();
        let solution = integrator.integrate_with_limit(100.0, 1.0, |x| 1.0 / x, 10f64.ln());
        assert!(solution.reached);
        assert_relative_eq!(solution.value, -(100f64.ln()), max_relative = 1e-6);
        assert_relative_eq!(solution.limit, 10.0, max_relative = 1e-5);
    }

    #[test]
    fn test_limit_not_reached() {
        let integrator = Integrator::default();
        let solution = integrator.integrate_with_limit(0.0, 1.0, |x| 2.0 * x, 5.0);
        assert!(!solution.reached);
        assert_eq!(solution.limit, 1.0);
        assert_relative_eq!(solution.value, 1.0, max_relative = 1e-6);
    }

    #[test]
    fn test_kinked_integrand_refines() {
        let integrator = Integrator::default();
        let calc = integrator.integrate_closed(-1.0, 2.0, |x: f64| x.abs());
        assert_relative_eq!(calc, 2.5, max_relative = 1e-6);
    }
}
