//! # Interpolation Engine
//!
//! Tables sampled on equidistant (optionally logarithmic) grids and
//! evaluated by local polynomial or rational fits.
//!
//! ## Theory
//!
//! A query is answered from the `order` nodes surrounding it:
//! - Neville's algorithm for the interpolating polynomial
//! - Bulirsch-Stoer diagonal rational interpolation, falling back to the
//!   polynomial when the rational fit hits a pole
//!
//! Transforms applied around the fit:
//! - log x: nodes equidistant in ln x
//! - log y: values stored as ln y (switched off automatically if any
//!   sample is not strictly positive)
//! - relative: values are fitted relative to the nearest node value
//!
//! Inversion of a monotone table brackets the target between two nodes by
//! binary search, then solves inside that interval with the Illinois
//! variant of regula falsi. Within one node interval the fit window is
//! fixed, so the interpolant is continuous there and the bracket holds.
//!
//! Two-dimensional tables interpolate along the first axis for each second
//! axis node and then along the second axis. `find_limit` on a 2-D table
//! inverts the second coordinate at fixed first coordinate, which is how
//! cumulative loss distributions are sampled.
//!
//! Node sampling runs in parallel with rayon; each node must be a pure
//! function of its coordinates.
//!
//! ## References
//!
//! - Press et al., "Numerical Recipes", §3.1-3.2 (polint, ratint)
//! - Dowell & Jarratt, "A modified regula falsi method", BIT 11 (1971)

pub mod cache;

use rayon::prelude::*;

/// Largest supported fit window
pub const MAX_ORDER: usize = 16;

const MAX_ROOT_ITERATIONS: usize = 100;
const ROOT_PRECISION: f64 = 1e-12;

// ============================================================================
// AXES AND FLAGS
// ============================================================================

/// Equidistant grid in x or in ln x
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Axis {
    pub min: f64,
    pub max: f64,
    pub nodes: usize,
    pub log: bool,
}

impl Axis {
    pub fn linear(min: f64, max: f64, nodes: usize) -> Self {
        Self { min, max, nodes: nodes.max(2), log: false }
    }

    pub fn logarithmic(min: f64, max: f64, nodes: usize) -> Self {
        Self { min, max, nodes: nodes.max(2), log: true }
    }

    fn to_grid(&self, x: f64) -> f64 {
        if self.log {
            x.ln()
        } else {
            x
        }
    }

    fn from_grid(&self, t: f64) -> f64 {
        if self.log {
            t.exp()
        } else {
            t
        }
    }

    fn grid_min(&self) -> f64 {
        self.to_grid(self.min)
    }

    fn step(&self) -> f64 {
        (self.to_grid(self.max) - self.grid_min()) / (self.nodes - 1) as f64
    }

    fn grid_node(&self, i: usize) -> f64 {
        self.grid_min() + i as f64 * self.step()
    }

    /// Node coordinate; the edges are returned exactly
    pub fn node(&self, i: usize) -> f64 {
        if i == 0 {
            self.min
        } else if i + 1 >= self.nodes {
            self.max
        } else {
            self.from_grid(self.grid_node(i))
        }
    }

    fn clamp(&self, x: f64) -> f64 {
        if x.is_nan() {
            return self.min;
        }
        x.clamp(self.min, self.max)
    }

    /// First node of the fit window containing grid coordinate t
    fn window(&self, t: f64, order: usize) -> usize {
        let position = ((t - self.grid_min()) / self.step()).floor();
        let first = position - ((order - 1) / 2) as f64;
        let last_start = (self.nodes - order) as f64;
        first.clamp(0.0, last_start) as usize
    }

    /// Exact node index when t falls on a node
    fn node_at(&self, t: f64) -> Option<usize> {
        let position = (t - self.grid_min()) / self.step();
        let rounded = position.round();
        if rounded >= 0.0
            && (rounded as usize) < self.nodes
            && (position - rounded).abs() <= 4.0 * f64::EPSILON * position.abs().max(1.0)
        {
            Some(rounded as usize)
        } else {
            None
        }
    }
}

/// Value transforms and fit strategy of a table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TableFlags {
    /// Store ln y instead of y
    pub log_y: bool,
    /// Bulirsch-Stoer rational fit instead of a polynomial
    pub rational: bool,
    /// Fit values relative to the nearest node value
    pub relative: bool,
}

impl TableFlags {
    pub fn with_log_y(mut self) -> Self {
        self.log_y = true;
        self
    }

    pub fn with_rational(mut self) -> Self {
        self.rational = true;
        self
    }

    pub fn with_relative(mut self) -> Self {
        self.relative = true;
        self
    }

    /// Bit layout used by the raw cache format
    pub fn bits(&self) -> u8 {
        u8::from(self.log_y) | (u8::from(self.rational) << 1) | (u8::from(self.relative) << 2)
    }

    pub fn from_bits(bits: u8) -> Option<Self> {
        if bits > 0b111 {
            return None;
        }
        Some(Self {
            log_y: bits & 1 != 0,
            rational: bits & 2 != 0,
            relative: bits & 4 != 0,
        })
    }
}

// ============================================================================
// LOCAL FITS
// ============================================================================

fn neville(ts: &[f64], ys: &[f64], t: f64) -> f64 {
    let n = ts.len();
    let mut p = [0.0; MAX_ORDER];
    p[..n].copy_from_slice(ys);
    for m in 1..n {
        for i in 0..n - m {
            p[i] = ((t - ts[i + m]) * p[i] + (ts[i] - t) * p[i + 1]) / (ts[i] - ts[i + m]);
        }
    }
    p[0]
}

fn rational(ts: &[f64], ys: &[f64], t: f64) -> Option<f64> {
    // Pole guard relative to the magnitude of the data
    const TINY: f64 = 1e-25;
    let n = ts.len();
    let magnitude = ys.iter().fold(0.0f64, |m, y| m.max(y.abs()));
    if magnitude == 0.0 {
        return Some(0.0);
    }
    let tiny = TINY * magnitude;
    let mut c = [0.0; MAX_ORDER];
    let mut d = [0.0; MAX_ORDER];

    let mut nearest = 0;
    let mut closest = (t - ts[0]).abs();
    for i in 0..n {
        let h = (t - ts[i]).abs();
        if h == 0.0 {
            return Some(ys[i]);
        }
        if h < closest {
            nearest = i;
            closest = h;
        }
        c[i] = ys[i];
        d[i] = ys[i] + tiny;
    }

    let mut y = ys[nearest];
    let mut ns = nearest as isize - 1;
    for m in 1..n {
        for i in 0..n - m {
            let w = c[i + 1] - d[i];
            let h = ts[i + m] - t;
            let tt = (ts[i] - t) * d[i] / h;
            let denominator = tt - c[i + 1];
            if denominator == 0.0 {
                return None;
            }
            let dd = w / denominator;
            d[i] = c[i + 1] * dd;
            c[i] = tt * dd;
        }
        let correction = if 2 * (ns + 1) < (n - m) as isize {
            c[(ns + 1) as usize]
        } else {
            let value = d[ns as usize];
            ns -= 1;
            value
        };
        y += correction;
    }

    if y.is_finite() {
        Some(y)
    } else {
        None
    }
}

fn fit(ts: &[f64], ys: &[f64], t: f64, flags: TableFlags) -> f64 {
    let mut scaled = [0.0; MAX_ORDER];
    let n = ys.len();

    let mut reference = 1.0;
    if flags.relative {
        let nearest = ts
            .iter()
            .enumerate()
            .min_by(|a, b| (a.1 - t).abs().total_cmp(&(b.1 - t).abs()))
            .map(|(i, _)| i)
            .unwrap_or(0);
        if ys[nearest] != 0.0 && ys[nearest].is_finite() {
            reference = ys[nearest];
        }
    }
    for i in 0..n {
        scaled[i] = ys[i] / reference;
    }
    let data = &scaled[..n];

    let value = if flags.rational {
        rational(ts, data, t).unwrap_or_else(|| neville(ts, data, t))
    } else {
        neville(ts, data, t)
    };
    value * reference
}

/// Fit at grid coordinate t over a strided view of stored values.
fn fit_strided(
    axis: &Axis,
    values: &[f64],
    offset: usize,
    stride: usize,
    order: usize,
    flags: TableFlags,
    t: f64,
) -> f64 {
    if let Some(i) = axis.node_at(t) {
        return values[offset + i * stride];
    }
    let start = axis.window(t, order);
    let mut ts = [0.0; MAX_ORDER];
    let mut ys = [0.0; MAX_ORDER];
    for j in 0..order {
        ts[j] = axis.grid_node(start + j);
        ys[j] = values[offset + (start + j) * stride];
    }
    fit(&ts[..order], &ys[..order], t, flags)
}

/// Solution of an inversion along one axis
#[derive(Debug, Clone, Copy, PartialEq)]
enum Root {
    /// Exactly on node i
    Node(usize),
    /// Inside the domain at grid coordinate t
    Grid(f64),
}

impl Root {
    fn to_axis(self, axis: &Axis) -> f64 {
        match self {
            Root::Node(i) => axis.node(i),
            Root::Grid(t) => axis.clamp(axis.from_grid(t)),
        }
    }
}

/// Invert stored (transformed) values along one axis. Targets outside the
/// stored range clamp to the edge nodes. `eval` evaluates the interpolant
/// at a grid coordinate.
fn invert<E: Fn(f64) -> f64>(axis: &Axis, column: &[f64], target: f64, eval: E) -> Root {
    let n = column.len();
    let increasing = column[n - 1] >= column[0];

    if increasing {
        if target <= column[0] {
            return Root::Node(0);
        }
        if target >= column[n - 1] {
            return Root::Node(n - 1);
        }
    } else {
        if target >= column[0] {
            return Root::Node(0);
        }
        if target <= column[n - 1] {
            return Root::Node(n - 1);
        }
    }

    let mut lo = 0;
    let mut hi = n - 1;
    while hi - lo > 1 {
        let mid = (lo + hi) / 2;
        if (column[mid] <= target) == increasing {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    let mut a = axis.grid_node(lo);
    let mut b = axis.grid_node(hi);
    let mut fa = column[lo] - target;
    let mut fb = column[hi] - target;
    if fa == 0.0 {
        return Root::Node(lo);
    }
    if fb == 0.0 {
        return Root::Node(hi);
    }

    let scale = target.abs().max(f64::MIN_POSITIVE);
    let mut c = b;
    for _ in 0..MAX_ROOT_ITERATIONS {
        c = (a * fb - b * fa) / (fb - fa);
        if !c.is_finite() || c <= a.min(b) || c >= a.max(b) {
            c = 0.5 * (a + b);
        }
        let fc = eval(c) - target;
        if fc.abs() <= ROOT_PRECISION * scale || (b - a).abs() <= ROOT_PRECISION * c.abs().max(1.0) {
            break;
        }
        if fc * fb < 0.0 {
            a = b;
            fa = fb;
        } else {
            fa *= 0.5;
        }
        b = c;
        fb = fc;
    }
    Root::Grid(c)
}

// ============================================================================
// ONE-DIMENSIONAL TABLES
// ============================================================================

/// Tabulated function of one variable
#[derive(Debug, Clone, PartialEq)]
pub struct Interpolant1D {
    axis: Axis,
    order: usize,
    flags: TableFlags,
    /// Stored values, ln y when `flags.log_y`
    values: Vec<f64>,
}

impl Interpolant1D {
    /// Sample `f` at every node of `axis` and build the table
    pub fn build<F>(axis: Axis, order: usize, flags: TableFlags, f: F) -> Self
    where
        F: Fn(f64) -> f64 + Sync,
    {
        let samples: Vec<f64> = (0..axis.nodes).into_par_iter().map(|i| f(axis.node(i))).collect();
        Self::from_samples(axis, order, flags, samples)
    }

    /// Build from real-valued node samples
    pub fn from_samples(axis: Axis, order: usize, mut flags: TableFlags, samples: Vec<f64>) -> Self {
        if flags.log_y && samples.iter().any(|&y| !(y > 0.0)) {
            flags.log_y = false;
        }
        let values = if flags.log_y { samples.iter().map(|y| y.ln()).collect() } else { samples };
        Self { axis, order: order.clamp(1, axis.nodes.min(MAX_ORDER)), flags, values }
    }

    /// Reassemble a table from stored parts; the caller validates them
    pub(crate) fn from_parts(axis: Axis, order: usize, flags: TableFlags, values: Vec<f64>) -> Self {
        Self { axis, order, flags, values }
    }

    pub fn axis(&self) -> &Axis {
        &self.axis
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn flags(&self) -> TableFlags {
        self.flags
    }

    pub(crate) fn stored_values(&self) -> &[f64] {
        &self.values
    }

    fn untransform(&self, y: f64) -> f64 {
        if self.flags.log_y {
            y.exp()
        } else {
            y
        }
    }

    fn eval_grid(&self, t: f64) -> f64 {
        fit_strided(&self.axis, &self.values, 0, 1, self.order, self.flags, t)
    }

    /// Value at x; queries outside the domain are clamped to its edges
    pub fn evaluate(&self, x: f64) -> f64 {
        let t = self.axis.to_grid(self.axis.clamp(x));
        self.untransform(self.eval_grid(t))
    }

    /// x with evaluate(x) = y for a monotone table, clamped to the domain
    pub fn find_limit(&self, y: f64) -> f64 {
        let target = if self.flags.log_y {
            if y <= 0.0 {
                return if self.values[self.values.len() - 1] >= self.values[0] {
                    self.axis.min
                } else {
                    self.axis.max
                };
            }
            y.ln()
        } else {
            y
        };
        invert(&self.axis, &self.values, target, |t| self.eval_grid(t)).to_axis(&self.axis)
    }
}

// ============================================================================
// TWO-DIMENSIONAL TABLES
// ============================================================================

/// Tabulated function of two variables, row-major over (x1, x2)
#[derive(Debug, Clone, PartialEq)]
pub struct Interpolant2D {
    axis1: Axis,
    axis2: Axis,
    order: usize,
    flags: TableFlags,
    values: Vec<f64>,
}

impl Interpolant2D {
    pub fn build<F>(axis1: Axis, axis2: Axis, order: usize, flags: TableFlags, f: F) -> Self
    where
        F: Fn(f64, f64) -> f64 + Sync,
    {
        let n2 = axis2.nodes;
        let samples: Vec<f64> = (0..axis1.nodes * n2)
            .into_par_iter()
            .map(|k| f(axis1.node(k / n2), axis2.node(k % n2)))
            .collect();
        Self::from_samples(axis1, axis2, order, flags, samples)
    }

    pub fn from_samples(
        axis1: Axis,
        axis2: Axis,
        order: usize,
        mut flags: TableFlags,
        samples: Vec<f64>,
    ) -> Self {
        if flags.log_y && samples.iter().any(|&y| !(y > 0.0)) {
            flags.log_y = false;
        }
        let values = if flags.log_y { samples.iter().map(|y| y.ln()).collect() } else { samples };
        let order = order.clamp(1, axis1.nodes.min(axis2.nodes).min(MAX_ORDER));
        Self { axis1, axis2, order, flags, values }
    }

    pub(crate) fn from_parts(
        axis1: Axis,
        axis2: Axis,
        order: usize,
        flags: TableFlags,
        values: Vec<f64>,
    ) -> Self {
        Self { axis1, axis2, order, flags, values }
    }

    pub fn axes(&self) -> (&Axis, &Axis) {
        (&self.axis1, &self.axis2)
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn flags(&self) -> TableFlags {
        self.flags
    }

    pub(crate) fn stored_values(&self) -> &[f64] {
        &self.values
    }

    fn untransform(&self, y: f64) -> f64 {
        if self.flags.log_y {
            y.exp()
        } else {
            y
        }
    }

    /// Stored value of column j interpolated along the first axis
    fn column_at(&self, t1: f64, j: usize) -> f64 {
        fit_strided(&self.axis1, &self.values, j, self.axis2.nodes, self.order, self.flags, t1)
    }

    fn eval_grid(&self, t1: f64, t2: f64) -> f64 {
        if let Some(j) = self.axis2.node_at(t2) {
            return self.column_at(t1, j);
        }
        let start = self.axis2.window(t2, self.order);
        let mut ts = [0.0; MAX_ORDER];
        let mut ys = [0.0; MAX_ORDER];
        for k in 0..self.order {
            ts[k] = self.axis2.grid_node(start + k);
            ys[k] = self.column_at(t1, start + k);
        }
        fit(&ts[..self.order], &ys[..self.order], t2, self.flags)
    }

    /// Value at (x1, x2), both clamped to the domain
    pub fn evaluate(&self, x1: f64, x2: f64) -> f64 {
        let t1 = self.axis1.to_grid(self.axis1.clamp(x1));
        let t2 = self.axis2.to_grid(self.axis2.clamp(x2));
        self.untransform(self.eval_grid(t1, t2))
    }

    /// x2 with evaluate(x1, x2) = y, the table being monotone in x2
    pub fn find_limit(&self, x1: f64, y: f64) -> f64 {
        let t1 = self.axis1.to_grid(self.axis1.clamp(x1));
        let column: Vec<f64> = (0..self.axis2.nodes).map(|j| self.column_at(t1, j)).collect();

        let target = if self.flags.log_y {
            if y <= 0.0 {
                return if column[column.len() - 1] >= column[0] {
                    self.axis2.min
                } else {
                    self.axis2.max
                };
            }
            y.ln()
        } else {
            y
        };

        let line = Interpolant1D::from_parts(self.axis2, self.order, self.flags, column);
        invert(&self.axis2, line.stored_values(), target, |t| line.eval_grid(t)).to_axis(&self.axis2)
    }

    /// One-dimensional table of the column at second-axis node `j`
    pub fn column(&self, j: usize) -> Interpolant1D {
        let j = j.min(self.axis2.nodes - 1);
        let samples: Vec<f64> = (0..self.axis1.nodes)
            .map(|i| self.untransform(self.values[i * self.axis2.nodes + j]))
            .collect();
        Interpolant1D::from_samples(self.axis1, self.order, self.flags, samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn power_law() -> Interpolant1D {
        let axis = Axis::logarithmic(1.0, 1e6, 60);
        Interpolant1D::build(axis, 5, TableFlags::default().with_log_y(), |x| 3.0 * x.powf(1.7))
    }

    #[test]
    fn test_nodes_are_exact() {
        let table = power_law();
        assert_relative_eq!(table.evaluate(1.0), 3.0, max_relative = 1e-14);
        assert_relative_eq!(table.evaluate(1e6), 3.0 * 1e6f64.powf(1.7), max_relative = 1e-12);
    }

    #[test]
    fn test_log_log_power_law() {
        let table = power_law();
        for x in [2.5, 17.0, 3.3e3, 9.9e5] {
            assert_relative_eq!(table.evaluate(x), 3.0 * f64::powf(x, 1.7), max_relative = 1e-10);
        }
    }

    #[test]
    fn test_polynomial_fit_is_exact_for_cubics() {
        let axis = Axis::linear(-2.0, 2.0, 21);
        let table = Interpolant1D::build(axis, 4, TableFlags::default(), |x| x * x * x - x);
        assert_relative_eq!(table.evaluate(0.37), 0.37f64.powi(3) - 0.37, epsilon = 1e-12);
    }

    #[test]
    fn test_rational_fit() {
        let axis = Axis::linear(0.0, 4.0, 41);
        let f = |x: f64| 1.0 / (1.0 + x * x);
        let table = Interpolant1D::build(axis, 5, TableFlags::default().with_rational(), f);
        assert_relative_eq!(table.evaluate(1.234), f(1.234), max_relative = 1e-6);
    }

    #[test]
    fn test_relative_fit() {
        let axis = Axis::logarithmic(1.0, 1e4, 50);
        let flags = TableFlags::default().with_rational().with_relative();
        let table = Interpolant1D::build(axis, 5, flags, |x| x.sqrt() + 10.0);
        assert_relative_eq!(table.evaluate(42.0), 42f64.sqrt() + 10.0, max_relative = 1e-7);
    }

    #[test]
    fn test_log_y_disabled_for_non_positive_samples() {
        let axis = Axis::linear(-1.0, 1.0, 11);
        let table = Interpolant1D::build(axis, 3, TableFlags::default().with_log_y(), |x| x);
        assert!(!table.flags().log_y);
        assert_relative_eq!(table.evaluate(0.25), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_find_limit_clamps() {
        let table = power_law();
        assert_eq!(table.find_limit(1e-3), 1.0);
        assert_eq!(table.find_limit(1e30), 1e6);
    }

    #[test]
    fn test_find_limit_clamps_decreasing_and_two_dimensional() {
        let axis = Axis::logarithmic(1.0, 1e3, 40);
        let table = Interpolant1D::build(axis, 5, TableFlags::default().with_log_y(), |x| 1.0 / x);
        assert_eq!(table.find_limit(10.0), 1.0);
        assert_eq!(table.find_limit(1e-9), 1e3);

        let a1 = Axis::logarithmic(1.0, 1e4, 20);
        let a2 = Axis::logarithmic(1e-3, 0.7, 15);
        let plane = Interpolant2D::build(a1, a2, 5, TableFlags::default(), |x, v| x * v);
        assert_eq!(plane.find_limit(10.0, 1e9), 0.7);
        assert_eq!(plane.find_limit(10.0, -1.0), 1e-3);
    }

    #[test]
    fn test_rational_fit_of_tiny_values() {
        // cross sections per atom are of order 1e-28 cm²
        let axis = Axis::linear(0.0, 1.0, 30);
        let f = |v: f64| 1.7e-28 * (1.0 - (-4.0 * v).exp());
        let table = Interpolant1D::build(axis, 5, TableFlags::default().with_rational(), f);
        for v in [0.05, 0.31, 0.77, 0.999] {
            assert_relative_eq!(table.evaluate(v), f(v), max_relative = 1e-4);
        }
        let zero = Interpolant1D::build(axis, 5, TableFlags::default().with_rational(), |_| 0.0);
        assert_eq!(zero.evaluate(0.5), 0.0);
    }

    #[test]
    fn test_find_limit_decreasing() {
        let axis = Axis::logarithmic(1.0, 1e3, 40);
        let table = Interpolant1D::build(axis, 5, TableFlags::default().with_log_y(), |x| 1.0 / x);
        let x = table.find_limit(0.02);
        assert_relative_eq!(x, 50.0, max_relative = 1e-6);
    }

    #[test]
    fn test_two_dimensional_evaluate() {
        let a1 = Axis::logarithmic(1.0, 1e4, 30);
        let a2 = Axis::linear(0.0, 1.0, 30);
        let table = Interpolant2D::build(a1, a2, 5, TableFlags::default(), |x, v| x.ln() * v * v);
        assert_relative_eq!(table.evaluate(333.0, 0.41), 333f64.ln() * 0.41 * 0.41, max_relative = 1e-8);
    }

    #[test]
    fn test_two_dimensional_inverse() {
        let a1 = Axis::logarithmic(1.0, 1e4, 30);
        let a2 = Axis::linear(0.0, 1.0, 40);
        let table = Interpolant2D::build(a1, a2, 5, TableFlags::default().with_rational(), |x, v| {
            x.sqrt() * (1.0 - (-3.0 * v).exp())
        });
        let x1 = 77.0;
        let target = 0.5 * table.evaluate(x1, 1.0);
        let v = table.find_limit(x1, target);
        assert_relative_eq!(table.evaluate(x1, v), target, max_relative = 1e-9);
    }

    #[test]
    fn test_column_matches_edge() {
        let a1 = Axis::logarithmic(1.0, 1e4, 20);
        let a2 = Axis::linear(0.0, 1.0, 10);
        let table = Interpolant2D::build(a1, a2, 5, TableFlags::default(), |x, v| x * v);
        let edge = table.column(9);
        assert_relative_eq!(edge.evaluate(55.0), table.evaluate(55.0, 1.0), max_relative = 1e-12);
    }

    #[test]
    fn test_flag_bits() {
        let flags = TableFlags::default().with_log_y().with_relative();
        assert_eq!(TableFlags::from_bits(flags.bits()), Some(flags));
        assert_eq!(TableFlags::from_bits(8), None);
    }

    proptest! {
        #[test]
        fn prop_find_limit_round_trip(fraction in 0.0f64..1.0) {
            let table = power_law();
            let lo = table.evaluate(1.0);
            let hi = table.evaluate(1e6);
            let y = lo * (hi / lo).powf(fraction);
            let x = table.find_limit(y);
            let back = table.evaluate(x);
            prop_assert!(((back - y) / y).abs() < 1e-8, "y = {}, back = {}", y, back);
        }

        #[test]
        fn prop_cumulative_inverse(x1 in 1.0f64..1e4, fraction in 0.0f64..1.0) {
            let a1 = Axis::logarithmic(1.0, 1e4, 25);
            let a2 = Axis::linear(0.0, 1.0, 25);
            let table = Interpolant2D::build(a1, a2, 5, TableFlags::default(), |x, v| x * v * (2.0 - v));
            let target = fraction * table.evaluate(x1, 1.0);
            let v = table.find_limit(x1, target);
            prop_assert!((table.evaluate(x1, v) - target).abs() <= 1e-9 * x1);
        }
    }
}
