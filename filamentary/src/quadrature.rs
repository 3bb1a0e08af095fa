// SPDX-License-Identifier: AGPL-3.0-only

//! Gauss–Legendre quadrature on the unit interval.
//!
//! Filament segments are parametrized on [0, 1]; every line integral
//! (short-range Biot–Savart sums, vorticity deposition, filament length)
//! integrates over that interval with one of these rules. Nodes and weights
//! are computed once at construction by Newton iteration on the Legendre
//! polynomial and cached inside [`crate::ParamsBiotSavart`].

/// Gauss–Legendre rule with nodes and weights mapped to [0, 1].
#[derive(Clone, Debug)]
pub struct GaussLegendre {
    nodes: Vec<f64>,
    weights: Vec<f64>,
}

impl GaussLegendre {
    /// Rule with `n` points, exact for polynomials of degree 2n − 1.
    ///
    /// # Panics
    /// Panics if `n == 0`.
    #[must_use]
    pub fn new(n: usize) -> Self {
        assert!(n > 0, "quadrature order must be positive");
        let mut nodes = vec![0.0; n];
        let mut weights = vec![0.0; n];
        // Roots come in symmetric pairs on (-1, 1); solve the lower half.
        let m = n.div_ceil(2);
        for i in 0..m {
            // Chebyshev initial guess, then Newton on P_n
            let mut x = -(std::f64::consts::PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
            let mut dp = 0.0;
            for _ in 0..100 {
                let (p, d) = legendre_with_derivative(n, x);
                dp = d;
                let dx = p / d;
                x -= dx;
                if dx.abs() < 1e-15 {
                    break;
                }
            }
            let w = 2.0 / ((1.0 - x * x) * dp * dp);
            nodes[i] = 0.5 * (1.0 + x);
            weights[i] = 0.5 * w;
            nodes[n - 1 - i] = 0.5 * (1.0 - x);
            weights[n - 1 - i] = 0.5 * w;
        }
        Self { nodes, weights }
    }

    /// Number of quadrature points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the rule is empty (never true for a constructed rule).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in (0, 1), ascending.
    #[must_use]
    pub fn nodes(&self) -> &[f64] {
        &self.nodes
    }

    /// Weights summing to 1.
    #[must_use]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// ∫₀¹ f(ζ) dζ by this rule.
    pub fn integrate<F: FnMut(f64) -> f64>(&self, mut f: F) -> f64 {
        self.nodes
            .iter()
            .zip(&self.weights)
            .map(|(&x, &w)| w * f(x))
            .sum()
    }
}

/// (P_n(x), P_n'(x)) by the three-term recurrence.
fn legendre_with_derivative(n: usize, x: f64) -> (f64, f64) {
    let mut p0 = 1.0;
    let mut p1 = x;
    for k in 2..=n {
        let kf = k as f64;
        let p2 = ((2.0 * kf - 1.0) * x * p1 - (kf - 1.0) * p0) / kf;
        p0 = p1;
        p1 = p2;
    }
    if n == 0 {
        return (1.0, 0.0);
    }
    let d = n as f64 * (x * p1 - p0) / (x * x - 1.0);
    (p1, d)
}
