//! L1 merit function bookkeeping.
//!
//! The merit function is phi(x) = f(x) + sigma * sum_j violation(g_j(x)),
//! with violation(v) = max(0, lbg - v) + max(0, v - ubg). Bound-constraint
//! violations are not part of the merit. The penalty sigma only grows
//! within a run; over-penalization on long runs is accepted.

use std::collections::VecDeque;

/// Seed for the window maximum when the window is empty.
const REFERENCE_FLOOR: f64 = -1e20;

/// L1 norm of the general-constraint violation at g = g(x).
pub fn l1_infeasibility(g: &[f64], lbg: &[f64], ubg: &[f64]) -> f64 {
    let mut total = 0.0;
    for j in 0..g.len() {
        total += (lbg[j] - g[j]).max(0.0) + (g[j] - ubg[j]).max(0.0);
    }
    total
}

/// Penalty parameter and the nonmonotone window of recent merit values.
pub struct MeritTracker {
    sigma: f64,
    window: VecDeque<f64>,
    memory: usize,
}

impl MeritTracker {
    /// New tracker with sigma = 0 and an empty window of size `memory`.
    pub fn new(memory: usize) -> Self {
        Self {
            sigma: 0.0,
            window: VecDeque::with_capacity(memory + 1),
            memory,
        }
    }

    /// Current penalty parameter.
    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// Raise sigma to 1.01 |mu_j| for every QP multiplier that exceeds it.
    /// Bound multipliers do not drive sigma.
    pub fn update_sigma(&mut self, mu_qp: &[f64]) {
        for &mu in mu_qp {
            if mu.abs() > self.sigma {
                self.sigma = mu.abs() * 1.01;
            }
        }
    }

    /// Merit value phi at the given objective value and L1 infeasibility.
    pub fn merit(&self, f: f64, l1_infeas: f64) -> f64 {
        f + self.sigma * l1_infeas
    }

    /// Append a merit value, evicting the oldest when the window is full.
    pub fn push(&mut self, merit: f64) {
        self.window.push_back(merit);
        if self.window.len() > self.memory {
            self.window.pop_front();
        }
    }

    /// Nonmonotone line-search reference: the maximum over the window.
    pub fn reference(&self) -> f64 {
        self.window
            .iter()
            .copied()
            .fold(REFERENCE_FLOOR, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l1_infeasibility_two_sided() {
        let g = [0.5, 3.0, 1.0];
        let lbg = [1.0, 0.0, 0.0];
        let ubg = [2.0, 2.0, 2.0];
        // first row violates the lower side by 0.5, second the upper by 1.0
        assert_eq!(l1_infeasibility(&g, &lbg, &ubg), 1.5);
    }

    #[test]
    fn test_sigma_monotone_and_scaled() {
        let mut tracker = MeritTracker::new(4);
        tracker.update_sigma(&[2.0, -3.0]);
        assert_eq!(tracker.sigma(), 3.0 * 1.01);

        // Smaller multipliers never shrink it
        tracker.update_sigma(&[0.5]);
        assert_eq!(tracker.sigma(), 3.0 * 1.01);

        tracker.update_sigma(&[-10.0]);
        assert_eq!(tracker.sigma(), 10.0 * 1.01);
    }

    #[test]
    fn test_window_fifo_eviction() {
        let mut tracker = MeritTracker::new(2);
        tracker.push(5.0);
        tracker.push(1.0);
        tracker.push(2.0);
        // 5.0 was evicted
        assert_eq!(tracker.reference(), 2.0);
    }

    #[test]
    fn test_reference_is_window_max() {
        let mut tracker = MeritTracker::new(4);
        for v in [10.0, 12.0, 8.0, 9.0] {
            tracker.push(v);
        }
        assert_eq!(tracker.reference(), 12.0);
    }

    #[test]
    fn test_empty_window_reference_floor() {
        let tracker = MeritTracker::new(4);
        assert_eq!(tracker.reference(), REFERENCE_FLOOR);
    }
}
