//! Auxiliary linear program used to find a starting point:
//!
//! ```text
//!     minimize    −cᵗx
//!     subject to  AE·x  = bE
//!                 AI·x <= bI
//! ```
//!
//! Dense two-phase tableau simplex over x = x⁺ − x⁻, with Bland's rule
//! for both entering and leaving variables.

// Indexed loops read better for tableau updates.
#![allow(clippy::needless_range_loop)]

use activeqp_core::math::Scalar;
use activeqp_core::problem::Problem;
use nalgebra::DVector;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum LpOutcome {
    /// No point satisfies the constraints.
    Infeasible,
    /// `multipliers[i] >= 0` is the dual of inequality `i`; positive means active.
    Optimal {
        x: DVector<Scalar>,
        multipliers: Vec<Scalar>,
    },
    /// The objective is unbounded (or the phase-two pivot budget ran out)
    /// but `x` is feasible.
    Unbounded { x: DVector<Scalar> },
    /// Phase one ran out of pivots before settling feasibility.
    Exhausted,
}

enum Phase {
    Optimal,
    Unbounded,
    Exhausted,
}

struct Tableau {
    rows: Vec<Vec<Scalar>>,
    objective: Vec<Scalar>,
    basis: Vec<usize>,
    /// Columns at or past this index are artificial.
    first_artificial: usize,
    columns: usize,
    tolerance: Scalar,
    pivots: usize,
}

impl Tableau {
    fn rhs(&self, row: usize) -> Scalar {
        self.rows[row][self.columns]
    }

    fn pivot(&mut self, row: usize, col: usize) {
        let pivot = self.rows[row][col];
        for value in self.rows[row].iter_mut() {
            *value /= pivot;
        }
        let pivot_row = self.rows[row].clone();
        for (i, other) in self.rows.iter_mut().enumerate() {
            let factor = other[col];
            if i != row && factor != 0.0 {
                for (value, p) in other.iter_mut().zip(&pivot_row) {
                    *value -= factor * p;
                }
            }
        }
        let factor = self.objective[col];
        if factor != 0.0 {
            for (value, p) in self.objective.iter_mut().zip(&pivot_row) {
                *value -= factor * p;
            }
        }
        self.basis[row] = col;
        self.pivots += 1;
    }

    /// Sets the objective row to the reduced costs of `cost`.
    fn price(&mut self, cost: &[Scalar]) {
        self.objective = cost.to_vec();
        self.objective.push(0.0);
        for (row, &basic) in self.basis.iter().enumerate() {
            let weight = cost[basic];
            if weight != 0.0 {
                for (value, entry) in self.objective.iter_mut().zip(&self.rows[row]) {
                    *value -= weight * entry;
                }
            }
        }
    }

    fn run(&mut self, allow_artificial: bool, max_pivots: usize) -> Phase {
        let limit = if allow_artificial {
            self.columns
        } else {
            self.first_artificial
        };
        loop {
            if self.pivots >= max_pivots {
                return Phase::Exhausted;
            }
            let Some(col) = (0..limit).find(|&j| self.objective[j] < -self.tolerance) else {
                return Phase::Optimal;
            };
            let mut leaving: Option<(usize, Scalar)> = None;
            for i in 0..self.rows.len() {
                let entry = self.rows[i][col];
                if entry > self.tolerance {
                    let ratio = self.rhs(i).max(0.0) / entry;
                    let better = match leaving {
                        None => true,
                        Some((best, best_ratio)) => {
                            ratio < best_ratio - self.tolerance
                                || (ratio <= best_ratio + self.tolerance
                                    && self.basis[i] < self.basis[best])
                        }
                    };
                    if better {
                        leaving = Some((i, ratio));
                    }
                }
            }
            match leaving {
                Some((row, _)) => self.pivot(row, col),
                None => return Phase::Unbounded,
            }
        }
    }

    fn value(&self, column: usize) -> Scalar {
        self.basis
            .iter()
            .position(|&basic| basic == column)
            .map(|row| self.rhs(row))
            .unwrap_or(0.0)
    }
}

/// Finds a feasible point of `problem`'s constraints, preferring a vertex
/// that minimizes −cᵗx so the inequality duals hint at the active set.
pub fn find_feasible_point(problem: &Problem, tolerance: Scalar, max_pivots: usize) -> LpOutcome {
    let n = problem.n();
    let m_eq = problem.equality_count();
    let m_in = problem.inequality_count();
    let (ae, be, ai, bi) = (problem.ae(), problem.be(), problem.ai(), problem.bi());

    // Columns: x⁺ (n) | x⁻ (n) | slacks (m_in) | artificials
    let slack_start = 2 * n;
    let first_artificial = slack_start + m_in;
    let needs_artificial: Vec<bool> = (0..m_in)
        .map(|i| bi[i] < 0.0)
        .chain((0..m_eq).map(|_| true))
        .collect();
    let artificials = needs_artificial.iter().filter(|&&flag| flag).count();
    let columns = first_artificial + artificials;

    let mut rows = Vec::with_capacity(m_in + m_eq);
    let mut basis = Vec::with_capacity(m_in + m_eq);
    let mut next_artificial = first_artificial;
    for r in 0..(m_in + m_eq) {
        let (matrix, source, rhs) = if r < m_in {
            (ai, r, bi[r])
        } else {
            (ae, r - m_in, be[r - m_in])
        };
        let sign = if rhs < 0.0 { -1.0 } else { 1.0 };
        let mut row = vec![0.0; columns + 1];
        for j in 0..n {
            row[j] = sign * matrix[(source, j)];
            row[n + j] = -sign * matrix[(source, j)];
        }
        if r < m_in {
            row[slack_start + r] = sign;
        }
        row[columns] = sign * rhs;
        if needs_artificial[r] {
            row[next_artificial] = 1.0;
            basis.push(next_artificial);
            next_artificial += 1;
        } else {
            basis.push(slack_start + r);
        }
        rows.push(row);
    }

    let mut tableau = Tableau {
        rows,
        objective: Vec::new(),
        basis,
        first_artificial,
        columns,
        tolerance,
        pivots: 0,
    };

    // Phase 1: drive the artificials to zero.
    let scale = problem.rhs_scale();
    if artificials > 0 {
        let phase_one: Vec<Scalar> = (0..columns)
            .map(|j| if j >= first_artificial { 1.0 } else { 0.0 })
            .collect();
        tableau.price(&phase_one);
        if let Phase::Exhausted = tableau.run(true, max_pivots) {
            warn!(pivots = tableau.pivots, "phase one ran out of pivots");
            return LpOutcome::Exhausted;
        }
        let residual = -tableau.objective[columns];
        trace!(residual, pivots = tableau.pivots, "phase one finished");
        if residual > tolerance * scale {
            debug!(residual, "auxiliary problem has no feasible point");
            return LpOutcome::Infeasible;
        }
        for row in 0..tableau.rows.len() {
            if tableau.basis[row] >= first_artificial {
                if let Some(col) =
                    (0..first_artificial).find(|&j| tableau.rows[row][j].abs() > tolerance)
                {
                    tableau.pivot(row, col);
                }
            }
        }
    }

    // Phase 2: minimize −cᵗx = −cᵗx⁺ + cᵗx⁻.
    let c = problem.c();
    let phase_two: Vec<Scalar> = (0..columns)
        .map(|j| match j {
            j if j < n => -c[j],
            j if j < slack_start => c[j - n],
            _ => 0.0,
        })
        .collect();
    tableau.price(&phase_two);
    let phase = tableau.run(false, max_pivots);

    let x = DVector::from_fn(n, |j, _| tableau.value(j) - tableau.value(n + j));
    match phase {
        Phase::Optimal => {
            let multipliers = (0..m_in)
                .map(|i| tableau.objective[slack_start + i].max(0.0))
                .collect();
            debug!(pivots = tableau.pivots, "auxiliary problem solved");
            LpOutcome::Optimal { x, multipliers }
        }
        Phase::Unbounded | Phase::Exhausted => {
            debug!(pivots = tableau.pivots, "auxiliary objective unbounded");
            LpOutcome::Unbounded { x }
        }
    }
}
