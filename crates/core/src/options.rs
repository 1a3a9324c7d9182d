use crate::math::Scalar;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the active-set solver resolves its per-iteration KKT system.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Dense Schur-complement factorization rebuilt every iteration.
    #[default]
    Direct,
    /// Incrementally maintained Schur rows resolved by conjugate gradients.
    Iterative,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveOptions {
    pub max_iterations: usize,
    pub max_time: Option<Duration>,
    /// Slack tolerance, relative to 1 + the largest right-hand side.
    pub feasibility_tolerance: Scalar,
    /// A step shorter than this (relative to the iterate) counts as zero.
    pub solution_tolerance: Scalar,
    /// Multipliers below `-multiplier_tolerance` mark a constraint to exclude.
    pub multiplier_tolerance: Scalar,
    /// Relative pivot threshold for rank decisions.
    pub accuracy_tolerance: Scalar,
    pub symmetry_tolerance: Scalar,
    /// Relative residual accepted from the conjugate gradient solve.
    pub iterative_tolerance: Scalar,
    /// Diagonal shift, as a multiple of max(max|Qii|, 1), applied when Q is not SPD.
    pub perturbation: Scalar,
    pub strategy: Strategy,
    /// Promote soft numerical warnings to hard failures.
    pub validate: bool,
}

impl SolveOptions {
    pub fn with_strategy(strategy: Strategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    pub fn strict() -> Self {
        Self {
            validate: true,
            ..Self::default()
        }
    }

    /// Parses options from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_iterations: 1_000,
            max_time: None,
            feasibility_tolerance: 1e-9,
            solution_tolerance: 1e-12,
            multiplier_tolerance: 1e-9,
            accuracy_tolerance: 1e-12,
            symmetry_tolerance: 1e-10,
            iterative_tolerance: 1e-9,
            perturbation: 1e-6,
            strategy: Strategy::Direct,
            validate: false,
        }
    }
}
