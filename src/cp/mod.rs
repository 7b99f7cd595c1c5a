//! Constraint Programming (CP) modeling layer.
//!
//! Provides a domain-agnostic model for expressing constrained optimization
//! problems using integer and boolean variables, conditional linear
//! constraints, implications, circuits, and optional fixed-size intervals.
//!
//! # Key Components
//!
//! - **Variables**: [`IntVar`], [`BoolVar`], [`Literal`], [`IntervalVar`] — handles
//! - **Expressions**: [`LinearExpr`] — weighted sums built with `+`, `-`, `*`
//! - **Constraints**: [`Constraint`] — Linear (with enforcement), Implication,
//!   Circuit, NoOverlap
//! - **Model**: [`CpModel`] — container for variables, constraints, objective
//! - **Solver**: [`CpSolver`] trait and the exact [`BacktrackingSolver`]
//!
//! # Design
//!
//! Enforcement literals are data attached to a constraint
//! (`model.add_eq(x, 0).only_enforce_if(b)`), never encoding-time control
//! flow. The [`CpSolver`] trait allows plugging in external solvers; the
//! bundled solver is exact but sized for small and medium models.
//!
//! # References
//!
//! Rossi, van Beek & Walsh (2006), "Handbook of Constraint Programming"

mod expr;
mod model;
mod search;
mod solver;
mod variables;

pub use expr::LinearExpr;
pub use model::{
    CircuitArc, Constraint, CpModel, LinearConstraint, LinearConstraintBuilder, Objective,
};
pub use solver::{BacktrackingSolver, CpSolution, CpSolver, SolverConfig, SolverStatus};
pub use variables::{BoolVar, IntVar, IntervalDef, IntervalVar, Literal, VarDef};
