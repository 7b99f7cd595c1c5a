//! Circuit-based ranking of optional intervals.
//!
//! Assigns every present task of a disjunctive (no-overlap) set a dense
//! 0-based rank in start-time order, and absent tasks the sentinel rank `-1`,
//! by reducing ranking to a Hamiltonian circuit over an augmented graph.
//!
//! - **`ranking`**: The encoder ([`ranking::CircuitRanking`],
//!   [`ranking::rank_tasks_with_circuit`]) and solution verification
//!   ([`ranking::verify_ranking`]).
//! - **`cp`**: Domain-agnostic modeling layer the encoder posts into
//!   (integer and boolean variables, conditional linear constraints,
//!   implications, circuits, optional intervals), plus the [`cp::CpSolver`]
//!   trait and an exact reference solver.
//! - **`error`**: Model and encoder input errors.
//!
//! # Example
//!
//! ```
//! use u_ranking::cp::{BacktrackingSolver, CpModel, CpSolver, SolverConfig};
//! use u_ranking::ranking::{verify_ranking, CircuitRanking, RankedTask};
//!
//! let mut model = CpModel::new("ranking");
//! let mut tasks = Vec::new();
//! let mut intervals = Vec::new();
//! for (t, duration) in [2, 1].into_iter().enumerate() {
//!     let start = model.new_int_var(0, 10, format!("start[{t}]"));
//!     let presence = model.new_bool_var(format!("presence[{t}]"));
//!     intervals.push(model.new_optional_interval(start, duration, presence, format!("task[{t}]")));
//!     let rank = model.new_int_var(-1, 1, format!("rank[{t}]"));
//!     model.fix_literal(presence, true);
//!     tasks.push(RankedTask::new(start, duration, presence, rank));
//! }
//! model.add_no_overlap(intervals);
//! CircuitRanking::new(&tasks).encode(&mut model).unwrap();
//!
//! let solution = BacktrackingSolver::new().solve(&model, &SolverConfig::default());
//! let order = verify_ranking(&solution, &tasks).unwrap();
//! assert_eq!(order.len(), 2);
//! ```

pub mod cp;
pub mod error;
pub mod ranking;

pub use error::{ModelError, RankingError};
