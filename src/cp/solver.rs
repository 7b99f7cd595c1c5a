//! CP solver interface and reference implementation.

use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::expr::LinearExpr;
use super::model::CpModel;
use super::search::{Search, SearchLimits, SearchOutcome, StopReason};
use super::variables::{IntVar, Literal};

/// Status of the solver after execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SolverStatus {
    /// Proven optimal solution found.
    Optimal,
    /// Feasible (but not necessarily optimal) solution found.
    Feasible,
    /// No feasible solution exists.
    Infeasible,
    /// Model is invalid or malformed.
    ModelInvalid,
    /// Solver exceeded time limit.
    Timeout,
    /// No solution found for unknown reasons.
    Unknown,
}

/// Solution from a CP solver.
///
/// Values are only available when [`is_solution_found`](Self::is_solution_found)
/// holds; otherwise every accessor returns `None`.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CpSolution {
    /// Solver status.
    pub status: SolverStatus,
    /// Objective function value (if any).
    pub objective_value: Option<i64>,
    values: Vec<i64>,
    /// Search nodes explored (summed over workers).
    pub nodes: u64,
    /// Improving solutions found (summed over workers).
    pub solutions: u64,
    /// Solve time in milliseconds.
    pub solve_time_ms: i64,
}

impl CpSolution {
    /// Creates an empty solution with the given status.
    pub fn empty(status: SolverStatus) -> Self {
        Self {
            status,
            objective_value: None,
            values: Vec::new(),
            nodes: 0,
            solutions: 0,
            solve_time_ms: 0,
        }
    }

    /// Whether a feasible solution was found.
    pub fn is_solution_found(&self) -> bool {
        matches!(self.status, SolverStatus::Optimal | SolverStatus::Feasible)
    }

    /// Value of an integer variable.
    pub fn value(&self, var: IntVar) -> Option<i64> {
        self.values.get(var.index()).copied()
    }

    /// Truth value of a literal.
    pub fn bool_value(&self, literal: impl Into<Literal>) -> Option<bool> {
        let literal = literal.into();
        self.values
            .get(literal.var().index())
            .map(|&v| literal.holds(v))
    }

    /// Value of a linear expression.
    pub fn value_of(&self, expr: &LinearExpr) -> Option<i64> {
        if !expr.terms().iter().all(|(v, _)| v.index() < self.values.len()) {
            return None;
        }
        Some(expr.evaluate(|var| self.values[var.index()]))
    }

    /// Full assignment indexed by variable handle.
    pub fn values(&self) -> &[i64] {
        &self.values
    }
}

/// Solver configuration.
///
/// # Examples
///
/// ```
/// use u_ranking::cp::SolverConfig;
///
/// let config = SolverConfig::default()
///     .with_time_limit_ms(5_000)
///     .with_seed(7);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SolverConfig {
    /// Maximum solve time in milliseconds.
    pub time_limit_ms: i64,
    /// Number of portfolio workers. Values above 1 only run in parallel
    /// with the `parallel` feature; otherwise the first worker runs alone.
    pub num_workers: usize,
    /// Stop after finding the first feasible solution.
    pub stop_after_first: bool,
    /// Random seed for branching polarity. `None` = deterministic search.
    pub seed: Option<u64>,
    /// Maximum search nodes per worker. 0 = no limit.
    pub max_nodes: u64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            time_limit_ms: 60_000,
            num_workers: 1,
            stop_after_first: false,
            seed: None,
            max_nodes: 0,
        }
    }
}

impl SolverConfig {
    pub fn with_time_limit_ms(mut self, ms: i64) -> Self {
        self.time_limit_ms = ms;
        self
    }

    pub fn with_num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    pub fn with_stop_after_first(mut self, stop: bool) -> Self {
        self.stop_after_first = stop;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_max_nodes(mut self, n: u64) -> Self {
        self.max_nodes = n;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.time_limit_ms <= 0 {
            return Err(format!(
                "time_limit_ms must be positive, got {}",
                self.time_limit_ms
            ));
        }
        if self.num_workers == 0 {
            return Err("num_workers must be at least 1".into());
        }
        Ok(())
    }

    fn limits(&self, started: Instant) -> SearchLimits {
        SearchLimits {
            deadline: started.checked_add(Duration::from_millis(self.time_limit_ms as u64)),
            max_nodes: self.max_nodes,
            stop_after_first: self.stop_after_first,
        }
    }

    /// Seed of portfolio worker `worker`. Worker 0 keeps the configured seed.
    fn worker_seed(&self, worker: usize) -> Option<u64> {
        match (worker, self.seed) {
            (0, seed) => seed,
            (w, seed) => Some(seed.unwrap_or(0).wrapping_add(w as u64)),
        }
    }
}

/// Trait for CP solver implementations.
///
/// Implementors provide the actual constraint solving logic.
/// This can wrap external solvers (e.g., OR-Tools CP-SAT) or
/// provide custom search.
pub trait CpSolver {
    /// Solves the model and returns a solution.
    fn solve(&self, model: &CpModel, config: &SolverConfig) -> CpSolution;
}

/// Exact solver: bounds propagation, depth-first search and
/// branch-and-bound.
///
/// Complete on the models this crate builds: when the search is not cut
/// short by a limit, `Optimal` and `Infeasible` are proofs. Intended for
/// small and medium models (tens of tasks, not thousands).
///
/// # Examples
///
/// ```
/// use u_ranking::cp::{BacktrackingSolver, CpModel, CpSolver, SolverConfig, SolverStatus};
///
/// let mut model = CpModel::new("example");
/// let x = model.new_int_var(0, 10, "x");
/// let y = model.new_int_var(0, 10, "y");
/// model.add_ge(x + y, 5);
/// model.minimize(x * 3 + y);
///
/// let solution = BacktrackingSolver::new().solve(&model, &SolverConfig::default());
/// assert_eq!(solution.status, SolverStatus::Optimal);
/// assert_eq!(solution.objective_value, Some(5));
/// assert_eq!(solution.value(y), Some(5));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct BacktrackingSolver;

impl BacktrackingSolver {
    pub fn new() -> Self {
        Self
    }
}

impl CpSolver for BacktrackingSolver {
    fn solve(&self, model: &CpModel, config: &SolverConfig) -> CpSolution {
        let started = Instant::now();

        if let Err(reason) = config.validate() {
            warn!(%reason, "invalid solver config");
            return CpSolution::empty(SolverStatus::ModelInvalid);
        }
        if let Err(err) = model.validate() {
            warn!(model = %model.name, error = %err, "model rejected");
            return CpSolution::empty(SolverStatus::ModelInvalid);
        }

        info!(
            event = "solve_start",
            model = %model.name,
            variables = model.var_count(),
            constraints = model.constraint_count(),
            workers = config.num_workers,
        );

        let outcomes = run_workers(model, config, config.limits(started));
        let mut solution = merge_outcomes(model, outcomes);
        solution.solve_time_ms = started.elapsed().as_millis() as i64;

        info!(
            event = "solve_end",
            status = ?solution.status,
            objective = ?solution.objective_value,
            nodes = solution.nodes,
            time_ms = solution.solve_time_ms,
        );
        solution
    }
}

#[cfg(feature = "parallel")]
fn run_workers(model: &CpModel, config: &SolverConfig, limits: SearchLimits) -> Vec<SearchOutcome> {
    use rayon::prelude::*;

    (0..config.num_workers)
        .into_par_iter()
        .map(|w| Search::new(model, limits, config.worker_seed(w)).run())
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn run_workers(model: &CpModel, config: &SolverConfig, limits: SearchLimits) -> Vec<SearchOutcome> {
    vec![Search::new(model, limits, config.worker_seed(0)).run()]
}

/// Combines worker results. An exhausted worker is a proof: its incumbent
/// is optimal, or the model is infeasible if it has none.
fn merge_outcomes(model: &CpModel, outcomes: Vec<SearchOutcome>) -> CpSolution {
    let nodes = outcomes.iter().map(|o| o.nodes).sum();
    let solutions = outcomes.iter().map(|o| o.solutions).sum();
    let proven = outcomes.iter().any(|o| o.stop == StopReason::Exhausted);
    let timed_out = outcomes.iter().any(|o| o.stop == StopReason::TimeLimit);

    let best = outcomes
        .into_iter()
        .filter(|o| o.best.is_some())
        .reduce(|incumbent, candidate| {
            let better = match (model.objective(), candidate.objective, incumbent.objective) {
                (Some(objective), Some(c), Some(i)) => objective.improves(c, i),
                _ => false,
            };
            if better || (candidate.stop == StopReason::Exhausted && incumbent.stop != StopReason::Exhausted) {
                candidate
            } else {
                incumbent
            }
        });

    let status = match (&best, proven) {
        (Some(_), true) => SolverStatus::Optimal,
        (Some(_), false) if model.objective().is_none() => SolverStatus::Optimal,
        (Some(_), false) => SolverStatus::Feasible,
        (None, true) => SolverStatus::Infeasible,
        (None, false) if timed_out => SolverStatus::Timeout,
        (None, false) => SolverStatus::Unknown,
    };

    let mut solution = CpSolution::empty(status);
    solution.nodes = nodes;
    solution.solutions = solutions;
    if let Some(outcome) = best {
        solution.objective_value = outcome.objective;
        solution.values = outcome.best.unwrap_or_default();
    }
    solution
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cp::{CircuitArc, IntervalVar};

    fn solve(model: &CpModel) -> CpSolution {
        BacktrackingSolver::new().solve(model, &SolverConfig::default())
    }

    #[test]
    fn test_solver_config_default() {
        let config = SolverConfig::default();
        assert_eq!(config.time_limit_ms, 60_000);
        assert_eq!(config.num_workers, 1);
        assert!(!config.stop_after_first);
        assert!(config.seed.is_none());
        assert_eq!(config.max_nodes, 0);
    }

    #[test]
    fn test_solver_config_validate() {
        assert!(SolverConfig::default().with_time_limit_ms(0).validate().is_err());
        assert!(SolverConfig::default().with_num_workers(0).validate().is_err());
        assert!(SolverConfig::default().with_num_workers(4).validate().is_ok());
    }

    #[test]
    fn test_worker_seeds() {
        let config = SolverConfig::default();
        assert_eq!(config.worker_seed(0), None);
        assert_eq!(config.worker_seed(2), Some(2));
        let seeded = config.with_seed(10);
        assert_eq!(seeded.worker_seed(0), Some(10));
        assert_eq!(seeded.worker_seed(3), Some(13));
    }

    #[test]
    fn test_satisfaction_is_optimal() {
        let mut model = CpModel::new("test");
        let x = model.new_int_var(0, 10, "x");
        model.add_gt(x, 3);

        let solution = solve(&model);
        assert_eq!(solution.status, SolverStatus::Optimal);
        assert_eq!(solution.value(x), Some(4));
        assert_eq!(solution.objective_value, None);
    }

    #[test]
    fn test_infeasible() {
        let mut model = CpModel::new("test");
        let x = model.new_int_var(0, 10, "x");
        let y = model.new_int_var(0, 10, "y");
        model.add_lt(x, y);
        model.add_lt(y, x);

        let solution = solve(&model);
        assert_eq!(solution.status, SolverStatus::Infeasible);
        assert!(!solution.is_solution_found());
        assert_eq!(solution.value(x), None);
    }

    #[test]
    fn test_invalid_model() {
        let mut model = CpModel::new("test");
        model.add_no_overlap(vec![IntervalVar(0)]);

        let solution = solve(&model);
        assert_eq!(solution.status, SolverStatus::ModelInvalid);
    }

    #[test]
    fn test_invalid_config() {
        let model = CpModel::new("test");
        let config = SolverConfig::default().with_num_workers(0);
        let solution = BacktrackingSolver::new().solve(&model, &config);
        assert_eq!(solution.status, SolverStatus::ModelInvalid);
    }

    #[test]
    fn test_maximize() {
        let mut model = CpModel::new("test");
        let x = model.new_int_var(0, 10, "x");
        let y = model.new_int_var(0, 10, "y");
        model.add_le(x + y, 12);
        model.maximize(x * 2 + y);

        let solution = solve(&model);
        assert_eq!(solution.status, SolverStatus::Optimal);
        assert_eq!(solution.objective_value, Some(22));
        assert_eq!(solution.value(x), Some(10));
        assert_eq!(solution.value(y), Some(2));
    }

    #[test]
    fn test_no_overlap_makespan() {
        let mut model = CpModel::new("test");
        let horizon = 20;
        let makespan = model.new_int_var(0, horizon, "makespan");
        let mut intervals = Vec::new();
        for (t, duration) in [3, 2, 4].into_iter().enumerate() {
            let start = model.new_int_var(0, horizon, format!("start{t}"));
            intervals.push(model.new_interval(start, duration, format!("op{t}")));
            model.add_le(start + duration, makespan);
        }
        model.add_no_overlap(intervals.clone());
        model.minimize(makespan);

        let solution = solve(&model);
        assert_eq!(solution.status, SolverStatus::Optimal);
        assert_eq!(solution.value(makespan), Some(9));

        let spans: Vec<(i64, i64)> = intervals
            .iter()
            .filter_map(|iv| model.interval(*iv))
            .map(|def| {
                let s = solution.value(def.start).unwrap();
                (s, s + def.duration)
            })
            .collect();
        for (k, a) in spans.iter().enumerate() {
            for b in &spans[k + 1..] {
                assert!(a.1 <= b.0 || b.1 <= a.0, "overlap: {a:?} and {b:?}");
            }
        }
    }

    #[test]
    fn test_optional_interval_dropped() {
        let mut model = CpModel::new("test");
        let s0 = model.new_int_var(0, 0, "s0");
        let s1 = model.new_int_var(0, 1, "s1");
        let p1 = model.new_bool_var("p1");
        let a = model.new_interval(s0, 4, "a");
        let b = model.new_optional_interval(s1, 2, p1, "b");
        model.add_no_overlap(vec![a, b]);
        model.maximize(p1);

        let solution = solve(&model);
        assert_eq!(solution.status, SolverStatus::Optimal);
        assert_eq!(solution.bool_value(p1), Some(false));
    }

    #[test]
    fn test_circuit_tour() {
        // 3 nodes, no self-loops: a Hamiltonian cycle is mandatory
        let mut model = CpModel::new("test");
        let cost = [[0, 1, 5], [5, 0, 1], [1, 5, 0]];
        let mut arcs = Vec::new();
        let mut objective = LinearExpr::new();
        for (tail, row) in cost.iter().enumerate() {
            for (head, &c) in row.iter().enumerate() {
                if tail == head {
                    continue;
                }
                let lit = model.new_bool_var(format!("{tail}->{head}"));
                arcs.push(CircuitArc::new(tail, head, lit));
                objective = objective + lit.as_int() * c;
            }
        }
        model.add_circuit(arcs);
        model.minimize(objective);

        let solution = solve(&model);
        assert_eq!(solution.status, SolverStatus::Optimal);
        assert_eq!(solution.objective_value, Some(3));
    }

    #[test]
    fn test_stop_after_first() {
        let mut model = CpModel::new("test");
        let x = model.new_int_var(0, 100, "x");
        let y = model.new_int_var(0, 100, "y");
        model.add_eq(x + y, 100);
        model.minimize(y);

        // x is branched first, low half first, so the first leaf is y = 100
        let config = SolverConfig::default().with_stop_after_first(true);
        let solution = BacktrackingSolver::new().solve(&model, &config);
        assert_eq!(solution.status, SolverStatus::Feasible);
        assert_eq!(solution.solutions, 1);
        assert_eq!(solution.value(y), Some(100));
    }

    #[test]
    fn test_wide_domain_maximize() {
        let mut model = CpModel::new("test");
        let x = model.new_int_var(0, 200_000, "x");
        model.maximize(x);

        let solution = solve(&model);
        assert_eq!(solution.status, SolverStatus::Optimal);
        assert_eq!(solution.value(x), Some(200_000));
    }

    #[test]
    fn test_long_improvement_chain() {
        // every improving solution lowers y by one
        let mut model = CpModel::new("test");
        let horizon = 50_000;
        let x = model.new_int_var(0, horizon, "x");
        let y = model.new_int_var(0, horizon, "y");
        model.add_eq(x + y, horizon);
        model.minimize(y);

        let solution = solve(&model);
        assert_eq!(solution.status, SolverStatus::Optimal);
        assert_eq!(solution.objective_value, Some(0));
        assert_eq!(solution.value(x), Some(horizon));
        assert!(solution.solutions > 1_000);
    }

    #[test]
    fn test_time_limit_reports_status() {
        let mut model = CpModel::new("test");
        let x = model.new_int_var(0, i64::MAX / 4, "x");
        let y = model.new_int_var(0, i64::MAX / 4, "y");
        model.add_eq(x + y, i64::MAX / 4);
        model.minimize(y);

        let config = SolverConfig::default().with_time_limit_ms(50);
        let solution = BacktrackingSolver::new().solve(&model, &config);
        assert_eq!(solution.status, SolverStatus::Feasible);
        assert!(solution.objective_value.is_some_and(|v| v > 0));
    }

    #[test]
    fn test_seeded_search_still_optimal() {
        let mut model = CpModel::new("test");
        let bools: Vec<_> = (0..6).map(|i| model.new_bool_var(format!("b{i}"))).collect();
        model.add_le(LinearExpr::sum(bools.iter().copied()), 3);
        model.maximize(LinearExpr::sum(bools.iter().copied()));

        let config = SolverConfig::default().with_seed(42).with_num_workers(2);
        let solution = BacktrackingSolver::new().solve(&model, &config);
        assert_eq!(solution.status, SolverStatus::Optimal);
        assert_eq!(solution.objective_value, Some(3));
    }

    #[test]
    fn test_value_of_expr() {
        let mut model = CpModel::new("test");
        let x = model.new_int_var(3, 3, "x");
        let solution = solve(&model);
        assert_eq!(solution.value_of(&(x * 2 + 1)), Some(7));
    }
}
