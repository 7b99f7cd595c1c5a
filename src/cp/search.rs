//! Depth-first search with bounds propagation.
//!
//! Domains are kept as `[lb, ub]` pairs indexed by variable handle. Each
//! node propagates every constraint to a fixpoint, then branches: booleans
//! first (model order), then the integer with the smallest lower bound,
//! split at the midpoint of its domain. The lower half is tried first unless
//! the objective rewards larger values of that variable. Objectives are
//! handled by branch-and-bound: each improving solution posts a cut requiring
//! a strictly better objective.

use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use super::expr::LinearExpr;
use super::model::{CircuitArc, Constraint, CpModel, LinearConstraint, Objective};
use super::variables::{IntervalDef, Literal};

type Domains = Vec<(i64, i64)>;

/// Raised when propagation empties a domain.
#[derive(Debug)]
struct Conflict;

type Propagation = Result<(), Conflict>;

/// Why a search run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopReason {
    /// The whole tree was explored.
    Exhausted,
    /// Wall-clock deadline hit.
    TimeLimit,
    /// Node budget spent.
    NodeLimit,
    /// A solution was found and the run was asked to stop there.
    FirstSolution,
}

/// Budget shared by the workers of one solve.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SearchLimits {
    pub deadline: Option<Instant>,
    pub max_nodes: u64,
    pub stop_after_first: bool,
}

/// Result of one search run.
#[derive(Debug, Clone)]
pub(crate) struct SearchOutcome {
    pub best: Option<Vec<i64>>,
    pub objective: Option<i64>,
    pub stop: StopReason,
    pub nodes: u64,
    pub solutions: u64,
}

/// Decision taken at a search node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Branch {
    /// Boolean `var = value`, then `var = 1 - value`.
    Fix { var: usize, value: i64 },
    /// Integer `var <= mid` and `var > mid`, upper half first if `high_first`.
    Split {
        var: usize,
        mid: i64,
        high_first: bool,
    },
}

impl Branch {
    /// Child domains, the one to explore first leading.
    fn split(self, domains: Domains) -> (Domains, Domains) {
        let mut left = domains.clone();
        let mut right = domains;
        match self {
            Branch::Fix { var, value } => {
                left[var] = (value, value);
                right[var] = (1 - value, 1 - value);
            }
            Branch::Split {
                var,
                mid,
                high_first,
            } => {
                left[var].1 = mid;
                right[var].0 = mid + 1;
                if high_first {
                    return (right, left);
                }
            }
        }
        (left, right)
    }
}

/// Adjacency of one circuit constraint.
struct CircuitGraph<'m> {
    arcs: &'m [CircuitArc],
    nodes: Vec<usize>,
    out: Vec<Vec<usize>>,
    inc: Vec<Vec<usize>>,
    self_loop: Vec<Option<usize>>,
}

impl<'m> CircuitGraph<'m> {
    fn new(arcs: &'m [CircuitArc]) -> Self {
        let num_nodes = arcs
            .iter()
            .map(|a| a.tail.max(a.head) + 1)
            .max()
            .unwrap_or(0);
        let mut out = vec![Vec::new(); num_nodes];
        let mut inc = vec![Vec::new(); num_nodes];
        let mut self_loop = vec![None; num_nodes];
        for (k, arc) in arcs.iter().enumerate() {
            out[arc.tail].push(k);
            inc[arc.head].push(k);
            if arc.is_loop() {
                self_loop[arc.tail] = Some(k);
            }
        }
        let nodes = (0..num_nodes)
            .filter(|&n| !out[n].is_empty() || !inc[n].is_empty())
            .collect();
        Self {
            arcs,
            nodes,
            out,
            inc,
            self_loop,
        }
    }
}

pub(crate) struct Search<'m> {
    model: &'m CpModel,
    circuits: Vec<CircuitGraph<'m>>,
    bool_vars: Vec<usize>,
    high_first: Vec<bool>,
    limits: SearchLimits,
    rng: Option<StdRng>,
    cut: Option<LinearConstraint>,
    best: Option<Vec<i64>>,
    best_objective: Option<i64>,
    nodes: u64,
    solutions: u64,
    stop: Option<StopReason>,
}

impl<'m> Search<'m> {
    /// Prepares a search over a validated model.
    pub fn new(model: &'m CpModel, limits: SearchLimits, seed: Option<u64>) -> Self {
        let circuits = model
            .constraints()
            .iter()
            .filter_map(|c| match c {
                Constraint::Circuit { arcs } => Some(CircuitGraph::new(arcs)),
                _ => None,
            })
            .collect();
        let bool_vars = model
            .vars()
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_bool)
            .map(|(i, _)| i)
            .collect();
        let mut high_first = vec![false; model.var_count()];
        if let Some(objective) = model.objective() {
            for &(var, coef) in objective.expr().terms() {
                if let Some(slot) = high_first.get_mut(var.index()) {
                    *slot = match objective {
                        Objective::Minimize(_) => coef < 0,
                        Objective::Maximize(_) => coef > 0,
                    };
                }
            }
        }
        Self {
            model,
            circuits,
            bool_vars,
            high_first,
            limits,
            rng: seed.map(StdRng::seed_from_u64),
            cut: None,
            best: None,
            best_objective: None,
            nodes: 0,
            solutions: 0,
            stop: None,
        }
    }

    /// Explores the search tree until exhaustion or a limit.
    ///
    /// Open nodes live on an explicit stack, so memory grows with the
    /// branching depth and never with the call stack.
    pub fn run(mut self) -> SearchOutcome {
        let root: Domains = self.model.vars().iter().map(|v| (v.min, v.max)).collect();
        let mut open = vec![root];
        while let Some(mut domains) = open.pop() {
            if self.should_stop() {
                break;
            }
            self.nodes += 1;
            if self.propagate(&mut domains).is_err() {
                continue;
            }
            let Some(branch) = self.choose_branch(&domains) else {
                self.record_solution(&domains);
                continue;
            };
            trace!(?branch, nodes = self.nodes, "branch");
            let (left, right) = branch.split(domains);
            open.push(right);
            open.push(left);
        }
        SearchOutcome {
            best: self.best,
            objective: self.best_objective,
            stop: self.stop.unwrap_or(StopReason::Exhausted),
            nodes: self.nodes,
            solutions: self.solutions,
        }
    }

    fn should_stop(&mut self) -> bool {
        if self.stop.is_some() {
            return true;
        }
        if self.limits.max_nodes > 0 && self.nodes >= self.limits.max_nodes {
            self.stop = Some(StopReason::NodeLimit);
        } else if self
            .limits
            .deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
        {
            self.stop = Some(StopReason::TimeLimit);
        }
        self.stop.is_some()
    }

    fn choose_branch(&mut self, d: &Domains) -> Option<Branch> {
        if let Some(&var) = self.bool_vars.iter().find(|&&v| d[v].0 < d[v].1) {
            let value = match &mut self.rng {
                Some(rng) => i64::from(rng.random_bool(0.5)),
                None => 0,
            };
            return Some(Branch::Fix { var, value });
        }
        (0..d.len())
            .filter(|&v| d[v].0 < d[v].1)
            .min_by_key(|&v| (d[v].0, v))
            .map(|var| {
                let (lb, ub) = d[var];
                let mid = (lb as i128 + ub as i128).div_euclid(2) as i64;
                Branch::Split {
                    var,
                    mid,
                    high_first: self.high_first[var],
                }
            })
    }

    fn record_solution(&mut self, d: &Domains) {
        let values: Vec<i64> = d.iter().map(|&(lb, _)| lb).collect();
        if let Some(index) = self.model.first_violation(&values) {
            debug!(constraint = index, "leaf rejected by final check");
            return;
        }
        self.solutions += 1;

        let model = self.model;
        match model.objective() {
            Some(objective) => {
                let value = objective.expr().evaluate(|var| values[var.index()]);
                debug!(objective = value, nodes = self.nodes, "improving solution");
                self.cut = Some(improvement_cut(objective, value));
                self.best_objective = Some(value);
            }
            None => self.stop = Some(StopReason::FirstSolution),
        }
        self.best = Some(values);
        if self.limits.stop_after_first {
            self.stop = Some(StopReason::FirstSolution);
        }
    }

    fn propagate(&self, d: &mut Domains) -> Propagation {
        loop {
            let mut changed = false;
            for constraint in self.model.constraints() {
                match constraint {
                    Constraint::Linear(c) => propagate_linear(c, d, &mut changed)?,
                    Constraint::Implication {
                        premise,
                        conclusion,
                    } => propagate_implication(*premise, *conclusion, d, &mut changed)?,
                    Constraint::NoOverlap { intervals } => {
                        let defs: Vec<&IntervalDef> = intervals
                            .iter()
                            .filter_map(|iv| self.model.interval(*iv))
                            .collect();
                        propagate_no_overlap(&defs, d, &mut changed)?;
                    }
                    Constraint::Circuit { .. } => {}
                }
            }
            for graph in &self.circuits {
                propagate_circuit(graph, d, &mut changed)?;
            }
            if let Some(cut) = &self.cut {
                propagate_linear(cut, d, &mut changed)?;
            }
            if !changed {
                return Ok(());
            }
        }
    }
}

/// Constraint demanding a strictly better objective than `value`.
fn improvement_cut(objective: &Objective, value: i64) -> LinearConstraint {
    let (lower, upper) = match objective {
        Objective::Minimize(_) => (i64::MIN, value.saturating_sub(1)),
        Objective::Maximize(_) => (value.saturating_add(1), i64::MAX),
    };
    LinearConstraint {
        expr: objective.expr().clone(),
        lower,
        upper,
        enforcement: Vec::new(),
    }
}

fn tighten_min(d: &mut Domains, var: usize, value: i128, changed: &mut bool) -> Propagation {
    let (lb, ub) = d[var];
    if value <= lb as i128 {
        return Ok(());
    }
    if value > ub as i128 {
        return Err(Conflict);
    }
    d[var].0 = value as i64;
    *changed = true;
    Ok(())
}

fn tighten_max(d: &mut Domains, var: usize, value: i128, changed: &mut bool) -> Propagation {
    let (lb, ub) = d[var];
    if value >= ub as i128 {
        return Ok(());
    }
    if value < lb as i128 {
        return Err(Conflict);
    }
    d[var].1 = value as i64;
    *changed = true;
    Ok(())
}

fn lit_value(d: &Domains, lit: Literal) -> Option<bool> {
    let (lb, ub) = d[lit.var().index()];
    (lb == ub).then(|| lit.holds(lb))
}

fn set_lit(d: &mut Domains, lit: Literal, value: bool, changed: &mut bool) -> Propagation {
    let target = if value {
        lit.satisfying_value()
    } else {
        1 - lit.satisfying_value()
    } as i128;
    let var = lit.var().index();
    tighten_min(d, var, target, changed)?;
    tighten_max(d, var, target, changed)
}

fn div_floor(a: i128, b: i128) -> i128 {
    let q = a / b;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

fn div_ceil(a: i128, b: i128) -> i128 {
    let q = a / b;
    if a % b != 0 && ((a < 0) == (b < 0)) {
        q + 1
    } else {
        q
    }
}

fn activity(expr: &LinearExpr, d: &Domains) -> (i128, i128) {
    let c = expr.constant() as i128;
    expr.terms().iter().fold((c, c), |(lo, hi), &(var, coef)| {
        let (lb, ub) = d[var.index()];
        let (a, b) = (coef as i128 * lb as i128, coef as i128 * ub as i128);
        (lo + a.min(b), hi + a.max(b))
    })
}

fn propagate_linear(c: &LinearConstraint, d: &mut Domains, changed: &mut bool) -> Propagation {
    let mut open = None;
    let mut open_count = 0;
    for &lit in &c.enforcement {
        match lit_value(d, lit) {
            Some(false) => return Ok(()),
            Some(true) => {}
            None => {
                open_count += 1;
                open = Some(lit);
            }
        }
    }

    let lower = (c.lower != i64::MIN).then_some(c.lower as i128);
    let upper = (c.upper != i64::MAX).then_some(c.upper as i128);
    let (min_act, max_act) = activity(&c.expr, d);
    let infeasible = upper.is_some_and(|u| min_act > u) || lower.is_some_and(|l| max_act < l);

    if open_count > 0 {
        // Contrapositive: the constraint cannot hold, so the last open gate is off.
        if let (true, 1, Some(lit)) = (infeasible, open_count, open) {
            set_lit(d, lit, false, changed)?;
        }
        return Ok(());
    }
    if infeasible {
        return Err(Conflict);
    }

    for &(var, coef) in c.expr.terms() {
        let (lb, ub) = d[var.index()];
        let (a, b) = (coef as i128 * lb as i128, coef as i128 * ub as i128);
        let (term_min, term_max) = (a.min(b), a.max(b));
        let coef = coef as i128;
        let var = var.index();
        if let Some(u) = upper {
            let room = u - (min_act - term_min);
            if coef > 0 {
                tighten_max(d, var, div_floor(room, coef), changed)?;
            } else {
                tighten_min(d, var, div_ceil(room, coef), changed)?;
            }
        }
        if let Some(l) = lower {
            let need = l - (max_act - term_max);
            if coef > 0 {
                tighten_min(d, var, div_ceil(need, coef), changed)?;
            } else {
                tighten_max(d, var, div_floor(need, coef), changed)?;
            }
        }
    }
    Ok(())
}

fn propagate_implication(
    premise: Literal,
    conclusion: Literal,
    d: &mut Domains,
    changed: &mut bool,
) -> Propagation {
    if lit_value(d, premise) == Some(true) {
        set_lit(d, conclusion, true, changed)?;
    }
    if lit_value(d, conclusion) == Some(false) {
        set_lit(d, premise, false, changed)?;
    }
    Ok(())
}

/// Exactly one arc of `candidates` is selected.
fn exactly_one(
    arcs: &[CircuitArc],
    candidates: &[usize],
    d: &mut Domains,
    changed: &mut bool,
) -> Propagation {
    let mut selected = None;
    let mut open = None;
    let mut open_count = 0;
    for &k in candidates {
        match lit_value(d, arcs[k].literal) {
            Some(true) if selected.is_some() => return Err(Conflict),
            Some(true) => selected = Some(k),
            Some(false) => {}
            None => {
                open_count += 1;
                open = Some(k);
            }
        }
    }
    match (selected, open) {
        (Some(chosen), _) => {
            for &k in candidates {
                if k != chosen {
                    set_lit(d, arcs[k].literal, false, changed)?;
                }
            }
            Ok(())
        }
        (None, None) => Err(Conflict),
        (None, Some(k)) if open_count == 1 => set_lit(d, arcs[k].literal, true, changed),
        (None, Some(_)) => Ok(()),
    }
}

fn propagate_circuit(g: &CircuitGraph<'_>, d: &mut Domains, changed: &mut bool) -> Propagation {
    for &node in &g.nodes {
        exactly_one(g.arcs, &g.out[node], d, changed)?;
        exactly_one(g.arcs, &g.inc[node], d, changed)?;
    }

    let mut next = vec![None; g.out.len()];
    for arc in g.arcs {
        if !arc.is_loop() && lit_value(d, arc.literal) == Some(true) {
            next[arc.tail] = Some(arc.head);
        }
    }

    // Once a cycle closes, every node off it must sit on its self-loop.
    let mut visited = vec![false; next.len()];
    for &start in &g.nodes {
        if visited[start] || next[start].is_none() {
            continue;
        }
        let mut on_path = vec![false; next.len()];
        on_path[start] = true;
        visited[start] = true;
        let mut node = start;
        let closed = loop {
            match next[node] {
                Some(n) if n == start => break true,
                Some(n) if !visited[n] => {
                    visited[n] = true;
                    on_path[n] = true;
                    node = n;
                }
                _ => break false,
            }
        };
        if !closed {
            continue;
        }
        for &other in &g.nodes {
            if on_path[other] {
                continue;
            }
            match g.self_loop[other] {
                Some(k) => set_lit(d, g.arcs[k].literal, true, changed)?,
                None => return Err(Conflict),
            }
        }
        break;
    }
    Ok(())
}

fn presence_value(d: &Domains, def: &IntervalDef) -> Option<bool> {
    match def.presence {
        Some(lit) => lit_value(d, lit),
        None => Some(true),
    }
}

fn propagate_no_overlap(defs: &[&IntervalDef], d: &mut Domains, changed: &mut bool) -> Propagation {
    for (k, a) in defs.iter().enumerate() {
        for b in &defs[k + 1..] {
            if a.duration == 0 || b.duration == 0 {
                continue;
            }
            let (pa, pb) = (presence_value(d, a), presence_value(d, b));
            if pa == Some(false) || pb == Some(false) {
                continue;
            }
            let (sa, sb) = (a.start.index(), b.start.index());
            let a_first = d[sa].0.saturating_add(a.duration) <= d[sb].1;
            let b_first = d[sb].0.saturating_add(b.duration) <= d[sa].1;

            match (pa, pb) {
                (Some(true), Some(true)) => match (a_first, b_first) {
                    (false, false) => return Err(Conflict),
                    (true, false) => {
                        tighten_min(d, sb, d[sa].0 as i128 + a.duration as i128, changed)?;
                        tighten_max(d, sa, d[sb].1 as i128 - a.duration as i128, changed)?;
                    }
                    (false, true) => {
                        tighten_min(d, sa, d[sb].0 as i128 + b.duration as i128, changed)?;
                        tighten_max(d, sb, d[sa].1 as i128 - b.duration as i128, changed)?;
                    }
                    (true, true) => {}
                },
                (Some(true), None) if !a_first && !b_first => {
                    if let Some(lit) = b.presence {
                        set_lit(d, lit, false, changed)?;
                    }
                }
                (None, Some(true)) if !a_first && !b_first => {
                    if let Some(lit) = a.presence {
                        set_lit(d, lit, false, changed)?;
                    }
                }
                _ => {}
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cp::CpModel;

    fn limits() -> SearchLimits {
        SearchLimits {
            deadline: None,
            max_nodes: 0,
            stop_after_first: false,
        }
    }

    fn root(model: &CpModel) -> Domains {
        model.vars().iter().map(|v| (v.min, v.max)).collect()
    }

    #[test]
    fn test_division_rounding() {
        assert_eq!(div_floor(7, 2), 3);
        assert_eq!(div_floor(-7, 2), -4);
        assert_eq!(div_ceil(7, 2), 4);
        assert_eq!(div_ceil(-7, 2), -3);
        assert_eq!(div_ceil(7, -2), -3);
        assert_eq!(div_floor(6, 3), 2);
    }

    #[test]
    fn test_branch_split() {
        let d = vec![(0, 1), (-3, 10)];
        let low = Branch::Split {
            var: 1,
            mid: 3,
            high_first: false,
        };
        assert_eq!(low.split(d.clone()), (vec![(0, 1), (-3, 3)], vec![(0, 1), (4, 10)]));
        let high = Branch::Split {
            var: 1,
            mid: 3,
            high_first: true,
        };
        assert_eq!(high.split(d.clone()).0, vec![(0, 1), (4, 10)]);
        let fix = Branch::Fix { var: 0, value: 1 };
        assert_eq!(fix.split(d), (vec![(1, 1), (-3, 10)], vec![(0, 0), (-3, 10)]));
    }

    #[test]
    fn test_maximized_var_branches_high() {
        let mut model = CpModel::new("t");
        let x = model.new_int_var(-5, 1_000_000, "x");
        model.maximize(x);

        let outcome = Search::new(&model, limits(), None).run();
        assert_eq!(outcome.stop, StopReason::Exhausted);
        assert_eq!(outcome.objective, Some(1_000_000));
        assert_eq!(outcome.solutions, 1);
    }

    #[test]
    fn test_linear_bounds() {
        let mut model = CpModel::new("t");
        let x = model.new_int_var(0, 10, "x");
        let y = model.new_int_var(0, 10, "y");
        model.add_ge(y, x + 4);

        let search = Search::new(&model, limits(), None);
        let mut d = root(&model);
        search.propagate(&mut d).unwrap();
        assert_eq!(d[x.index()], (0, 6));
        assert_eq!(d[y.index()], (4, 10));
    }

    #[test]
    fn test_enforcement_contrapositive() {
        let mut model = CpModel::new("t");
        let x = model.new_int_var(5, 10, "x");
        let b = model.new_bool_var("b");
        model.add_eq(x, 0).only_enforce_if(b);

        let search = Search::new(&model, limits(), None);
        let mut d = root(&model);
        search.propagate(&mut d).unwrap();
        assert_eq!(d[b.index()], (0, 0));
    }

    #[test]
    fn test_implication_both_ways() {
        let mut model = CpModel::new("t");
        let a = model.new_bool_var("a");
        let b = model.new_bool_var("b");
        model.add_implication(a, !b);
        model.fix_literal(b, true);

        let search = Search::new(&model, limits(), None);
        let mut d = root(&model);
        search.propagate(&mut d).unwrap();
        assert_eq!(d[a.index()], (0, 0));
    }

    #[test]
    fn test_circuit_exactly_one() {
        let mut model = CpModel::new("t");
        let ab = model.new_bool_var("ab");
        let ba = model.new_bool_var("ba");
        let aa = model.new_bool_var("aa");
        let bb = model.new_bool_var("bb");
        model.add_circuit(vec![
            CircuitArc::new(0, 1, ab),
            CircuitArc::new(1, 0, ba),
            CircuitArc::new(0, 0, aa),
            CircuitArc::new(1, 1, bb),
        ]);
        model.fix_literal(ab, true);

        let search = Search::new(&model, limits(), None);
        let mut d = root(&model);
        search.propagate(&mut d).unwrap();
        assert_eq!(d[aa.index()], (0, 0));
        assert_eq!(d[bb.index()], (0, 0));
        assert_eq!(d[ba.index()], (1, 1));
    }

    #[test]
    fn test_closed_cycle_forces_loops() {
        let mut model = CpModel::new("t");
        let mut arcs = Vec::new();
        let mut lits = Vec::new();
        for tail in 0..3 {
            for head in 0..3 {
                let lit = model.new_bool_var(format!("{tail}->{head}"));
                arcs.push(CircuitArc::new(tail, head, lit));
                lits.push(lit);
            }
        }
        model.add_circuit(arcs);
        // 0 -> 1 -> 0 closes a cycle, so node 2 must loop
        model.fix_literal(lits[1], true);
        model.fix_literal(lits[3], true);

        let search = Search::new(&model, limits(), None);
        let mut d = root(&model);
        search.propagate(&mut d).unwrap();
        assert_eq!(d[lits[8].index()], (1, 1));
    }

    #[test]
    fn test_no_overlap_orders_pair() {
        let mut model = CpModel::new("t");
        let s0 = model.new_int_var(0, 2, "s0");
        let s1 = model.new_int_var(0, 10, "s1");
        let a = model.new_interval(s0, 5, "a");
        let b = model.new_interval(s1, 3, "b");
        model.add_no_overlap(vec![a, b]);
        // b cannot end before a can start
        model.add_ge(s1, 1);

        let search = Search::new(&model, limits(), None);
        let mut d = root(&model);
        search.propagate(&mut d).unwrap();
        assert!(d[s1.index()].0 >= 5);
    }

    #[test]
    fn test_minimize_explores_to_optimum() {
        let mut model = CpModel::new("t");
        let x = model.new_int_var(0, 20, "x");
        let y = model.new_int_var(0, 20, "y");
        model.add_ge(x + y, 7);
        model.minimize(x * 2 + y);

        let outcome = Search::new(&model, limits(), None).run();
        assert_eq!(outcome.stop, StopReason::Exhausted);
        assert_eq!(outcome.objective, Some(7));
    }

    #[test]
    fn test_node_limit() {
        let mut model = CpModel::new("t");
        for i in 0..20 {
            model.new_bool_var(format!("b{i}"));
        }
        let x = model.new_int_var(0, 1000, "x");
        model.maximize(x);

        let outcome = Search::new(
            &model,
            SearchLimits {
                max_nodes: 5,
                ..limits()
            },
            None,
        )
        .run();
        assert_eq!(outcome.stop, StopReason::NodeLimit);
        assert_eq!(outcome.nodes, 5);
    }
}
