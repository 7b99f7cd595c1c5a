//! CP model definition.

use std::collections::HashSet;

use super::expr::LinearExpr;
use super::variables::{BoolVar, IntVar, IntervalDef, IntervalVar, Literal, VarDef};
use crate::error::ModelError;

/// One arc of a circuit constraint.
///
/// Selecting the arc (its literal is true) means `head` immediately follows
/// `tail` on the circuit. An arc with `tail == head` is a self-loop: the node
/// is left out of the circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitArc {
    /// Source node.
    pub tail: usize,
    /// Destination node.
    pub head: usize,
    /// Selection literal.
    pub literal: Literal,
}

impl CircuitArc {
    /// Creates an arc.
    pub fn new(tail: usize, head: usize, literal: impl Into<Literal>) -> Self {
        Self {
            tail,
            head,
            literal: literal.into(),
        }
    }

    /// Whether this arc is a self-loop.
    pub fn is_loop(&self) -> bool {
        self.tail == self.head
    }
}

/// `lower <= expr <= upper`, enforced only when every enforcement literal
/// is true.
///
/// `i64::MIN` / `i64::MAX` bounds mean unbounded on that side.
#[derive(Debug, Clone)]
pub struct LinearConstraint {
    /// Left-hand side (constant folded into the bounds).
    pub expr: LinearExpr,
    /// Lower bound.
    pub lower: i64,
    /// Upper bound.
    pub upper: i64,
    /// Conjunction of literals gating the constraint. Empty = always on.
    pub enforcement: Vec<Literal>,
}

impl LinearConstraint {
    /// Whether the constraint holds under a full assignment.
    pub fn is_satisfied(&self, value: impl Fn(IntVar) -> i64) -> bool {
        let active = self
            .enforcement
            .iter()
            .all(|lit| lit.holds(value(lit.var().as_int())));
        if !active {
            return true;
        }
        let v = self.expr.evaluate_wide(value);
        i128::from(self.lower) <= v && v <= i128::from(self.upper)
    }
}

/// A constraint in the CP model.
#[derive(Debug, Clone)]
pub enum Constraint {
    /// Bounded linear expression, optionally gated by literals.
    Linear(LinearConstraint),

    /// `premise => conclusion`.
    Implication {
        premise: Literal,
        conclusion: Literal,
    },

    /// Selected arcs form one simple cycle over the nodes not on their
    /// self-loop (or every node is on its self-loop).
    ///
    /// Every node mentioned by an arc has exactly one selected outgoing and
    /// one selected incoming arc.
    Circuit { arcs: Vec<CircuitArc> },

    /// Present intervals are pairwise disjoint in time.
    NoOverlap { intervals: Vec<IntervalVar> },
}

/// Objective function for the CP model.
#[derive(Debug, Clone)]
pub enum Objective {
    /// Minimize a linear expression.
    Minimize(LinearExpr),
    /// Maximize a linear expression.
    Maximize(LinearExpr),
}

impl Objective {
    /// The expression being optimized.
    pub fn expr(&self) -> &LinearExpr {
        match self {
            Objective::Minimize(e) | Objective::Maximize(e) => e,
        }
    }

    /// Whether `candidate` is strictly better than `incumbent`.
    pub fn improves(&self, candidate: i64, incumbent: i64) -> bool {
        match self {
            Objective::Minimize(_) => candidate < incumbent,
            Objective::Maximize(_) => candidate > incumbent,
        }
    }
}

/// Returned by the `add_*` linear helpers; attaches enforcement literals
/// to the constraint just posted.
pub struct LinearConstraintBuilder<'a> {
    constraints: &'a mut Vec<Constraint>,
    index: usize,
}

impl LinearConstraintBuilder<'_> {
    /// Enforces the constraint only when `literal` is true.
    ///
    /// Calling this several times gates on the conjunction of the literals.
    pub fn only_enforce_if(self, literal: impl Into<Literal>) -> Self {
        if let Some(Constraint::Linear(c)) = self.constraints.get_mut(self.index) {
            c.enforcement.push(literal.into());
        }
        self
    }

    /// Position of the constraint in the model.
    pub fn index(&self) -> usize {
        self.index
    }
}

/// A constraint programming model.
///
/// Contains variables, intervals, constraints, and an optional objective.
///
/// # Examples
///
/// ```
/// use u_ranking::cp::CpModel;
///
/// let mut model = CpModel::new("example");
/// let x = model.new_int_var(0, 10, "x");
/// let y = model.new_int_var(0, 10, "y");
/// let b = model.new_bool_var("b");
/// model.add_ge(y, x + 3).only_enforce_if(b);
/// model.minimize(y);
/// assert!(model.validate().is_ok());
/// assert_eq!(model.constraint_count(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct CpModel {
    /// Model name.
    pub name: String,
    vars: Vec<VarDef>,
    intervals: Vec<IntervalDef>,
    constraints: Vec<Constraint>,
    objective: Option<Objective>,
}

impl CpModel {
    /// Creates a new empty model.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vars: Vec::new(),
            intervals: Vec::new(),
            constraints: Vec::new(),
            objective: None,
        }
    }

    /// Creates a boolean decision variable.
    pub fn new_bool_var(&mut self, name: impl Into<String>) -> BoolVar {
        self.vars.push(VarDef {
            name: name.into(),
            min: 0,
            max: 1,
            is_bool: true,
        });
        BoolVar(self.vars.len() - 1)
    }

    /// Creates an integer decision variable with domain `[min, max]`.
    ///
    /// An empty domain is accepted here and reported by [`validate`](Self::validate).
    pub fn new_int_var(&mut self, min: i64, max: i64, name: impl Into<String>) -> IntVar {
        self.vars.push(VarDef {
            name: name.into(),
            min,
            max,
            is_bool: false,
        });
        IntVar(self.vars.len() - 1)
    }

    /// Creates an integer variable fixed to `value`.
    pub fn new_constant(&mut self, value: i64) -> IntVar {
        self.new_int_var(value, value, value.to_string())
    }

    /// Creates an always-present interval of fixed size.
    pub fn new_interval(
        &mut self,
        start: IntVar,
        duration: i64,
        name: impl Into<String>,
    ) -> IntervalVar {
        self.push_interval(IntervalDef {
            name: name.into(),
            start,
            duration,
            presence: None,
        })
    }

    /// Creates an optional interval of fixed size, present iff `presence`.
    pub fn new_optional_interval(
        &mut self,
        start: IntVar,
        duration: i64,
        presence: impl Into<Literal>,
        name: impl Into<String>,
    ) -> IntervalVar {
        self.push_interval(IntervalDef {
            name: name.into(),
            start,
            duration,
            presence: Some(presence.into()),
        })
    }

    fn push_interval(&mut self, def: IntervalDef) -> IntervalVar {
        self.intervals.push(def);
        IntervalVar(self.intervals.len() - 1)
    }

    /// Posts `lower <= expr <= upper`.
    pub fn add_linear(
        &mut self,
        expr: impl Into<LinearExpr>,
        lower: i64,
        upper: i64,
    ) -> LinearConstraintBuilder<'_> {
        let mut expr = expr.into();
        let offset = expr.constant();
        if offset != 0 {
            expr = expr - offset;
        }
        let shift = |bound: i64| {
            if bound == i64::MIN || bound == i64::MAX {
                bound
            } else {
                bound.saturating_sub(offset)
            }
        };
        self.constraints.push(Constraint::Linear(LinearConstraint {
            expr,
            lower: shift(lower),
            upper: shift(upper),
            enforcement: Vec::new(),
        }));
        LinearConstraintBuilder {
            index: self.constraints.len() - 1,
            constraints: &mut self.constraints,
        }
    }

    /// Posts `lhs == rhs`.
    pub fn add_eq(
        &mut self,
        lhs: impl Into<LinearExpr>,
        rhs: impl Into<LinearExpr>,
    ) -> LinearConstraintBuilder<'_> {
        self.add_linear(lhs.into() - rhs.into(), 0, 0)
    }

    /// Posts `lhs >= rhs`.
    pub fn add_ge(
        &mut self,
        lhs: impl Into<LinearExpr>,
        rhs: impl Into<LinearExpr>,
    ) -> LinearConstraintBuilder<'_> {
        self.add_linear(lhs.into() - rhs.into(), 0, i64::MAX)
    }

    /// Posts `lhs <= rhs`.
    pub fn add_le(
        &mut self,
        lhs: impl Into<LinearExpr>,
        rhs: impl Into<LinearExpr>,
    ) -> LinearConstraintBuilder<'_> {
        self.add_linear(lhs.into() - rhs.into(), i64::MIN, 0)
    }

    /// Posts `lhs < rhs`.
    pub fn add_lt(
        &mut self,
        lhs: impl Into<LinearExpr>,
        rhs: impl Into<LinearExpr>,
    ) -> LinearConstraintBuilder<'_> {
        self.add_linear(lhs.into() - rhs.into(), i64::MIN, -1)
    }

    /// Posts `lhs > rhs`.
    pub fn add_gt(
        &mut self,
        lhs: impl Into<LinearExpr>,
        rhs: impl Into<LinearExpr>,
    ) -> LinearConstraintBuilder<'_> {
        self.add_linear(lhs.into() - rhs.into(), 1, i64::MAX)
    }

    /// Posts `premise => conclusion`.
    pub fn add_implication(&mut self, premise: impl Into<Literal>, conclusion: impl Into<Literal>) {
        self.constraints.push(Constraint::Implication {
            premise: premise.into(),
            conclusion: conclusion.into(),
        });
    }

    /// Posts `a <=> b`.
    pub fn add_bool_eq(&mut self, a: impl Into<Literal>, b: impl Into<Literal>) {
        let (a, b) = (a.into(), b.into());
        self.add_implication(a, b);
        self.add_implication(b, a);
    }

    /// Fixes a literal to `value`.
    pub fn fix_literal(&mut self, literal: impl Into<Literal>, value: bool) {
        let literal = literal.into();
        let target = if value { 1 } else { 0 };
        self.add_linear(literal, target, target);
    }

    /// Posts a circuit constraint over `arcs`.
    pub fn add_circuit(&mut self, arcs: Vec<CircuitArc>) -> usize {
        self.constraints.push(Constraint::Circuit { arcs });
        self.constraints.len() - 1
    }

    /// Posts a no-overlap constraint over `intervals`.
    pub fn add_no_overlap(&mut self, intervals: Vec<IntervalVar>) {
        self.constraints.push(Constraint::NoOverlap { intervals });
    }

    /// Sets the objective to minimize `expr`.
    pub fn minimize(&mut self, expr: impl Into<LinearExpr>) {
        self.objective = Some(Objective::Minimize(expr.into()));
    }

    /// Sets the objective to maximize `expr`.
    pub fn maximize(&mut self, expr: impl Into<LinearExpr>) {
        self.objective = Some(Objective::Maximize(expr.into()));
    }

    /// The objective, if one is set.
    pub fn objective(&self) -> Option<&Objective> {
        self.objective.as_ref()
    }

    /// All variable definitions, indexed by handle.
    pub fn vars(&self) -> &[VarDef] {
        &self.vars
    }

    /// Definition of an integer variable.
    pub fn int_var(&self, var: IntVar) -> Option<&VarDef> {
        self.vars.get(var.0)
    }

    /// Whether `var` exists in this model and is boolean.
    pub fn is_bool_var(&self, var: BoolVar) -> bool {
        self.vars.get(var.0).is_some_and(|v| v.is_bool)
    }

    /// All interval definitions, indexed by handle.
    pub fn intervals(&self) -> &[IntervalDef] {
        &self.intervals
    }

    /// Definition of an interval.
    pub fn interval(&self, var: IntervalVar) -> Option<&IntervalDef> {
        self.intervals.get(var.0)
    }

    /// Posted constraints in posting order.
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Number of variables (booleans included).
    pub fn var_count(&self) -> usize {
        self.vars.len()
    }

    /// Number of boolean variables.
    pub fn bool_var_count(&self) -> usize {
        self.vars.iter().filter(|v| v.is_bool).count()
    }

    /// Number of interval variables.
    pub fn interval_count(&self) -> usize {
        self.intervals.len()
    }

    /// Number of constraints.
    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// Validates the model for consistency.
    ///
    /// Checks that every handle belongs to this model, domains are
    /// non-empty, literals are boolean and circuits are well formed.
    pub fn validate(&self) -> Result<(), ModelError> {
        for def in &self.vars {
            if def.min > def.max {
                return Err(ModelError::EmptyDomain {
                    name: def.name.clone(),
                    min: def.min,
                    max: def.max,
                });
            }
        }

        for def in &self.intervals {
            self.check_var(def.start)?;
            if def.duration < 0 {
                return Err(ModelError::NegativeDuration {
                    name: def.name.clone(),
                    duration: def.duration,
                });
            }
            if let Some(lit) = def.presence {
                self.check_literal(lit)?;
            }
        }

        for (index, constraint) in self.constraints.iter().enumerate() {
            match constraint {
                Constraint::Linear(c) => {
                    for &(var, _) in c.expr.terms() {
                        self.check_var(var)?;
                    }
                    for &lit in &c.enforcement {
                        self.check_literal(lit)?;
                    }
                    if c.lower > c.upper {
                        return Err(ModelError::EmptyRange {
                            index,
                            lower: c.lower,
                            upper: c.upper,
                        });
                    }
                }
                Constraint::Implication {
                    premise,
                    conclusion,
                } => {
                    self.check_literal(*premise)?;
                    self.check_literal(*conclusion)?;
                }
                Constraint::Circuit { arcs } => {
                    if arcs.is_empty() {
                        return Err(ModelError::EmptyCircuit(index));
                    }
                    let mut seen = HashSet::new();
                    for arc in arcs {
                        self.check_literal(arc.literal)?;
                        if !seen.insert((arc.tail, arc.head)) {
                            return Err(ModelError::DuplicateArc {
                                index,
                                tail: arc.tail,
                                head: arc.head,
                            });
                        }
                    }
                }
                Constraint::NoOverlap { intervals } => {
                    for iv in intervals {
                        if self.intervals.get(iv.0).is_none() {
                            return Err(ModelError::UnknownInterval(iv.0));
                        }
                    }
                }
            }
        }

        if let Some(objective) = &self.objective {
            for &(var, _) in objective.expr().terms() {
                self.check_var(var)?;
            }
        }
        Ok(())
    }

    fn check_var(&self, var: IntVar) -> Result<(), ModelError> {
        if var.0 < self.vars.len() {
            Ok(())
        } else {
            Err(ModelError::UnknownVariable(var.0))
        }
    }

    fn check_literal(&self, lit: Literal) -> Result<(), ModelError> {
        let index = lit.var().index();
        match self.vars.get(index) {
            None => Err(ModelError::UnknownVariable(index)),
            Some(def) if !def.is_bool => Err(ModelError::NotBoolean(index)),
            Some(_) => Ok(()),
        }
    }

    /// Returns the index of the first constraint violated by a full
    /// assignment, or `None` if the assignment is a solution.
    ///
    /// `values` is indexed by variable handle. Domains count as constraints:
    /// a value outside its declared domain, a length mismatch, or a model
    /// that fails [`validate`](Self::validate) reports `Some(usize::MAX)`.
    pub fn first_violation(&self, values: &[i64]) -> Option<usize> {
        if values.len() != self.vars.len()
            || self.vars.iter().zip(values).any(|(def, &v)| !def.contains(v))
            || self.validate().is_err()
        {
            return Some(usize::MAX);
        }
        let value = |var: IntVar| values[var.0];
        let holds = |lit: Literal| lit.holds(values[lit.var().index()]);

        self.constraints
            .iter()
            .position(|constraint| match constraint {
                Constraint::Linear(c) => !c.is_satisfied(value),
                Constraint::Implication {
                    premise,
                    conclusion,
                } => holds(*premise) && !holds(*conclusion),
                Constraint::Circuit { arcs } => !circuit_holds(arcs, holds),
                Constraint::NoOverlap { intervals } => !self.no_overlap_holds(intervals, values),
            })
    }

    fn no_overlap_holds(&self, intervals: &[IntervalVar], values: &[i64]) -> bool {
        let present: Vec<&IntervalDef> = intervals
            .iter()
            .filter_map(|iv| self.intervals.get(iv.0))
            .filter(|def| def.presence.map_or(true, |lit| lit.holds(values[lit.var().index()])))
            .filter(|def| def.duration > 0)
            .collect();
        for (k, a) in present.iter().enumerate() {
            for b in &present[k + 1..] {
                let (sa, sb) = (values[a.start.0], values[b.start.0]);
                if sa.saturating_add(a.duration) > sb && sb.saturating_add(b.duration) > sa {
                    return false;
                }
            }
        }
        true
    }
}

/// Checks circuit semantics on a full assignment of the arc literals.
pub(crate) fn circuit_holds(arcs: &[CircuitArc], holds: impl Fn(Literal) -> bool) -> bool {
    let num_nodes = arcs.iter().map(|a| a.tail.max(a.head) + 1).max().unwrap_or(0);
    let mut mentioned = vec![false; num_nodes];
    let mut out_count = vec![0usize; num_nodes];
    let mut in_count = vec![0usize; num_nodes];
    let mut next = vec![None; num_nodes];
    for arc in arcs {
        mentioned[arc.tail] = true;
        mentioned[arc.head] = true;
        if holds(arc.literal) {
            out_count[arc.tail] += 1;
            in_count[arc.head] += 1;
            if !arc.is_loop() {
                next[arc.tail] = Some(arc.head);
            }
        }
    }
    let nodes = (0..num_nodes).filter(|&n| mentioned[n]);
    if nodes.clone().any(|n| out_count[n] != 1 || in_count[n] != 1) {
        return false;
    }

    let on_cycle: Vec<usize> = nodes.filter(|&n| next[n].is_some()).collect();
    let Some(&first) = on_cycle.first() else {
        return true;
    };
    let mut length = 0;
    let mut node = first;
    loop {
        length += 1;
        match next[node] {
            Some(n) if n == first => break,
            Some(n) if length <= on_cycle.len() => node = n,
            _ => return false,
        }
    }
    length == on_cycle.len()
}
