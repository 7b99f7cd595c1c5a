//! Ranking of optional intervals through a circuit constraint.
//!
//! Given tasks whose present intervals are already known to be pairwise
//! disjoint (typically through a no-overlap constraint), the encoder posts
//! constraints so that in every solution:
//!
//! - present tasks get ranks `0, 1, ..., k-1` in start-time order,
//! - absent tasks get rank `-1`,
//! - consecutive present tasks respect `start[next] >= start[prev] + duration[prev]`.
//!
//! # Graph
//!
//! A dense directed graph with `n + 1` nodes: node `0` is a depot with no
//! temporal meaning, task `i` is node `i + 1`. Arc `(0, i+1)` selects the
//! first task, `(i+1, 0)` the last one, `(i+1, j+1)` makes `j` the immediate
//! successor of `i`, the self-loop `(i+1, i+1)` marks task `i` absent and the
//! depot self-loop `(0, 0)` marks the case where no task is present. A circuit
//! constraint over all arcs makes the present tasks a single path from and back
//! to the depot; rank arithmetic on the successor arcs turns that path into
//! dense ranks.
//!
//! # Reference
//! Laborie et al. (2018), "IBM ILOG CP Optimizer for Scheduling", sequence variables

mod verify;

pub use verify::{verify_ranking, RankOrder, RankingViolation};

use tracing::debug;

use crate::cp::{CircuitArc, CpModel, IntVar, Literal};
use crate::error::RankingError;

/// Node id of the depot in the ranking graph.
pub const DEPOT: usize = 0;

/// One task to be ranked.
///
/// All handles belong to the model the encoder posts into. The rank
/// variable's domain must cover `[-1, n-1]` for `n` tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankedTask {
    /// Start time variable.
    pub start: IntVar,
    /// Fixed, strictly positive duration.
    pub duration: i64,
    /// True iff the task is scheduled.
    pub presence: Literal,
    /// Position among present tasks, `-1` when absent.
    pub rank: IntVar,
}

impl RankedTask {
    /// Creates a task record.
    pub fn new(start: IntVar, duration: i64, presence: impl Into<Literal>, rank: IntVar) -> Self {
        Self {
            start,
            duration,
            presence: presence.into(),
            rank,
        }
    }
}

/// Time origin assumed for the first present task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StartOrigin {
    /// All tasks share the origin `t = 0`: the first present task starts at 0.
    ///
    /// Posts the redundant `start == 0` under each "first" literal, which
    /// strengthens propagation when nothing else delays the first task.
    #[default]
    Zero,
    /// Tasks may have heterogeneous release times; only the rank of the
    /// first task is fixed.
    Free,
}

/// Meaning of an arc in the ranking graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArcKind {
    /// Depot to task: the task is first.
    First(usize),
    /// Task to depot: the task is last.
    Last(usize),
    /// Task self-loop: the task is absent.
    Absent(usize),
    /// Task `to` immediately follows task `from`.
    Successor { from: usize, to: usize },
    /// Depot self-loop: no task is present.
    Empty,
}

impl ArcKind {
    /// Classifies an arc by its endpoints.
    pub fn of(arc: &CircuitArc) -> Self {
        match (arc.tail, arc.head) {
            (DEPOT, DEPOT) => ArcKind::Empty,
            (DEPOT, head) => ArcKind::First(head - 1),
            (tail, DEPOT) => ArcKind::Last(tail - 1),
            (tail, head) if tail == head => ArcKind::Absent(tail - 1),
            (tail, head) => ArcKind::Successor {
                from: tail - 1,
                to: head - 1,
            },
        }
    }
}

/// Record of what the encoder posted.
///
/// Arcs are stored flat, one block of `n + 2` arcs per task
/// (`first`, `last`, then one arc per task `j` in order, the self-loop at
/// `j == i`), followed by the depot self-loop.
#[derive(Debug, Clone)]
pub struct RankingEncoding {
    arcs: Vec<CircuitArc>,
    empty: Literal,
    circuit: usize,
    num_tasks: usize,
}

impl RankingEncoding {
    /// Every arc handed to the circuit constraint.
    pub fn arcs(&self) -> &[CircuitArc] {
        &self.arcs
    }

    /// Literal of the depot self-loop ("no task is present").
    pub fn empty_literal(&self) -> Literal {
        self.empty
    }

    /// Index of the circuit constraint in the model.
    pub fn circuit_index(&self) -> usize {
        self.circuit
    }

    /// Number of ranked tasks.
    pub fn num_tasks(&self) -> usize {
        self.num_tasks
    }

    fn block(&self, task: usize) -> Option<usize> {
        (task < self.num_tasks).then(|| task * (self.num_tasks + 2))
    }

    /// Literal selecting `task` as the first present task.
    pub fn first_literal(&self, task: usize) -> Option<Literal> {
        self.block(task).map(|b| self.arcs[b].literal)
    }

    /// Literal selecting `task` as the last present task.
    pub fn last_literal(&self, task: usize) -> Option<Literal> {
        self.block(task).map(|b| self.arcs[b + 1].literal)
    }

    /// Literal of the self-loop of `task` (the negated presence).
    pub fn absent_literal(&self, task: usize) -> Option<Literal> {
        self.block(task).map(|b| self.arcs[b + 2 + task].literal)
    }

    /// Literal making `to` the immediate successor of `from`.
    pub fn successor_literal(&self, from: usize, to: usize) -> Option<Literal> {
        if from == to || to >= self.num_tasks {
            return None;
        }
        self.block(from).map(|b| self.arcs[b + 2 + to].literal)
    }
}

/// Builder for the circuit ranking encoding.
///
/// # Example
/// ```
/// use u_ranking::cp::CpModel;
/// use u_ranking::ranking::{CircuitRanking, RankedTask, StartOrigin};
///
/// let mut model = CpModel::new("ranking");
/// let tasks: Vec<RankedTask> = (0..3)
///     .map(|t| {
///         let start = model.new_int_var(0, 50, format!("start[{t}]"));
///         let presence = model.new_bool_var(format!("presence[{t}]"));
///         let rank = model.new_int_var(-1, 2, format!("rank[{t}]"));
///         RankedTask::new(start, t as i64 + 1, presence, rank)
///     })
///     .collect();
///
/// let encoding = CircuitRanking::new(&tasks)
///     .with_start_origin(StartOrigin::Free)
///     .encode(&mut model)
///     .unwrap();
/// assert_eq!(encoding.arcs().len(), 3 * (3 + 2) + 1);
/// ```
#[derive(Debug, Clone)]
pub struct CircuitRanking<'a> {
    tasks: &'a [RankedTask],
    origin: StartOrigin,
}

impl<'a> CircuitRanking<'a> {
    /// Creates an encoder over `tasks`.
    pub fn new(tasks: &'a [RankedTask]) -> Self {
        Self {
            tasks,
            origin: StartOrigin::default(),
        }
    }

    /// Sets the time origin assumption.
    pub fn with_start_origin(mut self, origin: StartOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Checks the input contract against `model` without posting anything.
    pub fn validate(&self, model: &CpModel) -> Result<(), RankingError> {
        let required_max = self.tasks.len() as i64 - 1;
        for (task, t) in self.tasks.iter().enumerate() {
            let (Some(_), Some(rank)) = (model.int_var(t.start), model.int_var(t.rank)) else {
                return Err(RankingError::UnknownVariable { task });
            };
            if !model.is_bool_var(t.presence.var()) {
                return Err(RankingError::UnknownVariable { task });
            }
            if t.duration <= 0 {
                return Err(RankingError::NonPositiveDuration {
                    task,
                    duration: t.duration,
                });
            }
            if rank.min > -1 || rank.max < required_max {
                return Err(RankingError::RankDomainTooNarrow {
                    task,
                    min: rank.min,
                    max: rank.max,
                    required_max,
                });
            }
        }
        Ok(())
    }

    /// Posts the ranking constraints into `model`.
    ///
    /// On error nothing has been posted.
    pub fn encode(&self, model: &mut CpModel) -> Result<RankingEncoding, RankingError> {
        self.validate(model)?;

        let n = self.tasks.len();
        let mut arcs = Vec::with_capacity(n * (n + 2) + 1);

        for (i, task) in self.tasks.iter().enumerate() {
            let node = i + 1;

            let first = model.new_bool_var(format!("first_{i}"));
            arcs.push(CircuitArc::new(DEPOT, node, first));
            model.add_eq(task.rank, 0).only_enforce_if(first);
            if self.origin == StartOrigin::Zero {
                model.add_eq(task.start, 0).only_enforce_if(first);
            }

            let last = model.new_bool_var(format!("last_{i}"));
            arcs.push(CircuitArc::new(node, DEPOT, last));

            for (j, other) in self.tasks.iter().enumerate() {
                if i == j {
                    let absent = !task.presence;
                    arcs.push(CircuitArc::new(node, node, absent));
                    model.add_eq(task.rank, -1).only_enforce_if(absent);
                } else {
                    let follows = model.new_bool_var(format!("arc_{i}_to_{j}"));
                    arcs.push(CircuitArc::new(node, j + 1, follows));
                    model
                        .add_eq(other.rank, task.rank + 1)
                        .only_enforce_if(follows);
                    // Inequality only: idle gaps between consecutive tasks are legal.
                    model
                        .add_ge(other.start, task.start + task.duration)
                        .only_enforce_if(follows);
                }
            }
        }

        let empty = model.new_bool_var("empty").literal();
        arcs.push(CircuitArc::new(DEPOT, DEPOT, empty));
        for task in self.tasks {
            model.add_implication(empty, !task.presence);
        }

        let circuit = model.add_circuit(arcs.clone());
        debug!(
            tasks = n,
            arcs = arcs.len(),
            origin = ?self.origin,
            constraints = model.constraint_count(),
            "posted circuit ranking"
        );

        Ok(RankingEncoding {
            arcs,
            empty,
            circuit,
            num_tasks: n,
        })
    }
}

/// Ranks tasks given as parallel slices, assuming a shared origin at 0.
///
/// `ranks[i]` ends up `-1` iff task `i` is absent; present tasks get dense
/// ranks in start order. Any two present tasks must already be constrained
/// to be disjoint.
pub fn rank_tasks_with_circuit(
    model: &mut CpModel,
    starts: &[IntVar],
    durations: &[i64],
    presences: &[Literal],
    ranks: &[IntVar],
) -> Result<RankingEncoding, RankingError> {
    let n = starts.len();
    if durations.len() != n || presences.len() != n || ranks.len() != n {
        return Err(RankingError::LengthMismatch {
            starts: n,
            durations: durations.len(),
            presences: presences.len(),
            ranks: ranks.len(),
        });
    }
    let tasks: Vec<RankedTask> = (0..n)
        .map(|i| RankedTask::new(starts[i], durations[i], presences[i], ranks[i]))
        .collect();
    CircuitRanking::new(&tasks).encode(model)
}
