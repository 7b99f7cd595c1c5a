//! Error types for model construction and ranking encoding.

use thiserror::Error;

/// Structural problem found while validating a [`CpModel`](crate::cp::CpModel).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// A handle refers to a variable that does not exist in this model.
    #[error("undefined variable: #{0}")]
    UnknownVariable(usize),

    /// A literal refers to a variable that was not declared boolean.
    #[error("variable #{0} is used as a literal but is not boolean")]
    NotBoolean(usize),

    /// A handle refers to an interval that does not exist in this model.
    #[error("undefined interval: #{0}")]
    UnknownInterval(usize),

    /// A variable was declared with `min > max`.
    #[error("empty domain for {name}: [{min}, {max}]")]
    EmptyDomain { name: String, min: i64, max: i64 },

    /// An interval was declared with a negative size.
    #[error("interval {name} has negative duration {duration}")]
    NegativeDuration { name: String, duration: i64 },

    /// A linear constraint with `lower > upper`.
    #[error("linear constraint #{index} has empty range [{lower}, {upper}]")]
    EmptyRange { index: usize, lower: i64, upper: i64 },

    /// A circuit constraint with no arcs.
    #[error("circuit constraint #{0} has no arcs")]
    EmptyCircuit(usize),

    /// The same (tail, head) pair appears twice in one circuit.
    #[error("circuit constraint #{index} repeats arc {tail} -> {head}")]
    DuplicateArc {
        index: usize,
        tail: usize,
        head: usize,
    },
}

/// Invalid input handed to the circuit ranking encoder.
///
/// Always returned before anything is posted to the model, so a model that
/// received this error is exactly as the caller left it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RankingError {
    /// The parallel input slices have different lengths.
    #[error(
        "input length mismatch: {starts} starts, {durations} durations, \
         {presences} presences, {ranks} ranks"
    )]
    LengthMismatch {
        starts: usize,
        durations: usize,
        presences: usize,
        ranks: usize,
    },

    /// A task has a zero or negative duration.
    #[error("task {task} has non-positive duration {duration}")]
    NonPositiveDuration { task: usize, duration: i64 },

    /// A rank variable cannot hold every value of `[-1, n-1]`.
    #[error("rank of task {task} has domain [{min}, {max}], needs [-1, {required_max}]")]
    RankDomainTooNarrow {
        task: usize,
        min: i64,
        max: i64,
        required_max: i64,
    },

    /// An input handle does not belong to the target model.
    #[error("task {task} refers to an unknown or non-boolean variable")]
    UnknownVariable { task: usize },
}
