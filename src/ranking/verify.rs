//! Checks a solved assignment against the ranking invariants.

use thiserror::Error;

use super::RankedTask;
use crate::cp::CpSolution;

/// A solved assignment that is not a valid ranking.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RankingViolation {
    /// The solution carries no assignment.
    #[error("no solution to verify")]
    NoSolution,

    /// A task variable has no value in the solution.
    #[error("task {task} has no value in the solution")]
    MissingValue { task: usize },

    /// An absent task carries a rank other than -1.
    #[error("task {task} is absent but ranked {rank}")]
    AbsentRanked { task: usize, rank: i64 },

    /// A present task carries the sentinel rank.
    #[error("task {task} is present but ranked -1")]
    PresentUnranked { task: usize },

    /// Ranks of present tasks are not exactly `0..count`.
    #[error("ranks of {count} present tasks are {ranks:?}, expected 0..{count}")]
    NotDense { count: usize, ranks: Vec<i64> },

    /// A task starts before its immediate predecessor ends.
    #[error("task {next} starts at {start}, before task {prev} ends at {end}")]
    OrderBroken {
        prev: usize,
        next: usize,
        start: i64,
        end: i64,
    },
}

/// Present tasks in rank order, as read from a solution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankOrder {
    tasks: Vec<usize>,
    spans: Vec<(i64, i64)>,
}

impl RankOrder {
    /// Task indices, rank 0 first.
    pub fn tasks(&self) -> &[usize] {
        &self.tasks
    }

    /// `(start, end)` of each task, parallel to [`tasks`](Self::tasks).
    pub fn spans(&self) -> &[(i64, i64)] {
        &self.spans
    }

    /// Number of present tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no task is present.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Task ranked 0.
    pub fn first(&self) -> Option<usize> {
        self.tasks.first().copied()
    }

    /// Task ranked `len - 1`.
    pub fn last(&self) -> Option<usize> {
        self.tasks.last().copied()
    }

    /// Rank of `task`, `None` if absent.
    pub fn rank_of(&self, task: usize) -> Option<usize> {
        self.tasks.iter().position(|&t| t == task)
    }

    /// End of the last present task (0 when none is present).
    pub fn makespan(&self) -> i64 {
        self.spans.iter().map(|&(_, end)| end).max().unwrap_or(0)
    }
}

/// Verifies that `solution` ranks `tasks` correctly and returns the order.
///
/// Checks that absent tasks have rank -1 and present ones do not, that the
/// ranks of present tasks are exactly `0..k`, and that each task starts no
/// earlier than the end of the task ranked just before it.
pub fn verify_ranking(
    solution: &CpSolution,
    tasks: &[RankedTask],
) -> Result<RankOrder, RankingViolation> {
    if !solution.is_solution_found() {
        return Err(RankingViolation::NoSolution);
    }

    let mut present = Vec::new();
    for (task, t) in tasks.iter().enumerate() {
        let (Some(is_present), Some(rank), Some(start)) = (
            solution.bool_value(t.presence),
            solution.value(t.rank),
            solution.value(t.start),
        ) else {
            return Err(RankingViolation::MissingValue { task });
        };
        match (is_present, rank) {
            (true, -1) => return Err(RankingViolation::PresentUnranked { task }),
            (false, -1) => {}
            (false, rank) => return Err(RankingViolation::AbsentRanked { task, rank }),
            (true, rank) => present.push((rank, task, start, start + t.duration)),
        }
    }

    present.sort_unstable();
    let dense = present
        .iter()
        .enumerate()
        .all(|(k, &(rank, ..))| rank == k as i64);
    if !dense {
        return Err(RankingViolation::NotDense {
            count: present.len(),
            ranks: present.iter().map(|&(rank, ..)| rank).collect(),
        });
    }

    for pair in present.windows(2) {
        let (_, prev, _, end) = pair[0];
        let (_, next, start, _) = pair[1];
        if start < end {
            return Err(RankingViolation::OrderBroken {
                prev,
                next,
                start,
                end,
            });
        }
    }

    Ok(RankOrder {
        tasks: present.iter().map(|&(_, task, ..)| task).collect(),
        spans: present.iter().map(|&(.., start, end)| (start, end)).collect(),
    })
}
