//! CP variable handles.
//!
//! Variables live inside a [`CpModel`](super::CpModel); the types here are
//! small `Copy` handles indexing into the owning model. Boolean variables
//! share the model's variable table with integer variables (domain `[0, 1]`),
//! which lets literals appear directly in linear expressions.

use std::fmt;
use std::ops::Not;

/// Handle to a bounded integer decision variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IntVar(pub(crate) usize);

impl IntVar {
    /// Position of this variable in the model's variable table.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Handle to a boolean decision variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoolVar(pub(crate) usize);

impl BoolVar {
    /// Position of this variable in the model's variable table.
    pub fn index(self) -> usize {
        self.0
    }

    /// The positive literal of this variable.
    pub fn literal(self) -> Literal {
        Literal {
            var: self,
            negated: false,
        }
    }

    /// Views the variable as a 0/1 integer.
    pub fn as_int(self) -> IntVar {
        IntVar(self.0)
    }
}

impl Not for BoolVar {
    type Output = Literal;

    fn not(self) -> Literal {
        !self.literal()
    }
}

impl From<BoolVar> for Literal {
    fn from(var: BoolVar) -> Self {
        var.literal()
    }
}

/// A boolean variable or its negation.
///
/// # Examples
///
/// ```
/// use u_ranking::cp::CpModel;
///
/// let mut model = CpModel::new("example");
/// let present = model.new_bool_var("present");
/// let absent = !present;
/// assert!(absent.is_negated());
/// assert_eq!(!absent, present.literal());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Literal {
    var: BoolVar,
    negated: bool,
}

impl Literal {
    /// The underlying variable.
    pub fn var(self) -> BoolVar {
        self.var
    }

    /// Whether this literal is the negation of its variable.
    pub fn is_negated(self) -> bool {
        self.negated
    }

    /// Truth value of the literal given the 0/1 value of its variable.
    pub fn holds(self, var_value: i64) -> bool {
        (var_value != 0) != self.negated
    }

    /// Variable value (0 or 1) that makes this literal true.
    pub(crate) fn satisfying_value(self) -> i64 {
        if self.negated {
            0
        } else {
            1
        }
    }
}

impl Not for Literal {
    type Output = Literal;

    fn not(self) -> Literal {
        Literal {
            var: self.var,
            negated: !self.negated,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "!b{}", self.var.0)
        } else {
            write!(f, "b{}", self.var.0)
        }
    }
}

/// Handle to an interval variable registered in a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntervalVar(pub(crate) usize);

impl IntervalVar {
    /// Position of this interval in the model's interval table.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Definition of a decision variable stored in the model.
#[derive(Debug, Clone)]
pub struct VarDef {
    /// Variable name (informational; not required to be unique).
    pub name: String,
    /// Minimum value.
    pub min: i64,
    /// Maximum value.
    pub max: i64,
    /// Whether the variable was declared boolean.
    pub is_bool: bool,
}

impl VarDef {
    /// Domain size (max - min + 1), zero for an empty domain.
    pub fn domain_size(&self) -> i64 {
        (self.max - self.min + 1).max(0)
    }

    /// Whether the domain holds a single value.
    pub fn is_fixed(&self) -> bool {
        self.min == self.max
    }

    /// Whether `value` lies within the domain.
    pub fn contains(&self, value: i64) -> bool {
        self.min <= value && value <= self.max
    }
}

/// An interval with a variable start and fixed size.
///
/// `end = start + duration` holds whenever the interval is present.
/// Absent intervals impose nothing on their start.
#[derive(Debug, Clone)]
pub struct IntervalDef {
    /// Interval name.
    pub name: String,
    /// Start time variable.
    pub start: IntVar,
    /// Fixed duration.
    pub duration: i64,
    /// Presence literal; `None` means always present.
    pub presence: Option<Literal>,
}

impl IntervalDef {
    /// Whether this interval can be left out of the schedule.
    pub fn is_optional(&self) -> bool {
        self.presence.is_some()
    }
}
