//! Linear expressions over model variables.

use std::ops::{Add, Mul, Neg, Sub};

use super::variables::{BoolVar, IntVar, Literal};

/// A linear expression `sum(coef * var) + constant`.
///
/// Built from [`IntVar`], [`BoolVar`], [`Literal`] (as 0/1 terms) and
/// integer constants with the usual operators.
///
/// # Examples
///
/// ```
/// use u_ranking::cp::{CpModel, LinearExpr};
///
/// let mut model = CpModel::new("example");
/// let start = model.new_int_var(0, 10, "start");
/// let end = start + 3;
/// assert_eq!(end.constant(), 3);
/// assert_eq!(end.terms(), &[(start, 1)]);
///
/// let doubled: LinearExpr = end * 2;
/// assert_eq!(doubled.constant(), 6);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinearExpr {
    terms: Vec<(IntVar, i64)>,
    constant: i64,
}

impl LinearExpr {
    /// The constant expression 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// A constant expression.
    pub fn constant_value(value: i64) -> Self {
        Self {
            terms: Vec::new(),
            constant: value,
        }
    }

    /// Adds `coef * var` in place.
    pub fn add_term(&mut self, var: IntVar, coef: i64) {
        if coef == 0 {
            return;
        }
        match self.terms.iter_mut().find(|(v, _)| *v == var) {
            Some(term) => term.1 += coef,
            None => self.terms.push((var, coef)),
        }
        self.terms.retain(|&(_, c)| c != 0);
    }

    /// Sum of the given expressions.
    pub fn sum<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<LinearExpr>,
    {
        items
            .into_iter()
            .fold(LinearExpr::new(), |acc, item| acc + item.into())
    }

    /// `(var, coefficient)` pairs with nonzero coefficients.
    pub fn terms(&self) -> &[(IntVar, i64)] {
        &self.terms
    }

    /// Constant offset.
    pub fn constant(&self) -> i64 {
        self.constant
    }

    /// Evaluates the expression given a value lookup, saturating at the
    /// `i64` range.
    pub fn evaluate(&self, value: impl Fn(IntVar) -> i64) -> i64 {
        let wide = self.evaluate_wide(value);
        i64::try_from(wide).unwrap_or(if wide < 0 { i64::MIN } else { i64::MAX })
    }

    /// Exact value in `i128`. Cannot overflow for fewer than 2^62 terms.
    pub(crate) fn evaluate_wide(&self, value: impl Fn(IntVar) -> i64) -> i128 {
        self.terms.iter().fold(self.constant as i128, |acc, &(var, coef)| {
            acc + coef as i128 * value(var) as i128
        })
    }

    fn scaled(mut self, factor: i64) -> Self {
        for term in &mut self.terms {
            term.1 *= factor;
        }
        self.constant *= factor;
        self.terms.retain(|&(_, c)| c != 0);
        self
    }
}

impl From<IntVar> for LinearExpr {
    fn from(var: IntVar) -> Self {
        Self {
            terms: vec![(var, 1)],
            constant: 0,
        }
    }
}

impl From<BoolVar> for LinearExpr {
    fn from(var: BoolVar) -> Self {
        var.as_int().into()
    }
}

impl From<Literal> for LinearExpr {
    fn from(lit: Literal) -> Self {
        let var = lit.var().as_int();
        if lit.is_negated() {
            // !x == 1 - x
            Self {
                terms: vec![(var, -1)],
                constant: 1,
            }
        } else {
            var.into()
        }
    }
}

impl From<i64> for LinearExpr {
    fn from(value: i64) -> Self {
        Self::constant_value(value)
    }
}

impl From<i32> for LinearExpr {
    fn from(value: i32) -> Self {
        Self::constant_value(i64::from(value))
    }
}

impl<T: Into<LinearExpr>> Add<T> for LinearExpr {
    type Output = LinearExpr;

    fn add(mut self, rhs: T) -> LinearExpr {
        let rhs = rhs.into();
        for (var, coef) in rhs.terms {
            self.add_term(var, coef);
        }
        self.constant += rhs.constant;
        self
    }
}

impl<T: Into<LinearExpr>> Sub<T> for LinearExpr {
    type Output = LinearExpr;

    fn sub(self, rhs: T) -> LinearExpr {
        self + rhs.into().scaled(-1)
    }
}

impl Mul<i64> for LinearExpr {
    type Output = LinearExpr;

    fn mul(self, rhs: i64) -> LinearExpr {
        self.scaled(rhs)
    }
}

impl Neg for LinearExpr {
    type Output = LinearExpr;

    fn neg(self) -> LinearExpr {
        self.scaled(-1)
    }
}

impl<T: Into<LinearExpr>> Add<T> for IntVar {
    type Output = LinearExpr;

    fn add(self, rhs: T) -> LinearExpr {
        LinearExpr::from(self) + rhs
    }
}

impl<T: Into<LinearExpr>> Sub<T> for IntVar {
    type Output = LinearExpr;

    fn sub(self, rhs: T) -> LinearExpr {
        LinearExpr::from(self) - rhs
    }
}

impl Mul<i64> for IntVar {
    type Output = LinearExpr;

    fn mul(self, rhs: i64) -> LinearExpr {
        LinearExpr::from(self) * rhs
    }
}

impl Mul<IntVar> for i64 {
    type Output = LinearExpr;

    fn mul(self, rhs: IntVar) -> LinearExpr {
        rhs * self
    }
}
