//! A linear and mixed-integer linear programming solver over a dense simplex
//! tableau, for problems up to a few thousand variables and constraints.
//!
//! A model is a set of named two-sided constraints plus an ordered list of
//! named variables, each contributing coefficients to the constraints it
//! touches. The objective is itself just a named linear combination (and may
//! legally appear among the constraints). All variables are implicitly
//! non-negative; individual variables can be restricted to integers or to
//! {0, 1}.
//!
//! ```
//! use tablo::{Bounds, Model, OptimizationDirection, Status};
//!
//! let mut model = Model::new(OptimizationDirection::Maximize);
//! model.optimize("profit");
//! model.add_constraint("wood", Bounds::max(300.0));
//! model.add_constraint("labor", Bounds::max(110.0));
//! model.add_variable("table", [("wood", 30.0), ("labor", 5.0), ("profit", 1200.0)]);
//! model.add_variable("dresser", [("wood", 20.0), ("labor", 10.0), ("profit", 1600.0)]);
//! model.set_integers(true);
//!
//! let solution = model.solve();
//! assert_eq!(solution.status(), Status::Optimal);
//! assert_eq!(solution.objective(), 19200.0);
//! assert_eq!(solution["table"], 4.0);
//! assert_eq!(solution["dresser"], 9.0);
//! ```
//!
//! Failures are reported through [`Status`], never by panicking: an
//! over-constrained model comes back [`Status::Infeasible`] with a NaN
//! objective, an unbounded one comes back [`Status::Unbounded`] with an
//! infinite objective.

#[macro_use]
extern crate log;

mod branch;
mod helpers;
mod simplex;
mod tableau;

use std::time::Duration;

/// Whether the objective should be maximized or minimized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptimizationDirection {
    Maximize,
    Minimize,
}

impl Default for OptimizationDirection {
    fn default() -> Self {
        OptimizationDirection::Maximize
    }
}

/// Two-sided bounds for one named linear combination of variables.
///
/// `equal` takes precedence: `Bounds::equal(v)` is exactly
/// `Bounds::range(v, v)`, even when `min`/`max` are also present. A side
/// that is absent is unbounded; a descriptor with `min > max` is accepted
/// here and surfaces as an infeasible solve.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Bounds {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub equal: Option<f64>,
}

impl Bounds {
    /// Lower bound only: the combination must stay `>= value`.
    pub fn min(value: f64) -> Bounds {
        Bounds {
            min: Some(value),
            ..Bounds::default()
        }
    }

    /// Upper bound only: the combination must stay `<= value`.
    pub fn max(value: f64) -> Bounds {
        Bounds {
            max: Some(value),
            ..Bounds::default()
        }
    }

    /// The combination must equal `value` exactly.
    pub fn equal(value: f64) -> Bounds {
        Bounds {
            equal: Some(value),
            ..Bounds::default()
        }
    }

    /// Two-sided bound.
    pub fn range(min: f64, max: f64) -> Bounds {
        Bounds {
            min: Some(min),
            max: Some(max),
            equal: None,
        }
    }

    /// Resolved (lower, upper) pair with absent sides mapped to infinities.
    pub(crate) fn resolved(&self) -> (f64, f64) {
        if let Some(value) = self.equal {
            (value, value)
        } else {
            (
                self.min.unwrap_or(f64::NEG_INFINITY),
                self.max.unwrap_or(f64::INFINITY),
            )
        }
    }
}

/// An ordered sequence of (constraint key, coefficient) pairs describing one
/// variable's contributions. Duplicate keys are kept; the last entry for a
/// key wins when the tableau is built.
#[derive(Clone, Debug, Default)]
pub struct LinearExpr {
    keys: Vec<String>,
    coeffs: Vec<f64>,
}

impl LinearExpr {
    pub fn empty() -> Self {
        Self {
            keys: vec![],
            coeffs: vec![],
        }
    }

    pub fn add(&mut self, key: impl Into<String>, coeff: f64) {
        self.keys.push(key.into());
        self.coeffs.push(coeff);
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.keys
            .iter()
            .map(|key| key.as_str())
            .zip(self.coeffs.iter().copied())
    }
}

pub struct LinearTerm(String, f64);

impl<S: Into<String>> From<(S, f64)> for LinearTerm {
    fn from(term: (S, f64)) -> Self {
        LinearTerm(term.0.into(), term.1)
    }
}

impl<'a, S: Copy + Into<String>> From<&'a (S, f64)> for LinearTerm {
    fn from(term: &'a (S, f64)) -> Self {
        LinearTerm(term.0.into(), term.1)
    }
}

impl<I: IntoIterator<Item = impl Into<LinearTerm>>> From<I> for LinearExpr {
    fn from(iter: I) -> Self {
        let mut expr = LinearExpr::empty();
        for term in iter {
            let LinearTerm(key, coeff) = term.into();
            expr.add(key, coeff);
        }
        expr
    }
}

impl<S: Into<String>> std::iter::FromIterator<(S, f64)> for LinearExpr {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        let mut expr = LinearExpr::empty();
        for (key, coeff) in iter {
            expr.add(key, coeff);
        }
        expr
    }
}

/// Selection of variable keys, used for the integer and binary marks: none,
/// all, or an explicit list. Converts from a bool or from any sequence of
/// keys.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeySet {
    None,
    All,
    Keys(Vec<String>),
}

impl KeySet {
    pub fn contains(&self, key: &str) -> bool {
        match self {
            KeySet::None => false,
            KeySet::All => true,
            KeySet::Keys(keys) => keys.iter().any(|k| k.as_str() == key),
        }
    }
}

impl Default for KeySet {
    fn default() -> Self {
        KeySet::None
    }
}

impl From<bool> for KeySet {
    fn from(all: bool) -> Self {
        if all {
            KeySet::All
        } else {
            KeySet::None
        }
    }
}

impl<S: Into<String>> From<Vec<S>> for KeySet {
    fn from(keys: Vec<S>) -> Self {
        KeySet::Keys(keys.into_iter().map(Into::into).collect())
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for KeySet {
    fn from(keys: [S; N]) -> Self {
        KeySet::Keys(keys.into_iter().map(Into::into).collect())
    }
}

impl<S: Into<String>> std::iter::FromIterator<S> for KeySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        KeySet::Keys(iter.into_iter().map(Into::into).collect())
    }
}

/// An optimization model.
///
/// Insertion order matters twice: variables keep their order in the solution,
/// and the first occurrence of a constraint key fixes that constraint's place
/// in the tableau. Repeating a constraint key intersects its bounds;
/// repeating a variable key is allowed and preserved positionally.
#[derive(Clone, Debug, Default)]
pub struct Model {
    pub(crate) direction: OptimizationDirection,
    pub(crate) objective: Option<String>,
    pub(crate) constraints: Vec<(String, Bounds)>,
    pub(crate) variables: Vec<(String, LinearExpr)>,
    pub(crate) integers: KeySet,
    pub(crate) binaries: KeySet,
}

impl Model {
    pub fn new(direction: OptimizationDirection) -> Model {
        Model {
            direction,
            ..Model::default()
        }
    }

    /// Sets the key of the linear combination to optimize. Without one the
    /// objective row is all zeros and any feasible point is reported optimal
    /// with objective 0.
    pub fn optimize(&mut self, objective: impl Into<String>) {
        self.objective = Some(objective.into());
    }

    /// Bounds the linear combination named `key`. Repeating a key intersects
    /// the bounds: the greatest lower and smallest upper side win.
    pub fn add_constraint(&mut self, key: impl Into<String>, bounds: Bounds) {
        self.constraints.push((key.into(), bounds));
    }

    /// Adds a variable with its coefficients, e.g.
    /// `model.add_variable("table", [("wood", 30.0), ("profit", 1200.0)])`.
    pub fn add_variable(&mut self, key: impl Into<String>, coeffs: impl Into<LinearExpr>) {
        self.variables.push((key.into(), coeffs.into()));
    }

    /// Requires the selected variables to take integer values.
    pub fn set_integers(&mut self, keys: impl Into<KeySet>) {
        self.integers = keys.into();
    }

    /// Requires the selected variables to take values in {0, 1}. Binary wins
    /// over integer when a key carries both marks.
    pub fn set_binaries(&mut self, keys: impl Into<KeySet>) {
        self.binaries = keys.into();
    }

    /// Solves with default [`Options`].
    pub fn solve(&self) -> Solution {
        self.solve_with(&Options::default())
    }

    /// Solves the model: builds the tableau, runs the two-phase simplex on
    /// the relaxation and, when integer marks are present and the relaxation
    /// is optimal, branch-and-cut on top of it.
    pub fn solve_with(&self, options: &Options) -> Solution {
        let built = tableau::build(self);
        let mut root = built.tableau;

        match simplex::run(&mut root, options) {
            simplex::Outcome::Optimal(result) => {
                if built.integer_cols.is_empty() {
                    extract(&root, built.sign, &built.variables, Status::Optimal, result, options)
                } else {
                    let outcome = branch::branch_and_cut(
                        &root,
                        result,
                        &built.integer_cols,
                        built.sign,
                        options,
                    );
                    let tableau = outcome.tableau.as_ref().unwrap_or(&root);
                    extract(
                        tableau,
                        built.sign,
                        &built.variables,
                        outcome.status,
                        outcome.result,
                        options,
                    )
                }
            }
            simplex::Outcome::Infeasible => Solution {
                status: Status::Infeasible,
                objective: f64::NAN,
                variables: vec![],
            },
            simplex::Outcome::Unbounded(col) => Solution {
                status: Status::Unbounded,
                objective: built.sign * f64::INFINITY,
                variables: vec![(built.variables[col - 1].clone(), f64::INFINITY)],
            },
            simplex::Outcome::Cycled => Solution {
                status: Status::Cycled,
                objective: f64::NAN,
                variables: vec![],
            },
        }
    }
}

/// Solver options.
#[derive(Clone, Debug)]
pub struct Options {
    /// Zero threshold for pivot selection, feasibility and integrality.
    pub precision: f64,
    /// Enables explicit pivot-history cycle detection.
    pub check_cycles: bool,
    /// Per-phase pivot cap; exhausting it reports [`Status::Cycled`].
    pub max_pivots: usize,
    /// Relative optimality gap at which branch-and-cut accepts an incumbent
    /// and stops early. 0 demands a proven optimum.
    pub tolerance: f64,
    /// Wall-clock cap for branch-and-cut. `None` means unlimited;
    /// `Some(Duration::ZERO)` exits on the first iteration.
    pub timeout: Option<Duration>,
    /// Iteration cap for branch-and-cut.
    pub max_iterations: usize,
    /// Emits zero-valued variables in the solution instead of omitting them.
    pub include_zero_variables: bool,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            precision: 1e-8,
            check_cycles: false,
            max_pivots: 8192,
            tolerance: 0.0,
            timeout: None,
            max_iterations: 32768,
            include_zero_variables: false,
        }
    }
}

/// Terminal state of a solve. Solver failures (`Cycled`, `TimedOut`) are
/// statuses too, not panics or errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    Optimal,
    Infeasible,
    Unbounded,
    Cycled,
    TimedOut,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let msg = match self {
            Status::Optimal => "optimal",
            Status::Infeasible => "infeasible",
            Status::Unbounded => "unbounded",
            Status::Cycled => "cycled",
            Status::TimedOut => "timedout",
        };
        msg.fmt(f)
    }
}

/// The outcome of [`Model::solve`].
#[derive(Clone, Debug)]
pub struct Solution {
    status: Status,
    objective: f64,
    variables: Vec<(String, f64)>,
}

impl Solution {
    pub fn status(&self) -> Status {
        self.status
    }

    /// The objective value: finite when optimal, `±∞` when unbounded (with
    /// the model's direction), NaN when no feasible assignment was found.
    pub fn objective(&self) -> f64 {
        self.objective
    }

    /// Variable values in model insertion order. Zero-valued variables are
    /// omitted unless [`Options::include_zero_variables`] is set. With
    /// duplicate variable keys this positional list is the authoritative
    /// readback; key lookups return the first occurrence.
    pub fn variables(&self) -> &[(String, f64)] {
        &self.variables
    }

    /// Value of the first variable with this key, if it was emitted.
    pub fn value(&self, key: &str) -> Option<f64> {
        self.variables
            .iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, v)| *v)
    }

    pub fn iter(&self) -> SolutionIter<'_> {
        SolutionIter {
            inner: self.variables.iter(),
        }
    }
}

impl std::ops::Index<&str> for Solution {
    type Output = f64;

    fn index(&self, key: &str) -> &f64 {
        match self.variables.iter().find(|(k, _)| k.as_str() == key) {
            Some((_, value)) => value,
            None => panic!("no variable {:?} in the solution", key),
        }
    }
}

pub struct SolutionIter<'a> {
    inner: std::slice::Iter<'a, (String, f64)>,
}

impl<'a> Iterator for SolutionIter<'a> {
    type Item = (&'a str, f64);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(key, value)| (key.as_str(), *value))
    }
}

impl<'a> IntoIterator for &'a Solution {
    type Item = (&'a str, f64);
    type IntoIter = SolutionIter<'a>;

    fn into_iter(self) -> SolutionIter<'a> {
        self.iter()
    }
}

/// Reads variable values back out of a terminal tableau: a basic variable's
/// value is the rhs of its row, a non-basic variable sits at zero. Values are
/// rounded to the reporting precision; the objective undoes the direction
/// sign folded in at construction.
fn extract(
    tableau: &tableau::Tableau,
    sign: f64,
    variables: &[String],
    status: Status,
    result: f64,
    options: &Options,
) -> Solution {
    if result.is_nan() {
        // timed out (or failed) without any incumbent
        return Solution {
            status,
            objective: f64::NAN,
            variables: vec![],
        };
    }

    let width = tableau.width();
    let mut values = Vec::with_capacity(variables.len());
    for (i, key) in variables.iter().enumerate() {
        let position = tableau.position_of_variable(i + 1);
        let value = if position >= width {
            tableau.get(position - width, 0)
        } else {
            0.0
        };
        if value > options.precision {
            values.push((
                key.clone(),
                helpers::round_to_precision(value, options.precision),
            ));
        } else if options.include_zero_variables {
            values.push((key.clone(), 0.0));
        }
    }

    Solution {
        status,
        objective: -sign * result,
        variables: values,
    }
}
