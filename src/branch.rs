use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

use crate::simplex::{self, Outcome};
use crate::tableau::Tableau;
use crate::{Options, Status};

/// One bound cut on an integer variable: `sign = +1` means the variable at
/// `column` must stay `<= value`, `sign = -1` means `>= value`.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Cut {
    sign: f64,
    column: usize,
    value: f64,
}

/// A pending subproblem: the LP bound of its parent relaxation plus the cut
/// set that defines it. Branches are immutable once pushed.
#[derive(Debug)]
struct Branch {
    bound: f64,
    cuts: Vec<Cut>,
}

impl PartialEq for Branch {
    fn eq(&self, other: &Branch) -> bool {
        self.bound == other.bound
    }
}

impl Eq for Branch {}

impl PartialOrd for Branch {
    fn partial_cmp(&self, other: &Branch) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Branch {
    fn cmp(&self, other: &Branch) -> Ordering {
        // BinaryHeap pops the greatest element; reverse the comparison so the
        // branch with the smallest bound comes out first. Bounds come from
        // optimal relaxations and are never NaN.
        other.bound.partial_cmp(&self.bound).unwrap_or(Ordering::Equal)
    }
}

/// What branch-and-cut produced. `result` keeps the internal sign convention
/// (smaller is better); it is NaN when no incumbent was found. `tableau` is
/// the incumbent's solved tableau, or `None` when the root relaxation itself
/// was already integral.
pub(crate) struct BranchResult {
    pub(crate) status: Status,
    pub(crate) result: f64,
    pub(crate) tableau: Option<Tableau>,
}

/// Best-first branch-and-cut over the root relaxation.
///
/// Only called once the root LP is optimal and at least one column is marked
/// integer. `root_result` is the root's internal objective and serves as the
/// bound of the two initial branches.
pub(crate) fn branch_and_cut(
    root: &Tableau,
    root_result: f64,
    integer_cols: &[usize],
    sign: f64,
    options: &Options,
) -> BranchResult {
    let start = Instant::now();

    let (column, value) = match most_fractional(root, integer_cols, options.precision) {
        Some(fractional) => fractional,
        None => {
            // the relaxation happens to be integral already
            return BranchResult {
                status: Status::Optimal,
                result: root_result,
                tableau: None,
            };
        }
    };

    // Two scratch tableaus sized for the worst case (every integer variable
    // cut from both sides), alternated between candidate and incumbent roles.
    let max_cuts = 2 * integer_cols.len();
    let mut candidate = root.with_row_capacity(max_cuts);
    let mut incumbent = root.with_row_capacity(max_cuts);
    let mut best_eval = f64::INFINITY;
    let mut found_incumbent = false;

    let mut branches = BinaryHeap::new();
    branches.push(Branch {
        bound: root_result,
        cuts: vec![Cut {
            sign: 1.0,
            column,
            value: value.floor(),
        }],
    });
    branches.push(Branch {
        bound: root_result,
        cuts: vec![Cut {
            sign: -1.0,
            column,
            value: value.ceil(),
        }],
    });

    let mut iterations = 0;
    let status = loop {
        let branch = match branches.pop() {
            Some(branch) => branch,
            None => {
                break if found_incumbent {
                    Status::Optimal
                } else {
                    Status::Infeasible
                };
            }
        };

        // Best-first order: once the smallest bound is worse than the
        // incumbent, no remaining branch can improve on it.
        if branch.bound > best_eval {
            break Status::Optimal;
        }

        if iterations >= options.max_iterations
            || options.timeout.map_or(false, |limit| start.elapsed() >= limit)
        {
            break Status::TimedOut;
        }
        iterations += 1;

        apply_cuts(root, &branch.cuts, &mut candidate);
        match simplex::run(&mut candidate, options) {
            Outcome::Optimal(result) if result < best_eval => {
                match most_fractional(&candidate, integer_cols, options.precision) {
                    None => {
                        // integral: new incumbent; keep its tableau by
                        // swapping buffer roles
                        std::mem::swap(&mut candidate, &mut incumbent);
                        best_eval = result;
                        found_incumbent = true;
                        debug!(
                            "iteration {}: new incumbent {} ({} branches queued)",
                            iterations,
                            best_eval,
                            branches.len()
                        );
                        if best_eval <= (1.0 - sign * options.tolerance) * root_result {
                            break Status::Optimal;
                        }
                    }
                    Some((column, value)) => {
                        let (down, up) = child_cuts(&branch.cuts, column, value);
                        branches.push(Branch {
                            bound: result,
                            cuts: down,
                        });
                        branches.push(Branch {
                            bound: result,
                            cuts: up,
                        });
                    }
                }
            }
            outcome => {
                // Infeasible, cycled, or no better than the incumbent: the
                // branch is discarded. Unbounded cannot appear once the root
                // relaxation is optimal, since cuts only restrict it.
                debug_assert!(!matches!(outcome, Outcome::Unbounded(_)));
            }
        }
    };

    debug!(
        "branch and cut finished: {} after {} iterations, best {}",
        status, iterations, best_eval
    );

    BranchResult {
        status,
        result: if found_incumbent { best_eval } else { f64::NAN },
        tableau: if found_incumbent { Some(incumbent) } else { None },
    }
}

/// Picks the basic integer column with the largest fractional part, ties
/// broken by the first column. `None` means every integer column is within
/// `precision` of an integer (non-basic columns sit at exact zero).
fn most_fractional(tableau: &Tableau, integer_cols: &[usize], precision: f64) -> Option<(usize, f64)> {
    let width = tableau.width();
    let mut best = None;
    let mut best_fraction = precision;
    for &col in integer_cols {
        let position = tableau.position_of_variable(col);
        if position < width {
            continue;
        }
        let value = tableau.get(position - width, 0);
        let fraction = (value - value.round()).abs();
        if fraction > best_fraction {
            best_fraction = fraction;
            best = Some((col, value));
        }
    }
    best
}

/// Copies the root tableau into `buffer` and appends one row per cut.
///
/// At the root, a basic variable equals its rhs, so a cut on it can be
/// written in terms of the root's non-basic variables by reading its row; a
/// cut on a non-basic variable is just a single-column bound. Phase 1 then
/// repairs whatever feasibility the new rows break.
fn apply_cuts(root: &Tableau, cuts: &[Cut], buffer: &mut Tableau) {
    let width = root.width();
    buffer.copy_from(root);
    for cut in cuts {
        let row = buffer.append_row();
        let position = root.position_of_variable(cut.column);
        if position < width {
            buffer.set(row, 0, cut.sign * cut.value);
            buffer.set(row, position, cut.sign);
        } else {
            let src = position - width;
            buffer.set(row, 0, cut.sign * (cut.value - root.get(src, 0)));
            for c in 1..width {
                buffer.set(row, c, -cut.sign * root.get(src, c));
            }
        }
    }
}

/// Builds the two child cut lists for a branch on `column` at fractional
/// `value`. A parent cut on the same column survives only on the side where
/// the new cut does not dominate it, so every branch carries at most one cut
/// per side per variable.
fn child_cuts(parent: &[Cut], column: usize, value: f64) -> (Vec<Cut>, Vec<Cut>) {
    let mut down = Vec::with_capacity(parent.len() + 1);
    let mut up = Vec::with_capacity(parent.len() + 1);
    for cut in parent {
        if cut.column == column {
            if cut.sign < 0.0 {
                down.push(*cut);
            } else {
                up.push(*cut);
            }
        } else {
            down.push(*cut);
            up.push(*cut);
        }
    }
    down.push(Cut {
        sign: 1.0,
        column,
        value: value.floor(),
    });
    up.push(Cut {
        sign: -1.0,
        column,
        value: value.ceil(),
    });
    (down, up)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use crate::tableau::build;
    use crate::{Bounds, Model, OptimizationDirection};

    #[test]
    fn child_cuts_keep_one_cut_per_side() {
        let parent = vec![
            Cut { sign: -1.0, column: 2, value: 2.0 },
            Cut { sign: 1.0, column: 3, value: 7.0 },
        ];
        let (down, up) = child_cuts(&parent, 2, 4.5);

        assert_eq!(
            down,
            vec![
                Cut { sign: -1.0, column: 2, value: 2.0 },
                Cut { sign: 1.0, column: 3, value: 7.0 },
                Cut { sign: 1.0, column: 2, value: 4.0 },
            ]
        );
        assert_eq!(
            up,
            vec![
                Cut { sign: 1.0, column: 3, value: 7.0 },
                Cut { sign: -1.0, column: 2, value: 5.0 },
            ]
        );
    }

    #[test]
    fn cut_on_nonbasic_variable_is_a_single_column_row() {
        let root = Tableau::new(3, 2);
        let mut buffer = root.with_row_capacity(2);
        apply_cuts(
            &root,
            &[Cut { sign: 1.0, column: 2, value: 3.0 }],
            &mut buffer,
        );

        assert_eq!(buffer.height(), 3);
        assert_eq!(buffer.get(2, 0), 3.0);
        assert_eq!(buffer.get(2, 1), 0.0);
        assert_eq!(buffer.get(2, 2), 1.0);
        // the new row's slack sits at the tail of both maps
        assert_eq!(buffer.position_of_variable(5), 5);
        assert_eq!(buffer.variable_at_position(5), 5);
    }

    #[test]
    fn cut_on_basic_variable_reads_its_root_row() {
        let mut root = Tableau::new(3, 2);
        // make variable 2 basic in row 1 with value 7
        root.swap_positions(2, 4);
        root.set(1, 0, 7.0);
        root.set(1, 1, 0.5);
        root.set(1, 2, 0.25);

        let mut buffer = root.with_row_capacity(2);
        apply_cuts(
            &root,
            &[Cut { sign: -1.0, column: 2, value: 9.0 }],
            &mut buffer,
        );

        // -x <= -9 becomes rhs -(9 - 7) = -2 with the row negated
        assert_eq!(buffer.get(2, 0), -2.0);
        assert_eq!(buffer.get(2, 1), 0.5);
        assert_eq!(buffer.get(2, 2), 0.25);
    }

    fn knapsack() -> Model {
        // max 8x + 11y + 6z + 4w, 5x + 7y + 4z + 3w <= 14, all binary;
        // the LP relaxation is fractional (z = 1/2), the best integral
        // choice is y + z + w = 21.
        let mut model = Model::new(OptimizationDirection::Maximize);
        model.optimize("value");
        model.add_constraint("weight", Bounds::max(14.0));
        model.add_variable("x", [("weight", 5.0), ("value", 8.0)]);
        model.add_variable("y", [("weight", 7.0), ("value", 11.0)]);
        model.add_variable("z", [("weight", 4.0), ("value", 6.0)]);
        model.add_variable("w", [("weight", 3.0), ("value", 4.0)]);
        model.set_binaries(true);
        model
    }

    #[test]
    fn knapsack_branches_to_the_integral_optimum() {
        let options = Options::default();
        let mut built = build(&knapsack());
        let root_result = match simplex::run(&mut built.tableau, &options) {
            Outcome::Optimal(result) => result,
            outcome => panic!("unexpected outcome {:?}", outcome),
        };
        assert_abs_diff_eq!(root_result, -22.0, epsilon = 1e-6);

        let outcome = branch_and_cut(
            &built.tableau,
            root_result,
            &built.integer_cols,
            built.sign,
            &options,
        );
        assert_eq!(outcome.status, Status::Optimal);
        assert_abs_diff_eq!(outcome.result, -21.0, epsilon = 1e-6);
        assert!(outcome.tableau.is_some());
    }

    #[test]
    fn zero_timeout_reports_timedout() {
        let options = Options {
            timeout: Some(std::time::Duration::ZERO),
            ..Options::default()
        };
        let mut built = build(&knapsack());
        let root_result = match simplex::run(&mut built.tableau, &options) {
            Outcome::Optimal(result) => result,
            outcome => panic!("unexpected outcome {:?}", outcome),
        };

        let outcome = branch_and_cut(
            &built.tableau,
            root_result,
            &built.integer_cols,
            built.sign,
            &options,
        );
        assert_eq!(outcome.status, Status::TimedOut);
        assert!(outcome.result.is_nan());
        assert!(outcome.tableau.is_none());
    }

    #[test]
    fn loose_tolerance_accepts_the_first_incumbent() {
        let options = Options {
            tolerance: 0.5,
            ..Options::default()
        };
        let mut built = build(&knapsack());
        let root_result = match simplex::run(&mut built.tableau, &options) {
            Outcome::Optimal(result) => result,
            outcome => panic!("unexpected outcome {:?}", outcome),
        };

        let outcome = branch_and_cut(
            &built.tableau,
            root_result,
            &built.integer_cols,
            built.sign,
            &options,
        );
        // any incumbent within half of the LP bound 22 ends the search
        assert_eq!(outcome.status, Status::Optimal);
        assert!(-outcome.result >= 11.0 - 1e-6);
    }
}
