use crate::helpers::round_to_precision;
use crate::tableau::{Tableau, SPARSITY_EPS};
use crate::Options;

/// Terminal state of a simplex run. The internal convention is that row 0 is
/// always maximized; `Optimal` carries the raw rhs of row 0 (the negated
/// internal objective), `Unbounded` carries the entering column that had no
/// leaving row.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Outcome {
    Optimal(f64),
    Infeasible,
    Unbounded(usize),
    Cycled,
}

/// Shorter repeats show up spuriously in degenerate tableaus, so nothing
/// below this length counts as a cycle.
const MIN_CYCLE_LEN: usize = 6;

/// Append-only history of (leaving, entering) variable pairs.
struct History {
    pairs: Vec<(usize, usize)>,
}

impl History {
    fn new() -> History {
        History { pairs: vec![] }
    }

    /// Records a pivot, then reports whether the latest L pivots repeat the L
    /// pivots immediately before them for any L in `[MIN_CYCLE_LEN, len/2]`.
    fn record_and_check(&mut self, leaving: usize, entering: usize) -> bool {
        self.pairs.push((leaving, entering));
        let len = self.pairs.len();
        for cycle in MIN_CYCLE_LEN..=len / 2 {
            if self.pairs[len - cycle..] == self.pairs[len - 2 * cycle..len - cycle] {
                return true;
            }
        }
        false
    }
}

/// One Gauss-Jordan pivot on `(row, col)`: the variable at column `col`
/// enters the basis and the variable basic in `row` leaves. The pivot row is
/// normalized first; every other row is then reduced against it, restricted
/// to the pivot row's non-zero columns. The vacated pivot column keeps the
/// elimination multipliers (`1/q` and `-k/q`), which is what lets cuts be
/// expressed against this tableau later.
pub(crate) fn pivot(tableau: &mut Tableau, row: usize, col: usize) {
    let width = tableau.width();
    let height = tableau.height();
    let quotient = tableau.get(row, col);

    tableau.swap_positions(col, width + row);

    for c in 0..width {
        let value = tableau.get(row, c) / quotient;
        tableau.set(row, c, if value.abs() < SPARSITY_EPS { 0.0 } else { value });
    }
    tableau.set(row, col, 1.0 / quotient);

    let nonzero = (0..width)
        .filter(|&c| c != col && tableau.get(row, c) != 0.0)
        .collect::<Vec<_>>();

    for r in 0..height {
        if r == row {
            continue;
        }
        let factor = tableau.get(r, col);
        if factor.abs() <= SPARSITY_EPS {
            continue;
        }
        for &c in &nonzero {
            let value = tableau.get(r, c) - factor * tableau.get(row, c);
            tableau.set(r, c, value);
        }
        tableau.set(r, col, -factor / quotient);
    }
}

/// Drives the tableau to a terminal state: phase 1 pivots negative
/// right-hand sides away until the basis is feasible, phase 2 then runs
/// Dantzig's rule until no reduced cost is positive.
pub(crate) fn run(tableau: &mut Tableau, options: &Options) -> Outcome {
    let precision = options.precision;
    let width = tableau.width();
    let mut history = if options.check_cycles {
        Some(History::new())
    } else {
        None
    };

    // Phase 1: feasibility.
    let mut pivots = 0;
    loop {
        let row = {
            let mut best = None;
            let mut most_negative = -precision;
            for r in 1..tableau.height() {
                let rhs = tableau.get(r, 0);
                if rhs < most_negative {
                    most_negative = rhs;
                    best = Some(r);
                }
            }
            match best {
                Some(r) => r,
                None => break,
            }
        };

        if pivots >= options.max_pivots {
            return Outcome::Cycled;
        }

        // The entering column must have a negative coefficient in the
        // infeasible row so that pivoting grows its rhs; among those, take
        // the best objective-per-unit ratio.
        let col = {
            let mut best = None;
            let mut best_ratio = f64::NEG_INFINITY;
            for c in 1..width {
                let coeff = tableau.get(row, c);
                if coeff < -precision {
                    let ratio = -tableau.get(0, c) / coeff;
                    if ratio > best_ratio {
                        best_ratio = ratio;
                        best = Some(c);
                    }
                }
            }
            match best {
                Some(c) => c,
                None => return Outcome::Infeasible,
            }
        };

        if let Some(history) = &mut history {
            let leaving = tableau.variable_at_position(width + row);
            let entering = tableau.variable_at_position(col);
            if history.record_and_check(leaving, entering) {
                return Outcome::Cycled;
            }
        }

        pivot(tableau, row, col);
        pivots += 1;
    }
    if pivots > 0 {
        debug!("phase 1 feasible after {} pivots", pivots);
    }

    // Phase 2: optimality.
    let mut pivots = 0;
    loop {
        // Dantzig's rule: the most positive reduced cost enters.
        let col = {
            let mut best = None;
            let mut best_cost = precision;
            for c in 1..width {
                let cost = tableau.get(0, c);
                if cost > best_cost {
                    best_cost = cost;
                    best = Some(c);
                }
            }
            match best {
                Some(c) => c,
                None => {
                    debug!(
                        "optimal after {} pivots, row 0 rhs {}",
                        pivots,
                        tableau.get(0, 0)
                    );
                    return Outcome::Optimal(round_to_precision(tableau.get(0, 0), precision));
                }
            }
        };

        if pivots >= options.max_pivots {
            return Outcome::Cycled;
        }

        let row = {
            let mut best = None;
            let mut best_ratio = f64::INFINITY;
            for r in 1..tableau.height() {
                let coeff = tableau.get(r, col);
                if coeff > precision {
                    let rhs = tableau.get(r, 0);
                    if rhs <= precision {
                        // degenerate row, its zero ratio can't be beaten
                        best = Some(r);
                        break;
                    }
                    let ratio = rhs / coeff;
                    if ratio < best_ratio {
                        best_ratio = ratio;
                        best = Some(r);
                    }
                }
            }
            match best {
                Some(r) => r,
                None => return Outcome::Unbounded(col),
            }
        };

        if let Some(history) = &mut history {
            let leaving = tableau.variable_at_position(width + row);
            let entering = tableau.variable_at_position(col);
            if history.record_and_check(leaving, entering) {
                return Outcome::Cycled;
            }
        }

        pivot(tableau, row, col);
        pivots += 1;
    }
}
