use indexmap::IndexMap;

use crate::{Model, OptimizationDirection};

/// Entries smaller than this in magnitude are flushed to exact zero when a
/// pivot row is normalized, to keep rows sparse. Deliberately far below any
/// user-facing precision: a 1e-10 entry is still structurally meaningful when
/// the caller solves with `precision = 1e-5`.
pub(crate) const SPARSITY_EPS: f64 = 1e-16;

/// A dense simplex tableau in standard form.
///
/// Row 0 is the objective row and column 0 the right-hand-side column.
/// Abstract variables live in `[0, width + height)`: the objective value is
/// variable 0, decision variables are `1..width`, generated row variables
/// take the rest. A variable's position is a column index when `< width`
/// (non-basic, value zero) and `width + row` otherwise (basic, value read
/// from the rhs of that row). The two maps stay inverse bijections at all
/// times.
#[derive(Clone)]
pub(crate) struct Tableau {
    width: usize,
    height: usize,
    matrix: Vec<f64>,
    position_of_variable: Vec<usize>,
    variable_at_position: Vec<usize>,
}

impl std::fmt::Debug for Tableau {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Tableau({}x{})\n", self.height, self.width)?;
        for r in 0..self.height {
            write!(f, "{:?}\n", &self.matrix[r * self.width..(r + 1) * self.width])?;
        }
        write!(f, "position_of_variable: {:?}\n", self.position_of_variable)?;
        write!(f, "variable_at_position: {:?}\n", self.variable_at_position)?;
        Ok(())
    }
}

impl Tableau {
    pub(crate) fn new(width: usize, height: usize) -> Tableau {
        Tableau {
            width,
            height,
            matrix: vec![0.0; width * height],
            position_of_variable: (0..width + height).collect(),
            variable_at_position: (0..width + height).collect(),
        }
    }

    #[inline]
    pub(crate) fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub(crate) fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub(crate) fn get(&self, row: usize, col: usize) -> f64 {
        self.matrix[row * self.width + col]
    }

    #[inline]
    pub(crate) fn set(&mut self, row: usize, col: usize, value: f64) {
        self.matrix[row * self.width + col] = value;
    }

    #[inline]
    pub(crate) fn position_of_variable(&self, var: usize) -> usize {
        self.position_of_variable[var]
    }

    #[inline]
    pub(crate) fn variable_at_position(&self, pos: usize) -> usize {
        self.variable_at_position[pos]
    }

    pub(crate) fn swap_positions(&mut self, a: usize, b: usize) {
        let var_a = self.variable_at_position[a];
        let var_b = self.variable_at_position[b];
        self.variable_at_position[a] = var_b;
        self.variable_at_position[b] = var_a;
        self.position_of_variable[var_a] = b;
        self.position_of_variable[var_b] = a;
    }

    /// Clone with spare room for `extra_rows` appended rows, so that later
    /// `append_row` calls never reallocate.
    pub(crate) fn with_row_capacity(&self, extra_rows: usize) -> Tableau {
        let mut buffer = Tableau {
            width: self.width,
            height: 0,
            matrix: Vec::with_capacity(self.width * (self.height + extra_rows)),
            position_of_variable: Vec::with_capacity(self.width + self.height + extra_rows),
            variable_at_position: Vec::with_capacity(self.width + self.height + extra_rows),
        };
        buffer.copy_from(self);
        buffer
    }

    /// Resets this tableau to a copy of `other`, reusing the allocations.
    pub(crate) fn copy_from(&mut self, other: &Tableau) {
        self.width = other.width;
        self.height = other.height;
        self.matrix.clear();
        self.matrix.extend_from_slice(&other.matrix);
        self.position_of_variable.clear();
        self.position_of_variable
            .extend_from_slice(&other.position_of_variable);
        self.variable_at_position.clear();
        self.variable_at_position
            .extend_from_slice(&other.variable_at_position);
    }

    /// Appends a zeroed row whose basic variable is a fresh slack at the tail
    /// of both position maps. Returns the new row index.
    pub(crate) fn append_row(&mut self) -> usize {
        let row = self.height;
        let tail = self.width + self.height;
        self.matrix.resize(self.matrix.len() + self.width, 0.0);
        self.position_of_variable.push(tail);
        self.variable_at_position.push(tail);
        self.height += 1;
        row
    }
}

/// A model translated into its initial tableau.
pub(crate) struct Built {
    pub(crate) tableau: Tableau,
    /// +1 for maximization, -1 for minimization; already folded into row 0.
    pub(crate) sign: f64,
    /// Variable keys in model order, duplicates preserved.
    pub(crate) variables: Vec<String>,
    /// 1-based columns of variables that must end up integral.
    pub(crate) integer_cols: Vec<usize>,
}

struct ConstraintRows {
    lower: f64,
    upper: f64,
    upper_row: Option<usize>,
    lower_row: Option<usize>,
}

/// Builds the initial tableau for a model.
///
/// The layout is deterministic: columns follow variable insertion order, rows
/// follow first-occurrence order of constraint keys (upper side first, then
/// lower side), binary rows come last. No feasibility validation happens
/// here; a `lower > upper` descriptor simply surfaces as phase-1
/// infeasibility later.
pub(crate) fn build(model: &Model) -> Built {
    let sign = match model.direction {
        OptimizationDirection::Maximize => 1.0,
        OptimizationDirection::Minimize => -1.0,
    };

    let variables = model
        .variables
        .iter()
        .map(|(key, _)| key.clone())
        .collect::<Vec<_>>();
    let width = variables.len() + 1;

    let mut integer_cols = vec![];
    let mut binary_cols = vec![];
    for (i, (key, _)) in model.variables.iter().enumerate() {
        let col = i + 1;
        if model.binaries.contains(key) {
            // binary wins over a plain integer mark on the same key
            binary_cols.push(col);
            integer_cols.push(col);
        } else if model.integers.contains(key) {
            integer_cols.push(col);
        }
    }

    // Merge duplicate constraint keys by intersecting their bounds. The first
    // occurrence of a key fixes its place in the row order.
    let mut constraints = IndexMap::new();
    for (key, bounds) in &model.constraints {
        let (lower, upper) = bounds.resolved();
        let entry = constraints
            .entry(key.as_str())
            .or_insert_with(|| ConstraintRows {
                lower: f64::NEG_INFINITY,
                upper: f64::INFINITY,
                upper_row: None,
                lower_row: None,
            });
        entry.lower = entry.lower.max(lower);
        entry.upper = entry.upper.min(upper);
    }

    // Each finite side consumes one row, upper before lower; a constraint
    // unbounded on both sides consumes none.
    let mut next_row = 1;
    for entry in constraints.values_mut() {
        if entry.upper.is_finite() {
            entry.upper_row = Some(next_row);
            next_row += 1;
        }
        if entry.lower.is_finite() {
            entry.lower_row = Some(next_row);
            next_row += 1;
        }
    }

    let height = next_row + binary_cols.len();
    let mut tableau = Tableau::new(width, height);

    for (i, (_, expr)) in model.variables.iter().enumerate() {
        let col = i + 1;
        for (key, coeff) in expr.iter() {
            // plain assignment, so a repeated key within one variable wins
            if model.objective.as_deref() == Some(key) {
                tableau.set(0, col, sign * coeff);
            }
            if let Some(entry) = constraints.get(key) {
                if let Some(row) = entry.upper_row {
                    tableau.set(row, col, coeff);
                }
                if let Some(row) = entry.lower_row {
                    tableau.set(row, col, -coeff);
                }
            }
        }
    }

    for entry in constraints.values() {
        if let Some(row) = entry.upper_row {
            tableau.set(row, 0, entry.upper);
        }
        if let Some(row) = entry.lower_row {
            tableau.set(row, 0, -entry.lower);
        }
    }

    for (i, &col) in binary_cols.iter().enumerate() {
        let row = next_row + i;
        tableau.set(row, 0, 1.0);
        tableau.set(row, col, 1.0);
    }

    debug!(
        "built tableau: {} columns, {} rows, {} integer ({} binary)",
        width,
        height,
        integer_cols.len(),
        binary_cols.len(),
    );

    Built {
        tableau,
        sign,
        variables,
        integer_cols,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::assert_matrix_eq;
    use crate::{Bounds, Model};

    fn furniture(direction: OptimizationDirection) -> Model {
        let mut model = Model::new(direction);
        model.optimize("profit");
        model.add_constraint("wood", Bounds::max(300.0));
        model.add_constraint("labor", Bounds::max(110.0));
        model.add_constraint("storage", Bounds::max(400.0));
        model.add_variable(
            "table",
            [
                ("wood", 30.0),
                ("labor", 5.0),
                ("profit", 1200.0),
                ("storage", 30.0),
            ],
        );
        model.add_variable(
            "dresser",
            [
                ("wood", 20.0),
                ("labor", 10.0),
                ("profit", 1600.0),
                ("storage", 50.0),
            ],
        );
        model
    }

    #[test]
    fn layout() {
        let built = build(&furniture(OptimizationDirection::Maximize));

        assert_eq!(built.sign, 1.0);
        assert_eq!(built.variables, vec!["table", "dresser"]);
        assert!(built.integer_cols.is_empty());

        assert_matrix_eq(
            &built.tableau,
            &[
                vec![0.0, 1200.0, 1600.0],
                vec![300.0, 30.0, 20.0],
                vec![110.0, 5.0, 10.0],
                vec![400.0, 30.0, 50.0],
            ],
        );

        // fresh tableau: identity bijection
        for i in 0..built.tableau.width() + built.tableau.height() {
            assert_eq!(built.tableau.position_of_variable(i), i);
            assert_eq!(built.tableau.variable_at_position(i), i);
        }
    }

    #[test]
    fn direction_flip_negates_objective_row() {
        let max = build(&furniture(OptimizationDirection::Maximize));
        let min = build(&furniture(OptimizationDirection::Minimize));

        assert_eq!(min.sign, -1.0);
        for c in 0..max.tableau.width() {
            assert_eq!(min.tableau.get(0, c), -max.tableau.get(0, c));
        }
        for r in 1..max.tableau.height() {
            for c in 0..max.tableau.width() {
                assert_eq!(min.tableau.get(r, c), max.tableau.get(r, c));
            }
        }
    }

    #[test]
    fn two_sided_constraint_gets_upper_then_lower_row() {
        let mut model = Model::default();
        model.add_constraint("c", Bounds::range(2.0, 10.0));
        model.add_variable("x", [("c", 3.0)]);

        let built = build(&model);
        assert_matrix_eq(
            &built.tableau,
            &[vec![0.0, 0.0], vec![10.0, 3.0], vec![-2.0, -3.0]],
        );
    }

    #[test]
    fn equal_is_exactly_min_and_max() {
        let mut eq = Model::default();
        eq.add_constraint("c", Bounds::equal(4.0));
        eq.add_variable("x", [("c", 3.0)]);

        let mut range = Model::default();
        range.add_constraint("c", Bounds::range(4.0, 4.0));
        range.add_variable("x", [("c", 3.0)]);

        let eq = build(&eq);
        let range = build(&range);
        assert_matrix_eq(&eq.tableau, &[vec![0.0, 0.0], vec![4.0, 3.0], vec![-4.0, -3.0]]);
        for r in 0..eq.tableau.height() {
            for c in 0..eq.tableau.width() {
                assert_eq!(eq.tableau.get(r, c), range.tableau.get(r, c));
            }
        }
    }

    #[test]
    fn equal_wins_over_min_and_max() {
        let mut model = Model::default();
        model.add_constraint(
            "c",
            Bounds {
                min: Some(1.0),
                max: Some(9.0),
                equal: Some(4.0),
            },
        );
        model.add_variable("x", [("c", 1.0)]);

        let built = build(&model);
        assert_matrix_eq(
            &built.tableau,
            &[vec![0.0, 0.0], vec![4.0, 1.0], vec![-4.0, -1.0]],
        );
    }

    #[test]
    fn duplicate_keys_intersect_bounds() {
        let mut twice = Model::default();
        twice.add_constraint("c", Bounds::max(10.0));
        twice.add_constraint("c", Bounds::min(2.0));
        twice.add_constraint("c", Bounds::max(7.0));
        twice.add_variable("x", [("c", 1.0)]);

        let mut once = Model::default();
        once.add_constraint("c", Bounds::range(2.0, 7.0));
        once.add_variable("x", [("c", 1.0)]);

        let twice = build(&twice);
        let once = build(&once);
        assert_eq!(twice.tableau.height(), once.tableau.height());
        for r in 0..once.tableau.height() {
            for c in 0..once.tableau.width() {
                assert_eq!(twice.tableau.get(r, c), once.tableau.get(r, c));
            }
        }
    }

    #[test]
    fn row_order_follows_first_occurrence() {
        let mut model = Model::default();
        model.add_constraint("b", Bounds::max(2.0));
        model.add_constraint("a", Bounds::max(1.0));
        model.add_constraint("b", Bounds::min(0.5));
        model.add_variable("x", [("a", 1.0), ("b", 1.0)]);

        let built = build(&model);
        // b was seen first: its upper and lower rows precede a's row
        assert_matrix_eq(
            &built.tableau,
            &[
                vec![0.0, 0.0],
                vec![2.0, 1.0],
                vec![-0.5, -1.0],
                vec![1.0, 1.0],
            ],
        );
    }

    #[test]
    fn min_and_max_sides_are_negations() {
        let mut upper = Model::default();
        upper.add_constraint("c", Bounds::max(5.0));
        upper.add_variable("x", [("c", 2.0)]);

        let mut lower = Model::default();
        lower.add_constraint("c", Bounds::min(5.0));
        lower.add_variable("x", [("c", 2.0)]);

        let upper = build(&upper);
        let lower = build(&lower);
        for c in 0..upper.tableau.width() {
            assert_eq!(lower.tableau.get(1, c), -upper.tableau.get(1, c));
        }
    }

    #[test]
    fn binary_bookkeeping() {
        let mut model = Model::default();
        model.add_constraint("budget", Bounds::max(10.0));
        model.add_variable("a", [("budget", 1.0)]);
        model.add_variable("b", [("budget", 2.0)]);
        model.set_integers(["a", "b"]);
        model.set_binaries(["a"]);

        let built = build(&model);
        // binary wins over integer for "a": one integer entry per column and
        // a single binary row for column 1
        assert_eq!(built.integer_cols, vec![1, 2]);
        assert_matrix_eq(
            &built.tableau,
            &[
                vec![0.0, 0.0, 0.0],
                vec![10.0, 1.0, 2.0],
                vec![1.0, 1.0, 0.0],
            ],
        );
    }

    #[test]
    fn constraint_without_coefficients_is_a_zero_row() {
        let mut model = Model::default();
        model.add_constraint("ghost", Bounds::max(5.0));
        model.add_variable("x", [("other", 1.0)]);

        let built = build(&model);
        assert_matrix_eq(&built.tableau, &[vec![0.0, 0.0], vec![5.0, 0.0]]);
    }

    #[test]
    fn objective_may_also_be_constrained() {
        let mut model = Model::new(OptimizationDirection::Maximize);
        model.optimize("obj");
        model.add_constraint("obj", Bounds::max(10.0));
        model.add_variable("x", [("obj", 2.0)]);

        let built = build(&model);
        assert_matrix_eq(&built.tableau, &[vec![0.0, 2.0], vec![10.0, 2.0]]);
    }

    #[test]
    fn repeated_coefficient_key_last_wins() {
        let mut model = Model::default();
        model.add_constraint("c", Bounds::max(5.0));
        let mut expr = crate::LinearExpr::empty();
        expr.add("c", 1.0);
        expr.add("c", 3.0);
        model.add_variable("x", expr);

        let built = build(&model);
        assert_eq!(built.tableau.get(1, 1), 3.0);
    }

    #[test]
    fn append_row_extends_maps_at_tail() {
        let mut tableau = Tableau::new(3, 2);
        let row = tableau.append_row();
        assert_eq!(row, 2);
        assert_eq!(tableau.height(), 3);
        assert_eq!(tableau.position_of_variable(5), 5);
        assert_eq!(tableau.variable_at_position(5), 5);
        for c in 0..3 {
            assert_eq!(tableau.get(row, c), 0.0);
        }
    }
}
