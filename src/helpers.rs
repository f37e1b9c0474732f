/// Rounds a reported value to the user-visible precision so that artifacts of
/// floating-point pivoting (7.999999999 instead of 8) don't leak into
/// solutions. Never applied during pivots.
pub(crate) fn round_to_precision(value: f64, precision: f64) -> f64 {
    let scale = f64::round(1.0 / precision);
    f64::round((value + f64::EPSILON) * scale) / scale
}

#[cfg(test)]
use crate::tableau::Tableau;

#[cfg(test)]
pub(crate) fn assert_matrix_eq(tableau: &Tableau, reference: &[Vec<f64>]) {
    assert_eq!(tableau.height(), reference.len());
    for r in 0..tableau.height() {
        let row = (0..tableau.width())
            .map(|c| tableau.get(r, c))
            .collect::<Vec<_>>();
        assert_eq!(row, reference[r], "tableaus differ in row {}", r);
    }
}
