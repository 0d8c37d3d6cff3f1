//! 2×2 linear algebra for the planar solvers

/// Determinant magnitude below which a system is treated as singular
pub(crate) const SINGULAR_EPSILON: f64 = 1e-9;

/// Row-major 2×2 matrix
pub(crate) type Mat2 = [[f64; 2]; 2];

/// Solve `A·x = b`; `None` when `A` is singular
pub(crate) fn solve2(a: &Mat2, b: [f64; 2]) -> Option<[f64; 2]> {
    let det = a[0][0] * a[1][1] - a[0][1] * a[1][0];
    let scale = a[0][0].abs().max(a[1][1].abs()).max(1.0);
    if !det.is_finite() || det.abs() < SINGULAR_EPSILON * scale * scale {
        return None;
    }
    let x = (b[0] * a[1][1] - a[0][1] * b[1]) / det;
    let y = (a[0][0] * b[1] - b[0] * a[1][0]) / det;
    (x.is_finite() && y.is_finite()).then_some([x, y])
}

/// Accumulates weighted normal equations `(Jᵀ W J) x = Jᵀ W r`
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct NormalEquations {
    ata: Mat2,
    atb: [f64; 2],
}

impl NormalEquations {
    pub(crate) fn add_row(&mut self, row: [f64; 2], rhs: f64, weight: f64) {
        for i in 0..2 {
            for j in 0..2 {
                self.ata[i][j] += weight * row[i] * row[j];
            }
            self.atb[i] += weight * row[i] * rhs;
        }
    }

    pub(crate) fn solve(&self) -> Option<[f64; 2]> {
        solve2(&self.ata, self.atb)
    }
}
