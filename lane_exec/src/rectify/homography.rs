//! Four point homography solver

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

use super::RectifyError;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Smallest triangle area (in pixels squared) for three corners of a quad to be non-collinear.
const MIN_CORNER_AREA_PX2: f64 = 1e-6;

/// Smallest homogeneous scale accepted when projecting a point.
const MIN_PROJECTIVE_SCALE: f64 = 1e-12;

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Solve for the homography `H` such that `dst ~ H * src`, normalised so that `H[(2, 2)] = 1`.
///
/// With exactly four correspondences the system is fully determined, so the eight unknowns are
/// solved directly rather than via a least squares null space.
pub fn solve_homography(
    src: &[[f64; 2]; 4],
    dst: &[[f64; 2]; 4],
) -> Result<Matrix3<f64>, RectifyError> {
    check_quad(src, "source")?;
    check_quad(dst, "destination")?;

    let mut a = DMatrix::<f64>::zeros(8, 8);
    let mut b = DVector::<f64>::zeros(8);

    for (i, (s, d)) in src.iter().zip(dst.iter()).enumerate() {
        let (x, y) = (s[0], s[1]);
        let (u, v) = (d[0], d[1]);

        let r0 = 2 * i;
        let r1 = 2 * i + 1;

        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = 1.0;
        a[(r0, 6)] = -u * x;
        a[(r0, 7)] = -u * y;
        b[r0] = u;

        a[(r1, 3)] = x;
        a[(r1, 4)] = y;
        a[(r1, 5)] = 1.0;
        a[(r1, 6)] = -v * x;
        a[(r1, 7)] = -v * y;
        b[r1] = v;
    }

    let h = a
        .lu()
        .solve(&b)
        .ok_or(RectifyError::DegenerateGeometry("the correspondence system is singular"))?;

    let h_mat = Matrix3::new(
        h[0], h[1], h[2],
        h[3], h[4], h[5],
        h[6], h[7], 1.0,
    );

    if h_mat.iter().any(|v| !v.is_finite()) || h_mat.try_inverse().is_none() {
        return Err(RectifyError::DegenerateGeometry("the homography is not invertible"));
    }

    Ok(h_mat)
}

/// Apply a homography to a single point, or `None` if it maps to infinity.
pub fn apply_homography(h: &Matrix3<f64>, point: [f64; 2]) -> Option<[f64; 2]> {
    let v = h * Vector3::new(point[0], point[1], 1.0);

    if v[2].abs() <= MIN_PROJECTIVE_SCALE || !v[0].is_finite() || !v[1].is_finite() {
        return None;
    }

    Some([v[0] / v[2], v[1] / v[2]])
}

/// Reject quads with non-finite corners or with any three corners collinear.
fn check_quad(quad: &[[f64; 2]; 4], which: &'static str) -> Result<(), RectifyError> {
    if quad.iter().flatten().any(|c| !c.is_finite()) {
        return Err(RectifyError::NonFiniteCorner(which));
    }

    for skip in 0..4 {
        let tri: Vec<&[f64; 2]> = quad
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != skip)
            .map(|(_, p)| p)
            .collect();

        let area = ((tri[1][0] - tri[0][0]) * (tri[2][1] - tri[0][1])
            - (tri[2][0] - tri[0][0]) * (tri[1][1] - tri[0][1]))
            .abs()
            * 0.5;

        if area < MIN_CORNER_AREA_PX2 {
            return Err(RectifyError::CollinearCorners(which));
        }
    }

    Ok(())
}
