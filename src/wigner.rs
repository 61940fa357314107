//! Incremental Wigner small-d matrices via the Risbo recursion.
//!
//! The recursion (J. Risbo, J. Geodesy 70, 383-396, 1996) builds `d^n` from
//! `d^{n-1}` in two half-angle steps. Both steps touch only one previous row
//! per output row, so the per-row work is independent and the buffers can be
//! shared across worker threads by a caller that partitions the rows.

use crate::matrix::Matrix;

/// Builds `d^n(theta)` for `n = 0, 1, 2, ...` at a fixed angle.
///
/// The matrices for successive degrees are produced by [`advance`]; state can
/// only move forward. At degree `n` the returned matrix holds the elements of
/// `d^n(theta)` with both indices shifted into `[0, 2n]`, of which the rows
/// `0 <= a <= n` are stored; the remaining rows follow from the symmetry
/// `d^n_{-m',-m} = (-1)^{m'+m} d^n_{m'm}`, which consumers apply as
/// alternating signs.
///
/// [`advance`]: WignerDRisbo::advance
pub struct WignerDRisbo {
    lmax: usize,
    p: f64,
    q: f64,
    sqt: Vec<f64>,
    d: Matrix<f64>,
    dd: Matrix<f64>,
    n: isize,
}

impl WignerDRisbo {
    /// Recursion state for degrees up to `lmax` at angle `ang` (radians).
    pub fn new(lmax: usize, ang: f64) -> Self {
        Self {
            lmax,
            p: (ang / 2.0).sin(),
            q: (ang / 2.0).cos(),
            sqt: (0..=2 * lmax).map(|k| (k as f64).sqrt()).collect(),
            d: Matrix::zeros(lmax + 1, 2 * lmax + 1),
            dd: Matrix::zeros(lmax + 1, 2 * lmax + 1),
            n: -1,
        }
    }

    /// Band limit the recursion buffers were sized for.
    #[inline]
    pub fn lmax(&self) -> usize {
        self.lmax
    }

    /// Degree held by the matrix returned from the last [`advance`] call, or
    /// `None` before the first call.
    ///
    /// [`advance`]: WignerDRisbo::advance
    #[inline]
    pub fn degree(&self) -> Option<usize> {
        (self.n >= 0).then_some(self.n as usize)
    }

    /// Advance to the next degree and return `d^n`.
    ///
    /// The `k`-th call returns the matrix for `n = k - 1`. The borrow is
    /// read-only and ends at the next call. The recursion is capped at the
    /// construction-time `lmax`: advancing more than `lmax + 1` times is a
    /// caller bug and panics.
    pub fn advance(&mut self) -> &Matrix<f64> {
        assert!(
            self.n < self.lmax as isize,
            "Wigner-d recursion advanced past its band limit"
        );
        self.n += 1;
        let n = self.n as usize;
        let (p, q) = (self.p, self.q);
        match n {
            0 => {
                self.d[(0, 0)] = 1.0;
            }
            1 => {
                self.d[(0, 0)] = q * q;
                self.d[(0, 1)] = -p * q * self.sqt[2];
                self.d[(0, 2)] = p * p;
                self.d[(1, 0)] = -self.d[(0, 1)];
                self.d[(1, 1)] = q * q - p * p;
                self.d[(1, 2)] = self.d[(0, 1)];
            }
            _ => {
                // Extend the bottom row by anti-symmetric reflection of row
                // n-2, sign starting at (-1)^n and alternating along the row.
                let mut sign = if n % 2 == 1 { -1.0 } else { 1.0 };
                for i in 0..=2 * n - 2 {
                    let v = self.d[(n - 2, 2 * n - 2 - i)];
                    self.d[(n, i)] = sign * v;
                    sign = -sign;
                }
                // Two half-angle steps; the second lands the result in `d`.
                Self::half_step(2 * n - 1, n, p, q, &self.sqt, &self.d, &mut self.dd);
                Self::half_step(2 * n, n, p, q, &self.sqt, &self.dd, &mut self.d);
            }
        }
        &self.d
    }

    /// One Risbo half-step: consume the degree-(j-1)/2 state in `xd` and
    /// write the j-step state into `xdd`. Row 0 follows a 1-D recurrence;
    /// rows `1..=n` mix four neighbours of the previous state.
    fn half_step(
        j: usize,
        n: usize,
        p: f64,
        q: f64,
        sqt: &[f64],
        xd: &Matrix<f64>,
        xdd: &mut Matrix<f64>,
    ) {
        let xj = 1.0 / j as f64;
        xdd[(0, 0)] = q * xd[(0, 0)];
        for i in 1..j {
            xdd[(0, i)] = xj * sqt[j] * (q * sqt[j - i] * xd[(0, i)] - p * sqt[i] * xd[(0, i - 1)]);
        }
        xdd[(0, j)] = -p * xd[(0, j - 1)];
        for k in 1..=n {
            let t1 = xj * sqt[j - k] * q;
            let t2 = xj * sqt[j - k] * p;
            let t3 = xj * sqt[k] * p;
            let t4 = xj * sqt[k] * q;
            xdd[(k, 0)] = xj * sqt[j] * (q * sqt[j - k] * xd[(k, 0)] + p * sqt[k] * xd[(k - 1, 0)]);
            for i in 1..j {
                xdd[(k, i)] = t1 * sqt[j - i] * xd[(k, i)] - t2 * sqt[i] * xd[(k, i - 1)]
                    + t3 * sqt[j - i] * xd[(k - 1, i)]
                    + t4 * sqt[i] * xd[(k - 1, i - 1)];
            }
            xdd[(k, j)] = -t2 * sqt[j] * xd[(k, j - 1)] + t4 * sqt[j] * xd[(k - 1, j - 1)];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn degree_zero_is_identity() {
        let mut rec = WignerDRisbo::new(4, 1.234);
        assert_eq!(rec.degree(), None);
        let d = rec.advance();
        assert_eq!(d[(0, 0)], 1.0);
        assert_eq!(rec.degree(), Some(0));
    }

    #[test]
    fn degree_one_matches_closed_form() {
        let theta = 0.81f64;
        let mut rec = WignerDRisbo::new(2, theta);
        rec.advance();
        let d = rec.advance();
        let (s, c) = theta.sin_cos();
        // rows are a = l - m', columns b = l + m
        assert_abs_diff_eq!(d[(0, 0)], (1.0 + c) / 2.0, epsilon = 1e-14);
        assert_abs_diff_eq!(d[(0, 1)], -s / 2f64.sqrt(), epsilon = 1e-14);
        assert_abs_diff_eq!(d[(0, 2)], (1.0 - c) / 2.0, epsilon = 1e-14);
        assert_abs_diff_eq!(d[(1, 0)], s / 2f64.sqrt(), epsilon = 1e-14);
        assert_abs_diff_eq!(d[(1, 1)], c, epsilon = 1e-14);
        assert_abs_diff_eq!(d[(1, 2)], -s / 2f64.sqrt(), epsilon = 1e-14);
    }

    #[test]
    fn rows_stay_orthonormal() {
        // every stored row of d^n is a unit vector of the full (2n+1)-square
        // orthogonal matrix
        let lmax = 12usize;
        let mut rec = WignerDRisbo::new(lmax, 0.6180339887);
        for n in 0..=lmax {
            let d = rec.advance();
            for a in 0..=n {
                let norm2: f64 = (0..=2 * n).map(|b| d[(a, b)] * d[(a, b)]).sum();
                assert_abs_diff_eq!(norm2, 1.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn stored_rows_are_mutually_orthogonal() {
        let lmax = 8usize;
        let mut rec = WignerDRisbo::new(lmax, 1.9);
        for n in 0..=lmax {
            let d = rec.advance();
            for a in 0..=n {
                for a2 in 0..a {
                    let dot: f64 = (0..=2 * n).map(|b| d[(a, b)] * d[(a2, b)]).sum();
                    assert_abs_diff_eq!(dot, 0.0, epsilon = 1e-12);
                }
            }
        }
    }

    #[test]
    fn zero_angle_gives_identity_rows() {
        let lmax = 6usize;
        let mut rec = WignerDRisbo::new(lmax, 0.0);
        for n in 0..=lmax {
            let d = rec.advance();
            for a in 0..=n {
                for b in 0..=2 * n {
                    let expect = if b == a { 1.0 } else { 0.0 };
                    assert_abs_diff_eq!(d[(a, b)], expect, epsilon = 1e-13);
                }
            }
        }
    }

    #[test]
    #[should_panic(expected = "band limit")]
    fn advancing_past_lmax_panics() {
        let mut rec = WignerDRisbo::new(1, 0.5);
        rec.advance();
        rec.advance();
        rec.advance();
    }
}
