//! Rotation of complete coefficient sets by Euler angles.

use log::debug;
use num_complex::Complex;
use num_traits::{AsPrimitive, Float, NumAssign};

use crate::alm::Alm;
use crate::threading::{exec_static, Scheduler, SendPtr};
use crate::wigner::WignerDRisbo;
use crate::{AlmError, Result};

#[inline]
fn promote<T: AsPrimitive<f64>>(z: Complex<T>) -> Complex<f64> {
    Complex::new(z.re.as_(), z.im.as_())
}

/// Rotate a complete coefficient set by the Euler angles
/// `(psi, theta, phi)`: a twist by `psi` about the z axis, a tilt by `theta`
/// about the y axis, then a twist by `phi` about the z axis.
///
/// The Wigner matrix for each degree is built incrementally with the Risbo
/// recursion and applied between diagonal phase factors from `psi` and
/// `phi`. All intermediate arithmetic runs in double precision regardless of
/// `T`. For `theta == 0` the rotation collapses to a per-order phase twist
/// and no Wigner matrices are computed.
///
/// The per-degree accumulation is fanned out over the workers of the
/// process-wide pool; a degree's results are written back only after its
/// fan-out joins, so a failed rotation never leaves a degree partially
/// updated.
///
/// Fails when `alm` does not store every order `m in [0, lmax]`.
pub fn rotate_alm<T>(alm: &mut Alm<'_, Complex<T>>, psi: f64, theta: f64, phi: f64) -> Result<()>
where
    T: Float + NumAssign + AsPrimitive<f64> + Send + Sync,
    f64: AsPrimitive<T>,
{
    if !alm.complete() {
        return Err(AlmError::IncompleteSet);
    }
    let lmax = alm.lmax();
    debug!("rotating alm set with lmax = {lmax} by ({psi}, {theta}, {phi})");

    if theta == 0.0 {
        // pure twist about the z axis: a(l, m) *= exp(-i (psi + phi) m)
        for m in 0..=lmax {
            let ang = Complex::from_polar(1.0, -(psi + phi) * m as f64);
            let ang = Complex::new(ang.re.as_(), ang.im.as_());
            for v in alm.column_mut(m) {
                *v *= ang;
            }
        }
        return Ok(());
    }

    let exppsi: Vec<Complex<f64>> = (0..=lmax)
        .map(|m| Complex::from_polar(1.0, -psi * m as f64))
        .collect();
    let expphi: Vec<Complex<f64>> = (0..=lmax)
        .map(|m| Complex::from_polar(1.0, -phi * m as f64))
        .collect();

    let mut rec = WignerDRisbo::new(lmax, theta);
    let mut almtmp = vec![Complex::<f64>::new(0.0, 0.0); lmax + 1];

    for l in 0..=lmax {
        let d = rec.advance();

        let a_l0 = promote(*alm.at(l, 0));
        for (m, tmp) in almtmp.iter_mut().enumerate().take(l + 1) {
            *tmp = a_l0 * d[(l, l + m)];
        }

        {
            let tmp = SendPtr(almtmp.as_mut_ptr());
            let alm_ref: &Alm<'_, Complex<T>> = alm;
            // One static stripe per worker over m in [0, l+1): each worker
            // owns a disjoint slice of `almtmp` and walks mm sequentially so
            // the two parity signs can be toggled instead of recomputed.
            exec_static(l + 1, 0, 0, |sched: &mut Scheduler<'_>| {
                let Some(rng) = sched.next_range() else { return };
                let (lo, hi) = (rng.start, rng.end);
                let mut flip = true;
                for mm in 1..=l {
                    let t1 = promote(*alm_ref.at(l, mm)) * exppsi[mm];
                    let mut flip2 = (mm + lo) % 2 == 1;
                    for m in lo..hi {
                        let d1 = if flip2 { -d[(l - mm, l - m)] } else { d[(l - mm, l - m)] };
                        let d2 = if flip { -d[(l - mm, l + m)] } else { d[(l - mm, l + m)] };
                        let f1 = d1 + d2;
                        let f2 = d1 - d2;
                        unsafe {
                            let slot = tmp.as_ptr().add(m);
                            *slot += Complex::new(t1.re * f1, t1.im * f2);
                        }
                        flip2 = !flip2;
                    }
                    flip = !flip;
                }
            })?;
        }

        for m in 0..=l {
            let v = almtmp[m] * expphi[m];
            *alm.at_mut(l, m) = Complex::new(v.re.as_(), v.im.as_());
        }
    }
    Ok(())
}
