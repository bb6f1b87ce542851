//! Bounded one-dimensional solvers: bracket expansion, Brent root finding
//! and Brent's bounded minimiser.

use crate::error::ProjectionError;

type Result<T> = std::result::Result<T, ProjectionError>;

/// Bracket growth factor per expansion step
const GROWTH: f64 = 1.6;

const GOLDEN: f64 = 0.381_966_011_250_105_1;

/// Widen `[lo, hi]` until `f` changes sign across it.
///
/// The side with the smaller |f| is pushed outward; `lo` never drops below
/// `floor`, which keeps strictly positive parameters positive.
pub fn expand_bracket<F>(
    f: F,
    mut lo: f64,
    mut hi: f64,
    floor: f64,
    max_expansions: usize,
) -> Result<(f64, f64)>
where
    F: Fn(f64) -> f64,
{
    if !(lo < hi) {
        return Err(ProjectionError::convergence(format!("empty bracket [{lo}, {hi}]")));
    }
    let mut f_lo = f(lo);
    let mut f_hi = f(hi);

    for _ in 0..max_expansions {
        if f_lo * f_hi <= 0.0 {
            return Ok((lo, hi));
        }
        if f_lo.abs() < f_hi.abs() && lo > floor {
            lo = (lo + GROWTH * (lo - hi)).max(floor);
            f_lo = f(lo);
        } else {
            hi += GROWTH * (hi - lo);
            f_hi = f(hi);
        }
        if !f_lo.is_finite() || !f_hi.is_finite() {
            break;
        }
    }

    if f_lo * f_hi <= 0.0 {
        Ok((lo, hi))
    } else {
        Err(ProjectionError::convergence(format!(
            "no sign change found in [{lo}, {hi}] after {max_expansions} expansions"
        )))
    }
}

/// Brent's method for a root of `f` inside a sign-changing bracket
pub fn brent_root<F>(f: F, lo: f64, hi: f64, tolerance: f64, max_iterations: usize) -> Result<f64>
where
    F: Fn(f64) -> f64,
{
    let (mut a, mut b) = (lo, hi);
    let (mut fa, mut fb) = (f(a), f(b));
    if fa == 0.0 {
        return Ok(a);
    }
    if fb == 0.0 {
        return Ok(b);
    }
    if fa * fb > 0.0 {
        return Err(ProjectionError::convergence(format!(
            "root is not bracketed by [{lo}, {hi}]"
        )));
    }

    let mut c = b;
    let mut fc = fb;
    let mut d = b - a;
    let mut e = d;

    for _ in 0..max_iterations {
        if (fb > 0.0 && fc > 0.0) || (fb < 0.0 && fc < 0.0) {
            c = a;
            fc = fa;
            d = b - a;
            e = d;
        }
        if fc.abs() < fb.abs() {
            a = b;
            b = c;
            c = a;
            fa = fb;
            fb = fc;
            fc = fa;
        }

        let tol1 = 2.0 * f64::EPSILON * b.abs() + 0.5 * tolerance;
        let xm = 0.5 * (c - b);
        if xm.abs() <= tol1 || fb == 0.0 {
            return Ok(b);
        }

        if e.abs() >= tol1 && fa.abs() > fb.abs() {
            // Inverse quadratic interpolation, or secant when a == c
            let s = fb / fa;
            let (mut p, mut q) = if a == c {
                (2.0 * xm * s, 1.0 - s)
            } else {
                let q = fa / fc;
                let r = fb / fc;
                (
                    s * (2.0 * xm * q * (q - r) - (b - a) * (r - 1.0)),
                    (q - 1.0) * (r - 1.0) * (s - 1.0),
                )
            };
            if p > 0.0 {
                q = -q;
            }
            p = p.abs();
            let min1 = 3.0 * xm * q - (tol1 * q).abs();
            let min2 = (e * q).abs();
            if 2.0 * p < min1.min(min2) {
                e = d;
                d = p / q;
            } else {
                d = xm;
                e = d;
            }
        } else {
            d = xm;
            e = d;
        }

        a = b;
        fa = fb;
        b += if d.abs() > tol1 { d } else { tol1.copysign(xm) };
        fb = f(b);
    }

    Err(ProjectionError::convergence(format!(
        "root search did not converge in {max_iterations} iterations"
    )))
}

/// Minimum of `f` on `[lo, hi]` by golden-section search with parabolic
/// steps. Returns `(x_min, f(x_min))`.
pub fn minimize_bounded<F>(
    f: F,
    lo: f64,
    hi: f64,
    tolerance: f64,
    max_iterations: usize,
) -> Result<(f64, f64)>
where
    F: Fn(f64) -> f64,
{
    if !(lo < hi) {
        return Err(ProjectionError::convergence(format!("empty interval [{lo}, {hi}]")));
    }
    let sqrt_eps = f64::EPSILON.sqrt();
    let (mut a, mut b) = (lo, hi);
    let mut x = a + GOLDEN * (b - a);
    let mut w = x;
    let mut v = x;
    let mut fx = f(x);
    let mut fw = fx;
    let mut fv = fx;
    let mut d: f64 = 0.0;
    let mut e: f64 = 0.0;

    for _ in 0..max_iterations {
        let xm = 0.5 * (a + b);
        let tol1 = sqrt_eps * x.abs() + tolerance / 3.0;
        let tol2 = 2.0 * tol1;
        if (x - xm).abs() <= tol2 - 0.5 * (b - a) {
            return Ok((x, fx));
        }

        let mut golden = true;
        if e.abs() > tol1 {
            let r = (x - w) * (fx - fv);
            let mut q = (x - v) * (fx - fw);
            let mut p = (x - v) * q - (x - w) * r;
            q = 2.0 * (q - r);
            if q > 0.0 {
                p = -p;
            }
            q = q.abs();
            let e_prev = e;
            e = d;
            if p.abs() < (0.5 * q * e_prev).abs() && p > q * (a - x) && p < q * (b - x) {
                d = p / q;
                let u = x + d;
                if u - a < tol2 || b - u < tol2 {
                    d = tol1.copysign(xm - x);
                }
                golden = false;
            }
        }
        if golden {
            e = if x >= xm { a - x } else { b - x };
            d = GOLDEN * e;
        }

        let u = if d.abs() >= tol1 { x + d } else { x + tol1.copysign(d) };
        let fu = f(u);

        if fu <= fx {
            if u >= x {
                a = x;
            } else {
                b = x;
            }
            v = w;
            fv = fw;
            w = x;
            fw = fx;
            x = u;
            fx = fu;
        } else {
            if u < x {
                a = u;
            } else {
                b = u;
            }
            if fu <= fw || w == x {
                v = w;
                fv = fw;
                w = u;
                fw = fu;
            } else if fu <= fv || v == x || v == w {
                v = u;
                fv = fu;
            }
        }
    }

    Err(ProjectionError::convergence(format!(
        "bounded minimisation did not converge in {max_iterations} iterations"
    )))
}
