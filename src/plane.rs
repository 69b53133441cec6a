//! Oriented planes and half-space inequalities over exact rationals.
//!
//! A plane `a x + b y + c z + d = 0` owns both its exact coefficients
//! and the float coefficients it was ingested from; the float copy only
//! serves the split-scoring paths.

use crate::linalg::{QVec3, Vec3};
use crate::rational::{rational_from_f32, Scalar};
use anyhow::Result;
use num::{Signed, Zero};

/// Closed half-space `a x + b y + c z + d >= 0`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ineq {
    pub a: Scalar,
    pub b: Scalar,
    pub c: Scalar,
    pub d: Scalar,
}

impl Ineq {
    pub fn new(a: Scalar, b: Scalar, c: Scalar, d: Scalar) -> Self {
        Self { a, b, c, d }
    }

    pub fn eval(&self, p: &QVec3) -> Scalar {
        &self.a * &p.x + &self.b * &p.y + &self.c * &p.z + &self.d
    }

    pub fn normal(&self) -> QVec3 {
        QVec3::new(self.a.clone(), self.b.clone(), self.c.clone())
    }

    pub fn negated(&self) -> Ineq {
        Ineq::new(-&self.a, -&self.b, -&self.c, -&self.d)
    }

    /// Scale so the first non-zero coefficient has magnitude one. Equal
    /// half-spaces then compare equal componentwise.
    pub fn canonical(&self) -> Ineq {
        for coeff in [&self.a, &self.b, &self.c, &self.d] {
            if !coeff.is_zero() {
                let s = coeff.abs();
                return Ineq::new(&self.a / &s, &self.b / &s, &self.c / &s, &self.d / &s);
            }
        }
        self.clone()
    }

    pub fn is_degenerate(&self) -> bool {
        self.a.is_zero() && self.b.is_zero() && self.c.is_zero()
    }

    pub fn to_f64(&self) -> [f64; 4] {
        [
            crate::rational::to_f64(&self.a),
            crate::rational::to_f64(&self.b),
            crate::rational::to_f64(&self.c),
            crate::rational::to_f64(&self.d),
        ]
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct QPlane {
    pub a: Scalar,
    pub b: Scalar,
    pub c: Scalar,
    pub d: Scalar,
    /// Coefficients as ingested, for inexact evaluation only.
    float: [f64; 4],
}

impl QPlane {
    /// Decimal-exact plane from float parameters `(a, b, c, d)`.
    pub fn from_f32(params: [f32; 4]) -> Result<Self> {
        anyhow::ensure!(
            params[0] != 0.0 || params[1] != 0.0 || params[2] != 0.0,
            "plane has a zero normal"
        );
        Ok(Self {
            a: rational_from_f32(params[0])?,
            b: rational_from_f32(params[1])?,
            c: rational_from_f32(params[2])?,
            d: rational_from_f32(params[3])?,
            float: [
                params[0] as f64,
                params[1] as f64,
                params[2] as f64,
                params[3] as f64,
            ],
        })
    }

    pub fn eval(&self, p: &QVec3) -> Scalar {
        &self.a * &p.x + &self.b * &p.y + &self.c * &p.z + &self.d
    }

    /// Inexact signed distance numerator, used by the split scorer.
    pub fn eval_f64(&self, p: Vec3) -> f64 {
        self.float[0] * p.x + self.float[1] * p.y + self.float[2] * p.z + self.float[3]
    }

    pub fn coeffs_f64(&self) -> [f64; 4] {
        self.float
    }

    pub fn normal_f64(&self) -> Vec3 {
        Vec3::new(self.float[0], self.float[1], self.float[2])
    }

    /// The `(positive, negative)` half-space pair of the plane.
    pub fn halfspaces(&self) -> (Ineq, Ineq) {
        let positive = Ineq::new(self.a.clone(), self.b.clone(), self.c.clone(), self.d.clone());
        let negative = positive.negated();
        (positive, negative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rational::rational_from_f64;

    fn qv(x: f64, y: f64, z: f64) -> QVec3 {
        QVec3::new(
            rational_from_f64(x).unwrap(),
            rational_from_f64(y).unwrap(),
            rational_from_f64(z).unwrap(),
        )
    }

    #[test]
    fn halfspace_pair_covers_both_sides() {
        let plane = QPlane::from_f32([0.0, 0.0, 1.0, -0.5]).unwrap();
        let (pos, neg) = plane.halfspaces();
        let above = qv(0.0, 0.0, 1.0);
        let below = qv(0.0, 0.0, 0.0);
        assert!(pos.eval(&above).is_positive());
        assert!(pos.eval(&below).is_negative());
        assert!(neg.eval(&below).is_positive());
        let on = qv(0.3, 0.7, 0.5);
        assert!(pos.eval(&on).is_zero());
        assert!(neg.eval(&on).is_zero());
    }

    #[test]
    fn canonical_identifies_scaled_halfspaces() {
        let a = Ineq::new(
            rational_from_f64(2.0).unwrap(),
            rational_from_f64(0.0).unwrap(),
            rational_from_f64(-4.0).unwrap(),
            rational_from_f64(1.0).unwrap(),
        );
        let b = Ineq::new(
            rational_from_f64(1.0).unwrap(),
            rational_from_f64(0.0).unwrap(),
            rational_from_f64(-2.0).unwrap(),
            rational_from_f64(0.5).unwrap(),
        );
        assert_eq!(a.canonical(), b.canonical());
        // opposite orientation stays distinct
        assert_ne!(a.canonical(), a.negated().canonical());
    }

    #[test]
    fn exact_and_float_evaluation_agree_in_sign() {
        let plane = QPlane::from_f32([0.3, -1.2, 0.5, 0.1]).unwrap();
        for p in [qv(0.0, 0.0, 0.0), qv(1.0, 2.0, -3.0), qv(-0.5, 0.25, 4.0)] {
            let exact = plane.eval(&p);
            let float = plane.eval_f64(p.to_f64());
            if float.abs() > 1e-9 {
                assert_eq!(exact.is_positive(), float > 0.0);
            }
        }
    }
}
