//! Exact rational scalars.
//!
//! The partition kernel works over `BigRational` so that all incidence
//! predicates (dimension, emptiness, equality) are decided exactly. Input
//! coordinates arrive as binary floats; they are ingested through their
//! shortest decimal representation, so the rational value matches the
//! number as printed rather than the raw mantissa.

use anyhow::{bail, Result};
use num::{BigInt, BigRational, ToPrimitive, Zero};

pub type Scalar = BigRational;

/// Parse a plain decimal string (`-0.125`, `3`, `12.5`) into a rational.
pub fn rational_from_decimal(s: &str) -> Result<Scalar> {
    let s = s.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let mut parts = digits.splitn(2, '.');
    let int_part = parts.next().unwrap_or("");
    let frac_part = parts.next().unwrap_or("");
    if int_part.is_empty() && frac_part.is_empty() {
        bail!("empty decimal literal {:?}", s);
    }
    if !int_part.chars().all(|c| c.is_ascii_digit()) || !frac_part.chars().all(|c| c.is_ascii_digit()) {
        bail!("malformed decimal literal {:?}", s);
    }

    let mut numer = if int_part.is_empty() {
        BigInt::zero()
    } else {
        int_part.parse::<BigInt>()?
    };
    let mut denom = BigInt::from(1);
    if !frac_part.is_empty() {
        let scale = num::pow(BigInt::from(10), frac_part.len());
        numer = numer * &scale + frac_part.parse::<BigInt>()?;
        denom = scale;
    }
    if negative {
        numer = -numer;
    }
    Ok(Scalar::new(numer, denom))
}

/// Exact rational of the shortest decimal representation of `v`.
pub fn rational_from_f32(v: f32) -> Result<Scalar> {
    if !v.is_finite() {
        bail!("non-finite coordinate {}", v);
    }
    rational_from_decimal(&format!("{}", v))
}

/// Exact rational of the shortest decimal representation of `v`.
pub fn rational_from_f64(v: f64) -> Result<Scalar> {
    if !v.is_finite() {
        bail!("non-finite coordinate {}", v);
    }
    rational_from_decimal(&format!("{}", v))
}

pub fn to_f64(q: &Scalar) -> f64 {
    q.to_f64().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use num::One;
    use quickcheck::{quickcheck, TestResult};

    #[test]
    fn parses_integers_and_fractions() {
        assert_eq!(rational_from_decimal("3").unwrap(), Scalar::from_integer(3.into()));
        assert_eq!(
            rational_from_decimal("-0.125").unwrap(),
            Scalar::new((-1).into(), 8.into())
        );
        assert_eq!(rational_from_decimal("12.5").unwrap(), Scalar::new(25.into(), 2.into()));
        assert_eq!(rational_from_decimal(".5").unwrap(), Scalar::new(1.into(), 2.into()));
    }

    #[test]
    fn rejects_garbage() {
        assert!(rational_from_decimal("").is_err());
        assert!(rational_from_decimal("1.2.3").is_err());
        assert!(rational_from_decimal("abc").is_err());
        assert!(rational_from_f32(f32::NAN).is_err());
    }

    #[test]
    fn decimal_is_exact() {
        // 0.1 as a rational is exactly 1/10, not the nearest binary float
        let q = rational_from_f32(0.1).unwrap();
        assert_eq!(q, Scalar::new(1.into(), 10.into()));
    }

    #[test]
    fn one_is_one() {
        assert!(rational_from_f32(1.0).unwrap().is_one());
    }

    quickcheck! {
        fn roundtrips_through_f32(v: f32) -> TestResult {
            if !v.is_finite() {
                return TestResult::discard();
            }
            let q = rational_from_f32(v).unwrap();
            TestResult::from_bool(to_f64(&q) as f32 == v)
        }
    }
}
