use std::fmt::{Display, Formatter};

use num_traits::NumCast;

/// A dynamically typed array element, widened to 64 bits.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub enum PValue {
    /// A boolean.
    Bool(bool),
    /// Any signed integer.
    I64(i64),
    /// Any unsigned integer.
    U64(u64),
    /// Any float.
    F64(f64),
}

impl PValue {
    /// Cast to a numeric type, `None` if the value does not fit or is a boolean.
    pub fn cast<T: NumCast>(self) -> Option<T> {
        match self {
            Self::Bool(_) => None,
            Self::I64(v) => T::from(v),
            Self::U64(v) => T::from(v),
            Self::F64(v) => T::from(v),
        }
    }

    /// The boolean value, if this is a boolean.
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// The value as a float, booleans map to `0.0`/`1.0`.
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Bool(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
            other => other.cast::<f64>().unwrap_or(f64::NAN),
        }
    }
}

impl Display for PValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
            Self::F64(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for PValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for PValue {
    fn from(value: i64) -> Self {
        Self::I64(value)
    }
}

impl From<u64> for PValue {
    fn from(value: u64) -> Self {
        Self::U64(value)
    }
}

impl From<f64> for PValue {
    fn from(value: f64) -> Self {
        Self::F64(value)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(PValue::Bool(true), 1.0)]
    #[case(PValue::Bool(false), 0.0)]
    #[case(PValue::I64(-3), -3.0)]
    #[case(PValue::U64(7), 7.0)]
    #[case(PValue::F64(0.5), 0.5)]
    fn widen_to_float(#[case] value: PValue, #[case] expected: f64) {
        assert_eq!(value.as_f64(), expected);
    }

    #[test]
    fn booleans_do_not_cast() {
        assert_eq!(PValue::Bool(true).cast::<i32>(), None);
        assert_eq!(PValue::I64(300).cast::<u8>(), None);
        assert_eq!(PValue::U64(300).cast::<u16>(), Some(300));
    }
}
