use crate::error::DbError;
use crate::udbc::serializer;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    Null,
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    F64(f64),
    Str(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeUtc(DateTime<Utc>),
    Decimal(Decimal),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
}

/// 将 T: Serialize 转为位置参数列表
///
/// Tuples, slices and vectors keep their order. `()` yields no parameters and a
/// scalar (including `None`) yields a single one.
pub fn to_values<T: Serialize + ?Sized>(t: &T) -> Result<Vec<Value>, DbError> {
    let out = match serializer::to_value(t)? {
        Value::List(vec) => vec,
        Value::Map(_) => {
            return Err(DbError::Value(
                "named parameters are not supported, pass a tuple or a slice".into(),
            ));
        }
        other => vec![other],
    };
    Ok(out)
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::I16(v)
    }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}
impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::U8(v)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_values_unit() {
        let values = to_values(&()).unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn test_to_values_tuple() {
        let values = to_values(&(1, "hello")).unwrap();
        assert_eq!(values, vec![Value::I32(1), Value::Str("hello".to_string())]);
    }

    #[test]
    fn test_to_values_scalar_and_slice() {
        assert_eq!(to_values(&0i64).unwrap(), vec![Value::I64(0)]);
        assert_eq!(
            to_values(&[1i16, 2][..]).unwrap(),
            vec![Value::I16(1), Value::I16(2)]
        );
    }

    #[test]
    fn test_to_values_rejects_struct() {
        #[derive(Serialize)]
        struct Named {
            id: i64,
        }
        assert!(matches!(
            to_values(&Named { id: 1 }),
            Err(DbError::Value(_))
        ));
    }
}
