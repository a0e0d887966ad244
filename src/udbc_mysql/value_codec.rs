use crate::udbc::connection::Row;
use crate::udbc::value::Value;
use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use mysql_async::{Params, Row as MyRow, Value as MyValue};

pub fn from_mysql_value(v: &MyValue) -> Value {
    match v {
        MyValue::NULL => Value::Null,
        MyValue::Int(i) => Value::I64(*i),
        MyValue::UInt(u) => i64::try_from(*u)
            .map(Value::I64)
            .unwrap_or_else(|_| Value::Str(u.to_string())),
        MyValue::Float(f) => Value::F64(f64::from(*f)),
        MyValue::Double(d) => Value::F64(*d),
        MyValue::Bytes(b) => match std::str::from_utf8(b) {
            Ok(s) => Value::Str(s.to_string()),
            Err(_) => Value::Bytes(b.clone()),
        },
        MyValue::Date(y, m, d, h, min, s, micro) => {
            let Some(date) = NaiveDate::from_ymd_opt(i32::from(*y), u32::from(*m), u32::from(*d))
            else {
                return Value::Str(v.as_sql(true));
            };
            if *h == 0 && *min == 0 && *s == 0 && *micro == 0 {
                return Value::Date(date);
            }
            date.and_hms_micro_opt(u32::from(*h), u32::from(*min), u32::from(*s), *micro)
                .map(Value::DateTime)
                .unwrap_or_else(|| Value::Str(v.as_sql(true)))
        }
        MyValue::Time(is_neg, days, h, min, s, micro) => {
            let hours = *days * 24 + u32::from(*h);
            match NaiveTime::from_hms_micro_opt(hours, u32::from(*min), u32::from(*s), *micro) {
                Some(t) if !*is_neg => Value::Time(t),
                // Negative or multi-day intervals have no NaiveTime form.
                _ => Value::Str(v.as_sql(true)),
            }
        }
    }
}

pub fn to_mysql_value(v: &Value) -> MyValue {
    match v {
        Value::Null => MyValue::NULL,
        Value::Bool(b) => MyValue::Int(i64::from(*b)),
        Value::I16(i) => MyValue::Int(i64::from(*i)),
        Value::I32(i) => MyValue::Int(i64::from(*i)),
        Value::I64(i) => MyValue::Int(*i),
        Value::U8(u) => MyValue::UInt(u64::from(*u)),
        Value::F64(f) => MyValue::Double(*f),
        Value::Str(s) => MyValue::Bytes(s.as_bytes().to_vec()),
        Value::Bytes(b) => MyValue::Bytes(b.clone()),
        Value::Date(d) => date_value(*d, 0, 0, 0, 0),
        Value::Time(t) => MyValue::Time(
            false,
            0,
            t.hour() as u8,
            t.minute() as u8,
            t.second() as u8,
            t.nanosecond() / 1000,
        ),
        Value::DateTime(dt) => date_value(
            dt.date(),
            dt.hour(),
            dt.minute(),
            dt.second(),
            dt.and_utc().timestamp_subsec_micros(),
        ),
        Value::DateTimeUtc(dt) => {
            let ndt = dt.naive_utc();
            date_value(
                ndt.date(),
                ndt.hour(),
                ndt.minute(),
                ndt.second(),
                dt.timestamp_subsec_micros(),
            )
        }
        Value::Decimal(d) => MyValue::Bytes(d.to_string().into_bytes()),
        Value::List(_) | Value::Map(_) => MyValue::NULL,
    }
}

fn date_value(d: NaiveDate, h: u32, min: u32, s: u32, micro: u32) -> MyValue {
    MyValue::Date(
        d.year() as u16,
        d.month() as u8,
        d.day() as u8,
        h as u8,
        min as u8,
        s as u8,
        micro,
    )
}

pub fn to_params(values: &[Value]) -> Params {
    if values.is_empty() {
        Params::Empty
    } else {
        Params::Positional(values.iter().map(to_mysql_value).collect())
    }
}

/// Column names and the row keyed by them.
pub fn map_row(row: &MyRow) -> (Vec<String>, Row) {
    let names: Vec<String> = row
        .columns_ref()
        .iter()
        .map(|c| c.name_str().to_string())
        .collect();
    let values = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let value = row.as_ref(i).map(from_mysql_value).unwrap_or(Value::Null);
            (name.clone(), value)
        })
        .collect();
    (names, values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_values() {
        let d = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let my = to_mysql_value(&Value::Date(d));
        assert_eq!(from_mysql_value(&my), Value::Date(d));

        let dt = d.and_hms_micro_opt(13, 5, 7, 250).unwrap();
        let my = to_mysql_value(&Value::DateTime(dt));
        assert_eq!(from_mysql_value(&my), Value::DateTime(dt));
    }

    #[test]
    fn test_invalid_date_is_kept_as_text() {
        let zero = MyValue::Date(0, 0, 0, 0, 0, 0, 0);
        assert!(matches!(from_mysql_value(&zero), Value::Str(_)));
    }

    #[test]
    fn test_negative_time_is_text() {
        let t = MyValue::Time(true, 0, 1, 2, 3, 0);
        assert!(matches!(from_mysql_value(&t), Value::Str(_)));
    }

    #[test]
    fn test_empty_params() {
        assert!(matches!(to_params(&[]), Params::Empty));
        match to_params(&[Value::I32(7)]) {
            Params::Positional(values) => assert_eq!(values, vec![MyValue::Int(7)]),
            other => panic!("unexpected {other:?}"),
        }
    }
}
