use crate::error::DbError;
use crate::udbc::connection::Row;
use crate::udbc::value::Value;
use serde::de::{self, Deserializer, IntoDeserializer, MapAccess, Visitor};

/// Deserializes one result row into any `Deserialize` type keyed by column name.
pub struct RowDeserializer<'a> {
    row: &'a Row,
}

impl<'a> RowDeserializer<'a> {
    pub fn new(row: &'a Row) -> Self {
        Self { row }
    }
}

impl<'de> Deserializer<'de> for RowDeserializer<'_> {
    type Error = DbError;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_map(RowMapAccess {
            iter: self.row.iter(),
            pending: None,
        })
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 u8 u16 u32 u64 f32 f64 char str string
        unit seq tuple tuple_struct map struct enum identifier ignored_any
        unit_struct newtype_struct bytes byte_buf option
    }
}

struct RowMapAccess<'a> {
    iter: std::collections::hash_map::Iter<'a, String, Value>,
    pending: Option<&'a Value>,
}

impl<'de> MapAccess<'de> for RowMapAccess<'_> {
    type Error = DbError;

    fn next_key_seed<K>(&mut self, seed: K) -> Result<Option<K::Value>, Self::Error>
    where
        K: de::DeserializeSeed<'de>,
    {
        match self.iter.next() {
            Some((k, v)) => {
                self.pending = Some(v);
                seed.deserialize(k.as_str().into_deserializer()).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V>(&mut self, seed: V) -> Result<V::Value, Self::Error>
    where
        V: de::DeserializeSeed<'de>,
    {
        let value = self
            .pending
            .take()
            .ok_or_else(|| DbError::Value("value requested before key".into()))?;
        seed.deserialize(ValueDeserializer { value })
    }
}

pub struct ValueDeserializer<'a> {
    pub value: &'a Value,
}

impl<'de> Deserializer<'de> for ValueDeserializer<'_> {
    type Error = DbError;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.value {
            Value::Null => visitor.visit_unit(),
            Value::Bool(v) => visitor.visit_bool(*v),
            Value::I16(v) => visitor.visit_i16(*v),
            Value::I32(v) => visitor.visit_i32(*v),
            Value::I64(v) => visitor.visit_i64(*v),
            Value::U8(v) => visitor.visit_u8(*v),
            Value::F64(v) => visitor.visit_f64(*v),
            Value::Str(v) => visitor.visit_str(v),
            Value::Bytes(v) => visitor.visit_bytes(v),
            Value::Date(d) => visitor.visit_string(d.to_string()),
            Value::Time(t) => visitor.visit_string(t.to_string()),
            Value::DateTime(dt) => visitor.visit_string(dt.to_string()),
            Value::DateTimeUtc(dt) => visitor.visit_string(dt.to_rfc3339()),
            Value::Decimal(d) => visitor.visit_string(d.to_string()),
            Value::List(_) | Value::Map(_) => Err(DbError::Value(
                "nested values cannot be mapped onto a column".into(),
            )),
        }
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.value {
            Value::Null => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_ignored_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_unit()
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 u8 u16 u32 u64 f32 f64 char str string
        unit seq tuple tuple_struct map struct enum identifier
        unit_struct newtype_struct bytes byte_buf
    }
}
