//! Typed decoding of configuration values
//!
//! [`from_value`] drives any `serde::Deserialize` type from a [`Value`]
//! tree. Scalars are coerced leniently (`"8080"` decodes into a `u16`,
//! `"true"` into a `bool`). A scalar that cannot be coerced is recorded
//! together with its full key and decoding carries on with a zero value,
//! so one failed decode reports every mismatch at once.
//!
//! [`unflatten`] rebuilds the tree from flat `a.b[0].c` keys.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, DeserializeOwned, IntoDeserializer, Visitor};

use crate::parser::Properties;
use crate::value::Value;
use crate::{StrataError, StrataResult};

/// Decode `value` into `T`
pub fn from_value<T: DeserializeOwned>(value: &Value) -> StrataResult<T> {
    let errors = RefCell::new(Vec::new());
    let result = T::deserialize(ValueDeserializer {
        value,
        path: String::new(),
        errors: &errors,
    });
    let mut errors = errors.into_inner();
    match result {
        Ok(decoded) if errors.is_empty() => Ok(decoded),
        Ok(_) => Err(StrataError::Decode { errors }),
        Err(err) => {
            errors.push(err.0);
            Err(StrataError::Decode { errors })
        }
    }
}

/// Decode the keys under `prefix` of a flat property map into `T`
pub fn from_properties<T: DeserializeOwned>(props: &Properties, prefix: &str) -> StrataResult<T> {
    from_value(&unflatten(props, prefix))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'k> {
    Key(&'k str),
    Index(usize),
}

fn segments(key: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    for part in key.split('.') {
        let Some(open) = part.find('[') else {
            out.push(Segment::Key(part));
            continue;
        };
        let (name, mut rest) = part.split_at(open);
        let mut indices = Vec::new();
        while let Some(stripped) = rest.strip_prefix('[') {
            let Some(close) = stripped.find(']') else {
                break;
            };
            match stripped[..close].parse::<usize>() {
                Ok(i) => indices.push(i),
                Err(_) => break,
            }
            rest = &stripped[close + 1..];
        }
        if !rest.is_empty() {
            out.push(Segment::Key(part));
            continue;
        }
        if !name.is_empty() {
            out.push(Segment::Key(name));
        }
        out.extend(indices.into_iter().map(Segment::Index));
    }
    out
}

enum Node {
    Leaf(Value),
    Map(BTreeMap<String, Node>),
    List(BTreeMap<usize, Node>),
}

impl Node {
    fn insert(&mut self, path: &[Segment<'_>], value: Value) {
        let Some((head, tail)) = path.split_first() else {
            // containers win over the length entries stored at array keys
            if let Node::Leaf(_) = self {
                *self = Node::Leaf(value);
            }
            return;
        };
        match head {
            Segment::Key(k) => {
                if !matches!(self, Node::Map(_)) {
                    *self = Node::Map(BTreeMap::new());
                }
                if let Node::Map(map) = self {
                    map.entry(k.to_string())
                        .or_insert(Node::Leaf(Value::Null))
                        .insert(tail, value);
                }
            }
            Segment::Index(i) => {
                if !matches!(self, Node::List(_)) {
                    *self = Node::List(BTreeMap::new());
                }
                if let Node::List(items) = self {
                    items
                        .entry(*i)
                        .or_insert(Node::Leaf(Value::Null))
                        .insert(tail, value);
                }
            }
        }
    }

    fn into_value(self) -> Value {
        match self {
            Node::Leaf(v) => v,
            Node::Map(map) => Value::Map(map.into_iter().map(|(k, n)| (k, n.into_value())).collect()),
            Node::List(items) => {
                let len = items.keys().next_back().map_or(0, |last| last + 1);
                let mut out = vec![Value::Null; len];
                for (i, node) in items {
                    out[i] = node.into_value();
                }
                Value::Array(out)
            }
        }
    }
}

/// Rebuild a nested value from flat keys below `prefix`. An empty
/// prefix takes every key.
pub fn unflatten(props: &Properties, prefix: &str) -> Value {
    let mut root = Node::Leaf(Value::Null);
    for (key, value) in props {
        let rel = if prefix.is_empty() {
            key.as_str()
        } else if key == prefix {
            ""
        } else if let Some(rest) = key.strip_prefix(prefix) {
            if let Some(r) = rest.strip_prefix('.') {
                r
            } else if rest.starts_with('[') {
                rest
            } else {
                continue;
            }
        } else {
            continue;
        };
        let path = if rel.is_empty() { Vec::new() } else { segments(rel) };
        root.insert(&path, value.clone());
    }
    root.into_value()
}

/// `#[serde(with = "strata_core::decode::duration")]` support for
/// `std::time::Duration` fields written as `30s`, `1h 15m` or seconds.
pub mod duration {
    use std::time::Duration;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::value::Value;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let value = Value::deserialize(deserializer)?;
        value
            .to_duration()
            .ok_or_else(|| D::Error::custom(format!("invalid duration: {value}")))
    }

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }
}

#[derive(Debug)]
struct DecodeError(String);

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for DecodeError {}

impl de::Error for DecodeError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        DecodeError(msg.to_string())
    }
}

struct ValueDeserializer<'a> {
    value: &'a Value,
    path: String,
    errors: &'a RefCell<Vec<String>>,
}

impl<'a> ValueDeserializer<'a> {
    fn child(&self, value: &'a Value, path: String) -> Self {
        ValueDeserializer {
            value,
            path,
            errors: self.errors,
        }
    }

    fn display_path(&self) -> &str {
        if self.path.is_empty() {
            "<root>"
        } else {
            &self.path
        }
    }

    /// Null decodes to the zero value without complaint
    fn mismatch(&self, expected: &str) {
        if self.value.is_null() {
            return;
        }
        self.errors.borrow_mut().push(format!(
            "{}: expected {}, found {} `{}`",
            self.display_path(),
            expected,
            self.value.type_name(),
            self.value
        ));
    }
}

macro_rules! signed {
    ($method:ident, $visit:ident, $ty:ty) => {
        fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
            match self.value.to_i64().and_then(|n| <$ty>::try_from(n).ok()) {
                Some(n) => visitor.$visit(n),
                None => {
                    self.mismatch(stringify!($ty));
                    visitor.$visit(0)
                }
            }
        }
    };
}

macro_rules! unsigned {
    ($method:ident, $visit:ident, $ty:ty) => {
        fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
            match self.value.to_u64().and_then(|n| <$ty>::try_from(n).ok()) {
                Some(n) => visitor.$visit(n),
                None => {
                    self.mismatch(stringify!($ty));
                    visitor.$visit(0)
                }
            }
        }
    };
}

impl<'de, 'a> de::Deserializer<'de> for ValueDeserializer<'a> {
    type Error = DecodeError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        match self.value {
            Value::Null => visitor.visit_unit(),
            Value::Bool(b) => visitor.visit_bool(*b),
            Value::Int(i) => visitor.visit_i64(*i),
            Value::Float(f) => visitor.visit_f64(*f),
            Value::String(s) => visitor.visit_str(s),
            Value::Array(_) => self.deserialize_seq(visitor),
            Value::Map(_) => self.deserialize_map(visitor),
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        match self.value.to_bool() {
            Some(b) => visitor.visit_bool(b),
            None => {
                self.mismatch("bool");
                visitor.visit_bool(false)
            }
        }
    }

    signed!(deserialize_i8, visit_i8, i8);
    signed!(deserialize_i16, visit_i16, i16);
    signed!(deserialize_i32, visit_i32, i32);
    signed!(deserialize_i64, visit_i64, i64);
    unsigned!(deserialize_u8, visit_u8, u8);
    unsigned!(deserialize_u16, visit_u16, u16);
    unsigned!(deserialize_u32, visit_u32, u32);
    unsigned!(deserialize_u64, visit_u64, u64);

    fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        match self.value.to_f64() {
            Some(f) => visitor.visit_f32(f as f32),
            None => {
                self.mismatch("f32");
                visitor.visit_f32(0.0)
            }
        }
    }

    fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        match self.value.to_f64() {
            Some(f) => visitor.visit_f64(f),
            None => {
                self.mismatch("f64");
                visitor.visit_f64(0.0)
            }
        }
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        let text = self.value.to_text().unwrap_or_default();
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => visitor.visit_char(c),
            _ => {
                self.mismatch("char");
                visitor.visit_char('\0')
            }
        }
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        match self.value.to_text() {
            Some(text) => visitor.visit_string(text),
            None => {
                self.mismatch("string");
                visitor.visit_string(String::new())
            }
        }
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        self.deserialize_str(visitor)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        match self.value.to_text() {
            Some(text) => visitor.visit_byte_buf(text.into_bytes()),
            None => {
                self.mismatch("bytes");
                visitor.visit_byte_buf(Vec::new())
            }
        }
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        self.deserialize_bytes(visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        match self.value {
            Value::Null => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        let items: &'a [Value] = match self.value {
            Value::Array(items) => items,
            _ => {
                self.mismatch("sequence");
                &[]
            }
        };
        visitor.visit_seq(SeqReader {
            parent: &self,
            items: items.iter().enumerate(),
        })
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        static EMPTY: BTreeMap<String, Value> = BTreeMap::new();
        let map: &'a BTreeMap<String, Value> = match self.value {
            Value::Map(map) => map,
            _ => {
                self.mismatch("map");
                &EMPTY
            }
        };
        visitor.visit_map(MapReader {
            parent: &self,
            entries: map.iter(),
            pending: None,
        })
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        self.deserialize_map(visitor)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        match self.value {
            Value::String(variant) => {
                let variant: de::value::StrDeserializer<'_, DecodeError> =
                    variant.as_str().into_deserializer();
                visitor.visit_enum(variant)
            }
            other => Err(DecodeError(format!(
                "{}: enum {} must be written as a string, found {}",
                self.display_path(),
                name,
                other.type_name()
            ))),
        }
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        self.deserialize_str(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        visitor.visit_unit()
    }
}

struct SeqReader<'p, 'a, I> {
    parent: &'p ValueDeserializer<'a>,
    items: I,
}

impl<'de, 'p, 'a, I> de::SeqAccess<'de> for SeqReader<'p, 'a, I>
where
    I: Iterator<Item = (usize, &'a Value)>,
{
    type Error = DecodeError;

    fn next_element_seed<T: de::DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, DecodeError> {
        match self.items.next() {
            Some((i, value)) => {
                let path = format!("{}[{}]", self.parent.path, i);
                seed.deserialize(self.parent.child(value, path)).map(Some)
            }
            None => Ok(None),
        }
    }
}

struct MapReader<'p, 'a, I> {
    parent: &'p ValueDeserializer<'a>,
    entries: I,
    pending: Option<(&'a String, &'a Value)>,
}

impl<'de, 'p, 'a, I> de::MapAccess<'de> for MapReader<'p, 'a, I>
where
    I: Iterator<Item = (&'a String, &'a Value)>,
{
    type Error = DecodeError;

    fn next_key_seed<K: de::DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, DecodeError> {
        match self.entries.next() {
            Some((key, value)) => {
                self.pending = Some((key, value));
                let key: de::value::StrDeserializer<'_, DecodeError> =
                    key.as_str().into_deserializer();
                seed.deserialize(key).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V: de::DeserializeSeed<'de>>(
        &mut self,
        seed: V,
    ) -> Result<V::Value, DecodeError> {
        let (key, value) = self
            .pending
            .take()
            .ok_or_else(|| DecodeError("value requested before key".to_string()))?;
        let path = if self.parent.path.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", self.parent.path, key)
        };
        seed.deserialize(self.parent.child(value, path))
    }
}
