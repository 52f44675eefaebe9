//! JSON text to [`PrefValue`] with duplicate-key detection.
//!
//! `serde_json::Value` silently keeps the last of two equal keys and, without
//! the `preserve_order` feature, forgets key order. Both matter here, so the
//! tree is built directly through a serde visitor.

use std::collections::BTreeSet;

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde_json::Number;

use super::{PrefMap, PrefValue};
use crate::error::MalformedInput;

const DUPLICATE_KEY_PREFIX: &str = "duplicate key: ";

pub(super) fn parse_with_duplicate_detection(input: &str) -> Result<PrefValue, MalformedInput> {
    let mut deserializer = serde_json::Deserializer::from_str(input);
    let value = OrderedValue::deserialize(&mut deserializer).map_err(|e| {
        let msg = e.to_string();
        match msg.strip_prefix(DUPLICATE_KEY_PREFIX) {
            // serde_json appends " at line X column Y"; keep only the key.
            Some(rest) => MalformedInput::DuplicateKey {
                key: rest.split(" at line ").next().unwrap_or(rest).to_string(),
            },
            None => MalformedInput::ParseError { message: msg },
        }
    })?;
    deserializer
        .end()
        .map_err(|e| MalformedInput::ParseError {
            message: e.to_string(),
        })?;
    Ok(value.0)
}

struct OrderedValue(PrefValue);

impl<'de> Deserialize<'de> for OrderedValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ValueVisitor;

        impl<'de> Visitor<'de> for ValueVisitor {
            type Value = PrefValue;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("any valid JSON value")
            }

            fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E> {
                Ok(PrefValue::Bool(v))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
                Ok(PrefValue::Number(v.into()))
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
                Ok(PrefValue::Number(v.into()))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Number::from_f64(v)
                    .map(PrefValue::Number)
                    .ok_or_else(|| de::Error::custom("invalid float value"))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E> {
                Ok(PrefValue::String(v.to_owned()))
            }

            fn visit_string<E>(self, v: String) -> Result<Self::Value, E> {
                Ok(PrefValue::String(v))
            }

            fn visit_none<E>(self) -> Result<Self::Value, E> {
                Ok(PrefValue::Null)
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E> {
                Ok(PrefValue::Null)
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let mut items = Vec::new();
                while let Some(elem) = seq.next_element::<OrderedValue>()? {
                    items.push(elem.0);
                }
                Ok(PrefValue::List(items))
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut seen_keys = BTreeSet::new();
                let mut entries = Vec::new();

                while let Some(key) = map.next_key::<String>()? {
                    // Compare decoded keys so "a" and "\u0061" collide.
                    if !seen_keys.insert(key.clone()) {
                        return Err(de::Error::custom(format!("{DUPLICATE_KEY_PREFIX}{key}")));
                    }
                    let value = map.next_value::<OrderedValue>()?;
                    entries.push((key, value.0));
                }
                Ok(PrefValue::Map(PrefMap::from_unique_entries(entries)))
            }
        }

        deserializer.deserialize_any(ValueVisitor).map(OrderedValue)
    }
}
