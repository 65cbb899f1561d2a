//! JSON Schema inference from sample records.
//!
//! Produces the same shape of schema as the `genson` generator: scalar
//! type unions, object `properties` with `required` holding the keys present
//! in every sample, a single merged `items` schema per array, and `anyOf`
//! where structured and scalar samples meet at one position.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Map, Value};

/// Draft identifier placed at the root of every generated schema.
pub const SCHEMA_URI: &str = "http://json-schema.org/schema#";

/// Strings the recorder emits for non-finite doubles.
const SPECIAL_NUMBERS: [&str; 3] = ["NaN", "Infinity", "-Infinity"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum ScalarType {
    Boolean,
    Integer,
    Null,
    Number,
    String,
}

impl ScalarType {
    fn as_str(self) -> &'static str {
        match self {
            ScalarType::Boolean => "boolean",
            ScalarType::Integer => "integer",
            ScalarType::Null => "null",
            ScalarType::Number => "number",
            ScalarType::String => "string",
        }
    }
}

#[derive(Debug, Clone, Default)]
struct ObjectNode {
    properties: BTreeMap<String, SchemaNode>,
    required: BTreeSet<String>,
}

#[derive(Debug, Clone, Default)]
struct ArrayNode {
    items: Option<Box<SchemaNode>>,
}

#[derive(Debug, Clone, Default)]
struct SchemaNode {
    scalars: BTreeSet<ScalarType>,
    object: Option<ObjectNode>,
    array: Option<ArrayNode>,
}

impl SchemaNode {
    fn add(&mut self, value: &Value) {
        match value {
            Value::Null => {
                self.scalars.insert(ScalarType::Null);
            }
            Value::Bool(_) => {
                self.scalars.insert(ScalarType::Boolean);
            }
            Value::Number(n) => {
                let ty = if n.is_i64() || n.is_u64() {
                    ScalarType::Integer
                } else {
                    ScalarType::Number
                };
                self.scalars.insert(ty);
            }
            Value::String(_) => {
                self.scalars.insert(ScalarType::String);
            }
            Value::Array(items) => {
                let node = self.array.get_or_insert_with(ArrayNode::default);
                for item in items {
                    node.items
                        .get_or_insert_with(|| Box::new(SchemaNode::default()))
                        .add(item);
                }
            }
            Value::Object(map) => {
                let keys: BTreeSet<String> = map.keys().cloned().collect();
                let node = self.object.get_or_insert_with(|| ObjectNode {
                    properties: BTreeMap::new(),
                    required: keys.clone(),
                });
                node.required.retain(|k| keys.contains(k));
                for (key, value) in map {
                    node.properties.entry(key.clone()).or_default().add(value);
                }
            }
        }
    }

    fn to_schema(&self) -> Value {
        let mut structured: Vec<Value> = Vec::new();
        if let Some(object) = &self.object {
            let properties: Map<String, Value> = object
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), v.to_schema()))
                .collect();
            let mut schema = Map::new();
            schema.insert("type".to_string(), json!("object"));
            schema.insert("properties".to_string(), Value::Object(properties));
            if !object.required.is_empty() {
                schema.insert("required".to_string(), json!(object.required));
            }
            structured.push(Value::Object(schema));
        }
        if let Some(array) = &self.array {
            let mut schema = Map::new();
            schema.insert("type".to_string(), json!("array"));
            if let Some(items) = &array.items {
                schema.insert("items".to_string(), items.to_schema());
            }
            structured.push(Value::Object(schema));
        }

        let scalars = self.scalar_schema();
        match (structured.len(), scalars) {
            (0, None) => json!({}),
            (0, Some(scalars)) => scalars,
            (1, None) => structured.remove(0),
            (_, scalars) => {
                structured.extend(scalars);
                json!({ "anyOf": structured })
            }
        }
    }

    fn scalar_schema(&self) -> Option<Value> {
        let mut types = self.scalars.clone();
        if types.contains(&ScalarType::Number) {
            types.remove(&ScalarType::Integer);
        }
        let names: Vec<&str> = types.into_iter().map(ScalarType::as_str).collect();
        match names.as_slice() {
            [] => None,
            [one] => Some(json!({ "type": one })),
            _ => Some(json!({ "type": names })),
        }
    }
}

/// Incremental schema inference over sample values.
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    root: SchemaNode,
    samples: usize,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one sample into the schema.
    pub fn add_object(&mut self, value: &Value) {
        self.root.add(value);
        self.samples += 1;
    }

    pub fn sample_count(&self) -> usize {
        self.samples
    }

    /// The schema for every sample added so far, with `$schema` at the root.
    pub fn to_schema(&self) -> Value {
        let mut schema = Map::new();
        schema.insert("$schema".to_string(), json!(SCHEMA_URI));
        match self.root.to_schema() {
            Value::Object(body) => schema.extend(body),
            other => {
                schema.insert("anyOf".to_string(), json!([other]));
            }
        }
        Value::Object(schema)
    }
}

/// Copy of `value` with `NaN`/`Infinity`/`-Infinity` strings replaced by `0`.
///
/// Used only for inference so those positions type as numbers; the dump
/// files keep the strings.
pub fn inference_copy(value: &Value) -> Value {
    match value {
        Value::String(s) if SPECIAL_NUMBERS.contains(&s.as_str()) => json!(0),
        Value::Array(items) => Value::Array(items.iter().map(inference_copy).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), inference_copy(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}
