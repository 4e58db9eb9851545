//! Conversion between models and `serde_json::Value`.
//!
//! JSON `null` maps to [`Model::Absent`]. Going back, non-finite floats also
//! become `null` and integer keys are rendered as strings.

use serde_json::{Map, Number, Value};

use super::{ListModel, MapModel, Model, Primitive};

impl From<Value> for Model {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Model::Absent,
            Value::Bool(b) => Model::Primitive(Primitive::Bool(b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Model::Primitive(Primitive::Int(i)),
                None => Model::Primitive(Primitive::Float(n.as_f64().unwrap_or(f64::NAN))),
            },
            Value::String(s) => Model::Primitive(Primitive::Str(s)),
            Value::Array(items) => Model::List(items.into_iter().map(Model::from).collect()),
            Value::Object(fields) => Model::Map(fields.into_iter().map(|(k, v)| (k, Model::from(v))).collect()),
        }
    }
}

impl Model {
    /// Render the model as JSON. Metadata is dropped.
    pub fn to_json(&self) -> Value {
        match self {
            Model::Map(map) => map.to_json(),
            Model::List(list) => list.to_json(),
            Model::Primitive(p) => p.to_json(),
            Model::Absent => Value::Null,
        }
    }
}

impl MapModel {
    pub fn to_json(&self) -> Value {
        let fields: Map<String, Value> = self
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_json()))
            .collect();
        Value::Object(fields)
    }
}

impl ListModel {
    pub fn to_json(&self) -> Value {
        Value::Array(self.iter().map(Model::to_json).collect())
    }
}

impl Primitive {
    pub fn to_json(&self) -> Value {
        match self {
            Primitive::Bool(b) => Value::Bool(*b),
            Primitive::Int(n) => Value::Number((*n).into()),
            Primitive::Float(x) => Number::from_f64(*x).map_or(Value::Null, Value::Number),
            Primitive::Str(s) => Value::String(s.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_round_trip() {
        let value = json!({
            "title": "Build",
            "progress": 0.5,
            "steps": [1, 2, null],
            "done": false,
        });
        let model = Model::from(value.clone());

        assert_eq!(
            model.as_map().and_then(|m| m.field("title")),
            Some(&Model::from("Build"))
        );
        assert_eq!(model.to_json(), value);
    }

    #[test]
    fn null_becomes_absent() {
        assert_eq!(Model::from(Value::Null), Model::Absent);
    }
}
