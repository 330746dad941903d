//! Object-shaped parameter schema shared by every tool.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{Error, Result};

const OBJECT: &str = "object";

/// JSON-schema subset describing a tool's arguments.
///
/// The top-level `type` is always `"object"`; anything else is rejected so
/// that required-field validation has something to reason about.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct ParameterSchema {
    properties: Map<String, Value>,
    required: Vec<String>,
    extra: Map<String, Value>,
}

impl Default for ParameterSchema {
    fn default() -> Self {
        Self::empty()
    }
}

impl ParameterSchema {
    /// Schema accepting an empty object.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            properties: Map::new(),
            required: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Adds a property declaration.
    #[must_use]
    pub fn property(
        mut self,
        name: impl Into<String>,
        kind: &str,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        let name = name.into();
        self.properties.insert(
            name.clone(),
            json!({ "type": kind, "description": description.into() }),
        );
        if required && !self.required.contains(&name) {
            self.required.push(name);
        }
        self
    }

    /// Adds a raw property declaration.
    #[must_use]
    pub fn raw_property(mut self, name: impl Into<String>, schema: Value, required: bool) -> Self {
        let name = name.into();
        self.properties.insert(name.clone(), schema);
        if required && !self.required.contains(&name) {
            self.required.push(name);
        }
        self
    }

    /// Validates and converts a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSchema`] listing every problem found.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut object) = value else {
            return Err(Error::InvalidSchema {
                problems: vec!["parameters must be a JSON object".into()],
            });
        };

        let mut problems = Vec::new();
        match object.remove("type") {
            Some(Value::String(kind)) if kind == OBJECT => {}
            Some(other) => problems.push(format!(
                "parameters.type must be \"object\", got {other}"
            )),
            None => problems.push("parameters.type must be \"object\"".into()),
        }

        let properties = match object.remove("properties") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => {
                problems.push("parameters.properties must be an object".into());
                Map::new()
            }
        };

        let required = match object.remove("required") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => {
                let mut names = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(name) => names.push(name),
                        other => problems.push(format!(
                            "parameters.required entries must be strings, got {other}"
                        )),
                    }
                }
                names
            }
            Some(_) => {
                problems.push("parameters.required must be an array of strings".into());
                Vec::new()
            }
        };

        for name in &required {
            if !properties.contains_key(name) {
                problems.push(format!(
                    "required parameter `{name}` is not declared in parameters.properties"
                ));
            }
        }

        if !problems.is_empty() {
            return Err(Error::InvalidSchema { problems });
        }

        Ok(Self {
            properties,
            required,
            extra: object,
        })
    }

    /// Parses a schema supplied as raw JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSchema`] if the text is not JSON or the schema is invalid.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text).map_err(|err| Error::InvalidSchema {
            problems: vec![format!("parameters is not valid JSON: {err}")],
        })?;
        Self::from_value(value)
    }

    /// Declared properties.
    #[must_use]
    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    /// Names of required properties in declaration order.
    #[must_use]
    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// Returns `true` when `name` is required.
    #[must_use]
    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }

    /// Required properties absent from `args`.
    #[must_use]
    pub fn missing_required(&self, args: &Value) -> Vec<&str> {
        let object = args.as_object();
        self.required
            .iter()
            .filter(|name| {
                object
                    .and_then(|o| o.get(name.as_str()))
                    .is_none_or(Value::is_null)
            })
            .map(String::as_str)
            .collect()
    }

    /// Serializes the schema back to JSON.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::from(self.clone())
    }
}

impl TryFrom<Value> for ParameterSchema {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(value)
    }
}

impl From<ParameterSchema> for Value {
    fn from(schema: ParameterSchema) -> Self {
        let mut object = schema.extra;
        object.insert("type".into(), Value::from(OBJECT));
        object.insert("properties".into(), Value::Object(schema.properties));
        if !schema.required.is_empty() {
            object.insert(
                "required".into(),
                Value::Array(schema.required.into_iter().map(Value::from).collect()),
            );
        }
        Value::Object(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_object_schema() {
        let schema = ParameterSchema::from_value(json!({
            "type": "object",
            "properties": { "city": { "type": "string" } },
            "required": ["city"],
            "additionalProperties": false
        }))
        .unwrap();
        assert!(schema.is_required("city"));
        assert_eq!(schema.to_value()["additionalProperties"], json!(false));
    }

    #[test]
    fn rejects_non_object_types() {
        for value in [json!({"type": "array"}), json!({}), json!([1, 2]), json!("x")] {
            let err = ParameterSchema::from_value(value).expect_err("must reject");
            assert!(matches!(err, Error::InvalidSchema { .. }));
        }
    }

    #[test]
    fn parses_raw_text() {
        let schema = ParameterSchema::parse(r#"{"type":"object","properties":{}}"#).unwrap();
        assert!(schema.properties().is_empty());
        assert!(ParameterSchema::parse("{not json").is_err());
    }

    #[test]
    fn aggregates_problems() {
        let err = ParameterSchema::from_value(json!({
            "type": "string",
            "properties": [],
            "required": ["a", 3]
        }))
        .expect_err("invalid");
        let Error::InvalidSchema { problems } = err else {
            panic!("unexpected error");
        };
        assert_eq!(problems.len(), 4);
    }

    #[test]
    fn reports_missing_required() {
        let schema = ParameterSchema::empty()
            .property("city", "string", "City name", true)
            .property("units", "string", "Units", false);
        assert_eq!(schema.missing_required(&json!({})), vec!["city"]);
        assert_eq!(schema.missing_required(&json!({"city": null})), vec!["city"]);
        assert!(schema.missing_required(&json!({"city": "Oslo"})).is_empty());
    }
}
