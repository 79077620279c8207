//! Input schemas validating and coercing resource objects before they reach a view.
//!
//! Violation paths are relative to the resource object (`attributes.name`); the
//! executor roots them at `data.` so they point into the operation.

use std::collections::BTreeMap;
use std::marker::PhantomData;

use jsonapi_errors::ValidationViolation;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Number, Value};

use crate::document::ResourceObject;

/// Validates and coerces the input of a create or update operation.
pub trait InputSchema: Send + Sync {
    /// # Errors
    /// Returns every violation found in `data`.
    fn validate(&self, data: &mut ResourceObject) -> Result<(), Vec<ValidationViolation>>;
}

/// Schema that accepts any input unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl InputSchema for AcceptAll {
    fn validate(&self, _data: &mut ResourceObject) -> Result<(), Vec<ValidationViolation>> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
    Any,
}

impl FieldKind {
    const fn type_code(self) -> &'static str {
        match self {
            Self::String => "string_type",
            Self::Integer => "int_type",
            Self::Number => "float_type",
            Self::Boolean => "bool_type",
            Self::Object => "dict_type",
            Self::Array => "list_type",
            Self::Any => "any",
        }
    }

    const fn description(self) -> &'static str {
        match self {
            Self::String => "a valid string",
            Self::Integer => "a valid integer",
            Self::Number => "a valid number",
            Self::Boolean => "a valid boolean",
            Self::Object => "a valid object",
            Self::Array => "a valid list",
            Self::Any => "any value",
        }
    }

    /// Accept `value` as is, or coerce it from a lax representation.
    fn coerce(self, value: &Value) -> Option<Value> {
        match (self, value) {
            (Self::Any, v)
            | (Self::String, v @ Value::String(_))
            | (Self::Boolean, v @ Value::Bool(_))
            | (Self::Object, v @ Value::Object(_))
            | (Self::Array, v @ Value::Array(_)) => Some(v.clone()),
            (Self::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => {
                Some(Value::Number(n.clone()))
            }
            (Self::Integer, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
            (Self::Number, Value::Number(n)) => Some(Value::Number(n.clone())),
            (Self::Number, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number),
            (Self::Boolean, Value::String(s)) => match s.as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct FieldSpec {
    kind: FieldKind,
    required: bool,
    nullable: bool,
}

/// Policy for attributes a schema does not declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownAttributes {
    /// Keep them unchanged.
    #[default]
    Allow,
    /// Report each as a violation.
    Reject,
    /// Drop them silently.
    Strip,
}

/// Declarative attribute schema.
///
/// ```
/// use jsonapi_atomic::schema::{AttributeSchema, FieldKind};
///
/// let create = AttributeSchema::new()
///     .required("name", FieldKind::String)
///     .nullable("email", FieldKind::String);
/// let update = create.partial();
/// # let _ = update;
/// ```
#[derive(Debug, Clone, Default)]
pub struct AttributeSchema {
    fields: BTreeMap<String, FieldSpec>,
    unknown: UnknownAttributes,
}

impl AttributeSchema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.insert(name.into(), spec);
        self
    }

    /// Optional, non-null field.
    #[must_use]
    pub fn field(self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.with_field(
            name,
            FieldSpec {
                kind,
                required: false,
                nullable: false,
            },
        )
    }

    /// Required, non-null field.
    #[must_use]
    pub fn required(self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.with_field(
            name,
            FieldSpec {
                kind,
                required: true,
                nullable: false,
            },
        )
    }

    /// Optional field that accepts `null`.
    #[must_use]
    pub fn nullable(self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.with_field(
            name,
            FieldSpec {
                kind,
                required: false,
                nullable: true,
            },
        )
    }

    #[must_use]
    pub fn unknown_attributes(mut self, policy: UnknownAttributes) -> Self {
        self.unknown = policy;
        self
    }

    /// Update form of this schema: same fields, none of them required.
    #[must_use]
    pub fn partial(&self) -> Self {
        let mut partial = self.clone();
        for spec in partial.fields.values_mut() {
            spec.required = false;
        }
        partial
    }
}

impl InputSchema for AttributeSchema {
    fn validate(&self, data: &mut ResourceObject) -> Result<(), Vec<ValidationViolation>> {
        let mut violations = Vec::new();

        for (name, spec) in &self.fields {
            let path = format!("attributes.{name}");
            let Some(value) = data.attributes.get_mut(name) else {
                if spec.required {
                    violations
                        .push(ValidationViolation::new(path, "field required").with_code("missing"));
                }
                continue;
            };
            if value.is_null() {
                if !spec.nullable {
                    violations.push(
                        ValidationViolation::new(path, "input should not be null")
                            .with_code("null"),
                    );
                }
                continue;
            }
            match spec.kind.coerce(value) {
                Some(coerced) => *value = coerced,
                None => violations.push(
                    ValidationViolation::new(
                        path,
                        format!("input should be {}", spec.kind.description()),
                    )
                    .with_code(spec.kind.type_code()),
                ),
            }
        }

        match self.unknown {
            UnknownAttributes::Allow => {}
            UnknownAttributes::Strip => data.attributes.retain(|k, _| self.fields.contains_key(k)),
            UnknownAttributes::Reject => violations.extend(
                data.attributes
                    .keys()
                    .filter(|k| !self.fields.contains_key(*k))
                    .map(|k| {
                        ValidationViolation::new(
                            format!("attributes.{k}"),
                            "extra attributes not permitted",
                        )
                        .with_code("extra_forbidden")
                    }),
            ),
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

/// Schema backed by a serde type: attributes are deserialized into `T` and the
/// normalized form is written back.
pub struct TypedSchema<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedSchema<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for TypedSchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for TypedSchema<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedSchema")
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> InputSchema for TypedSchema<T>
where
    T: DeserializeOwned + Serialize,
{
    fn validate(&self, data: &mut ResourceObject) -> Result<(), Vec<ValidationViolation>> {
        let raw = Value::Object(std::mem::take(&mut data.attributes));
        let typed: T = match serde_path_to_error::deserialize(raw.clone()) {
            Ok(typed) => typed,
            Err(e) => {
                if let Value::Object(original) = raw {
                    data.attributes = original;
                }
                let message = e.inner().to_string();
                let field = violation_field(&e.path().to_string(), &message);
                return Err(vec![ValidationViolation::new(field, message).with_code("invalid")]);
            }
        };
        match serde_json::to_value(&typed) {
            Ok(Value::Object(normalized)) => {
                data.attributes = normalized;
                Ok(())
            }
            Ok(_) | Err(_) => {
                if let Value::Object(original) = raw {
                    data.attributes = original;
                }
                Err(vec![
                    ValidationViolation::new("attributes", "attributes must serialize to an object")
                        .with_code("invalid"),
                ])
            }
        }
    }
}

/// Attribute path of a deserialization failure. Root-level failures name the
/// field only through serde's "missing field" or "unknown field" message.
fn violation_field(path: &str, message: &str) -> String {
    if path != "." {
        return format!("attributes.{path}");
    }
    message
        .strip_prefix("missing field `")
        .or_else(|| message.strip_prefix("unknown field `"))
        .and_then(|rest| rest.split('`').next())
        .map_or_else(|| "attributes".to_owned(), |name| format!("attributes.{name}"))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn customer(attrs: Value) -> ResourceObject {
        let Value::Object(attributes) = attrs else {
            panic!("attributes must be an object");
        };
        ResourceObject {
            attributes,
            ..ResourceObject::new("customer")
        }
    }

    fn schema() -> AttributeSchema {
        AttributeSchema::new()
            .required("name", FieldKind::String)
            .nullable("email", FieldKind::String)
            .field("age", FieldKind::Integer)
            .unknown_attributes(UnknownAttributes::Reject)
    }

    #[test]
    fn reports_every_violation() {
        let mut data = customer(json!({"email": 7, "nickname": "x"}));
        let violations = schema().validate(&mut data).unwrap_err();
        let fields: Vec<_> = violations.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["attributes.email", "attributes.name", "attributes.nickname"]
        );
        assert_eq!(violations[1].code.as_deref(), Some("missing"));
    }

    #[test]
    fn coerces_lax_values() {
        let mut data = customer(json!({"name": "Ann", "age": "42", "email": null}));
        schema().validate(&mut data).unwrap();
        assert_eq!(data.attributes["age"], json!(42));
        assert_eq!(data.attributes["email"], Value::Null);
    }

    #[test]
    fn partial_schema_does_not_require_fields() {
        let mut data = customer(json!({"age": 3}));
        assert!(schema().validate(&mut data).is_err());
        schema().partial().validate(&mut data).unwrap();
    }

    #[test]
    fn strip_policy_drops_unknown_attributes() {
        let strip = AttributeSchema::new()
            .field("name", FieldKind::String)
            .unknown_attributes(UnknownAttributes::Strip);
        let mut data = customer(json!({"name": "Ann", "extra": true}));
        strip.validate(&mut data).unwrap();
        assert_eq!(Value::Object(data.attributes), json!({"name": "Ann"}));
    }

    #[derive(Serialize, Deserialize)]
    struct ComputerInput {
        serial: String,
        #[serde(default)]
        retired: bool,
    }

    #[test]
    fn typed_schema_normalizes_attributes() {
        let mut data = customer(json!({"serial": "X1"}));
        TypedSchema::<ComputerInput>::new().validate(&mut data).unwrap();
        assert_eq!(data.attributes["retired"], json!(false));

        let mut bad = customer(json!({"retired": true}));
        let violations = TypedSchema::<ComputerInput>::new()
            .validate(&mut bad)
            .unwrap_err();
        assert_eq!(violations[0].field, "attributes.serial");
        assert_eq!(bad.attributes["retired"], json!(true));
    }

    #[test]
    fn typed_schema_names_the_offending_field() {
        let mut bad = customer(json!({"serial": "X1", "retired": "soon"}));
        let violations = TypedSchema::<ComputerInput>::new()
            .validate(&mut bad)
            .unwrap_err();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "attributes.retired");
        assert!(violations[0].message.contains("invalid type"));

        assert_eq!(violation_field(".", "invalid length 0"), "attributes");
    }
}
