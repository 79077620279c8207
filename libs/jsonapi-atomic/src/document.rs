//! Wire documents of the atomic extension (`atomic:operations` / `atomic:results`).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Operation code of one atomic operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AtomicAction {
    Add,
    Update,
    Remove,
}

impl AtomicAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Update => "update",
            Self::Remove => "remove",
        }
    }
}

impl fmt::Display for AtomicAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource linkage: `{type, id}` or `{type, lid}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lid: Option<String>,
}

impl ResourceIdentifier {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: Some(id.into()),
            lid: None,
        }
    }

    pub fn local(resource_type: impl Into<String>, lid: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: None,
            lid: Some(lid.into()),
        }
    }
}

/// Linkage of a relationship: a list for to-many, a single identifier or `null` for to-one.
///
/// `ToMany` is tried first so that `null` never matches it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationshipData {
    ToMany(Vec<ResourceIdentifier>),
    ToOne(Option<ResourceIdentifier>),
}

impl RelationshipData {
    /// Identifiers carried by this linkage, in document order.
    #[must_use]
    pub fn identifiers(&self) -> Vec<&ResourceIdentifier> {
        match self {
            Self::ToMany(items) => items.iter().collect(),
            Self::ToOne(item) => item.iter().collect(),
        }
    }

    pub(crate) fn identifiers_mut(&mut self) -> Vec<&mut ResourceIdentifier> {
        match self {
            Self::ToMany(items) => items.iter_mut().collect(),
            Self::ToOne(item) => item.iter_mut().collect(),
        }
    }
}

/// A relationship member of a resource object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub data: RelationshipData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

impl From<RelationshipData> for Relationship {
    fn from(data: RelationshipData) -> Self {
        Self { data, meta: None }
    }
}

/// JSON:API resource object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceObject {
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lid: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, Relationship>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

impl ResourceObject {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: None,
            lid: None,
            attributes: Map::new(),
            relationships: BTreeMap::new(),
            meta: None,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_relationship(mut self, name: impl Into<String>, data: RelationshipData) -> Self {
        self.relationships.insert(name.into(), data.into());
        self
    }
}

/// `ref` member of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship: Option<String>,
}

/// One entry of `atomic:operations`.
///
/// `data` stays raw until binding, because its interpretation (resource object
/// or relationship linkage) depends on `ref.relationship`. A JSON `null` is kept
/// as `Some(Value::Null)` and differs from an absent member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperationDescriptor {
    pub op: AtomicAction,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ResourceRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl OperationDescriptor {
    /// The `data` member when it is a JSON object.
    #[must_use]
    pub fn data_object(&self) -> Option<&Map<String, Value>> {
        self.data.as_ref().and_then(Value::as_object)
    }

    /// `ref.relationship`, if the operation targets a relationship.
    #[must_use]
    pub fn relationship(&self) -> Option<&str> {
        self.target
            .as_ref()
            .and_then(|target| target.relationship.as_deref())
    }
}

/// Request document: `{"atomic:operations": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomicOperationRequest {
    #[serde(rename = "atomic:operations")]
    pub operations: Vec<OperationDescriptor>,
}

/// One entry of `atomic:results`; `{}` when the operation produced no data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AtomicResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ResourceObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

impl AtomicResult {
    #[must_use]
    pub fn data(resource: ResourceObject) -> Self {
        Self {
            data: Some(resource),
            meta: None,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_none() && self.meta.is_none()
    }
}

/// Response document: `{"atomic:results": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomicResultDocument {
    #[serde(rename = "atomic:results")]
    pub results: Vec<AtomicResult>,
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn descriptor_distinguishes_null_from_absent_data() {
        let with_null: OperationDescriptor = serde_json::from_value(json!({
            "op": "update",
            "ref": {"type": "computer", "id": "1", "relationship": "owner"},
            "data": null
        }))
        .unwrap();
        assert_eq!(with_null.data, Some(Value::Null));

        let absent: OperationDescriptor = serde_json::from_value(json!({
            "op": "remove",
            "ref": {"type": "computer", "id": "1"}
        }))
        .unwrap();
        assert_eq!(absent.data, None);
        assert_eq!(absent.relationship(), None);
    }

    #[test]
    fn unknown_op_code_is_rejected() {
        let res: Result<OperationDescriptor, _> =
            serde_json::from_value(json!({"op": "upsert", "data": {"type": "customer"}}));
        assert!(res.is_err());
    }

    #[test]
    fn relationship_data_parses_every_linkage_shape() {
        let many: RelationshipData =
            serde_json::from_value(json!([{"type": "computer", "id": "5"}])).unwrap();
        assert_eq!(
            many,
            RelationshipData::ToMany(vec![ResourceIdentifier::new("computer", "5")])
        );

        let one: RelationshipData =
            serde_json::from_value(json!({"type": "customer", "lid": "c1"})).unwrap();
        assert_eq!(
            one,
            RelationshipData::ToOne(Some(ResourceIdentifier::local("customer", "c1")))
        );

        let none: RelationshipData = serde_json::from_value(Value::Null).unwrap();
        assert_eq!(none, RelationshipData::ToOne(None));
    }

    #[test]
    fn empty_result_serializes_as_empty_object() {
        let doc = AtomicResultDocument {
            results: vec![
                AtomicResult::data(ResourceObject::new("customer").with_id("1")),
                AtomicResult::default(),
            ],
        };
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(
            value,
            json!({"atomic:results": [{"data": {"type": "customer", "id": "1"}}, {}]})
        );
    }
}
