//! Record storage with relationship bookkeeping.

use std::collections::{BTreeMap, BTreeSet};

use jsonapi_atomic::{Cardinality, RelationshipData, RelationshipInfo, ResourceIdentifier, StoreError};
use serde::Serialize;
use serde_json::{Map, Value};

/// Stored members of one relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Link {
    One {
        related_type: String,
        id: Option<String>,
    },
    Many {
        related_type: String,
        ids: BTreeSet<String>,
    },
}

impl Link {
    fn empty(related_type: &str, cardinality: Cardinality) -> Self {
        match cardinality {
            Cardinality::ToOne => Self::One {
                related_type: related_type.to_owned(),
                id: None,
            },
            Cardinality::ToMany => Self::Many {
                related_type: related_type.to_owned(),
                ids: BTreeSet::new(),
            },
        }
    }

    #[must_use]
    pub fn related_type(&self) -> &str {
        match self {
            Self::One { related_type, .. } | Self::Many { related_type, .. } => related_type,
        }
    }

    #[must_use]
    pub fn members(&self) -> Vec<String> {
        match self {
            Self::One { id, .. } => id.iter().cloned().collect(),
            Self::Many { ids, .. } => ids.iter().cloned().collect(),
        }
    }

    fn attach(&mut self, member: &str) {
        match self {
            Self::One { id, .. } => *id = Some(member.to_owned()),
            Self::Many { ids, .. } => {
                ids.insert(member.to_owned());
            }
        }
    }

    fn detach(&mut self, member: &str) {
        match self {
            Self::One { id, .. } => {
                if id.as_deref() == Some(member) {
                    *id = None;
                }
            }
            Self::Many { ids, .. } => {
                ids.remove(member);
            }
        }
    }

    fn linkage(&self) -> RelationshipData {
        match self {
            Self::One { related_type, id } => RelationshipData::ToOne(
                id.as_ref()
                    .map(|id| ResourceIdentifier::new(related_type.as_str(), id.as_str())),
            ),
            Self::Many { related_type, ids } => RelationshipData::ToMany(
                ids.iter()
                    .map(|id| ResourceIdentifier::new(related_type.as_str(), id.as_str()))
                    .collect(),
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Record {
    pub attributes: Map<String, Value>,
    pub links: BTreeMap<String, Link>,
}

impl Record {
    /// Linkage of every stored relationship, keyed by name.
    #[must_use]
    pub fn relationships(&self) -> BTreeMap<String, RelationshipData> {
        self.links
            .iter()
            .map(|(name, link)| (name.clone(), link.linkage()))
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
struct Table {
    records: BTreeMap<String, Record>,
    sequence: u64,
}

/// Every record of the store, grouped by resource type.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    types: BTreeMap<String, Table>,
}

impl Tables {
    #[must_use]
    pub fn get(&self, resource_type: &str, id: &str) -> Option<&Record> {
        self.types.get(resource_type)?.records.get(id)
    }

    #[must_use]
    pub fn contains(&self, resource_type: &str, id: &str) -> bool {
        self.get(resource_type, id).is_some()
    }

    #[must_use]
    pub fn ids(&self, resource_type: &str) -> Vec<String> {
        self.types
            .get(resource_type)
            .map(|t| t.records.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn record_mut(&mut self, resource_type: &str, id: &str) -> Result<&mut Record, StoreError> {
        self.types
            .get_mut(resource_type)
            .and_then(|t| t.records.get_mut(id))
            .ok_or_else(|| StoreError::not_found(resource_type, id))
    }

    /// Insert a record under the client id, or under the next free sequence id.
    ///
    /// # Errors
    /// Returns `StoreError::Conflict` if the client id is taken.
    pub fn create(
        &mut self,
        resource_type: &str,
        id: Option<String>,
        attributes: Map<String, Value>,
    ) -> Result<String, StoreError> {
        let table = self.types.entry(resource_type.to_owned()).or_default();
        let id = match id {
            Some(id) if table.records.contains_key(&id) => {
                return Err(StoreError::Conflict(format!(
                    "{resource_type} with id '{id}' already exists"
                )));
            }
            Some(id) => id,
            None => loop {
                table.sequence += 1;
                let candidate = table.sequence.to_string();
                if !table.records.contains_key(&candidate) {
                    break candidate;
                }
            },
        };
        table.records.insert(
            id.clone(),
            Record {
                attributes,
                links: BTreeMap::new(),
            },
        );
        Ok(id)
    }

    /// Overlay `attributes` on the stored ones.
    ///
    /// # Errors
    /// Returns `StoreError::NotFound` if the record does not exist.
    pub fn merge_attributes(
        &mut self,
        resource_type: &str,
        id: &str,
        attributes: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let record = self.record_mut(resource_type, id)?;
        record.attributes.extend(attributes);
        Ok(())
    }

    /// Remove a record and every link pointing at it.
    ///
    /// # Errors
    /// Returns `StoreError::NotFound` if the record does not exist.
    pub fn delete(&mut self, resource_type: &str, id: &str) -> Result<Record, StoreError> {
        let record = self
            .types
            .get_mut(resource_type)
            .and_then(|t| t.records.remove(id))
            .ok_or_else(|| StoreError::not_found(resource_type, id))?;
        for table in self.types.values_mut() {
            for other in table.records.values_mut() {
                for link in other.links.values_mut() {
                    if link.related_type() == resource_type {
                        link.detach(id);
                    }
                }
            }
        }
        Ok(record)
    }

    fn link_members(&self, resource_type: &str, id: &str, name: &str) -> Vec<String> {
        self.get(resource_type, id)
            .and_then(|r| r.links.get(name))
            .map(Link::members)
            .unwrap_or_default()
    }

    fn link_mut(
        &mut self,
        resource_type: &str,
        id: &str,
        name: &str,
        related_type: &str,
        cardinality: Cardinality,
    ) -> Option<&mut Link> {
        let record = self.types.get_mut(resource_type)?.records.get_mut(id)?;
        Some(
            record
                .links
                .entry(name.to_owned())
                .or_insert_with(|| Link::empty(related_type, cardinality)),
        )
    }

    fn detach(&mut self, resource_type: &str, id: &str, name: &str, member: &str) {
        if let Some(link) = self
            .types
            .get_mut(resource_type)
            .and_then(|t| t.records.get_mut(id))
            .and_then(|r| r.links.get_mut(name))
        {
            link.detach(member);
        }
    }

    /// Replace the members of relationship `name` of `resource_type/id`,
    /// keeping the inverse side consistent.
    ///
    /// # Errors
    /// Returns `StoreError::NotFound` for a missing owner and
    /// `StoreError::RelatedNotFound` for a missing member.
    pub fn set_link(
        &mut self,
        resource_type: &str,
        id: &str,
        name: &str,
        info: &RelationshipInfo,
        members: &[String],
    ) -> Result<(), StoreError> {
        if !self.contains(resource_type, id) {
            return Err(StoreError::not_found(resource_type, id));
        }
        if let Some(missing) = members
            .iter()
            .find(|m| !self.contains(&info.related_type, m))
        {
            return Err(StoreError::RelatedNotFound {
                resource_type: info.related_type.clone(),
                id: missing.clone(),
            });
        }

        let previous = self.link_members(resource_type, id, name);
        let link = Link::empty(&info.related_type, info.cardinality);
        let Some(slot) = self.link_mut(resource_type, id, name, &info.related_type, info.cardinality)
        else {
            return Err(StoreError::not_found(resource_type, id));
        };
        *slot = link;
        for member in members {
            slot.attach(member);
        }

        let Some(inverse) = &info.inverse else {
            return Ok(());
        };
        for old in previous.iter().filter(|old| !members.contains(old)) {
            self.detach(&info.related_type, old, &inverse.name, id);
        }
        // Every current member is re-attached, kept ones included
        for member in members {
            if inverse.cardinality == Cardinality::ToOne {
                // A to-one inverse moves the member away from its previous holder
                for holder in self.link_members(&info.related_type, member, &inverse.name) {
                    if holder != id {
                        self.detach(resource_type, &holder, name, member);
                    }
                }
            }
            if let Some(back) = self.link_mut(
                &info.related_type,
                member,
                &inverse.name,
                resource_type,
                inverse.cardinality,
            ) {
                back.attach(id);
            }
        }
        Ok(())
    }
}
