//! Request-scoped table of client local ids (`lid`) and their resolved ids.

use std::collections::HashMap;

use crate::document::{RelationshipData, ResourceIdentifier, ResourceRef};
use crate::errors::LocalIdError;

/// `resource type -> (lid -> resolved id)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalIdTable {
    by_type: HashMap<String, HashMap<String, String>>,
}

impl LocalIdTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the id a declared lid resolved to.
    ///
    /// # Errors
    /// Returns `LocalIdError::Duplicate` if the lid is already registered for the type.
    pub fn register(
        &mut self,
        resource_type: &str,
        lid: &str,
        id: &str,
    ) -> Result<(), LocalIdError> {
        let lids = self.by_type.entry(resource_type.to_owned()).or_default();
        if lids.contains_key(lid) {
            return Err(LocalIdError::Duplicate {
                resource_type: resource_type.to_owned(),
                lid: lid.to_owned(),
            });
        }
        lids.insert(lid.to_owned(), id.to_owned());
        Ok(())
    }

    /// # Errors
    /// Returns `LocalIdError` naming the type and lid if it is not registered.
    pub fn resolve(&self, resource_type: &str, lid: &str) -> Result<&str, LocalIdError> {
        let Some(lids) = self.by_type.get(resource_type) else {
            return Err(LocalIdError::UnknownType {
                resource_type: resource_type.to_owned(),
                lid: lid.to_owned(),
            });
        };
        lids.get(lid)
            .map(String::as_str)
            .ok_or_else(|| LocalIdError::UnknownLid {
                resource_type: resource_type.to_owned(),
                lid: lid.to_owned(),
            })
    }

    /// Replace `lid` by the resolved `id` on a `ref`.
    ///
    /// # Errors
    /// Returns `LocalIdError` if the lid is unknown.
    pub fn resolve_ref(&self, target: &mut ResourceRef) -> Result<(), LocalIdError> {
        if let Some(lid) = target.lid.take() {
            match self.resolve(&target.resource_type, &lid) {
                Ok(id) => target.id = Some(id.to_owned()),
                Err(e) => {
                    target.lid = Some(lid);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// # Errors
    /// Returns `LocalIdError` if the lid is unknown.
    pub fn resolve_identifier(&self, ident: &mut ResourceIdentifier) -> Result<(), LocalIdError> {
        if let Some(lid) = ident.lid.take() {
            match self.resolve(&ident.resource_type, &lid) {
                Ok(id) => ident.id = Some(id.to_owned()),
                Err(e) => {
                    ident.lid = Some(lid);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Resolve every element of a linkage; `null` and id-only elements pass through.
    ///
    /// # Errors
    /// Returns the first `LocalIdError` encountered.
    pub fn resolve_linkage(&self, data: &mut RelationshipData) -> Result<(), LocalIdError> {
        for ident in data.identifiers_mut() {
            self.resolve_identifier(ident)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_type.values().all(HashMap::is_empty)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_type.values().map(HashMap::len).sum()
    }
}
