use crate::{key::KeyElement, model::ModelError, value};
use serde_json::{Map, Value};
use std::{
    fmt::{self, Debug},
    sync::Arc,
};

/// Extractor for a computed index property. Receives the un-flattened
/// document and must be pure: the same document always yields the same value.
pub type ComputeFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

///
/// IndexProperty
///

#[derive(Clone)]
pub enum IndexProperty {
    /// Reads a dotted path from the flattened document.
    Path { key: String },

    /// Derives a value by invoking a user function over the document. The
    /// key is the function's declared name and must be stable across runs.
    Computed { key: String, compute: ComputeFn },
}

impl IndexProperty {
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Path { key } | Self::Computed { key, .. } => key,
        }
    }

    /// Extract this property's value from a document. `None` means the
    /// value is absent: a missing path, or a value with no key order.
    #[must_use]
    pub fn extract(&self, doc: &Value) -> Option<KeyElement> {
        match self {
            Self::Path { key } => {
                value::extract(doc, key).as_ref().and_then(KeyElement::from_json)
            }
            Self::Computed { compute, .. } => KeyElement::from_json(&compute(doc)),
        }
    }
}

impl Debug for IndexProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path { key } => f.debug_struct("Path").field("key", key).finish(),
            Self::Computed { key, .. } => f
                .debug_struct("Computed")
                .field("key", key)
                .finish_non_exhaustive(),
        }
    }
}

///
/// IndexModel
///
/// One secondary index: an ordered property list, an optional projection
/// stored inside each entry, and an optional user version that stands in
/// for the body of computed properties during migration diffs.
///

#[derive(Clone, Debug)]
pub struct IndexModel {
    properties: Vec<IndexProperty>,
    keys: Vec<String>,
    name: String,
    projection: Option<Vec<String>>,
    version: Option<u32>,
}

impl IndexModel {
    pub(crate) fn try_new(
        properties: Vec<IndexProperty>,
        projection: Option<Vec<String>>,
        version: Option<u32>,
    ) -> Result<Self, ModelError> {
        if properties.is_empty() {
            return Err(ModelError::EmptyIndex);
        }

        let mut keys = Vec::with_capacity(properties.len());
        for property in &properties {
            let key = property.key();
            if key.is_empty() {
                return Err(ModelError::UnnamedProperty);
            }
            if keys.iter().any(|k| k == key) {
                return Err(ModelError::DuplicateProperty {
                    key: key.to_owned(),
                });
            }
            keys.push(key.to_owned());
        }

        let name = keys.join("+");

        Ok(Self {
            properties,
            keys,
            name,
            projection,
            version,
        })
    }

    #[must_use]
    pub fn properties(&self) -> &[IndexProperty] {
        &self.properties
    }

    /// Ordered property keys; the index's identity within its collection.
    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Keys joined by `+`; the index's KVS name segment.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn projection(&self) -> Option<&[String]> {
        self.projection.as_deref()
    }

    #[must_use]
    pub const fn version(&self) -> Option<u32> {
        self.version
    }

    /// Extract every property value; an absent document yields all-absent.
    #[must_use]
    pub fn extract_values(&self, doc: Option<&Value>) -> Vec<Option<KeyElement>> {
        match doc {
            None => vec![None; self.properties.len()],
            Some(doc) => self.properties.iter().map(|p| p.extract(doc)).collect(),
        }
    }

    /// Build the projection payload for a document, if this index projects.
    #[must_use]
    pub fn build_projection(&self, doc: Option<&Value>) -> Option<Map<String, Value>> {
        let paths = self.projection.as_ref()?;
        value::project(doc?, paths)
    }

    /// True when every requested path can be answered from the projection.
    #[must_use]
    pub fn covers(&self, paths: &[String]) -> bool {
        self.projection
            .as_ref()
            .is_some_and(|projected| paths.iter().all(|p| projected.contains(p)))
    }
}

///
/// IndexDef
///
/// Declaration-time shape of an index, before validation. Mirrors the
/// accepted shorthand forms: a single path, a compound path list, a named
/// computed function, or any of those plus a projection and a version.
///

#[derive(Clone, Debug)]
pub struct IndexDef {
    properties: Vec<IndexProperty>,
    projection: Option<Vec<String>>,
    version: Option<u32>,
}

impl IndexDef {
    /// Simple single-property index on a dotted path.
    #[must_use]
    pub fn path(path: impl Into<String>) -> Self {
        Self {
            properties: vec![IndexProperty::Path { key: path.into() }],
            projection: None,
            version: None,
        }
    }

    /// Compound index on several dotted paths, in order.
    #[must_use]
    pub fn paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            properties: paths
                .into_iter()
                .map(|p| IndexProperty::Path { key: p.into() })
                .collect(),
            projection: None,
            version: None,
        }
    }

    /// Computed index. `name` identifies the function and must be non-empty
    /// and stable across runs; pair it with [`IndexDef::version`] so schema
    /// migration can detect a changed function body.
    #[must_use]
    pub fn computed(
        name: impl Into<String>,
        compute: impl Fn(&Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            properties: vec![IndexProperty::Computed {
                key: name.into(),
                compute: Arc::new(compute),
            }],
            projection: None,
            version: None,
        }
    }

    /// Append a computed property to a compound index.
    #[must_use]
    pub fn then_computed(
        mut self,
        name: impl Into<String>,
        compute: impl Fn(&Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.properties.push(IndexProperty::Computed {
            key: name.into(),
            compute: Arc::new(compute),
        });
        self
    }

    /// Append a path property to a compound index.
    #[must_use]
    pub fn then_path(mut self, path: impl Into<String>) -> Self {
        self.properties.push(IndexProperty::Path { key: path.into() });
        self
    }

    /// Store these dotted paths inside each index entry.
    #[must_use]
    pub fn project<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Some(paths.into_iter().map(Into::into).collect());
        self
    }

    /// Migration hint for computed indexes; bump when the function changes.
    #[must_use]
    pub const fn version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    pub(crate) fn build(self) -> Result<IndexModel, ModelError> {
        IndexModel::try_new(self.properties, self.projection, self.version)
    }
}

impl From<&str> for IndexDef {
    fn from(path: &str) -> Self {
        Self::path(path)
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for IndexDef {
    fn from(paths: [S; N]) -> Self {
        Self::paths(paths)
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_and_name_derive_from_properties() {
        let index = IndexDef::paths(["country", "city"]).build().unwrap();

        assert_eq!(index.keys(), &["country", "city"]);
        assert_eq!(index.name(), "country+city");
    }

    #[test]
    fn empty_property_list_is_rejected() {
        let err = IndexModel::try_new(Vec::new(), None, None).unwrap_err();
        assert!(matches!(err, ModelError::EmptyIndex));
    }

    #[test]
    fn unnamed_computed_property_is_rejected() {
        let err = IndexDef::computed("", |_| Value::Null).build().unwrap_err();
        assert!(matches!(err, ModelError::UnnamedProperty));
    }

    #[test]
    fn duplicate_property_keys_are_rejected() {
        let err = IndexDef::paths(["city", "city"]).build().unwrap_err();
        assert!(matches!(err, ModelError::DuplicateProperty { .. }));
    }

    #[test]
    fn extract_values_reads_paths_and_functions() {
        let index = IndexDef::path("country")
            .then_computed("cityUpper", |doc| {
                match doc.get("city").and_then(Value::as_str) {
                    Some(city) => Value::String(city.to_uppercase()),
                    None => Value::Null,
                }
            })
            .build()
            .unwrap();

        let doc = json!({ "country": "USA", "city": "Reno" });
        let values = index.extract_values(Some(&doc));

        assert_eq!(values[0], Some(KeyElement::from("USA")));
        assert_eq!(values[1], Some(KeyElement::from("RENO")));
    }

    #[test]
    fn extract_values_of_absent_document_is_all_absent() {
        let index = IndexDef::paths(["a", "b"]).build().unwrap();
        assert_eq!(index.extract_values(None), vec![None, None]);
    }

    #[test]
    fn missing_path_extracts_as_absent_but_null_is_a_value() {
        let index = IndexDef::paths(["present", "absent"]).build().unwrap();
        let doc = json!({ "present": null });
        let values = index.extract_values(Some(&doc));

        assert_eq!(values[0], Some(KeyElement::Null));
        assert_eq!(values[1], None);
    }

    #[test]
    fn covers_requires_every_requested_path() {
        let index = IndexDef::path("country")
            .project(["firstName", "lastName"])
            .build()
            .unwrap();

        assert!(index.covers(&["firstName".to_owned()]));
        assert!(index.covers(&["firstName".to_owned(), "lastName".to_owned()]));
        assert!(!index.covers(&["firstName".to_owned(), "age".to_owned()]));
    }
}
