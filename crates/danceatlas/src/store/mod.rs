pub mod firestore;

use std::collections::BTreeMap;

use serde_json::Value;

pub use firestore::FirestoreStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Could not serialize document: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Store rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("Invalid path '{0}'")]
    InvalidPath(String),
    #[error("Could not decode document: {0}")]
    Decode(String),
}

/// Hierarchical document store laid out as alternating collection / document segments,
/// e.g. `classes/{studio}/{date}/{key}`.
pub trait DocumentStore {
    /// Creates or fully replaces the document at `path`.
    fn upsert(&mut self, path: &[&str], document: &Value) -> Result<(), StoreError>;

    /// Ids of the sub-collections under the document at `path`. The document itself need
    /// not exist.
    fn collection_ids(&self, path: &[&str]) -> Result<Vec<String>, StoreError>;

    /// Every document in the collection at `path`, as `(id, fields)`.
    fn documents(&self, path: &[&str]) -> Result<Vec<(String, Value)>, StoreError>;
}

fn check_segments(path: &[&str]) -> Result<(), StoreError> {
    if path.is_empty() || path.iter().any(|s| s.is_empty() || s.contains('/')) {
        return Err(StoreError::InvalidPath(path.join("/")));
    }
    Ok(())
}

pub(crate) fn check_document_path(path: &[&str]) -> Result<(), StoreError> {
    check_segments(path)?;
    if path.len() % 2 != 0 {
        return Err(StoreError::InvalidPath(path.join("/")));
    }
    Ok(())
}

pub(crate) fn check_collection_path(path: &[&str]) -> Result<(), StoreError> {
    check_segments(path)?;
    if path.len() % 2 != 1 {
        return Err(StoreError::InvalidPath(path.join("/")));
    }
    Ok(())
}

/// In-process store keyed by full document path. Used offline and in tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    documents: BTreeMap<Vec<String>, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &[&str]) -> Option<&Value> {
        let key: Vec<String> = path.iter().map(|s| s.to_string()).collect();
        self.documents.get(&key)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Full paths of every stored document, in order.
    pub fn paths(&self) -> impl Iterator<Item = String> + '_ {
        self.documents.keys().map(|k| k.join("/"))
    }
}

impl DocumentStore for MemoryStore {
    fn upsert(&mut self, path: &[&str], document: &Value) -> Result<(), StoreError> {
        check_document_path(path)?;
        let key = path.iter().map(|s| s.to_string()).collect();
        self.documents.insert(key, document.clone());
        Ok(())
    }

    fn collection_ids(&self, path: &[&str]) -> Result<Vec<String>, StoreError> {
        check_document_path(path)?;
        let mut ids: Vec<String> = self
            .documents
            .keys()
            .filter(|k| k.len() > path.len() && k.iter().zip(path).all(|(a, b)| a == b))
            .map(|k| k[path.len()].clone())
            .collect();
        ids.dedup();
        Ok(ids)
    }

    fn documents(&self, path: &[&str]) -> Result<Vec<(String, Value)>, StoreError> {
        check_collection_path(path)?;
        Ok(self
            .documents
            .iter()
            .filter(|(k, _)| k.len() == path.len() + 1 && k.iter().zip(path).all(|(a, b)| a == b))
            .map(|(k, v)| (k[path.len()].clone(), v.clone()))
            .collect())
    }
}
