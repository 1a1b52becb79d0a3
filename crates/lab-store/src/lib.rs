use lab_record::CodecError;
use std::collections::BTreeSet;
use thiserror::Error;

pub mod local;
pub mod remote;
pub mod tree;
pub mod wire;

pub use lab_record::{decode_record, encode_record, encode_record_pretty, Record};
pub use local::TreeRecordStore;
pub use remote::HttpRecordStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found in record store")]
    NotFound(String),
    #[error("record store access error ({status}): {body}")]
    Access { status: u16, body: String },
    #[error("{0} is not supported by this record store; use the server's administrative interface")]
    Unsupported(&'static str),
    #[error("no record store backend recognizes uri: {0}")]
    UnrecognizedUri(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, StoreError::Unsupported(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Codec(CodecError::from(err))
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        // Transport failures carry no HTTP status; 0 marks them.
        let status = err.status().map(|s| s.as_u16()).unwrap_or(0);
        StoreError::Access {
            status,
            body: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Uniform contract over interchangeable record store backends.
///
/// `save` takes the record mutably: a backend that assigns identities on
/// creation (the remote push path) writes the adopted label back into the
/// record. Backends without that behavior leave the record untouched.
pub trait RecordStore {
    fn list_projects(&self) -> Result<Vec<String>>;
    fn has_project(&self, project: &str) -> Result<bool>;
    fn save(&self, project: &str, record: &mut Record) -> Result<()>;
    fn save_with_status(&self, project: &str, record: &mut Record, _status: &str) -> Result<()> {
        self.save(project, record)
    }
    fn get(&self, project: &str, label: &str) -> Result<Record>;
    fn list(&self, project: &str, tags: Option<&[String]>) -> Result<Vec<Record>>;
    fn labels(&self, project: &str, tags: Option<&[String]>) -> Result<Vec<String>>;
    fn delete(&self, project: &str, label: &str) -> Result<()>;
    fn delete_by_tag(&self, project: &str, tag: &str) -> Result<usize>;
    fn most_recent(&self, project: &str) -> Result<Option<String>>;
    fn backup(&self) -> Result<()>;
    fn remove(&self) -> Result<()>;
    fn clear(&self) -> Result<()>;

    fn accepts_uri(uri: &str) -> bool
    where
        Self: Sized;
}

pub fn open_store(uri: &str) -> Result<Box<dyn RecordStore>> {
    if TreeRecordStore::accepts_uri(uri) {
        Ok(Box::new(TreeRecordStore::open(uri)?))
    } else if HttpRecordStore::accepts_uri(uri) {
        Ok(Box::new(HttpRecordStore::open(uri)?))
    } else {
        Err(StoreError::UnrecognizedUri(uri.to_string()))
    }
}

// None means no filter; an explicit empty list matches nothing; otherwise a
// record matches when it holds at least one of the listed tags.
pub(crate) fn tags_match(filter: Option<&[String]>, tags: &BTreeSet<String>) -> bool {
    match filter {
        None => true,
        Some(wanted) => wanted.iter().any(|tag| tags.contains(tag)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag_set(tags: &[&str]) -> BTreeSet<String> {
        tags.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn no_filter_matches_everything() {
        assert!(tags_match(None, &tag_set(&["x"])));
        assert!(tags_match(None, &tag_set(&[])));
    }

    #[test]
    fn empty_filter_matches_nothing() {
        assert!(!tags_match(Some(&[]), &tag_set(&["x"])));
        assert!(!tags_match(Some(&[]), &tag_set(&[])));
    }

    #[test]
    fn filter_matches_on_any_listed_tag() {
        let filter = vec!["x".to_string(), "y".to_string()];
        assert!(tags_match(Some(&filter), &tag_set(&["y", "z"])));
        assert!(!tags_match(Some(&filter), &tag_set(&["z"])));
    }

    #[test]
    fn error_predicates_discriminate_variants() {
        assert!(StoreError::NotFound("record a".to_string()).is_not_found());
        assert!(!StoreError::NotFound("record a".to_string()).is_unsupported());
        assert!(StoreError::Unsupported("delete").is_unsupported());
    }

    #[test]
    fn open_store_rejects_unknown_uri_schemes() {
        let err = open_store("ftp://somewhere/else").err().expect("must fail");
        assert!(matches!(err, StoreError::UnrecognizedUri(_)));
    }
}
