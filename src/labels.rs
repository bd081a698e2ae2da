//! The class-index to label lookup table.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Label map shipped with the crate: the 1000 ImageNet-1k class names.
pub const DEFAULT_CLASS_MAP: &str = "assets/imagenet_classes_map.json";

/// Read-only index-to-label table, deserialized once at startup from a
/// JSON array of strings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassMap {
    labels: Vec<String>,
}

impl ClassMap {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let map = serde_json::from_reader(BufReader::new(file)).map_err(|source| {
            Error::ClassMap {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Ok(map)
    }

    pub fn from_labels(labels: Vec<String>) -> Self {
        ClassMap { labels }
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_within_and_outside_bounds() {
        let map: ClassMap = serde_json::from_str(r#"["cat", "dog"]"#).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(0), Some("cat"));
        assert_eq!(map.get(1), Some("dog"));
        assert_eq!(map.get(2), None);
    }

    #[test]
    fn bundled_map_has_the_full_imagenet_range() {
        let map = ClassMap::from_path(DEFAULT_CLASS_MAP).unwrap();
        assert_eq!(map.len(), 1000);
        assert_eq!(map.get(0), Some("tench, Tinca tinca"));
        assert!(map.get(999).is_some());
        assert_eq!(map.get(1000), None);
    }

    #[test]
    fn missing_map_file_is_an_io_error() {
        let err = ClassMap::from_path("no/such/labels.json").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
