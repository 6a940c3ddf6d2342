use std::str::FromStr;

use mongodb::bson::{Bson, Document};

use crate::error::{CursorError, Result};

/// Direction of a single sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn as_i32(&self) -> i32 {
        match self {
            SortDirection::Ascending => 1,
            SortDirection::Descending => -1,
        }
    }
}

impl FromStr for SortDirection {
    type Err = CursorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "1" | "asc" | "ascending" => Ok(SortDirection::Ascending),
            "-1" | "desc" | "descending" => Ok(SortDirection::Descending),
            _ => Err(CursorError::InvalidArgument(format!(
                "invalid sort direction '{s}'"
            ))),
        }
    }
}

/// Validate a sort document and rewrite string directions as 1 / -1.
///
/// Accepted values per key: 1, -1 (any integer or float type), a direction
/// name such as `"desc"`, or a `{ "$meta": ... }` document.
pub fn normalize_sort(sort: Document) -> Result<Document> {
    let mut normalized = Document::new();
    for (key, value) in sort {
        let direction = match value {
            Bson::Int32(v) => direction_from_number(&key, f64::from(v))?,
            Bson::Int64(v) => direction_from_number(&key, v as f64)?,
            Bson::Double(v) => direction_from_number(&key, v)?,
            Bson::String(name) => Bson::Int32(name.parse::<SortDirection>()?.as_i32()),
            Bson::Document(meta) if meta.contains_key("$meta") => Bson::Document(meta),
            other => {
                return Err(CursorError::InvalidArgument(format!(
                    "invalid sort value for '{key}': {other}"
                )));
            }
        };
        normalized.insert(key, direction);
    }
    Ok(normalized)
}

fn direction_from_number(key: &str, value: f64) -> Result<Bson> {
    if value == 1.0 {
        Ok(Bson::Int32(1))
    } else if value == -1.0 {
        Ok(Bson::Int32(-1))
    } else {
        Err(CursorError::InvalidArgument(format!(
            "invalid sort direction for '{key}': {value}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[test]
    fn test_normalize_mixed_directions() {
        let sort = normalize_sort(doc! { "a": "desc", "b": 1i64, "c": -1.0 }).unwrap();
        assert_eq!(sort, doc! { "a": -1, "b": 1, "c": -1 });
    }

    #[test]
    fn test_meta_sort_kept() {
        let sort = normalize_sort(doc! { "score": { "$meta": "textScore" } }).unwrap();
        assert_eq!(sort, doc! { "score": { "$meta": "textScore" } });
    }

    #[test]
    fn test_invalid_direction_rejected() {
        assert!(normalize_sort(doc! { "a": 2 }).is_err());
        assert!(normalize_sort(doc! { "a": "sideways" }).is_err());
        assert!(normalize_sort(doc! { "a": true }).is_err());
    }
}
