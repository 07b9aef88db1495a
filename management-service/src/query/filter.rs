//! Splits reserved directives out of a query.

use common::config::Paginate;
use common::errors::{AppError, AppResult};
use mongodb::bson::{Bson, Document};

use super::sorter::{SortOrder, SortSpec};

/// Query keys that shape the result instead of filtering it.
pub const DIRECTIVES: [&str; 4] = ["$sort", "$skip", "$limit", "$select"];

/// Whether a query key is one of [`DIRECTIVES`].
pub fn is_directive(key: &str) -> bool {
    DIRECTIVES.contains(&key)
}

/// Result-shaping directives of a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters {
    /// Field order, in the order the fields were listed.
    pub sort: Option<SortSpec>,
    /// Number of records dropped from the front.
    pub skip: Option<u64>,
    /// Maximum number of records returned.
    pub limit: Option<u64>,
    /// Fields kept in every returned record.
    pub select: Option<Vec<String>>,
}

/// Separates a query into its predicate part and its directives.
///
/// With an enabled pagination policy the limit falls back to the policy's
/// default and is capped at its max.
pub fn split(query: &Document, paginate: Option<&Paginate>) -> AppResult<(Document, Filters)> {
    let mut predicate = Document::new();
    let mut filters = Filters::default();

    for (key, value) in query {
        if !is_directive(key) {
            predicate.insert(key.clone(), value.clone());
            continue;
        }
        match key.as_str() {
            "$sort" => filters.sort = Some(parse_sort(value)?),
            "$skip" => filters.skip = Some(parse_count("$skip", value)?),
            "$limit" => filters.limit = Some(parse_count("$limit", value)?),
            _ => filters.select = Some(parse_select(value)?),
        }
    }

    if let Some(paginate) = paginate.filter(|p| p.is_enabled()) {
        filters.limit = effective_limit(filters.limit, paginate);
    }

    Ok((predicate, filters))
}

fn effective_limit(requested: Option<u64>, paginate: &Paginate) -> Option<u64> {
    let limit = requested.or(paginate.default);
    match (limit, paginate.max) {
        (Some(limit), Some(max)) => Some(limit.min(max)),
        (limit, _) => limit,
    }
}

fn parse_count(directive: &str, value: &Bson) -> AppResult<u64> {
    let count = match value {
        Bson::Int32(n) => u64::try_from(*n).ok(),
        Bson::Int64(n) => u64::try_from(*n).ok(),
        Bson::Double(f) if *f >= 0.0 && f.fract() == 0.0 => Some(*f as u64),
        Bson::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    count.ok_or_else(|| {
        AppError::Validation(format!("{} must be a non-negative integer", directive))
    })
}

fn parse_sort(value: &Bson) -> AppResult<SortSpec> {
    let fields = value
        .as_document()
        .ok_or_else(|| AppError::Validation("$sort must map field names to 1 or -1".into()))?;

    fields
        .iter()
        .map(|(field, direction)| {
            SortOrder::from_bson(direction)
                .map(|order| (field.clone(), order))
                .ok_or_else(|| {
                    AppError::Validation(format!("invalid sort direction for field '{}'", field))
                })
        })
        .collect()
}

pub(crate) fn parse_select(value: &Bson) -> AppResult<Vec<String>> {
    match value {
        Bson::String(field) => Ok(vec![field.clone()]),
        Bson::Array(fields) => fields
            .iter()
            .map(|field| {
                field.as_str().map(String::from).ok_or_else(|| {
                    AppError::Validation("$select must list field names".into())
                })
            })
            .collect(),
        _ => Err(AppError::Validation("$select must list field names".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[test]
    fn test_split_separates_directives() {
        let query = doc! {
            "name": { "$in": ["a", "b"] },
            "$sort": { "size": -1, "name": 1 },
            "$skip": 2,
            "$limit": 1_i64,
            "$select": ["name", "count"],
        };
        let (predicate, filters) = split(&query, None).unwrap();

        assert_eq!(predicate, doc! { "name": { "$in": ["a", "b"] } });
        assert_eq!(
            filters.sort,
            Some(vec![
                ("size".to_string(), SortOrder::Descending),
                ("name".to_string(), SortOrder::Ascending),
            ])
        );
        assert_eq!(filters.skip, Some(2));
        assert_eq!(filters.limit, Some(1));
        assert_eq!(
            filters.select,
            Some(vec!["name".to_string(), "count".to_string()])
        );
    }

    #[test]
    fn test_directive_keys() {
        assert!(DIRECTIVES.iter().all(|key| is_directive(key)));
        assert!(!is_directive("name"));
        assert!(!is_directive("$in"));
    }

    #[test]
    fn test_numeric_strings_accepted() {
        let (_, filters) = split(&doc! { "$skip": "3", "$limit": 4.0 }, None).unwrap();
        assert_eq!(filters.skip, Some(3));
        assert_eq!(filters.limit, Some(4));
    }

    #[test]
    fn test_negative_limit_rejected() {
        let err = split(&doc! { "$limit": -1 }, None).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_invalid_sort_direction_rejected() {
        let err = split(&doc! { "$sort": { "name": 2 } }, None).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_paginate_default_applies_without_limit() {
        let paginate = Paginate::new(10, 50);
        let (_, filters) = split(&doc! {}, Some(&paginate)).unwrap();
        assert_eq!(filters.limit, Some(10));
    }

    #[test]
    fn test_paginate_max_caps_limit() {
        let paginate = Paginate::new(10, 50);
        let (_, filters) = split(&doc! { "$limit": 500 }, Some(&paginate)).unwrap();
        assert_eq!(filters.limit, Some(50));
    }

    #[test]
    fn test_without_paginate_limit_passes_through() {
        let (_, filters) = split(&doc! { "$limit": 500 }, None).unwrap();
        assert_eq!(filters.limit, Some(500));
        let (_, filters) = split(&doc! {}, None).unwrap();
        assert_eq!(filters.limit, None);
    }
}
