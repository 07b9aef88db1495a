//! Query processing for `find`.
//!
//! A query document mixes field predicates with the reserved directives
//! `$sort`, `$skip`, `$limit` and `$select`. [`split`] separates the two,
//! [`Matcher`] evaluates the predicate part, [`default_sorter`] orders
//! records and [`select`] projects them.

mod filter;
mod matcher;
mod select;
mod sorter;

use std::sync::Arc;

use mongodb::bson::{Bson, Document};

pub use filter::{is_directive, split, Filters, DIRECTIVES};
pub(crate) use filter::parse_select;
pub use matcher::{Matcher, Predicate};
pub use select::select;
pub use sorter::{compare_values, default_sorter, Comparator, SortOrder, SortSpec};

/// Builds a record predicate from the predicate part of a query.
pub type MatcherFactory = Arc<dyn Fn(&Document) -> Predicate + Send + Sync>;

/// Builds a record comparator from a `$sort` directive.
pub type SorterFactory = Arc<dyn Fn(&[(String, SortOrder)]) -> Comparator + Send + Sync>;

/// Resolves a dotted field path inside a record.
///
/// Numeric segments index into arrays.
pub fn resolve<'a>(record: &'a Document, path: &str) -> Option<&'a Bson> {
    if let Some(value) = record.get(path) {
        return Some(value);
    }

    let mut segments = path.split('.');
    let mut current = record.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}
