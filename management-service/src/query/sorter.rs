//! Record ordering.

use std::cmp::Ordering;

use mongodb::bson::{Bson, Document};

use super::resolve;

/// Compares two records.
pub type Comparator = Box<dyn Fn(&Document, &Document) -> Ordering + Send + Sync>;

/// Ordered `(field, direction)` pairs of a `$sort` directive.
pub type SortSpec = Vec<(String, SortOrder)>;

/// Sort direction of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// `1`
    Ascending,
    /// `-1`
    Descending,
}

impl SortOrder {
    /// Parses `1` / `-1`, given as any numeric type or as a string.
    pub fn from_bson(value: &Bson) -> Option<Self> {
        let direction = match value {
            Bson::Int32(n) => i64::from(*n),
            Bson::Int64(n) => *n,
            Bson::Double(f) if f.fract() == 0.0 => *f as i64,
            Bson::String(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        match direction {
            1 => Some(SortOrder::Ascending),
            -1 => Some(SortOrder::Descending),
            _ => None,
        }
    }

    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    }
}

/// Builds the default comparator: fields compared in listed order, later
/// fields breaking ties of earlier ones.
pub fn default_sorter(spec: &[(String, SortOrder)]) -> Comparator {
    let spec = spec.to_vec();
    Box::new(move |a, b| {
        spec.iter()
            .map(|(field, order)| order.apply(compare_values(resolve(a, field), resolve(b, field))))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    })
}

/// Canonical BSON type order; a missing field sorts with null.
pub(crate) fn type_rank(value: Option<&Bson>) -> u8 {
    match value {
        Some(Bson::MinKey) => 0,
        None | Some(Bson::Null) | Some(Bson::Undefined) => 1,
        Some(Bson::Int32(_)) | Some(Bson::Int64(_)) | Some(Bson::Double(_)) | Some(Bson::Decimal128(_)) => 2,
        Some(Bson::String(_)) | Some(Bson::Symbol(_)) => 3,
        Some(Bson::Document(_)) => 4,
        Some(Bson::Array(_)) => 5,
        Some(Bson::Binary(_)) => 6,
        Some(Bson::ObjectId(_)) => 7,
        Some(Bson::Boolean(_)) => 8,
        Some(Bson::DateTime(_)) => 9,
        Some(Bson::Timestamp(_)) => 10,
        Some(Bson::RegularExpression(_)) => 11,
        Some(Bson::MaxKey) => u8::MAX,
        Some(_) => 12,
    }
}

/// Compares two field values, numbers numerically across integer and
/// floating point representations.
pub fn compare_values(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank.is_ne() {
        return rank;
    }

    match (a, b) {
        (Some(a), Some(b)) => compare_same_rank(a, b),
        _ => Ordering::Equal,
    }
}

fn compare_same_rank(a: &Bson, b: &Bson) -> Ordering {
    match (a, b) {
        (Bson::String(a), Bson::String(b)) => a.cmp(b),
        (Bson::Symbol(a), Bson::Symbol(b)) => a.cmp(b),
        (Bson::Boolean(a), Bson::Boolean(b)) => a.cmp(b),
        (Bson::DateTime(a), Bson::DateTime(b)) => a.timestamp_millis().cmp(&b.timestamp_millis()),
        (Bson::ObjectId(a), Bson::ObjectId(b)) => a.bytes().cmp(&b.bytes()),
        (Bson::Timestamp(a), Bson::Timestamp(b)) => {
            (a.time, a.increment).cmp(&(b.time, b.increment))
        }
        (Bson::Binary(a), Bson::Binary(b)) => a.bytes.cmp(&b.bytes),
        (Bson::Array(a), Bson::Array(b)) => compare_sequences(a.iter(), b.iter()),
        (Bson::Document(a), Bson::Document(b)) => compare_documents(a, b),
        _ => compare_numbers(a, b).unwrap_or(Ordering::Equal),
    }
}

fn compare_numbers(a: &Bson, b: &Bson) -> Option<Ordering> {
    match (as_integer(a), as_integer(b)) {
        (Some(a), Some(b)) => Some(a.cmp(&b)),
        _ => as_float(a)?.partial_cmp(&as_float(b)?),
    }
}

fn as_integer(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(n) => Some(i64::from(*n)),
        Bson::Int64(n) => Some(*n),
        _ => None,
    }
}

fn as_float(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(f) => Some(*f),
        _ => None,
    }
}

fn compare_sequences<'a>(
    mut a: impl Iterator<Item = &'a Bson>,
    mut b: impl Iterator<Item = &'a Bson>,
) -> Ordering {
    loop {
        match (a.next(), b.next()) {
            (Some(x), Some(y)) => {
                let ordering = compare_values(Some(x), Some(y));
                if ordering.is_ne() {
                    return ordering;
                }
            }
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
        }
    }
}

fn compare_documents(a: &Document, b: &Document) -> Ordering {
    let mut a = a.iter();
    let mut b = b.iter();
    loop {
        match (a.next(), b.next()) {
            (Some((ka, va)), Some((kb, vb))) => {
                let ordering = compare_values(Some(va), Some(vb)).then_with(|| ka.cmp(kb));
                if ordering.is_ne() {
                    return ordering;
                }
            }
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    fn names(records: &[Document]) -> Vec<&str> {
        records.iter().map(|r| r.get_str("name").unwrap()).collect()
    }

    #[test]
    fn test_numbers_compare_across_types() {
        assert_eq!(
            compare_values(Some(&Bson::Int32(2)), Some(&Bson::Double(2.5))),
            Ordering::Less
        );
        assert_eq!(
            compare_values(Some(&Bson::Int64(7)), Some(&Bson::Int32(7))),
            Ordering::Equal
        );
    }

    #[test]
    fn test_missing_sorts_before_values() {
        assert_eq!(compare_values(None, Some(&Bson::Int32(0))), Ordering::Less);
        assert_eq!(compare_values(None, Some(&Bson::Null)), Ordering::Equal);
        assert_eq!(
            compare_values(Some(&Bson::Int32(100)), Some(&Bson::String("1".into()))),
            Ordering::Less
        );
    }

    #[test]
    fn test_multi_field_sort_breaks_ties_in_order() {
        let mut records = vec![
            doc! { "name": "c", "size": 1 },
            doc! { "name": "a", "size": 2 },
            doc! { "name": "b", "size": 1 },
        ];
        let comparator = default_sorter(&[
            ("size".to_string(), SortOrder::Descending),
            ("name".to_string(), SortOrder::Ascending),
        ]);
        records.sort_by(|a, b| comparator(a, b));
        assert_eq!(names(&records), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_sort_is_stable_for_equal_keys() {
        let mut records = vec![
            doc! { "name": "first", "size": 1 },
            doc! { "name": "second", "size": 1 },
            doc! { "name": "third", "size": 0 },
        ];
        let comparator = default_sorter(&[("size".to_string(), SortOrder::Ascending)]);
        records.sort_by(|a, b| comparator(a, b));
        assert_eq!(names(&records), vec!["third", "first", "second"]);
    }

    #[test]
    fn test_sort_order_parsing() {
        assert_eq!(SortOrder::from_bson(&Bson::Int32(-1)), Some(SortOrder::Descending));
        assert_eq!(SortOrder::from_bson(&Bson::String("1".into())), Some(SortOrder::Ascending));
        assert_eq!(SortOrder::from_bson(&Bson::Int32(0)), None);
    }
}
