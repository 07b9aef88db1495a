//! Structural query matching over records.
//!
//! Supports the MongoDB query operators that make sense against in-memory
//! records: comparison (`$eq $ne $gt $gte $lt $lte`), set membership
//! (`$in $nin $all`), element (`$exists`), evaluation (`$regex`), array
//! (`$size $elemMatch`) and logical composition (`$and $or $nor $not`).
//! A plain value matches an array field when any element matches.

use std::cmp::Ordering;

use common::errors::{AppError, AppResult};
use mongodb::bson::{Bson, Document};
use regex::{Regex, RegexBuilder};

use super::sorter::{compare_values, type_rank};

/// Boolean filter over records.
pub type Predicate = Box<dyn Fn(&Document) -> bool + Send + Sync>;

/// A compiled query predicate.
#[derive(Debug)]
pub struct Matcher {
    clauses: Vec<Clause>,
}

#[derive(Debug)]
enum Clause {
    And(Vec<Vec<Clause>>),
    Or(Vec<Vec<Clause>>),
    Nor(Vec<Vec<Clause>>),
    Field {
        path: String,
        conditions: Vec<Condition>,
    },
}

#[derive(Debug)]
enum Condition {
    Eq(Bson),
    Ne(Bson),
    Gt(Bson),
    Gte(Bson),
    Lt(Bson),
    Lte(Bson),
    In(Vec<Bson>),
    Nin(Vec<Bson>),
    All(Vec<Bson>),
    Exists(bool),
    Regex(Regex),
    Size(usize),
    ElemMatch(ElemMatch),
    Not(Vec<Condition>),
}

#[derive(Debug)]
enum ElemMatch {
    Document(Vec<Clause>),
    Value(Vec<Condition>),
}

impl Matcher {
    /// Compiles a predicate document. Unknown operators are rejected.
    pub fn compile(query: &Document) -> AppResult<Self> {
        Ok(Self {
            clauses: compile_clauses(query)?,
        })
    }

    /// Returns true when the record satisfies every clause.
    pub fn matches(&self, record: &Document) -> bool {
        all_clauses(&self.clauses, record)
    }

    /// Converts the matcher into a boxed predicate.
    pub fn into_predicate(self) -> Predicate {
        Box::new(move |record| self.matches(record))
    }
}

fn unsupported(operator: &str) -> AppError {
    AppError::Validation(format!("unsupported query operator '{}'", operator))
}

fn compile_clauses(query: &Document) -> AppResult<Vec<Clause>> {
    query
        .iter()
        .map(|(key, value)| compile_clause(key, value))
        .collect()
}

fn compile_clause(key: &str, value: &Bson) -> AppResult<Clause> {
    match key {
        "$and" => Ok(Clause::And(compile_branches(key, value)?)),
        "$or" => Ok(Clause::Or(compile_branches(key, value)?)),
        "$nor" => Ok(Clause::Nor(compile_branches(key, value)?)),
        operator if operator.starts_with('$') => Err(unsupported(operator)),
        path => Ok(Clause::Field {
            path: path.to_string(),
            conditions: compile_conditions(value)?,
        }),
    }
}

fn compile_branches(operator: &str, value: &Bson) -> AppResult<Vec<Vec<Clause>>> {
    let invalid = || AppError::Validation(format!("{} expects an array of queries", operator));
    value
        .as_array()
        .ok_or_else(invalid)?
        .iter()
        .map(|branch| branch.as_document().ok_or_else(invalid).and_then(compile_clauses))
        .collect()
}

fn is_operator_document(doc: &Document) -> bool {
    doc.keys().next().is_some_and(|key| key.starts_with('$'))
}

fn compile_conditions(value: &Bson) -> AppResult<Vec<Condition>> {
    match value {
        Bson::Document(doc) if is_operator_document(doc) => compile_operators(doc),
        Bson::RegularExpression(re) => Ok(vec![Condition::Regex(build_regex(&re.pattern, &re.options)?)]),
        other => Ok(vec![Condition::Eq(other.clone())]),
    }
}

fn compile_operators(doc: &Document) -> AppResult<Vec<Condition>> {
    let mut conditions = Vec::with_capacity(doc.len());
    for (operator, operand) in doc {
        let condition = match operator.as_str() {
            "$eq" => Condition::Eq(operand.clone()),
            "$ne" => Condition::Ne(operand.clone()),
            "$gt" => Condition::Gt(operand.clone()),
            "$gte" => Condition::Gte(operand.clone()),
            "$lt" => Condition::Lt(operand.clone()),
            "$lte" => Condition::Lte(operand.clone()),
            "$in" => Condition::In(operand_list(operator, operand)?),
            "$nin" => Condition::Nin(operand_list(operator, operand)?),
            "$all" => Condition::All(operand_list(operator, operand)?),
            "$exists" => Condition::Exists(is_truthy(operand)),
            "$regex" => {
                let options = doc.get_str("$options").unwrap_or("");
                Condition::Regex(regex_operand(operand, options)?)
            }
            "$options" if doc.contains_key("$regex") => continue,
            "$size" => Condition::Size(size_operand(operand)?),
            "$elemMatch" => {
                let inner = operand.as_document().ok_or_else(|| {
                    AppError::Validation("$elemMatch expects a query document".into())
                })?;
                if is_operator_document(inner) {
                    Condition::ElemMatch(ElemMatch::Value(compile_operators(inner)?))
                } else {
                    Condition::ElemMatch(ElemMatch::Document(compile_clauses(inner)?))
                }
            }
            "$not" => match operand {
                Bson::Document(inner) if is_operator_document(inner) => {
                    Condition::Not(compile_operators(inner)?)
                }
                Bson::RegularExpression(_) | Bson::String(_) => {
                    Condition::Not(vec![Condition::Regex(regex_operand(operand, "")?)])
                }
                _ => {
                    return Err(AppError::Validation(
                        "$not expects an operator document or a regular expression".into(),
                    ))
                }
            },
            other => return Err(unsupported(other)),
        };
        conditions.push(condition);
    }
    Ok(conditions)
}

fn operand_list(operator: &str, operand: &Bson) -> AppResult<Vec<Bson>> {
    operand
        .as_array()
        .cloned()
        .ok_or_else(|| AppError::Validation(format!("{} expects an array", operator)))
}

fn size_operand(operand: &Bson) -> AppResult<usize> {
    let size = match operand {
        Bson::Int32(n) => usize::try_from(*n).ok(),
        Bson::Int64(n) => usize::try_from(*n).ok(),
        Bson::Double(f) if *f >= 0.0 && f.fract() == 0.0 => Some(*f as usize),
        _ => None,
    };
    size.ok_or_else(|| AppError::Validation("$size expects a non-negative integer".into()))
}

fn regex_operand(operand: &Bson, options: &str) -> AppResult<Regex> {
    match operand {
        Bson::String(pattern) => build_regex(pattern, options),
        Bson::RegularExpression(re) if options.is_empty() => build_regex(&re.pattern, &re.options),
        Bson::RegularExpression(re) => build_regex(&re.pattern, options),
        _ => Err(AppError::Validation("$regex expects a string pattern".into())),
    }
}

fn build_regex(pattern: &str, options: &str) -> AppResult<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .ignore_whitespace(options.contains('x'))
        .build()
        .map_err(|e| AppError::Validation(format!("invalid regular expression: {}", e)))
}

fn is_truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(flag) => *flag,
        Bson::Null | Bson::Undefined => false,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(f) => *f != 0.0,
        _ => true,
    }
}

fn all_clauses(clauses: &[Clause], record: &Document) -> bool {
    clauses.iter().all(|clause| clause_matches(clause, record))
}

fn clause_matches(clause: &Clause, record: &Document) -> bool {
    match clause {
        Clause::And(branches) => branches.iter().all(|branch| all_clauses(branch, record)),
        Clause::Or(branches) => branches.iter().any(|branch| all_clauses(branch, record)),
        Clause::Nor(branches) => !branches.iter().any(|branch| all_clauses(branch, record)),
        Clause::Field { path, conditions } => {
            let values = lookup(record, path);
            conditions
                .iter()
                .all(|condition| condition_matches(condition, &values))
        }
    }
}

/// Collects every value a path reaches, descending into arrays of
/// documents for non-numeric segments.
fn lookup<'a>(record: &'a Document, path: &str) -> Vec<&'a Bson> {
    if let Some(value) = record.get(path) {
        return vec![value];
    }
    let segments: Vec<&str> = path.split('.').collect();
    let mut found = Vec::new();
    if let Some((first, rest)) = segments.split_first() {
        if let Some(value) = record.get(*first) {
            collect(value, rest, &mut found);
        }
    }
    found
}

fn collect<'a>(value: &'a Bson, segments: &[&str], found: &mut Vec<&'a Bson>) {
    let Some((segment, rest)) = segments.split_first() else {
        found.push(value);
        return;
    };
    match value {
        Bson::Document(doc) => {
            if let Some(inner) = doc.get(*segment) {
                collect(inner, rest, found);
            }
        }
        Bson::Array(items) => match segment.parse::<usize>() {
            Ok(index) => {
                if let Some(item) = items.get(index) {
                    collect(item, rest, found);
                }
            }
            Err(_) => items
                .iter()
                .filter(|item| matches!(item, Bson::Document(_)))
                .for_each(|item| collect(item, segments, found)),
        },
        _ => {}
    }
}

fn condition_matches(condition: &Condition, values: &[&Bson]) -> bool {
    match condition {
        Condition::Eq(expected) => equals(values, expected),
        Condition::Ne(expected) => !equals(values, expected),
        Condition::Gt(bound) => compares(values, bound, |o| o == Ordering::Greater),
        Condition::Gte(bound) => compares(values, bound, |o| o != Ordering::Less),
        Condition::Lt(bound) => compares(values, bound, |o| o == Ordering::Less),
        Condition::Lte(bound) => compares(values, bound, |o| o != Ordering::Greater),
        Condition::In(candidates) => candidates.iter().any(|c| equals(values, c)),
        Condition::Nin(candidates) => !candidates.iter().any(|c| equals(values, c)),
        Condition::All(required) => {
            !values.is_empty() && required.iter().all(|r| equals(values, r))
        }
        Condition::Exists(expected) => !values.is_empty() == *expected,
        Condition::Regex(re) => values.iter().any(|value| {
            any_element(value, |v| matches!(v, Bson::String(s) if re.is_match(s)))
        }),
        Condition::Size(size) => values
            .iter()
            .any(|value| matches!(value, Bson::Array(items) if items.len() == *size)),
        Condition::ElemMatch(ElemMatch::Document(clauses)) => array_items(values).any(|item| {
            matches!(item, Bson::Document(doc) if all_clauses(clauses, doc))
        }),
        Condition::ElemMatch(ElemMatch::Value(conditions)) => array_items(values).any(|item| {
            conditions
                .iter()
                .all(|condition| condition_matches(condition, &[item]))
        }),
        Condition::Not(conditions) => !conditions
            .iter()
            .all(|condition| condition_matches(condition, values)),
    }
}

fn array_items<'a>(values: &'a [&'a Bson]) -> impl Iterator<Item = &'a Bson> {
    values
        .iter()
        .flat_map(|value| value.as_array().map(Vec::as_slice).unwrap_or_default())
}

fn values_equal(actual: &Bson, expected: &Bson) -> bool {
    match (actual, expected) {
        (Bson::Array(a), Bson::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        _ if type_rank(Some(actual)) == 2 && type_rank(Some(expected)) == 2 => {
            compare_values(Some(actual), Some(expected)) == Ordering::Equal
        }
        _ => actual == expected,
    }
}

fn equals(values: &[&Bson], expected: &Bson) -> bool {
    if values.is_empty() {
        return matches!(expected, Bson::Null);
    }
    values
        .iter()
        .any(|value| any_element(value, |v| values_equal(v, expected)))
}

fn compares(values: &[&Bson], bound: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    let bound_rank = type_rank(Some(bound));
    values.iter().any(|value| {
        any_element(value, |v| {
            type_rank(Some(v)) == bound_rank && accept(compare_values(Some(v), Some(bound)))
        })
    })
}

/// Applies a test to a value and, for arrays, to each of its elements.
fn any_element(value: &Bson, test: impl Fn(&Bson) -> bool) -> bool {
    match value {
        Bson::Array(items) => test(value) || items.iter().any(&test),
        single => test(single),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    fn users() -> Vec<Document> {
        vec![
            doc! { "name": "alice", "db": "admin", "roles": [{ "role": "root", "db": "admin" }], "age": 31 },
            doc! { "name": "bob", "db": "shop", "roles": [{ "role": "readWrite", "db": "shop" }], "age": 24_i64 },
            doc! { "name": "carol", "db": "shop", "roles": [], "age": 45.5 },
        ]
    }

    fn matching(query: Document) -> Vec<String> {
        let matcher = Matcher::compile(&query).unwrap();
        users()
            .into_iter()
            .filter(|u| matcher.matches(u))
            .map(|u| u.get_str("name").unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_empty_query_matches_everything() {
        assert_eq!(matching(doc! {}).len(), 3);
    }

    #[test]
    fn test_equality_and_comparison() {
        assert_eq!(matching(doc! { "db": "shop" }), vec!["bob", "carol"]);
        assert_eq!(matching(doc! { "age": { "$gte": 30 } }), vec!["alice", "carol"]);
        assert_eq!(matching(doc! { "age": { "$gt": 24.0, "$lt": 40 } }), vec!["alice"]);
        assert_eq!(matching(doc! { "age": 24 }), vec!["bob"]);
        assert_eq!(matching(doc! { "db": { "$ne": "shop" } }), vec!["alice"]);
    }

    #[test]
    fn test_comparison_does_not_cross_types() {
        assert!(matching(doc! { "name": { "$gt": 5 } }).is_empty());
    }

    #[test]
    fn test_set_membership() {
        assert_eq!(matching(doc! { "name": { "$in": ["bob", "dave"] } }), vec!["bob"]);
        assert_eq!(matching(doc! { "name": { "$nin": ["bob"] } }), vec!["alice", "carol"]);
    }

    #[test]
    fn test_logical_composition() {
        assert_eq!(
            matching(doc! { "$or": [{ "name": "alice" }, { "age": { "$gt": 40 } }] }),
            vec!["alice", "carol"]
        );
        assert_eq!(
            matching(doc! { "$and": [{ "db": "shop" }, { "age": { "$lt": 30 } }] }),
            vec!["bob"]
        );
        assert_eq!(matching(doc! { "$nor": [{ "db": "shop" }] }), vec!["alice"]);
        assert_eq!(matching(doc! { "age": { "$not": { "$gt": 30 } } }), vec!["bob"]);
    }

    #[test]
    fn test_array_and_nested_fields() {
        assert_eq!(matching(doc! { "roles.role": "root" }), vec!["alice"]);
        assert_eq!(matching(doc! { "roles.db": { "$in": ["shop"] } }), vec!["bob"]);
        assert_eq!(matching(doc! { "roles.0.role": "root" }), vec!["alice"]);
        assert_eq!(matching(doc! { "roles": { "$size": 0 } }), vec!["carol"]);
        assert_eq!(
            matching(doc! { "roles": { "$elemMatch": { "role": "readWrite", "db": "shop" } } }),
            vec!["bob"]
        );
    }

    #[test]
    fn test_scalar_matches_array_element() {
        let matcher = Matcher::compile(&doc! { "tags": "b" }).unwrap();
        assert!(matcher.matches(&doc! { "tags": ["a", "b"] }));
        assert!(!matcher.matches(&doc! { "tags": ["c"] }));

        let all = Matcher::compile(&doc! { "tags": { "$all": ["a", "b"] } }).unwrap();
        assert!(all.matches(&doc! { "tags": ["b", "c", "a"] }));
        assert!(!all.matches(&doc! { "tags": ["a"] }));
    }

    #[test]
    fn test_exists_and_null() {
        let exists = Matcher::compile(&doc! { "capped": { "$exists": true } }).unwrap();
        assert!(exists.matches(&doc! { "capped": false }));
        assert!(!exists.matches(&doc! {}));

        let null = Matcher::compile(&doc! { "capped": Bson::Null }).unwrap();
        assert!(null.matches(&doc! {}));
        assert!(!null.matches(&doc! { "capped": true }));
    }

    #[test]
    fn test_regex() {
        assert_eq!(matching(doc! { "name": { "$regex": "^A", "$options": "i" } }), vec!["alice"]);
        assert_eq!(matching(doc! { "name": { "$regex": "o" } }), vec!["bob", "carol"]);
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let err = Matcher::compile(&doc! { "name": { "$where": "true" } }).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let err = Matcher::compile(&doc! { "$text": { "$search": "x" } }).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_invalid_regex_rejected() {
        assert!(Matcher::compile(&doc! { "name": { "$regex": "(" } }).is_err());
    }
}
