//! Field projection for `$select`.

use mongodb::bson::Document;

/// Keeps only the listed fields, in listed order. Fields the record lacks
/// are skipped.
pub fn select(record: &Document, fields: &[String]) -> Document {
    let mut projected = Document::new();
    for field in fields {
        if projected.contains_key(field) {
            continue;
        }
        if let Some(value) = record.get(field) {
            projected.insert(field.clone(), value.clone());
        }
    }
    projected
}
