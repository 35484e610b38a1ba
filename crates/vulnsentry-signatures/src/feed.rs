//! Validation of signature feed payloads

use serde_json::Value;
use vulnsentry_core::{Result, SignatureRecord, VulnError};

use crate::hash::content_hash;

/// Convert a feed payload into signature records.
///
/// The payload must be a JSON array of objects, each carrying string
/// `pattern`, `description`, `CVE` and `severity` fields. Any `hash` in the
/// input is ignored and recomputed from `pattern`.
pub fn parse_records(payload: &Value) -> Result<Vec<SignatureRecord>> {
    as_list(payload)?
        .iter()
        .enumerate()
        .map(|(index, item)| parse_record(index, item))
        .collect()
}

/// Read records back from a stored database.
///
/// The top level must still be a list, but entries that fail validation are
/// skipped with a warning so one bad entry does not hide the rest.
pub fn parse_stored_records(payload: &Value) -> Result<Vec<SignatureRecord>> {
    let records = as_list(payload)?
        .iter()
        .enumerate()
        .filter_map(|(index, item)| match parse_record(index, item) {
            Ok(record) => Some(record),
            Err(e) => {
                log::warn!("Skipping stored signature: {}", e);
                None
            }
        })
        .collect();
    Ok(records)
}

fn as_list(payload: &Value) -> Result<&Vec<Value>> {
    payload.as_array().ok_or_else(|| {
        VulnError::InvalidSignatureFormat(format!(
            "expected a list of signature objects, got {}",
            kind_of(payload)
        ))
    })
}

fn parse_record(index: usize, item: &Value) -> Result<SignatureRecord> {
    let object = item.as_object().ok_or_else(|| {
        VulnError::InvalidSignatureFormat(format!(
            "entry {} is {}, expected an object",
            index,
            kind_of(item)
        ))
    })?;

    let field = |name: &str| -> Result<String> {
        match object.get(name) {
            Some(Value::String(value)) => Ok(value.clone()),
            Some(other) => Err(VulnError::InvalidSignatureFormat(format!(
                "entry {}: field `{}` must be a string, got {}",
                index,
                name,
                kind_of(other)
            ))),
            None => Err(VulnError::InvalidSignatureFormat(format!(
                "entry {}: missing field `{}`",
                index, name
            ))),
        }
    };

    let pattern = field("pattern")?;
    Ok(SignatureRecord {
        pattern_hash: content_hash(&pattern),
        description: field("description")?,
        cve_id: field("CVE")?,
        severity: field("severity")?,
        pattern,
    })
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
