//! Declared defaults, installed into blank fields before any file is applied.

use super::merge::merge_into;
use crate::error::{ConfigError, Result};
use crate::schema::{NamePath, Schema, SlotShape, same_value};
use serde_json::{Map, Value};

/// Install every declared default whose field is still blank.
///
/// `record` is the value tree of one record and `zero` its blank value.
/// Returns the dotted paths of the fields that received a default.
pub(crate) fn apply_defaults(
    record: &mut Value,
    schema: &Schema,
    zero: &Map<String, Value>,
    path: &NamePath,
) -> Result<Vec<String>> {
    let mut applied = Vec::new();
    visit(record, schema, zero, path, &mut applied)?;
    Ok(applied)
}

fn visit(
    record: &mut Value,
    schema: &Schema,
    zero: &Map<String, Value>,
    path: &NamePath,
    applied: &mut Vec<String>,
) -> Result<()> {
    let Value::Object(map) = record else {
        return Ok(());
    };

    for slot in schema.slots(zero) {
        let field_path = path.child(slot.name);
        let current = map
            .entry(slot.name.to_string())
            .or_insert_with(|| slot.zero.clone());

        if let Some(literal) = slot.default_literal()
            && same_value(current, slot.zero)
        {
            let invalid = |message: String| ConfigError::InvalidDefault {
                path: field_path.dotted(),
                message,
            };
            match slot.shape {
                SlotShape::Record { .. } => {
                    let value: Value = serde_yaml::from_str(literal)
                        .map_err(|e| invalid(e.to_string()))?;
                    merge_into(current, value);
                }
                SlotShape::List { .. } => {
                    *current = serde_yaml::from_str(literal).map_err(|e| invalid(e.to_string()))?;
                }
                SlotShape::Value => {
                    *current = slot.leaf_kind().parse_default(literal).map_err(invalid)?;
                }
            }
            applied.push(field_path.dotted());
        }

        match slot.shape {
            SlotShape::Value => {}
            SlotShape::Record { schema, .. } => {
                let empty = Map::new();
                let child_zero = slot.record_zero().unwrap_or(&empty);
                visit(current, schema, child_zero, &slot.child_base(path), applied)?;
            }
            SlotShape::List { schema, zero } => {
                let Value::Array(items) = current else {
                    continue;
                };
                let empty = Map::new();
                let element_zero = zero.as_object().unwrap_or(&empty);
                for (idx, item) in items.iter_mut().enumerate() {
                    visit(item, schema, element_zero, &field_path.index(idx), applied)?;
                }
            }
        }
    }
    Ok(())
}
