use serde_json::Value;
use tracing::debug;

use crate::entities::{LabelRule, Resource};
use crate::page::LookupOption;

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn item_key(item: &Value) -> Option<String> {
    ["id", "uuid", "pk"]
        .iter()
        .find_map(|field| item.get(field).and_then(scalar_string))
}

fn label(item: &Value, rule: LabelRule) -> Option<String> {
    match rule {
        LabelRule::Joined(fields) => {
            let parts: Vec<String> = fields
                .iter()
                .filter_map(|field| item.get(field).and_then(scalar_string))
                .collect();
            (!parts.is_empty()).then(|| parts.join(" "))
        }
        LabelRule::FirstOf(fields) => fields
            .iter()
            .find_map(|field| item.get(field).and_then(scalar_string)),
    }
}

/// Maps one list item to an option. Items without a usable key are dropped;
/// items without a label fall back to their key.
pub(crate) fn to_option(resource: Resource, item: &Value) -> Option<LookupOption> {
    let Some(key) = item_key(item) else {
        debug!(resource = resource.name(), "dropping list item without id");
        return None;
    };
    let label = label(item, resource.label_rule()).unwrap_or_else(|| key.clone());
    Some(LookupOption { key, label })
}
