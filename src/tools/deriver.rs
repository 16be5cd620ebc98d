//! API description to tool table derivation

use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use super::naming::{DISCOVERY_TOOL, disambiguate, tool_name};
use super::table::{ToolDescriptor, ToolTable};
use crate::spec::{ApiDescription, Operation};

/// Derives tools from an API description
///
/// Derivation is pure: the same description always yields the same table,
/// in the same order.
pub struct ToolDeriver;

impl ToolDeriver {
    /// Build the tool table for every operation that has an `operationId`
    ///
    /// Tools follow document order. The discovery tool's name is reserved.
    #[must_use]
    pub fn derive(doc: &ApiDescription) -> ToolTable {
        let mut table = ToolTable::new();
        let mut skipped = 0usize;

        for op in doc.operations() {
            let Some(ref operation_id) = op.operation_id else {
                skipped += 1;
                debug!(path = %op.path, method = %op.method, "Skipping operation without operationId");
                continue;
            };

            let taken = |candidate: &str| candidate == DISCOVERY_TOOL || table.contains(candidate);
            let mut name = tool_name(operation_id, &op.path);
            if taken(&name) {
                let unique = disambiguate(&name, op.method, &op.path, taken);
                warn!(
                    name = %name,
                    renamed = %unique,
                    path = %op.path,
                    method = %op.method,
                    "Tool name collision"
                );
                name = unique;
            }

            table.push(ToolDescriptor {
                name,
                description: describe(op),
                input_schema: input_schema(op),
                method: op.method,
                path: op.path.clone(),
                operation: op.clone(),
            });
        }

        info!(
            tools = table.len(),
            skipped,
            title = %doc.title,
            "Derived tools from API description"
        );
        table
    }
}

/// Summary, else description, else a synthesized one
fn describe(op: &Operation) -> String {
    op.summary
        .as_deref()
        .filter(|s| !s.is_empty())
        .or_else(|| op.description.as_deref().filter(|s| !s.is_empty()))
        .map_or_else(|| format!("Consulta {}", op.path), str::to_string)
}

/// Merge path/query parameters and flattened body properties
///
/// The first occurrence of a name wins.
fn input_schema(op: &Operation) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for param in op.exposed_parameters() {
        if properties.contains_key(&param.name) {
            continue;
        }
        let description = param
            .description
            .clone()
            .unwrap_or_else(|| format!("Parâmetro {}", param.name));
        properties.insert(
            param.name.clone(),
            json!({ "type": param.kind.json_type(), "description": description }),
        );
        if param.required {
            required.push(Value::String(param.name.clone()));
        }
    }

    if let Some(ref body) = op.request_body {
        for prop in &body.properties {
            if properties.contains_key(&prop.name) {
                continue;
            }
            let description = prop
                .description
                .clone()
                .unwrap_or_else(|| format!("Propriedade {}", prop.name));
            properties.insert(
                prop.name.clone(),
                json!({ "type": prop.kind.json_type(), "description": description }),
            );
        }
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}
