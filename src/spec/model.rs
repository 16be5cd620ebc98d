//! Typed model of an `OpenAPI` 3 / Swagger 2 API description
//!
//! The raw document is deserialized into private `Raw*` structs that mirror
//! the wire shape, then folded into the public model. Only the parts needed
//! to derive tools are kept: operations, their path/query parameters, the
//! request-body properties and the kind of the success response.
//!
//! Paths and the methods of each path item keep their document order. Local
//! `$ref` pointers (`#/components/...`, `#/definitions/...`) are inlined
//! before the typed model is built; cyclic or dangling ones are skipped.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{Error, Result};

/// Longest chain of nested `$ref` pointers that is followed
const MAX_REF_DEPTH: usize = 32;

/// Validated, parsed API description
#[derive(Debug, Clone)]
pub struct ApiDescription {
    /// Value of the `openapi` or `swagger` version marker
    pub spec_version: String,
    /// `info.title`
    pub title: String,
    /// `info.version`
    pub version: String,
    /// Path items in document order
    pub paths: Vec<PathItem>,
}

/// Operations declared on one path template
#[derive(Debug, Clone)]
pub struct PathItem {
    /// Path template with `{param}` placeholders
    pub path: String,
    /// Operations in the order the document lists their methods
    pub operations: Vec<Operation>,
}

/// HTTP methods an `OpenAPI` path item can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HttpMethod {
    /// GET
    Get,
    /// PUT
    Put,
    /// POST
    Post,
    /// DELETE
    Delete,
    /// OPTIONS
    Options,
    /// HEAD
    Head,
    /// PATCH
    Patch,
    /// TRACE
    Trace,
}

impl HttpMethod {
    /// Every method a path item can carry
    pub const ALL: [Self; 8] = [
        Self::Get,
        Self::Put,
        Self::Post,
        Self::Delete,
        Self::Options,
        Self::Head,
        Self::Patch,
        Self::Trace,
    ];

    /// Parse a path-item key (`get`, `post`, ...)
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(key))
    }

    /// Upper-case wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
            Self::Head => "HEAD",
            Self::Patch => "PATCH",
            Self::Trace => "TRACE",
        }
    }

    /// Methods that conventionally carry a JSON body
    #[must_use]
    pub fn carries_body(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }

    /// Convert to the HTTP client's method type
    #[must_use]
    pub fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Put => reqwest::Method::PUT,
            Self::Post => reqwest::Method::POST,
            Self::Delete => reqwest::Method::DELETE,
            Self::Options => reqwest::Method::OPTIONS,
            Self::Head => reqwest::Method::HEAD,
            Self::Patch => reqwest::Method::PATCH,
            Self::Trace => reqwest::Method::TRACE,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One API action, owned by exactly one (path, method) pair
#[derive(Debug, Clone)]
pub struct Operation {
    /// `operationId`, often generator-decorated (`listarUsingGET_1`)
    pub operation_id: Option<String>,
    /// HTTP method
    pub method: HttpMethod,
    /// Path template with `{param}` placeholders
    pub path: String,
    /// Short summary
    pub summary: Option<String>,
    /// Long description
    pub description: Option<String>,
    /// Parameters (path-level ones merged in, operation-level overriding)
    pub parameters: Vec<Parameter>,
    /// JSON request body, if any
    pub request_body: Option<RequestBody>,
    /// Kind of the success response body, when declared
    pub response_kind: Option<PrimitiveKind>,
}

/// Where a parameter is carried on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParameterLocation {
    /// `{param}` placeholder in the path template
    Path,
    /// URL query string
    Query,
    /// Request header
    Header,
    /// Cookie
    Cookie,
    /// Swagger 2 body parameter
    Body,
    /// Swagger 2 form field
    FormData,
    /// Anything else
    #[serde(other)]
    Other,
}

/// Declared primitive kind of a parameter or property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    /// `string`
    String,
    /// `integer`
    Integer,
    /// `number`
    Number,
    /// `boolean`
    Boolean,
    /// `array`
    Array,
    /// `object`
    Object,
    /// Missing or unrecognized type
    Unknown,
}

impl PrimitiveKind {
    /// Read a schema `type` value; `["string", "null"]` picks the non-null entry
    #[must_use]
    pub fn from_schema_type(value: Option<&Value>) -> Self {
        match value {
            Some(Value::String(s)) => Self::from_name(s),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .find(|s| *s != "null")
                .map_or(Self::Unknown, Self::from_name),
            _ => Self::Unknown,
        }
    }

    fn from_name(name: &str) -> Self {
        match name {
            "string" => Self::String,
            "integer" => Self::Integer,
            "number" => Self::Number,
            "boolean" => Self::Boolean,
            "array" => Self::Array,
            "object" => Self::Object,
            _ => Self::Unknown,
        }
    }

    /// JSON-schema type exposed to tool callers
    #[must_use]
    pub fn json_type(self) -> &'static str {
        match self {
            Self::Integer | Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::String | Self::Unknown => "string",
        }
    }
}

/// A declared operation parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Parameter name
    pub name: String,
    /// Wire location
    pub location: ParameterLocation,
    /// Declared kind
    pub kind: PrimitiveKind,
    /// Whether the parameter is mandatory
    pub required: bool,
    /// Human description
    pub description: Option<String>,
}

/// JSON object request body
#[derive(Debug, Clone, PartialEq)]
pub struct RequestBody {
    /// Top-level object properties, in document order
    pub properties: Vec<BodyProperty>,
}

/// One property of a request body schema
#[derive(Debug, Clone, PartialEq)]
pub struct BodyProperty {
    /// Property name
    pub name: String,
    /// Declared kind
    pub kind: PrimitiveKind,
    /// Human description
    pub description: Option<String>,
}

/// Summary of a loaded description
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SpecInfo {
    /// `info.title`
    pub title: String,
    /// `info.version`
    pub version: String,
    /// Number of path templates
    pub path_count: usize,
}

// ============================================================================
// Raw wire shapes
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawDocument {
    openapi: Option<String>,
    swagger: Option<String>,
    info: RawInfo,
    #[serde(default)]
    paths: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawInfo {
    title: String,
    version: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOperation {
    #[serde(default)]
    operation_id: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Vec<RawParameterOrRef>,
    #[serde(default)]
    request_body: Option<RawRequestBody>,
    #[serde(default)]
    responses: BTreeMap<String, RawResponse>,
}

/// A parameter entry; a `$ref` that survived resolution is kept apart
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawParameterOrRef {
    Ref {
        #[serde(rename = "$ref")]
        reference: String,
    },
    Inline(RawParameter),
}

#[derive(Debug, Clone, Deserialize)]
struct RawParameter {
    name: String,
    #[serde(rename = "in")]
    location: ParameterLocation,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    schema: Option<RawSchema>,
    /// Swagger 2 declares the type inline
    #[serde(rename = "type", default)]
    kind: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawSchema {
    #[serde(rename = "$ref", default)]
    reference: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<Value>,
    #[serde(default)]
    properties: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawRequestBody {
    #[serde(rename = "$ref", default)]
    reference: Option<String>,
    #[serde(default)]
    content: BTreeMap<String, RawMediaType>,
}

#[derive(Debug, Deserialize)]
struct RawMediaType {
    #[serde(default)]
    schema: Option<RawSchema>,
}

#[derive(Debug, Default, Deserialize)]
struct RawResponse {
    #[serde(default)]
    content: BTreeMap<String, RawMediaType>,
    /// Swagger 2 puts the schema on the response itself
    #[serde(default)]
    schema: Option<RawSchema>,
}

impl RawSchema {
    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::from_schema_type(self.kind.as_ref())
    }

    /// Object properties; unresolved `$ref` schemas and properties are skipped
    fn body_properties(&self) -> Option<Vec<BodyProperty>> {
        if self.reference.is_some() || self.properties.is_empty() {
            return None;
        }
        let props = self
            .properties
            .iter()
            .filter(|(_, v)| v.get("$ref").is_none())
            .map(|(name, v)| BodyProperty {
                name: name.clone(),
                kind: PrimitiveKind::from_schema_type(v.get("type")),
                description: v
                    .get("description")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            })
            .collect();
        Some(props)
    }
}

impl RawParameter {
    fn into_parameter(self) -> Parameter {
        let kind = match (&self.schema, &self.kind) {
            (Some(schema), _) if schema.kind.is_some() => schema.kind(),
            (_, kind) => PrimitiveKind::from_schema_type(kind.as_ref()),
        };
        Parameter {
            name: self.name,
            location: self.location,
            kind,
            required: self.required,
            description: self.description,
        }
    }
}

impl ApiDescription {
    /// Build the typed model from a parsed JSON/YAML document
    ///
    /// Operations that do not fit the model are skipped with a warning so a
    /// single malformed entry cannot hide the rest of the API.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the top-level shape (`info`, `paths`)
    /// cannot be read.
    pub fn from_value(mut doc: Value) -> Result<Self> {
        resolve_local_refs(&mut doc);

        let raw: RawDocument = serde_json::from_value(doc)
            .map_err(|e| Error::spec_validation(format!("Unreadable API description: {e}")))?;

        let spec_version = raw
            .openapi
            .or(raw.swagger)
            .ok_or_else(|| Error::spec_validation("Missing OpenAPI/Swagger version"))?;

        let mut paths = Vec::with_capacity(raw.paths.len());
        for (path, item) in raw.paths {
            let Value::Object(item) = item else {
                warn!(path = %path, "Skipping path item that is not an object");
                continue;
            };
            let shared = item
                .get("parameters")
                .map(|v| parse_parameters(&path, None, v))
                .unwrap_or_default();

            let mut operations = Vec::new();
            for (key, value) in &item {
                let Some(method) = HttpMethod::from_key(key) else {
                    continue;
                };
                if !value.is_object() {
                    continue;
                }
                match serde_json::from_value::<RawOperation>(value.clone()) {
                    Ok(op) => operations.push(build_operation(&path, method, op, &shared)),
                    Err(e) => {
                        warn!(path = %path, method = %method, error = %e, "Skipping malformed operation");
                    }
                }
            }
            paths.push(PathItem { path, operations });
        }

        Ok(Self {
            spec_version,
            title: raw.info.title,
            version: raw.info.version,
            paths,
        })
    }

    /// Iterate every operation in document order
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.paths.iter().flat_map(|item| &item.operations)
    }

    /// Operations declared on `path`; empty if the path is unknown
    #[must_use]
    pub fn operations_at(&self, path: &str) -> &[Operation] {
        self.paths
            .iter()
            .find(|item| item.path == path)
            .map(|item| item.operations.as_slice())
            .unwrap_or_default()
    }

    /// Title, version and path count
    #[must_use]
    pub fn info(&self) -> SpecInfo {
        SpecInfo {
            title: self.title.clone(),
            version: self.version.clone(),
            path_count: self.paths.len(),
        }
    }

    /// Semantic checks beyond the structural ones
    ///
    /// Returns every problem found; an empty list means the description is
    /// usable.
    #[must_use]
    pub fn semantic_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        let mut seen_ids = HashSet::new();

        for PathItem { path, operations } in &self.paths {
            if !path.starts_with('/') {
                issues.push(format!("Path \"{path}\" must start with '/'"));
            }
            let placeholders = path_placeholders(path);
            for op in operations {
                for param in op
                    .parameters
                    .iter()
                    .filter(|p| p.location == ParameterLocation::Path)
                {
                    if !placeholders.contains(&param.name.as_str()) {
                        issues.push(format!(
                            "{} {path} declares path parameter \"{}\" with no {{{}}} placeholder",
                            op.method, param.name, param.name
                        ));
                    }
                }
                if let Some(ref id) = op.operation_id {
                    if !seen_ids.insert(id.as_str()) {
                        issues.push(format!("Duplicate operationId \"{id}\""));
                    }
                }
            }
        }
        issues
    }
}

impl Operation {
    /// Parameters the tool surface exposes (path and query)
    pub fn exposed_parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters
            .iter()
            .filter(|p| matches!(p.location, ParameterLocation::Path | ParameterLocation::Query))
    }
}

/// Names of the `{name}` placeholders in a path template, in order
#[must_use]
pub fn path_placeholders(template: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start + 1..].find('}') else {
            break;
        };
        names.push(&rest[start + 1..start + 1 + len]);
        rest = &rest[start + 1 + len + 1..];
    }
    names
}

/// Inline local `$ref` pointers found under `paths`
///
/// References are JSON pointers into the same document. A reference that
/// points at itself through its own expansion, or that does not resolve, is
/// left as is.
fn resolve_local_refs(doc: &mut Value) {
    let Some(slot) = doc.get_mut("paths") else {
        return;
    };
    let mut paths = slot.take();
    inline_refs(doc, &mut paths, &mut Vec::new());
    if let Some(slot) = doc.get_mut("paths") {
        *slot = paths;
    }
}

fn inline_refs(root: &Value, node: &mut Value, stack: &mut Vec<String>) {
    match node {
        Value::Object(map) => {
            if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
                let reference = reference.to_string();
                if let Some(target) = lookup_ref(root, &reference, stack) {
                    let mut resolved = target.clone();
                    stack.push(reference);
                    inline_refs(root, &mut resolved, stack);
                    stack.pop();
                    *node = resolved;
                }
                return;
            }
            for value in map.values_mut() {
                inline_refs(root, value, stack);
            }
        }
        Value::Array(items) => {
            for item in items {
                inline_refs(root, item, stack);
            }
        }
        _ => {}
    }
}

fn lookup_ref<'a>(root: &'a Value, reference: &str, stack: &[String]) -> Option<&'a Value> {
    if stack.iter().any(|r| r == reference) {
        debug!(reference, "Leaving cyclic $ref unresolved");
        return None;
    }
    if stack.len() >= MAX_REF_DEPTH {
        warn!(reference, depth = stack.len(), "Leaving deeply nested $ref unresolved");
        return None;
    }
    let Some(pointer) = reference.strip_prefix('#') else {
        warn!(reference, "Skipping non-local $ref");
        return None;
    };
    let target = root.pointer(pointer);
    if target.is_none() {
        warn!(reference, "Skipping dangling $ref");
    }
    target
}

fn parse_parameters(path: &str, method: Option<HttpMethod>, value: &Value) -> Vec<RawParameter> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match serde_json::from_value::<RawParameterOrRef>(item.clone()) {
            Ok(RawParameterOrRef::Inline(p)) => Some(p),
            Ok(RawParameterOrRef::Ref { reference }) => {
                debug!(path = %path, reference = %reference, "Skipping unresolved parameter");
                None
            }
            Err(e) => {
                warn!(path = %path, method = ?method, error = %e, "Skipping malformed parameter");
                None
            }
        })
        .collect()
}

fn build_operation(
    path: &str,
    method: HttpMethod,
    raw: RawOperation,
    shared: &[RawParameter],
) -> Operation {
    let mut parameters: Vec<Parameter> = Vec::new();
    let mut request_body = raw.request_body.as_ref().and_then(openapi3_body);

    let own = raw.parameters.into_iter().filter_map(|p| match p {
        RawParameterOrRef::Inline(p) => Some(p),
        RawParameterOrRef::Ref { reference } => {
            debug!(path = %path, method = %method, reference = %reference, "Skipping unresolved parameter");
            None
        }
    });
    for raw_param in shared.iter().cloned().chain(own) {
        if raw_param.location == ParameterLocation::Body {
            if let Some(properties) = raw_param.schema.as_ref().and_then(RawSchema::body_properties)
            {
                request_body = Some(RequestBody { properties });
            }
            continue;
        }
        let param = raw_param.into_parameter();
        // Operation-level entries override path-level ones in place
        if let Some(existing) = parameters
            .iter_mut()
            .find(|p| p.name == param.name && p.location == param.location)
        {
            *existing = param;
        } else {
            parameters.push(param);
        }
    }

    Operation {
        operation_id: raw.operation_id,
        method,
        path: path.to_string(),
        summary: raw.summary,
        description: raw.description,
        parameters,
        request_body,
        response_kind: success_kind(&raw.responses),
    }
}

fn openapi3_body(body: &RawRequestBody) -> Option<RequestBody> {
    if body.reference.is_some() {
        return None;
    }
    let schema = body.content.get("application/json")?.schema.as_ref()?;
    Some(RequestBody {
        properties: schema.body_properties()?,
    })
}

fn success_kind(responses: &BTreeMap<String, RawResponse>) -> Option<PrimitiveKind> {
    let response = ["200", "201", "default"]
        .iter()
        .find_map(|code| responses.get(*code))?;
    let schema = response
        .content
        .get("application/json")
        .or_else(|| response.content.get("*/*"))
        .and_then(|m| m.schema.as_ref())
        .or(response.schema.as_ref())?;
    match schema.kind() {
        PrimitiveKind::Unknown if schema.reference.is_some() || !schema.properties.is_empty() => {
            Some(PrimitiveKind::Object)
        }
        PrimitiveKind::Unknown => None,
        kind => Some(kind),
    }
}
