//! API description loading and the typed model it produces

mod model;
mod source;

pub use model::{
    ApiDescription, BodyProperty, HttpMethod, Operation, Parameter, ParameterLocation, PathItem,
    PrimitiveKind, RequestBody, SpecInfo, path_placeholders,
};
pub use source::{SpecSource, parse_document};

/// Published description of the Portal da Transparência API
pub const DEFAULT_SPEC_URL: &str = "https://api.portaldatransparencia.gov.br/v3/api-docs";
