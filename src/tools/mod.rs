//! Tool derivation from the API description
//!
//! Every operation with an `operationId` becomes one MCP tool. The name is
//! derived from the path and the `operationId`, the input schema from the
//! path/query parameters plus the flattened JSON request body.

pub mod deriver;
pub mod naming;
pub mod table;

pub use deriver::ToolDeriver;
pub use naming::DISCOVERY_TOOL;
pub use table::{ToolDescriptor, ToolTable};
