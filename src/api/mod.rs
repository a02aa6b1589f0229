pub mod format;
pub mod opaque_id;

pub use format::{entities_to_api_value, entity_to_api_value};
pub use opaque_id::OpaqueIdError;
