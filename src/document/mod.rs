mod core;
pub mod path;

pub use core::{Document, FIELD_CREATED_AT, FIELD_ID, FIELD_UPDATED_AT, is_reserved_field};
pub(crate) use core::{batch_prefix, coerce_id, random_id};
