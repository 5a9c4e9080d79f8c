pub mod lir_body_metadata;
pub mod types;
