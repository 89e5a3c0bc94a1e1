pub mod templates;
pub mod validate;
