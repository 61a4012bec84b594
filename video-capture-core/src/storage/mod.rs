pub mod files;
pub mod metadata;
