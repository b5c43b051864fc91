pub mod file;
pub mod source;
