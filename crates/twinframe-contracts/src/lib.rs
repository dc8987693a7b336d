pub mod config;
pub mod errors;
pub mod files;
pub mod generation;
pub mod slots;
