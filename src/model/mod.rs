pub mod config;
pub mod document;
pub mod entry;
pub mod node;
pub mod report;
