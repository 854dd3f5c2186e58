pub mod ai;
pub mod ai_types;
pub mod batcher;
pub mod diff;
pub mod encoding;
pub mod glossary;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod qa;
pub mod rebuild;
pub mod registry;
pub mod report;
pub mod response;
pub mod validate;
