pub mod cdn;
pub mod config;
pub mod rewriter;
pub mod rule;
