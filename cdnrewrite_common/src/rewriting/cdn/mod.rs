pub mod cdn_rewriter;
pub mod prefetch;
