/// Outcome of rewriting one response body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteResult {
    /// The rewritten body
    pub body: String,
    /// Categories that were applied, in evaluation order
    pub applied_categories: Vec<String>,
    /// Whether a `dns-prefetch` tag was inserted
    pub prefetch_applied: bool,
}

pub trait Rewriter {
    fn rewrite(&self, body: &str) -> RewriteResult;
}
