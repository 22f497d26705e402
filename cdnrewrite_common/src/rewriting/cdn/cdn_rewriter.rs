use std::{borrow::Cow, sync::Arc};

use tracing::trace;

use crate::rewriting::{
    config::RewriteConfig,
    rewriter::{RewriteResult, Rewriter},
    rule::{category_rules, RewriteRule, RuleContext, RuleError, RuleHook},
};

use super::prefetch::inject_prefetch;

struct CompiledCategory {
    name: String,
    rules: Vec<RewriteRule>,
}

/// Swaps site-relative asset URLs in a body for their CDN equivalents.
///
/// Rules are built once from the configuration; rewriting itself never fails and holds no
/// mutable state, so one engine serves every request.
pub struct CdnRewriter {
    config: Arc<RewriteConfig>,
    categories: Vec<CompiledCategory>,
}

impl CdnRewriter {
    pub fn new(config: Arc<RewriteConfig>) -> Result<Self, RuleError> {
        Self::build(config, None)
    }

    /// Like [`CdnRewriter::new`], passing each category's rules through `hook` first.
    pub fn with_hook(config: Arc<RewriteConfig>, hook: RuleHook) -> Result<Self, RuleError> {
        Self::build(config, Some(hook))
    }

    fn build(config: Arc<RewriteConfig>, hook: Option<RuleHook>) -> Result<Self, RuleError> {
        let subdirectory = config.normalized_subdirectory();
        let ctx = RuleContext {
            subdirectory: &subdirectory,
            cdn: config.cdn_origin(),
            site_origin: config.site_origin(),
        };

        let mut categories = Vec::new();
        for category in config.enabled_categories() {
            let mut rules = category_rules(category, ctx)?;
            if let Some(hook) = &hook {
                rules = hook(category, rules);
            }

            categories.push(CompiledCategory {
                name: category.name.clone(),
                rules,
            });
        }

        Ok(Self { config, categories })
    }

    pub fn config(&self) -> &RewriteConfig {
        &self.config
    }

    pub fn rules(&self) -> impl Iterator<Item = &RewriteRule> {
        self.categories
            .iter()
            .flat_map(|category| category.rules.iter())
    }
}

impl Rewriter for CdnRewriter {
    fn rewrite(&self, body: &str) -> RewriteResult {
        if body.is_empty() {
            return RewriteResult::default();
        }

        let mut body = body.to_owned();
        let mut applied_categories = Vec::with_capacity(self.categories.len());

        for category in &self.categories {
            for rule in &category.rules {
                let rewritten = match rule.apply(&body) {
                    Cow::Borrowed(_) => continue,
                    Cow::Owned(rewritten) => rewritten,
                };
                trace!(rule = rule.label(), "rewrite rule matched");
                body = rewritten;
            }

            // Enabled categories are reported whether or not they matched anything.
            if !applied_categories.contains(&category.name) {
                applied_categories.push(category.name.clone());
            }
        }

        let mut prefetch_applied = false;
        if self.config.add_prefetch {
            if let Some(with_prefetch) = inject_prefetch(&body, self.config.cdn_origin()) {
                body = with_prefetch;
                prefetch_applied = true;
            }
        }

        RewriteResult {
            body,
            applied_categories,
            prefetch_applied,
        }
    }
}
