use std::{borrow::Cow, fmt, sync::Arc};

use regex::{Captures, Regex};

use super::config::{AttributeTarget, RewriteCategory};

/// Name of the capture group holding the quote character (`"`, `'` or nothing) in pattern rules.
pub const QUOTE_GROUP: &str = "quote";

/// Callback that may reshape a category's rules before they are used.
pub type RuleHook = Arc<dyn Fn(&RewriteCategory, Vec<RewriteRule>) -> Vec<RewriteRule> + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("invalid rewrite pattern for `{label}`: {source}")]
    InvalidPattern {
        label: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone)]
enum Matcher {
    /// Fixed string, replaced leftmost-first without overlap
    Literal { search: String, replacement: String },
    /// Regex with a `quote` group; the output is `before`, the captured quote, then `after`
    Quoted {
        regex: Regex,
        before: String,
        after: String,
    },
}

/// One search/replace step applied to a response body.
#[derive(Debug, Clone)]
pub struct RewriteRule {
    label: String,
    matcher: Matcher,
}

impl RewriteRule {
    pub fn literal(
        label: impl Into<String>,
        search: impl Into<String>,
        replacement: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            matcher: Matcher::Literal {
                search: search.into(),
                replacement: replacement.into(),
            },
        }
    }

    /// A pattern rule. Whatever the `quote` group captured is re-emitted between `before` and
    /// `after`; a pattern without that group behaves as if it captured nothing.
    pub fn quoted(
        label: impl Into<String>,
        pattern: &str,
        before: impl Into<String>,
        after: impl Into<String>,
    ) -> Result<Self, RuleError> {
        let label = label.into();
        let regex = Regex::new(pattern).map_err(|source| RuleError::InvalidPattern {
            label: label.clone(),
            source,
        })?;

        Ok(Self {
            label,
            matcher: Matcher::Quoted {
                regex,
                before: before.into(),
                after: after.into(),
            },
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Apply the rule, borrowing the input back when nothing matched.
    pub fn apply<'a>(&self, body: &'a str) -> Cow<'a, str> {
        match &self.matcher {
            Matcher::Literal {
                search,
                replacement,
            } => {
                if search.is_empty() || !body.contains(search.as_str()) {
                    Cow::Borrowed(body)
                } else {
                    Cow::Owned(body.replace(search.as_str(), replacement))
                }
            }
            Matcher::Quoted {
                regex,
                before,
                after,
            } => regex.replace_all(body, |caps: &Captures| {
                let quote = caps.name(QUOTE_GROUP).map_or("", |m| m.as_str());
                format!("{before}{quote}{after}")
            }),
        }
    }
}

impl fmt::Display for RewriteRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.matcher {
            Matcher::Literal { search, .. } => write!(f, "{} (literal `{}`)", self.label, search),
            Matcher::Quoted { regex, .. } => write!(f, "{} (pattern `{}`)", self.label, regex),
        }
    }
}

/// Everything a category's rules are parameterised by.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    /// Normalized subdirectory, empty or ending in `/`
    pub subdirectory: &'a str,
    /// CDN origin without a trailing slash
    pub cdn: &'a str,
    /// Site origin without a trailing slash
    pub site_origin: Option<&'a str>,
}

/// Build the ordered rule list for one category.
pub fn category_rules(
    category: &RewriteCategory,
    ctx: RuleContext<'_>,
) -> Result<Vec<RewriteRule>, RuleError> {
    let mut rules = Vec::new();

    for prefix in &category.match_prefixes {
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            continue;
        }

        let path = format!("{}{}/", ctx.subdirectory, prefix);
        let target = format!("{}/{}", ctx.cdn, path);
        let label = format!("{}:{}", category.name, prefix);

        for attribute in &category.attribute_targets {
            match attribute {
                AttributeTarget::Src => {
                    rules.push(relative_attribute(&label, "src", &path, &target)?);
                    rules.push(rooted_attribute(&label, "src", &path, &target)?);
                    rules.push(escaped_attribute(&label, "src", &path, &target));
                }
                AttributeTarget::Href => {
                    rules.push(rooted_attribute(&label, "href", &path, &target)?);
                    rules.push(escaped_attribute(&label, "href", &path, &target));
                }
                AttributeTarget::BackgroundImageUrl => {
                    rules.push(background_image(&label, &path, &target)?);
                }
            }
        }

        if let Some(origin) = ctx.site_origin {
            rules.push(RewriteRule::literal(
                format!("{label}:absolute"),
                format!("{origin}/{path}"),
                target,
            ));
        }
    }

    Ok(rules)
}

/// `src="assets/` -> `src="<cdn>/assets/`
fn relative_attribute(
    label: &str,
    attribute: &str,
    path: &str,
    target: &str,
) -> Result<RewriteRule, RuleError> {
    RewriteRule::quoted(
        format!("{label}:{attribute}:relative"),
        &format!(
            r#"\b(?i:{})=(?P<{QUOTE_GROUP}>["']?){}"#,
            attribute,
            regex::escape(path)
        ),
        format!("{attribute}="),
        target,
    )
}

/// `src="/assets/` -> `src="<cdn>/assets/`
fn rooted_attribute(
    label: &str,
    attribute: &str,
    path: &str,
    target: &str,
) -> Result<RewriteRule, RuleError> {
    RewriteRule::quoted(
        format!("{label}:{attribute}:rooted"),
        &format!(
            r#"\b(?i:{})=(?P<{QUOTE_GROUP}>["']?)/{}"#,
            attribute,
            regex::escape(path)
        ),
        format!("{attribute}="),
        target,
    )
}

/// `src=\"/assets/` -> `src=\"<cdn>/assets/`, as found in JSON embedded in markup
fn escaped_attribute(label: &str, attribute: &str, path: &str, target: &str) -> RewriteRule {
    RewriteRule::literal(
        format!("{label}:{attribute}:escaped"),
        format!(r#"{attribute}=\"/{path}"#),
        format!(r#"{attribute}=\"{target}"#),
    )
}

/// `background-image: url('/assets/` -> `background-image: url('<cdn>/assets/`
fn background_image(label: &str, path: &str, target: &str) -> Result<RewriteRule, RuleError> {
    RewriteRule::quoted(
        format!("{label}:background-image"),
        &format!(
            r#"(?i:background-image:\s*url)\((?P<{QUOTE_GROUP}>["']?)/?{}"#,
            regex::escape(path)
        ),
        "background-image: url(",
        target,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const CDN: &str = "https://cdn.x";

    fn ctx(subdirectory: &str) -> RuleContext<'_> {
        RuleContext {
            subdirectory,
            cdn: CDN,
            site_origin: None,
        }
    }

    fn apply_all(rules: &[RewriteRule], body: &str) -> String {
        rules
            .iter()
            .fold(body.to_string(), |body, rule| rule.apply(&body).into_owned())
    }

    fn rule<'a>(rules: &'a [RewriteRule], label: &str) -> &'a RewriteRule {
        rules
            .iter()
            .find(|rule| rule.label() == label)
            .unwrap_or_else(|| panic!("missing rule {label}"))
    }

    #[test]
    fn labels_follow_category_prefix_and_form() {
        let category = RewriteCategory::new("assets", ["assets"]);
        let rules = category_rules(&category, ctx("")).unwrap();
        let labels: Vec<_> = rules.iter().map(RewriteRule::label).collect();

        assert_eq!(
            labels,
            vec![
                "assets:assets:src:relative",
                "assets:assets:src:rooted",
                "assets:assets:src:escaped",
                "assets:assets:href:rooted",
                "assets:assets:href:escaped",
                "assets:assets:background-image",
            ]
        );
    }

    #[test]
    fn src_relative() {
        let rules = category_rules(&RewriteCategory::new("assets", ["assets"]), ctx("")).unwrap();
        let rule = rule(&rules, "assets:assets:src:relative");

        assert_eq!(
            rule.apply(r#"<img src="assets/a.png">"#),
            r#"<img src="https://cdn.x/assets/a.png">"#
        );
        assert_eq!(
            rule.apply("<img src=assets/a.png>"),
            "<img src=https://cdn.x/assets/a.png>"
        );
    }

    #[test]
    fn src_rooted_keeps_quote() {
        let rules = category_rules(&RewriteCategory::new("assets", ["assets"]), ctx("")).unwrap();
        let rule = rule(&rules, "assets:assets:src:rooted");

        assert_eq!(
            rule.apply(r#"<script src="/assets/foo.js"></script>"#),
            r#"<script src="https://cdn.x/assets/foo.js"></script>"#
        );
        assert_eq!(
            rule.apply("<script src='/assets/foo.js'></script>"),
            "<script src='https://cdn.x/assets/foo.js'></script>"
        );
        assert_eq!(
            rule.apply(r#"<SCRIPT SRC="/assets/foo.js"></SCRIPT>"#),
            r#"<SCRIPT src="https://cdn.x/assets/foo.js"></SCRIPT>"#
        );
    }

    #[test]
    fn paths_match_case_sensitively() {
        let rules = category_rules(&RewriteCategory::new("assets", ["assets"]), ctx("")).unwrap();
        let body = concat!(
            r#"<img src="/Assets/Logo.PNG"><img src="Assets/a.png">"#,
            r#"<div style="background-image: url('/ASSETS/bg.png')">"#,
        );

        assert_eq!(apply_all(&rules, body), body);
        assert_eq!(
            apply_all(&rules, r#"<div style="Background-Image: URL('/assets/bg.png')">"#),
            r#"<div style="background-image: url('https://cdn.x/assets/bg.png')">"#
        );
    }

    #[test]
    fn src_escaped() {
        let rules = category_rules(&RewriteCategory::new("assets", ["assets"]), ctx("")).unwrap();
        let rule = rule(&rules, "assets:assets:src:escaped");

        assert_eq!(
            rule.apply(r#"{"html": "<img src=\"/assets/a.png\">"}"#),
            r#"{"html": "<img src=\"https://cdn.x/assets/a.png\">"}"#
        );
    }

    #[test]
    fn href_rooted_only() {
        let rules = category_rules(&RewriteCategory::new("assets", ["assets"]), ctx("")).unwrap();
        let body = r#"<link href="/assets/site.css"><a href="assets/doc.pdf">"#;

        assert_eq!(
            apply_all(&rules, body),
            r#"<link href="https://cdn.x/assets/site.css"><a href="assets/doc.pdf">"#
        );
    }

    #[test]
    fn background_image_preserves_quote_style() {
        let rules = category_rules(&RewriteCategory::new("assets", ["assets"]), ctx("")).unwrap();
        let rule = rule(&rules, "assets:assets:background-image");

        assert_eq!(
            rule.apply("background-image: url('/assets/bg.png')"),
            "background-image: url('https://cdn.x/assets/bg.png')"
        );
        assert_eq!(
            rule.apply(r#"background-image:url("assets/bg.png")"#),
            r#"background-image: url("https://cdn.x/assets/bg.png")"#
        );
        assert_eq!(
            rule.apply("background-image: url(/assets/bg.png)"),
            "background-image: url(https://cdn.x/assets/bg.png)"
        );
    }

    #[test]
    fn prefix_boundary_is_respected() {
        let rules = category_rules(&RewriteCategory::new("assets", ["assets"]), ctx("")).unwrap();
        let body = r#"<img src="/assets-legacy/a.png">"#;

        assert_eq!(apply_all(&rules, body), body);
    }

    #[test]
    fn subdirectory_appears_once() {
        let rules =
            category_rules(&RewriteCategory::new("assets", ["/assets/"]), ctx("site/")).unwrap();
        let body = r#"<img src="/site/assets/a.png"><img src="/assets/b.png">"#;

        assert_eq!(
            apply_all(&rules, body),
            r#"<img src="https://cdn.x/site/assets/a.png"><img src="/assets/b.png">"#
        );
    }

    #[test]
    fn absolute_site_urls() {
        let category = RewriteCategory::new("assets", ["assets"]);
        let rules = category_rules(
            &category,
            RuleContext {
                subdirectory: "",
                cdn: CDN,
                site_origin: Some("https://www.example.com"),
            },
        )
        .unwrap();
        let rule = rule(&rules, "assets:assets:absolute");

        assert_eq!(
            rule.apply(r#"<meta content="https://www.example.com/assets/og.png">"#),
            r#"<meta content="https://cdn.x/assets/og.png">"#
        );
        assert_eq!(
            rule.apply(r#"<meta content="https://www.example.com:8443/assets/og.png">"#),
            r#"<meta content="https://www.example.com:8443/assets/og.png">"#
        );
    }

    #[test]
    fn attribute_targets_limit_rules() {
        let category = RewriteCategory::new("themes", ["themes"])
            .with_attributes([AttributeTarget::BackgroundImageUrl]);
        let rules = category_rules(&category, ctx("")).unwrap();

        assert_eq!(rules.len(), 1);
        assert_eq!(
            apply_all(&rules, r#"<img src="/themes/a.png">"#),
            r#"<img src="/themes/a.png">"#
        );
    }

    #[test]
    fn empty_prefix_is_skipped() {
        let rules = category_rules(&RewriteCategory::new("root", ["/"]), ctx("")).unwrap();
        assert!(rules.is_empty());
    }

    #[test]
    fn dollar_in_cdn_is_not_expanded() {
        let category = RewriteCategory::new("assets", ["assets"]);
        let rules = category_rules(
            &category,
            RuleContext {
                subdirectory: "",
                cdn: "https://cdn.x/$1",
                site_origin: None,
            },
        )
        .unwrap();

        assert_eq!(
            apply_all(&rules, r#"<img src="/assets/a.png">"#),
            r#"<img src="https://cdn.x/$1/assets/a.png">"#
        );
    }

    #[test]
    fn already_rewritten_urls_are_left_alone() {
        let rules = category_rules(&RewriteCategory::new("assets", ["assets"]), ctx("")).unwrap();
        let once = apply_all(
            &rules,
            r#"<img src="/assets/a.png" style="background-image: url('assets/b.png')">"#,
        );

        assert_eq!(apply_all(&rules, &once), once);
    }

    #[test]
    fn invalid_custom_pattern_reports_label() {
        let err = RewriteRule::quoted("custom", "(unclosed", "", "").unwrap_err();
        assert!(err.to_string().contains("`custom`"));
    }
}
