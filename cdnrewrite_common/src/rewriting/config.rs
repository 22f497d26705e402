use std::{collections::BTreeMap, fmt};

use serde::{
    de::{self, value::MapAccessDeserializer, MapAccess, SeqAccess, Visitor},
    Deserialize, Deserializer, Serialize,
};

use crate::error::ConfigError;

const fn default_true() -> bool {
    true
}

fn all_attributes() -> Vec<AttributeTarget> {
    AttributeTarget::ALL.to_vec()
}

/// Where in the markup a URL prefix is looked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeTarget {
    /// `src="..."`
    Src,
    /// `href="..."`
    Href,
    /// `background-image: url(...)` in inline styles
    #[serde(alias = "background-image-url")]
    BackgroundImageUrl,
}

impl AttributeTarget {
    pub const ALL: [AttributeTarget; 3] = [
        AttributeTarget::Src,
        AttributeTarget::Href,
        AttributeTarget::BackgroundImageUrl,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AttributeTarget::Src => "src",
            AttributeTarget::Href => "href",
            AttributeTarget::BackgroundImageUrl => "background-image-url",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A named group of path prefixes that share one rewrite rule set.
pub struct RewriteCategory {
    /// Category name, used in the `X-CDN-<Category>` debug header
    pub name: String,
    /// Disabled categories produce no rules and no headers
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Path segments to match, e.g. `assets`. Surrounding slashes are ignored.
    #[serde(rename = "prefixes")]
    pub match_prefixes: Vec<String>,
    /// Attributes the prefixes are matched in
    #[serde(rename = "attributes", default = "all_attributes")]
    pub attribute_targets: Vec<AttributeTarget>,
}

impl RewriteCategory {
    /// A category matching the given prefixes in every attribute target.
    pub fn new<I, S>(name: impl Into<String>, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            enabled: true,
            match_prefixes: prefixes.into_iter().map(Into::into).collect(),
            attribute_targets: all_attributes(),
        }
    }

    /// One of the well-known categories: `assets`, `resources` or `themes`.
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "assets" => Some(Self::new("assets", ["assets"])),
            "resources" => Some(Self::new("resources", ["resources", "_resources"])),
            "themes" => Some(Self::new("themes", ["themes"])),
            _ => None,
        }
    }

    pub fn builtins() -> Vec<Self> {
        BUILTIN_ORDER
            .iter()
            .filter_map(|name| Self::builtin(name))
            .collect()
    }

    pub fn with_attributes(mut self, targets: impl IntoIterator<Item = AttributeTarget>) -> Self {
        self.attribute_targets = targets.into_iter().collect();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

const BUILTIN_ORDER: [&str; 3] = ["assets", "resources", "themes"];

/// Every shape the `rewrites` setting has had.
///
/// Each list element is read straight from the input, never buffered, so the bare enum
/// identifiers RON writes for [`AttributeTarget`] still parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rewrites {
    /// Flat list of prefixes, e.g. `["assets", "resources"]`. Each prefix becomes its own
    /// category.
    Prefixes(Vec<String>),
    /// Built-in categories switched on or off, e.g. `{"assets": true, "themes": false}`.
    Toggles(BTreeMap<String, bool>),
    /// Fully spelled out categories. Bare prefixes may be mixed in.
    Categories(Vec<RewriteCategory>),
}

fn prefix_category(prefix: String) -> RewriteCategory {
    let name = prefix.trim_matches('/').to_string();
    RewriteCategory::new(name, [prefix])
}

/// One element of a `rewrites` list.
enum RewriteEntry {
    Prefix(String),
    Category(RewriteCategory),
}

impl<'de> Deserialize<'de> for RewriteEntry {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EntryVisitor;

        impl<'de> Visitor<'de> for EntryVisitor {
            type Value = RewriteEntry;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a path prefix or a rewrite category")
            }

            fn visit_str<E: de::Error>(self, prefix: &str) -> Result<Self::Value, E> {
                Ok(RewriteEntry::Prefix(prefix.to_string()))
            }

            fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Self::Value, A::Error> {
                RewriteCategory::deserialize(MapAccessDeserializer::new(map))
                    .map(RewriteEntry::Category)
            }
        }

        deserializer.deserialize_any(EntryVisitor)
    }
}

impl<'de> Deserialize<'de> for Rewrites {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct RewritesVisitor;

        impl<'de> Visitor<'de> for RewritesVisitor {
            type Value = Rewrites;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a list of prefixes or categories, or a map of built-in toggles")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::new();
                while let Some(entry) = seq.next_element::<RewriteEntry>()? {
                    entries.push(entry);
                }

                if entries
                    .iter()
                    .all(|entry| matches!(entry, RewriteEntry::Prefix(_)))
                {
                    return Ok(Rewrites::Prefixes(
                        entries
                            .into_iter()
                            .filter_map(|entry| match entry {
                                RewriteEntry::Prefix(prefix) => Some(prefix),
                                RewriteEntry::Category(_) => None,
                            })
                            .collect(),
                    ));
                }

                Ok(Rewrites::Categories(
                    entries
                        .into_iter()
                        .map(|entry| match entry {
                            RewriteEntry::Prefix(prefix) => prefix_category(prefix),
                            RewriteEntry::Category(category) => category,
                        })
                        .collect(),
                ))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut toggles = BTreeMap::new();
                while let Some((name, enabled)) = map.next_entry::<String, bool>()? {
                    toggles.insert(name, enabled);
                }
                Ok(Rewrites::Toggles(toggles))
            }
        }

        deserializer.deserialize_any(RewritesVisitor)
    }
}

impl Rewrites {
    /// Resolve into the ordered category list the engine works from.
    pub fn into_categories(self) -> Result<Vec<RewriteCategory>, ConfigError> {
        match self {
            Rewrites::Prefixes(prefixes) => Ok(prefixes.into_iter().map(prefix_category).collect()),
            Rewrites::Toggles(toggles) => {
                if let Some(unknown) = toggles
                    .keys()
                    .find(|name| !BUILTIN_ORDER.contains(&name.as_str()))
                {
                    return Err(ConfigError::UnknownCategory(unknown.clone()));
                }

                Ok(BUILTIN_ORDER
                    .iter()
                    .filter_map(|name| {
                        let enabled = *toggles.get(*name)?;
                        let category = RewriteCategory::builtin(name)?;
                        Some(if enabled { category } else { category.disabled() })
                    })
                    .collect())
            }
            Rewrites::Categories(categories) => Ok(categories),
        }
    }
}

fn deserialize_rewrites<'de, D>(deserializer: D) -> Result<Vec<RewriteCategory>, D::Error>
where
    D: Deserializer<'de>,
{
    Rewrites::deserialize(deserializer)?
        .into_categories()
        .map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
/// Everything the rewrite engine and gatekeeper need. Built once at startup and shared
/// read-only between requests.
pub struct RewriteConfig {
    /// Master switch
    #[serde(rename = "cdn_rewrite")]
    pub enabled: bool,
    /// The CDN origin including scheme, e.g. `https://cdn.example.com`
    pub cdn_domain: String,
    /// Base path the site is served under
    pub subdirectory: String,
    /// The site's own absolute origin. Absolute URLs pointing at it are rewritten as well.
    pub site_origin: Option<String>,
    /// Rewrite in development environments
    pub enable_in_dev: bool,
    /// Rewrite CMS preview responses
    pub enable_in_preview: bool,
    /// Emit `X-CDN-Domain`, `X-CDN-Dir` and the per-category headers
    pub add_debug_headers: bool,
    /// Inject a `dns-prefetch` link for the CDN into `<head>`
    pub add_prefetch: bool,
    /// Categories in evaluation order
    #[serde(rename = "rewrites", deserialize_with = "deserialize_rewrites")]
    pub categories: Vec<RewriteCategory>,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        RewriteConfig {
            enabled: false,
            cdn_domain: String::new(),
            subdirectory: String::new(),
            site_origin: None,
            enable_in_dev: false,
            enable_in_preview: false,
            add_debug_headers: false,
            add_prefetch: false,
            categories: RewriteCategory::builtins(),
        }
    }
}

impl RewriteConfig {
    /// The subdirectory without a leading slash and with exactly one trailing slash, or an empty
    /// string when the site lives at the root.
    pub fn normalized_subdirectory(&self) -> String {
        normalize_subdirectory(&self.subdirectory)
    }

    /// The CDN domain without trailing slashes.
    pub fn cdn_origin(&self) -> &str {
        self.cdn_domain.trim_end_matches('/')
    }

    pub fn site_origin(&self) -> Option<&str> {
        self.site_origin
            .as_deref()
            .map(|origin| origin.trim_end_matches('/'))
            .filter(|origin| !origin.is_empty())
    }

    pub fn enabled_categories(&self) -> impl Iterator<Item = &RewriteCategory> {
        self.categories.iter().filter(|category| category.enabled)
    }
}

pub fn normalize_subdirectory(subdirectory: &str) -> String {
    let trimmed = subdirectory.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}
