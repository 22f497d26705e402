//! Decides, before any body is touched, whether a response may be rewritten.

mod admin;

pub use admin::AdminPaths;

use std::{collections::HashMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, rewriting::config::RewriteConfig};

/// The environment the site runs in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Test,
    #[default]
    Live,
}

impl Environment {
    pub fn is_dev(self) -> bool {
        self == Environment::Dev
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Dev),
            "test" => Ok(Environment::Test),
            "live" | "production" => Ok(Environment::Live),
            _ => Err(ConfigError::UnknownEnvironment(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Roots of the administrative UI
    pub admin_paths: Vec<String>,
    /// Query parameter that marks a CMS preview request when set to `1`
    pub preview_param: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        GateConfig {
            admin_paths: vec!["/admin/".to_string()],
            preview_param: "CMSPreview".to_string(),
        }
    }
}

/// Why a response was or was not rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Rewrite,
    Disabled,
    DevelopmentMode,
    Preview,
    AdminPath,
}

impl GateDecision {
    pub fn is_allowed(self) -> bool {
        self == GateDecision::Rewrite
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GateDecision::Rewrite => "rewrite",
            GateDecision::Disabled => "disabled",
            GateDecision::DevelopmentMode => "development mode",
            GateDecision::Preview => "preview",
            GateDecision::AdminPath => "admin path",
        }
    }
}

impl fmt::Display for GateDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Work out whether rewriting may run for a request. Checks run in order: master switch,
/// environment, preview, admin area.
pub fn decide<F>(
    path: &str,
    query: &HashMap<String, String>,
    config: &RewriteConfig,
    environment: Environment,
    preview_param: &str,
    is_admin_path: F,
) -> GateDecision
where
    F: Fn(&str) -> bool,
{
    if !config.enabled {
        return GateDecision::Disabled;
    }

    if environment.is_dev() && !config.enable_in_dev {
        return GateDecision::DevelopmentMode;
    }

    let is_preview = query
        .get(preview_param)
        .is_some_and(|value| value.trim() == "1");
    if is_preview && !config.enable_in_preview {
        return GateDecision::Preview;
    }

    if is_admin_path(path) {
        return GateDecision::AdminPath;
    }

    GateDecision::Rewrite
}

pub fn should_rewrite<F>(
    path: &str,
    query: &HashMap<String, String>,
    config: &RewriteConfig,
    environment: Environment,
    preview_param: &str,
    is_admin_path: F,
) -> bool
where
    F: Fn(&str) -> bool,
{
    decide(path, query, config, environment, preview_param, is_admin_path).is_allowed()
}

/// [`decide`] bound to the host's environment and admin roots.
#[derive(Debug, Clone)]
pub struct Gatekeeper {
    environment: Environment,
    preview_param: String,
    admin: AdminPaths,
}

impl Gatekeeper {
    pub fn new(environment: Environment, gate: &GateConfig) -> Self {
        Self {
            environment,
            preview_param: gate.preview_param.clone(),
            admin: AdminPaths::new(&gate.admin_paths),
        }
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn decide(
        &self,
        path: &str,
        query: &HashMap<String, String>,
        config: &RewriteConfig,
    ) -> GateDecision {
        decide(
            path,
            query,
            config,
            self.environment,
            &self.preview_param,
            |path| self.admin.is_admin_path(path),
        )
    }

    pub fn should_rewrite(
        &self,
        path: &str,
        query: &HashMap<String, String>,
        config: &RewriteConfig,
    ) -> bool {
        self.decide(path, query, config).is_allowed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled() -> RewriteConfig {
        RewriteConfig {
            enabled: true,
            cdn_domain: "https://cdn.x".to_string(),
            ..Default::default()
        }
    }

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn gatekeeper(environment: Environment) -> Gatekeeper {
        Gatekeeper::new(environment, &GateConfig::default())
    }

    #[test]
    fn allows_plain_requests() {
        let gate = gatekeeper(Environment::Live);
        assert_eq!(
            gate.decide("/about-us", &query(&[]), &enabled()),
            GateDecision::Rewrite
        );
    }

    #[test]
    fn master_switch() {
        let gate = gatekeeper(Environment::Live);
        assert_eq!(
            gate.decide("/", &query(&[]), &RewriteConfig::default()),
            GateDecision::Disabled
        );
    }

    #[test]
    fn development_needs_opt_in() {
        let gate = gatekeeper(Environment::Dev);
        assert_eq!(
            gate.decide("/", &query(&[]), &enabled()),
            GateDecision::DevelopmentMode
        );

        let config = RewriteConfig {
            enable_in_dev: true,
            ..enabled()
        };
        assert!(gate.should_rewrite("/", &query(&[]), &config));

        assert!(gatekeeper(Environment::Test).should_rewrite("/", &query(&[]), &enabled()));
    }

    #[test]
    fn preview_needs_opt_in() {
        let gate = gatekeeper(Environment::Live);
        let preview = query(&[("CMSPreview", "1")]);

        assert_eq!(
            gate.decide("/", &preview, &enabled()),
            GateDecision::Preview
        );
        assert!(gate.should_rewrite("/", &query(&[("CMSPreview", "0")]), &enabled()));

        let config = RewriteConfig {
            enable_in_preview: true,
            ..enabled()
        };
        assert!(gate.should_rewrite("/", &preview, &config));
    }

    #[test]
    fn admin_is_always_excluded() {
        let gate = gatekeeper(Environment::Dev);
        let config = RewriteConfig {
            enable_in_dev: true,
            enable_in_preview: true,
            ..enabled()
        };

        for path in ["/admin", "/admin/", "/admin/pages/edit/show/1"] {
            assert_eq!(
                gate.decide(path, &query(&[("CMSPreview", "1")]), &config),
                GateDecision::AdminPath
            );
        }
    }

    #[test]
    fn custom_preview_param_and_admin_roots() {
        let gate = Gatekeeper::new(
            Environment::Live,
            &GateConfig {
                admin_paths: vec!["/cms".to_string()],
                preview_param: "stage".to_string(),
            },
        );

        assert!(gate.should_rewrite("/admin", &query(&[]), &enabled()));
        assert!(!gate.should_rewrite("/cms/pages", &query(&[]), &enabled()));
        assert!(!gate.should_rewrite("/", &query(&[("stage", "1")]), &enabled()));
    }

    #[test]
    fn free_function_takes_any_predicate() {
        assert!(!should_rewrite(
            "/secret/area",
            &query(&[]),
            &enabled(),
            Environment::Live,
            "CMSPreview",
            |path| path.starts_with("/secret"),
        ));
    }

    #[test]
    fn environment_parsing() {
        assert_eq!("dev".parse::<Environment>().unwrap(), Environment::Dev);
        assert_eq!(" LIVE ".parse::<Environment>().unwrap(), Environment::Live);
        assert_eq!(
            "staging".parse::<Environment>().unwrap_err(),
            ConfigError::UnknownEnvironment("staging".to_string())
        );
    }
}
