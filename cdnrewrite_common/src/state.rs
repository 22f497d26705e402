use std::{net::SocketAddr, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    error::ConfigError,
    gate::{Environment, GateConfig, Gatekeeper},
    proxy::util::{parse_origin, Origin},
    rewriting::{
        cdn::cdn_rewriter::CdnRewriter,
        config::RewriteConfig,
        rule::{RuleError, RuleHook},
    },
};

/// Environment variable that overrides [`Config::environment`].
pub const ENVIRONMENT_VAR: &str = "CDNREWRITE_ENVIRONMENT";

const fn default_max_body_size() -> usize {
    10 * 1024 * 1024
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The listen address for the server
    pub host: SocketAddr,
    /// The origin requests are forwarded to, e.g. `http://127.0.0.1:8080`
    pub upstream: String,
    /// Environment the site runs in
    pub environment: Environment,
    /// Admin roots and preview detection
    pub gate: GateConfig,
    /// Largest body that is buffered, for both forwarding and rewriting
    pub max_body_size: usize,
    /// Content types whose bodies are rewritten, matched as substrings of `Content-Type`
    pub rewrite_content_types: Vec<String>,
    /// The rewrite rules themselves
    pub rewrite: RewriteConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: SocketAddr::from(([0, 0, 0, 0], 3069)),
            upstream: "http://127.0.0.1:8080".to_string(),
            environment: Environment::default(),
            gate: GateConfig::default(),
            max_body_size: default_max_body_size(),
            rewrite_content_types: vec!["text/html".to_string()],
            rewrite: RewriteConfig::default(),
        }
    }
}

impl Config {
    /// Apply overrides taken from the process environment.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(environment) = std::env::var(ENVIRONMENT_VAR) {
            self.environment = environment.parse()?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_origin(&self.upstream)?;

        if let Some(origin) = &self.rewrite.site_origin {
            parse_origin(origin)?;
        }

        // With an empty domain, rewritten URLs stay root-relative.
        if self.rewrite.enabled && self.rewrite.cdn_domain.trim().is_empty() {
            warn!("cdn_rewrite is on but cdn_domain is empty");
        }

        Ok(())
    }
}

#[derive(Clone)]
/// The state that is passed to the proxy handler
pub struct ProxyState {
    pub config: Arc<Config>,
    pub client: reqwest::Client,
    pub upstream: Origin,
}

#[derive(Clone)]
/// The state that is passed to the rewrite middleware
pub struct RewriteState {
    pub config: Arc<Config>,
    pub gatekeeper: Arc<Gatekeeper>,
    pub rewriter: Arc<CdnRewriter>,
}

impl RewriteState {
    pub fn new(config: Arc<Config>) -> Result<Self, RuleError> {
        let rewriter = CdnRewriter::new(Arc::new(config.rewrite.clone()))?;
        Ok(Self::with_rewriter(config, rewriter))
    }

    pub fn with_hook(config: Arc<Config>, hook: RuleHook) -> Result<Self, RuleError> {
        let rewriter = CdnRewriter::with_hook(Arc::new(config.rewrite.clone()), hook)?;
        Ok(Self::with_rewriter(config, rewriter))
    }

    fn with_rewriter(config: Arc<Config>, rewriter: CdnRewriter) -> Self {
        Self {
            gatekeeper: Arc::new(Gatekeeper::new(config.environment, &config.gate)),
            rewriter: Arc::new(rewriter),
            config,
        }
    }

    /// The rewrite settings the engine was built from.
    pub fn rewrite_config(&self) -> &RewriteConfig {
        self.rewriter.config()
    }
}
