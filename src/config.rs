// src/config.rs

//! The bootstrap configuration consumed by the resolver: loading, validation,
//! and listener resource name computation.
//!
//! Bootstrap *discovery* (which file or env var a process reads) is the
//! embedding application's concern; this module only offers the loaders and
//! the pieces of the document the resolver actually uses.

use crate::core::errors::ResolverError;
use crate::core::resolver::Target;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// The env var naming a bootstrap file path.
pub const BOOTSTRAP_FILE_ENV: &str = "XDS_BOOTSTRAP";
/// The env var carrying the bootstrap JSON inline. The file path takes
/// precedence when both are set.
pub const BOOTSTRAP_CONFIG_ENV: &str = "XDS_BOOTSTRAP_CONFIG";

fn default_listener_template() -> String {
    "%s".to_string()
}

/// One entry of the bootstrap `authorities` map.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Authority {
    /// The listener resource name template for targets naming this authority.
    /// When unset, the conventional `xdstp://<authority>/...` template is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_listener_resource_name_template: Option<String>,
}

/// The subset of the xDS bootstrap document the resolver consumes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BootstrapConfig {
    /// The listener resource name template for targets without an authority.
    /// `%s` is substituted with the target endpoint.
    #[serde(default = "default_listener_template")]
    pub client_default_listener_resource_name_template: String,

    /// Authorities addressable via the target URI's authority component.
    #[serde(default)]
    pub authorities: HashMap<String, Authority>,

    /// Certificate provider configurations, keyed by instance name. The
    /// payloads are opaque here; the resolver only requires their presence
    /// when xDS-aware credentials are in use.
    #[serde(default)]
    pub certificate_providers: HashMap<String, serde_json::Value>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            client_default_listener_resource_name_template: default_listener_template(),
            authorities: HashMap::new(),
            certificate_providers: HashMap::new(),
        }
    }
}

impl BootstrapConfig {
    /// Parses a bootstrap document from its JSON text.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse bootstrap JSON")
    }

    /// Loads a bootstrap document from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read bootstrap file '{}'", path.display()))?;
        let config = Self::from_json_str(&contents)
            .with_context(|| format!("Failed to parse bootstrap file '{}'", path.display()))?;
        info!(path = %path.display(), "loaded bootstrap configuration");
        Ok(config)
    }

    /// Loads the bootstrap from the conventional env vars: a file path in
    /// `XDS_BOOTSTRAP`, else inline JSON in `XDS_BOOTSTRAP_CONFIG`.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = std::env::var(BOOTSTRAP_FILE_ENV) {
            if !path.is_empty() {
                return Self::from_file(&path);
            }
        }
        if let Ok(contents) = std::env::var(BOOTSTRAP_CONFIG_ENV) {
            if !contents.is_empty() {
                debug!("loading bootstrap configuration from {BOOTSTRAP_CONFIG_ENV}");
                return Self::from_json_str(&contents);
            }
        }
        anyhow::bail!(
            "Neither {BOOTSTRAP_FILE_ENV} nor {BOOTSTRAP_CONFIG_ENV} is set to a non-empty value"
        )
    }

    /// An empty bootstrap carries no usable configuration at all: no default
    /// template and no authorities. Resolver construction rejects it.
    pub fn is_empty(&self) -> bool {
        self.client_default_listener_resource_name_template.is_empty()
            && self.authorities.is_empty()
    }

    /// Computes the Listener resource name for a target.
    ///
    /// A target authority selects that authority's template (with the
    /// conventional `xdstp://` fallback); no authority selects the default
    /// template. The endpoint is substituted for `%s`, percent-encoded when
    /// the template is `xdstp:`-style.
    pub fn listener_resource_name(&self, target: &Target) -> Result<String, ResolverError> {
        let template = match &target.authority {
            None => {
                let template = self.client_default_listener_resource_name_template.as_str();
                if template.is_empty() {
                    default_listener_template()
                } else {
                    template.to_string()
                }
            }
            Some(authority) => {
                let entry = self
                    .authorities
                    .get(authority)
                    .ok_or_else(|| ResolverError::AuthorityNotFound(authority.clone()))?;
                entry
                    .client_listener_resource_name_template
                    .clone()
                    .unwrap_or_else(|| {
                        format!("xdstp://{authority}/envoy.config.listener.v3.Listener/%s")
                    })
            }
        };
        Ok(expand_template(&template, &target.endpoint))
    }
}

/// Substitutes the endpoint into a listener name template. `xdstp:` resource
/// names are URIs, so the endpoint is percent-encoded for them, keeping `/`
/// separators intact.
fn expand_template(template: &str, endpoint: &str) -> String {
    let endpoint = if template.starts_with("xdstp:") {
        percent_encode_path(endpoint)
    } else {
        endpoint.to_string()
    };
    template.replacen("%s", &endpoint, 1)
}

fn percent_encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
