//! Edit plans
//!
//! A plan is a list of editing steps loaded from TOML or JSON. Applying it
//! threads the tree through every step in order:
//!
//! ```toml
//! [[steps]]
//! op = "upsert_redirect"
//! server_name = "example.com"
//!
//! [[steps]]
//! op = "upsert_location"
//! server_name = "example.com"
//! fragment = { template = "api_proxy", location = "/api", proxy_pass = "http://127.0.0.1:5000" }
//! ```

use crate::dedup::SERVER_KEYS;
use crate::error::{Error, Result};
use crate::normalize::{normalize, Input};
use crate::template::Fragment;
use crate::upsert::{
    apply_attributes_to, merge_into_with_keys, remove_by_location, upsert_by_location,
    upsert_redirect_to_443, upsert_ssl_cert_to_443, Placement, Target,
};
use ngxedit_syntax::Tree;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where site configurations live on a stock Debian/Ubuntu nginx
pub const DEFAULT_SITES_DIR: &str = "/etc/nginx/sites-enabled";

/// Configuration a step splices in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Source {
    /// Raw nginx text
    Text(String),

    /// Rendered template
    Template(Fragment),

    /// Nested-list tree
    Tree(Tree),
}

impl From<Source> for Input {
    fn from(source: Source) -> Self {
        match source {
            Source::Text(text) => Input::Text(text),
            Source::Template(fragment) => Input::Fragment(fragment),
            Source::Tree(tree) => Input::Tree(tree),
        }
    }
}

/// One editing operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EditStep {
    /// Append fragments to a server block (the last block when no name is given)
    Merge {
        #[serde(default)]
        server_name: Option<String>,
        fragments: Vec<Source>,
        #[serde(default)]
        keys: Option<Vec<String>>,
    },

    /// Replace a location block; the path defaults to the fragment's own
    UpsertLocation {
        server_name: String,
        #[serde(default)]
        location: Option<String>,
        fragment: Source,
    },

    /// Drop every plain `location` block for this path
    RemoveLocation { location: String },

    /// Point the 443 server blocks for a name at a certificate pair
    UpsertSslCert {
        server_name: String,
        ssl_certificate: String,
        ssl_certificate_key: String,
    },

    /// Serve port 80 for a name as a 301 redirect to https
    UpsertRedirect { server_name: String },

    /// Splice directives into a server block ahead of its locations
    ApplyAttributes {
        #[serde(default)]
        server_name: Option<String>,
        fragment: Source,
        #[serde(default)]
        placement: Placement,
    },
}

impl EditStep {
    /// Short name of the step, as written in `op`
    pub fn op(&self) -> &'static str {
        match self {
            EditStep::Merge { .. } => "merge",
            EditStep::UpsertLocation { .. } => "upsert_location",
            EditStep::RemoveLocation { .. } => "remove_location",
            EditStep::UpsertSslCert { .. } => "upsert_ssl_cert",
            EditStep::UpsertRedirect { .. } => "upsert_redirect",
            EditStep::ApplyAttributes { .. } => "apply_attributes",
        }
    }

    /// Run the step against `tree`
    pub fn apply(&self, tree: Tree) -> Result<Tree> {
        match self {
            EditStep::Merge {
                server_name,
                fragments,
                keys,
            } => {
                let target = target_for(server_name.as_deref());
                let keys: Vec<String> = match keys {
                    Some(keys) => keys.clone(),
                    None => SERVER_KEYS.iter().map(|k| k.to_string()).collect(),
                };
                merge_into_with_keys(tree, &target, fragments.iter().cloned(), keys.as_slice())
            }
            EditStep::UpsertLocation {
                server_name,
                location,
                fragment,
            } => {
                let child = normalize(fragment.clone())?;
                let location = match location {
                    Some(location) => location.clone(),
                    None => fragment_location(&child).ok_or_else(|| {
                        Error::Plan("upsert_location fragment has no location block".to_string())
                    })?,
                };
                upsert_by_location(tree, server_name, &location, child)
            }
            EditStep::RemoveLocation { location } => remove_by_location(tree, location),
            EditStep::UpsertSslCert {
                server_name,
                ssl_certificate,
                ssl_certificate_key,
            } => upsert_ssl_cert_to_443(tree, server_name, ssl_certificate, ssl_certificate_key),
            EditStep::UpsertRedirect { server_name } => upsert_redirect_to_443(tree, server_name),
            EditStep::ApplyAttributes {
                server_name,
                fragment,
                placement,
            } => apply_attributes_to(
                tree,
                &target_for(server_name.as_deref()),
                fragment.clone(),
                *placement,
            ),
        }
    }
}

fn target_for(server_name: Option<&str>) -> Target {
    server_name.map_or(Target::LastBlock, |name| Target::server_name(name))
}

/// Path of the first top-level plain `location` block
fn fragment_location(tree: &Tree) -> Option<String> {
    tree.nodes.iter().find_map(|node| match node.as_block()?.header.as_slice() {
        [kind, path] if kind == "location" => Some(path.clone()),
        _ => None,
    })
}

/// An ordered list of editing steps
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditPlan {
    #[serde(default)]
    pub steps: Vec<EditStep>,
}

impl EditPlan {
    /// Apply every step in order, each one receiving the previous one's output
    pub fn apply(&self, conf: impl Into<Input>) -> Result<Tree> {
        let mut tree = normalize(conf)?;
        for (i, step) in self.steps.iter().enumerate() {
            tracing::debug!("▶️ Step {}: {}", i + 1, step.op());
            tree = step.apply(tree)?;
        }
        tracing::info!("✅ Applied {} steps", self.steps.len());
        Ok(tree)
    }
}

/// Edit plan loader for the supported formats
pub struct PlanLoader;

impl PlanLoader {
    /// Load a plan from a file, picking the format from the extension
    pub fn load<P: AsRef<Path>>(path: P) -> Result<EditPlan> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Plan(format!("Failed to read plan file: {}", e)))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match ext {
            "json" => Self::from_json(&content),
            "toml" => Self::from_toml(&content),
            _ => Err(Error::Plan(format!("Unknown plan format: {}", ext))),
        }
    }

    /// Parse a JSON plan
    pub fn from_json(content: &str) -> Result<EditPlan> {
        serde_json::from_str(content).map_err(|e| Error::Plan(format!("Invalid JSON: {}", e)))
    }

    /// Parse a TOML plan
    pub fn from_toml(content: &str) -> Result<EditPlan> {
        toml::from_str(content).map_err(|e| Error::Plan(format!("Invalid TOML: {}", e)))
    }
}

/// File holding the site `name` under `dir`
///
/// `name.conf` is used when `name` itself does not exist and carries no
/// `.conf` suffix.
pub fn resolve_site_path(dir: impl AsRef<Path>, name: &str) -> PathBuf {
    let path = dir.as_ref().join(name);
    if name.ends_with(".conf") || path.exists() {
        path
    } else {
        dir.as_ref().join(format!("{}.conf", name))
    }
}
