//! ngxedit Core Library
//!
//! Idempotent editing of nginx server blocks: fragment templates, input
//! normalization, directive de-duplication, block lookup and the upsert
//! operations built on top of them, plus edit plans that chain operations.
//!
//! # Example
//!
//! ```
//! use ngxedit_core::{upsert_ssl_cert_to_443, dumps};
//!
//! let conf = "server { server_name example.com; listen 443; }";
//! let tree = upsert_ssl_cert_to_443(conf, "example.com", "/full.pem", "/key.pem").unwrap();
//! assert!(dumps(&tree).contains("ssl_certificate_key /key.pem;"));
//! ```

pub mod dedup;
pub mod error;
pub mod locate;
pub mod normalize;
pub mod plan;
pub mod template;
pub mod upsert;

pub use dedup::{dedup, CERTIFICATE_KEYS, SERVER_KEYS};
pub use error::{Error, Result};
pub use locate::{find, find_enclosing, Selector};
pub use normalize::{normalize, normalize_reader, Input};
pub use plan::{resolve_site_path, EditPlan, EditStep, PlanLoader, Source, DEFAULT_SITES_DIR};
pub use template::Fragment;
pub use upsert::{
    apply_attributes, apply_attributes_to, merge_into, merge_into_with_keys, remove_by_location,
    upsert_by_location, upsert_redirect_to_443, upsert_ssl_cert_to_443, Placement, Target,
};

pub use ngxedit_syntax::{dumps, parse, Block, Node, NodePath, Tree};

/// ngxedit version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
