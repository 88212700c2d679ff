//! Upsert engine
//!
//! The editing operations. Each one normalizes its input into an owned tree,
//! locates the blocks it cares about, mutates that copy and hands it back.
//! Running an operation twice with the same arguments gives the same tree
//! as running it once, except for [`merge_into`] which appends by contract.
//!
//! A selector that matches nothing is a normal first-run state: the tree is
//! returned unchanged.

use crate::dedup::{dedup, CERTIFICATE_KEYS, SERVER_KEYS};
use crate::error::Result;
use crate::locate::{find_enclosing, is_secure, listen_matches, location_matches, Selector};
use crate::normalize::{normalize, Input};
use crate::template::Fragment;
use ngxedit_syntax::{Block, Node, NodePath, StructuralError, Tree};
use serde::{Deserialize, Serialize};

/// Which block a merge or attribute splice lands in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// The active server block for this `server_name`
    ///
    /// When several blocks carry the name, the last one listening on 443
    /// wins; failing that the last one that is not a redirect stub, and
    /// failing that the last one.
    ServerName(String),

    /// The last top-level block
    LastBlock,
}

impl Target {
    pub fn server_name(name: impl Into<String>) -> Self {
        Target::ServerName(name.into())
    }

    /// Path of the block this target designates in `tree`
    pub fn resolve(&self, tree: &Tree) -> Option<NodePath> {
        match self {
            Target::LastBlock => tree.last_block_path(),
            Target::ServerName(name) => {
                let blocks = find_enclosing(tree, &Selector::server_name(name.as_str()));
                last_block_where(tree, &blocks, |b| is_secure(b) && !is_redirect_stub(b))
                    .or_else(|| last_block_where(tree, &blocks, |b| !is_redirect_stub(b)))
                    .or_else(|| blocks.last().cloned())
            }
        }
    }
}

fn last_block_where(
    tree: &Tree,
    blocks: &[NodePath],
    accept: impl Fn(&Block) -> bool,
) -> Option<NodePath> {
    blocks
        .iter()
        .rev()
        .find(|path| tree.block(path).is_some_and(&accept))
        .cloned()
}

/// Where [`apply_attributes`] puts the attribute directives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// After everything in the body
    Append,

    /// Right before the first nested block, so locations stay last
    #[default]
    BeforeNested,
}

/// A block whose body answers every request with `return`
pub fn is_redirect_stub(block: &Block) -> bool {
    block.directive("return").is_some()
}

// ============================================================
// Merge
// ============================================================

/// Append every child's nodes to the target block, then collapse duplicate
/// `listen`/`server_name` directives in that body
///
/// Nested blocks are appended as-is: merging the same location twice yields
/// two location blocks. Use [`upsert_by_location`] to replace instead.
pub fn merge_into<C, I>(parent: impl Into<Input>, target: &Target, children: I) -> Result<Tree>
where
    I: IntoIterator<Item = C>,
    C: Into<Input>,
{
    merge_into_with_keys(parent, target, children, SERVER_KEYS)
}

/// [`merge_into`] with a caller-chosen de-duplication key set
pub fn merge_into_with_keys<C, I, S>(
    parent: impl Into<Input>,
    target: &Target,
    children: I,
    keys: &[S],
) -> Result<Tree>
where
    I: IntoIterator<Item = C>,
    C: Into<Input>,
    S: AsRef<str>,
{
    let mut tree = checked(parent)?;
    let children = children
        .into_iter()
        .map(|child| checked(child))
        .collect::<Result<Vec<_>>>()?;

    let Some(path) = target.resolve(&tree) else {
        tracing::debug!("No block for {:?}, merge skipped", target);
        return Ok(tree);
    };

    let block = block_at(&mut tree, &path)?;
    let mut body = std::mem::take(&mut block.body);
    let added: usize = children.iter().map(Tree::len).sum();
    body.extend(children.into_iter().flat_map(|child| child.nodes));
    block.body = dedup(body, keys);

    tracing::info!("📎 Merged {} nodes into block at {}", added, path);
    Ok(tree)
}

// ============================================================
// Locations
// ============================================================

/// Drop every `location` block for `location`, at any depth
pub fn remove_by_location(parent: impl Into<Input>, location: &str) -> Result<Tree> {
    let mut tree = checked(parent)?;
    let removed = remove_location_nodes(&mut tree.nodes, location);
    if removed > 0 {
        tracing::info!("🗑️ Removed {} location {} blocks", removed, location);
    }
    Ok(tree)
}

fn remove_location_nodes(nodes: &mut Vec<Node>, location: &str) -> usize {
    let before = nodes.len();
    nodes.retain(|node| !matches!(node, Node::Block(block) if location_matches(block, location)));
    let mut removed = before - nodes.len();

    for node in nodes.iter_mut() {
        if let Node::Block(block) = node {
            removed += remove_location_nodes(&mut block.body, location);
        }
    }
    removed
}

/// Replace the `location` blocks for `location` with `child`, merged into
/// the active server block for `server_name`
///
/// Stale blocks for the path are purged everywhere first, so re-running with
/// the same child leaves exactly one copy. `child` should itself be a
/// `location` block for `location`.
pub fn upsert_by_location(
    parent: impl Into<Input>,
    server_name: &str,
    location: &str,
    child: impl Into<Input>,
) -> Result<Tree> {
    let mut tree = checked(parent)?;
    let child = checked(child)?;
    let target = Target::server_name(server_name);

    if target.resolve(&tree).is_none() {
        tracing::debug!("No server block for {}, location {} not upserted", server_name, location);
        return Ok(tree);
    }

    remove_location_nodes(&mut tree.nodes, location);
    merge_into(tree, &target, [child])
}

// ============================================================
// TLS
// ============================================================

/// Point every 443 server block for `server_name` at a certificate pair
///
/// Blocks listening on `443` or `443 ssl` are switched to `443 ssl`.
/// Existing `ssl_certificate`/`ssl_certificate_key` directives are
/// overwritten in place; missing ones are inserted right after the last
/// `listen`/`server_name` directive. Blocks for other names are untouched.
pub fn upsert_ssl_cert_to_443(
    conf: impl Into<Input>,
    server_name: &str,
    ssl_certificate: &str,
    ssl_certificate_key: &str,
) -> Result<Tree> {
    let mut tree = checked(conf)?;
    let blocks = find_enclosing(&tree, &Selector::server_name(server_name));

    let mut touched = 0;
    for path in &blocks {
        let block = block_at(&mut tree, path)?;
        if !block.directives("listen").any(is_plain_443) {
            continue;
        }

        let before = block.body.clone();
        upsert_certificate(block, ssl_certificate, ssl_certificate_key);
        if block.body != before {
            touched += 1;
            tracing::info!("🔐 Certificate for {} set in block at {}", server_name, path);
        }
    }

    if touched == 0 {
        tracing::debug!("Certificate for {} already current", server_name);
    }
    Ok(tree)
}

fn is_plain_443(value: &str) -> bool {
    value == "443" || value == "443 ssl"
}

fn upsert_certificate(block: &mut Block, ssl_certificate: &str, ssl_certificate_key: &str) {
    let mut anchor = None;
    let mut has_certificate = false;
    let mut has_key = false;

    for (k, node) in block.body.iter_mut().enumerate() {
        let Node::Directive { name, value } = node else {
            continue;
        };
        match name.as_str() {
            "listen" => {
                if is_plain_443(value) {
                    *value = "443 ssl".to_string();
                }
                anchor = Some(k);
            }
            "server_name" => anchor = Some(k),
            "ssl_certificate" => {
                *value = ssl_certificate.to_string();
                has_certificate = true;
            }
            "ssl_certificate_key" => {
                *value = ssl_certificate_key.to_string();
                has_key = true;
            }
            _ => {}
        }
    }

    let at = anchor.map_or(0, |k| k + 1);
    if !has_certificate {
        block
            .body
            .insert(at, Node::directive("ssl_certificate", ssl_certificate));
    }
    if !has_key {
        let after_certificate = block
            .body
            .iter()
            .rposition(|n| n.name() == Some("ssl_certificate"))
            .map_or(at, |k| k + 1);
        block
            .body
            .insert(after_certificate, Node::directive("ssl_certificate_key", ssl_certificate_key));
    }

    block.body = dedup(std::mem::take(&mut block.body), CERTIFICATE_KEYS);
}

// ============================================================
// Redirects
// ============================================================

/// Make port 80 for `server_name` a 301 redirect to https
///
/// - A redirect stub (a block for the name with a `return`) that listens on
///   443 is moved to `80`.
/// - When no site block for the name listens on 443 yet, the ones listening
///   on port 80 are moved to 443.
/// - When no stub exists yet, a rendered redirect block is inserted right
///   before the first block for the name. A secure site next to a plain
///   site still serving port 80 is left alone: both are live configuration
///   and a stub would shadow the plain one.
///
/// Once the stub exists, re-running changes nothing.
pub fn upsert_redirect_to_443(conf: impl Into<Input>, server_name: &str) -> Result<Tree> {
    let mut tree = checked(conf)?;
    let blocks = find_enclosing(&tree, &Selector::server_name(server_name));

    let Some(first) = blocks.first().cloned() else {
        tracing::debug!("No server block for {}, redirect not upserted", server_name);
        return Ok(tree);
    };

    let sites: Vec<&Block> = blocks
        .iter()
        .filter_map(|path| tree.block(path))
        .filter(|block| !is_redirect_stub(block))
        .collect();
    let found = sites.len() < blocks.len();
    let secured = sites.iter().any(|block| is_secure(block));
    let plain_on_80 = sites
        .iter()
        .any(|block| block.directives("listen").any(|v| move_port_80_to_443(v).is_some()));

    for path in &blocks {
        let block = block_at(&mut tree, path)?;
        if is_redirect_stub(block) {
            for value in listen_values_mut(block) {
                if listen_matches(value, "443") {
                    tracing::warn!("🔄 Redirect stub for {} listened on {}, moved to 80", server_name, value);
                    *value = "80".to_string();
                }
            }
        } else if !secured {
            for value in listen_values_mut(block) {
                if let Some(moved) = move_port_80_to_443(value) {
                    tracing::info!("🔄 {} now listens on {} instead of {}", server_name, moved, value);
                    *value = moved;
                }
            }
        }
    }

    if found {
        tracing::debug!("Redirect for {} already present", server_name);
        return Ok(tree);
    }
    if secured && plain_on_80 {
        tracing::warn!("Port 80 for {} is served by a plain site, redirect not upserted", server_name);
        return Ok(tree);
    }

    let redirect = Fragment::Redirect {
        server_name: server_name.to_string(),
        port: "80".to_string(),
        redirect_to: None,
    }
    .to_tree()?;

    let index = first.last().unwrap_or(0);
    let siblings = tree.siblings_mut(&first).ok_or_else(|| StructuralError::Malformed {
        path: first.clone(),
        message: "no parent body".to_string(),
    })?;
    for (offset, node) in redirect.nodes.into_iter().enumerate() {
        siblings.insert(index + offset, node);
    }

    tracing::info!("🔄 Inserted port 80 redirect for {} at {}", server_name, first);
    Ok(tree)
}

fn listen_values_mut(block: &mut Block) -> impl Iterator<Item = &mut String> {
    block.body.iter_mut().filter_map(|node| match node {
        Node::Directive { name, value } if name == "listen" => Some(value),
        _ => None,
    })
}

/// `80` -> `443`, `[::]:80 default_server` -> `[::]:443 default_server`
fn move_port_80_to_443(value: &str) -> Option<String> {
    let (address, rest) = match value.split_once(' ') {
        Some((address, rest)) => (address, Some(rest)),
        None => (value, None),
    };
    let moved = if address == "80" {
        "443".to_string()
    } else {
        format!("{}:443", address.strip_suffix(":80")?)
    };
    Some(match rest {
        Some(rest) => format!("{} {}", moved, rest),
        None => moved,
    })
}

// ============================================================
// Attributes
// ============================================================

/// Splice attribute directives into the last top-level block
///
/// With [`Placement::BeforeNested`] the directives land right before the
/// first nested block (after everything when there is none); with
/// [`Placement::Append`] they land at the end. Duplicate `listen` and
/// `server_name` directives are then collapsed, the spliced ones winning.
pub fn apply_attributes(
    block: impl Into<Input>,
    attributes: impl Into<Input>,
    placement: Placement,
) -> Result<Tree> {
    apply_attributes_to(block, &Target::LastBlock, attributes, placement)
}

/// [`apply_attributes`] against any [`Target`]
pub fn apply_attributes_to(
    block: impl Into<Input>,
    target: &Target,
    attributes: impl Into<Input>,
    placement: Placement,
) -> Result<Tree> {
    let mut tree = checked(block)?;
    let attributes = checked(attributes)?;

    let Some(path) = target.resolve(&tree) else {
        tracing::debug!("No block for {:?}, attributes skipped", target);
        return Ok(tree);
    };

    let block = block_at(&mut tree, &path)?;
    let mut body = std::mem::take(&mut block.body);
    let at = match placement {
        Placement::Append => body.len(),
        Placement::BeforeNested => body.iter().position(Node::is_block).unwrap_or(body.len()),
    };
    let count = attributes.len();
    body.splice(at..at, attributes.nodes);
    block.body = dedup(body, SERVER_KEYS);

    tracing::info!("📎 Applied {} attributes to block at {}", count, path);
    Ok(tree)
}

// ============================================================
// Helpers
// ============================================================

fn checked(input: impl Into<Input>) -> Result<Tree> {
    let tree = normalize(input)?;
    tree.validate()?;
    Ok(tree)
}

fn block_at<'a>(tree: &'a mut Tree, path: &NodePath) -> Result<&'a mut Block> {
    tree.block_mut(path).ok_or_else(|| {
        StructuralError::Malformed {
            path: path.clone(),
            message: "expected a block".to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use ngxedit_syntax::parse;

    fn server(tree: &Tree, tier: usize) -> &Block {
        tree.block(&NodePath::from(vec![tier])).unwrap()
    }

    #[test]
    fn test_target_prefers_secure_block() {
        let tree = parse(
            "server { server_name a.io; listen 443 ssl; }
             server { server_name a.io; listen 80; }",
        )
        .unwrap();
        assert_eq!(
            Target::server_name("a.io").resolve(&tree),
            Some(NodePath::from(vec![0]))
        );
    }

    #[test]
    fn test_target_skips_redirect_stub() {
        let tree = parse(
            "server { server_name a.io; listen 80; }
             server { server_name a.io; listen 8080; return 301 https://$host; }",
        )
        .unwrap();
        assert_eq!(
            Target::server_name("a.io").resolve(&tree),
            Some(NodePath::from(vec![0]))
        );
        assert_eq!(Target::server_name("b.io").resolve(&tree), None);
        assert_eq!(Target::LastBlock.resolve(&tree), Some(NodePath::from(vec![1])));
    }

    #[test]
    fn test_merge_dedups_scalar_directives() {
        let merged = merge_into(
            "server { server_name a.io; listen 80; }",
            &Target::server_name("a.io"),
            ["listen 443;"],
        )
        .unwrap();
        assert_eq!(
            server(&merged, 0).body,
            vec![
                Node::directive("server_name", "a.io"),
                Node::directive("listen", "443"),
            ]
        );
    }

    #[test]
    fn test_merge_miss_is_unchanged() {
        let source = parse("server { server_name a.io; listen 80; }").unwrap();
        let merged = merge_into(&source, &Target::server_name("b.io"), ["location / { }"]).unwrap();
        assert_eq!(merged, source);
    }

    #[test]
    fn test_merge_rejects_bad_child() {
        let err = merge_into(
            "server { server_name a.io; }",
            &Target::LastBlock,
            ["location / {"],
        )
        .unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_structural_error_leaves_caller_tree() {
        let mut tree = parse("server { server_name a.io; listen 80; }").unwrap();
        if let Node::Block(block) = &mut tree.nodes[0] {
            block.body.push(Node::directive("", "x"));
        }
        let snapshot = tree.clone();
        let err = upsert_redirect_to_443(&tree, "a.io").unwrap_err();
        assert!(matches!(err, Error::Structural(_)));
        assert_eq!(tree, snapshot);
    }

    #[test]
    fn test_remove_by_location_any_depth() {
        let tree = remove_by_location(
            "server { location /a { location /a { } } location /b { } }
             server { location a { } }",
            "/a",
        )
        .unwrap();
        assert_eq!(server(&tree, 0).blocks().count(), 1);
        assert_eq!(server(&tree, 1).blocks().count(), 0);
    }

    #[test]
    fn test_upsert_by_location_miss_keeps_locations() {
        let source = "server { server_name a.io; location /api { } }";
        let tree = upsert_by_location(source, "b.io", "/api", "location /api { }").unwrap();
        assert_eq!(tree, parse(source).unwrap());
    }

    #[test]
    fn test_ssl_cert_overwrites_in_place() {
        let tree = upsert_ssl_cert_to_443(
            "server {
                server_name a.io;
                listen 443;
                ssl_certificate /old/full.pem;
                root /srv;
                ssl_certificate_key /old/key.pem;
             }",
            "a.io",
            "/new/full.pem",
            "/new/key.pem",
        )
        .unwrap();
        assert_eq!(
            server(&tree, 0).body,
            vec![
                Node::directive("server_name", "a.io"),
                Node::directive("listen", "443 ssl"),
                Node::directive("ssl_certificate", "/new/full.pem"),
                Node::directive("root", "/srv"),
                Node::directive("ssl_certificate_key", "/new/key.pem"),
            ]
        );
    }

    #[test]
    fn test_ssl_cert_inserted_after_listen() {
        let tree = upsert_ssl_cert_to_443(
            "server { listen 443 ssl; server_name a.io; root /srv; location / { } }",
            "a.io",
            "/full.pem",
            "/key.pem",
        )
        .unwrap();
        let body = &server(&tree, 0).body;
        assert_eq!(body[2], Node::directive("ssl_certificate", "/full.pem"));
        assert_eq!(body[3], Node::directive("ssl_certificate_key", "/key.pem"));
        assert_eq!(body[4], Node::directive("root", "/srv"));
    }

    #[test]
    fn test_ssl_cert_ignores_other_names_and_ports() {
        let source = "server { server_name b.io; listen 443; }
                      server { server_name a.io; listen 80; }";
        let tree = upsert_ssl_cert_to_443(source, "a.io", "/full.pem", "/key.pem").unwrap();
        assert_eq!(tree, parse(source).unwrap());
    }

    #[test]
    fn test_redirect_stub_on_443_moved_to_80() {
        let tree = upsert_redirect_to_443(
            "server { server_name a.io; listen 443; return 301 https://$server_name$request_uri; }
             server { server_name a.io; listen 443 ssl; }",
            "a.io",
        )
        .unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(server(&tree, 0).directive("listen"), Some("80"));
        assert_eq!(server(&tree, 1).directive("listen"), Some("443 ssl"));
    }

    #[test]
    fn test_redirect_moves_plain_site() {
        let tree = upsert_redirect_to_443(
            "server { server_name a.io; listen 80; listen [::]:80 default_server; }",
            "a.io",
        )
        .unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(server(&tree, 0).directive("listen"), Some("80"));
        let site: Vec<_> = server(&tree, 1).directives("listen").collect();
        assert_eq!(site, vec!["443", "[::]:443 default_server"]);
    }

    #[test]
    fn test_redirect_inside_http_block() {
        let tree = upsert_redirect_to_443(
            "http { gzip on; server { server_name a.io; listen 443; } }",
            "a.io",
        )
        .unwrap();
        let http = server(&tree, 0);
        assert_eq!(http.body.len(), 3);
        assert!(is_redirect_stub(http.body[1].as_block().unwrap()));
    }

    #[test]
    fn test_redirect_leaves_plain_site_beside_secure_site() {
        let source = parse(
            "server { server_name a.io; listen 80; root /plain; }
             server { server_name a.io; listen 443; root /secure; }",
        )
        .unwrap();
        let tree = upsert_redirect_to_443(&source, "a.io").unwrap();
        assert_eq!(tree, source);
    }

    #[test]
    fn test_redirect_does_not_move_plain_site_when_secured() {
        let tree = upsert_redirect_to_443(
            "server { server_name a.io; listen 8080; }
             server { server_name a.io; listen 443 ssl; }",
            "a.io",
        )
        .unwrap();
        assert_eq!(tree.len(), 3);
        assert!(is_redirect_stub(server(&tree, 0)));
        assert_eq!(server(&tree, 1).directive("listen"), Some("8080"));
        assert_eq!(server(&tree, 2).directive("listen"), Some("443 ssl"));
    }

    #[test]
    fn test_upsert_by_location_keeps_modifier_locations() {
        let tree = upsert_by_location(
            "server {
                server_name a.io;
                listen 443;
                location = /api { return 204; }
                location ~ /api { return 418; }
                location /api { proxy_pass http://old; }
             }",
            "a.io",
            "/api",
            "location /api { proxy_pass http://new; }",
        )
        .unwrap();
        let headers: Vec<String> = server(&tree, 0).blocks().map(|b| b.header.join(" ")).collect();
        assert_eq!(headers, vec!["location = /api", "location ~ /api", "location /api"]);
        assert_eq!(
            server(&tree, 0).blocks().last().unwrap().directive("proxy_pass"),
            Some("http://new")
        );
    }

    #[test]
    fn test_move_port() {
        assert_eq!(move_port_80_to_443("80"), Some("443".to_string()));
        assert_eq!(move_port_80_to_443("127.0.0.1:80"), Some("127.0.0.1:443".to_string()));
        assert_eq!(move_port_80_to_443("8080"), None);
        assert_eq!(move_port_80_to_443("443 ssl"), None);
    }

    #[test]
    fn test_apply_attributes_append() {
        let tree = apply_attributes(
            "server { server_name a.io; listen 80; location / { } }",
            "listen 443 ssl; ssl_certificate /full.pem;",
            Placement::Append,
        )
        .unwrap();
        let body = &server(&tree, 0).body;
        assert_eq!(body.len(), 4);
        assert!(body[1].is_block());
        assert_eq!(body[2], Node::directive("listen", "443 ssl"));
    }

    #[test]
    fn test_apply_attributes_without_nested_block() {
        let tree = apply_attributes(
            "server { server_name a.io; }",
            "gzip on;",
            Placement::BeforeNested,
        )
        .unwrap();
        assert_eq!(server(&tree, 0).body[1], Node::directive("gzip", "on"));
    }
}
