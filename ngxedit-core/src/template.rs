//! Fragment templates
//!
//! Renders the fixed nginx fragments ngxedit knows how to emit: proxy,
//! WebSocket, SPA and autoindex locations, server blocks, port-301 redirect
//! blocks and the TLS attribute fragment.
//!
//! Placeholders are written `{{field}}` so nginx `$variables` in the
//! templates pass through untouched.

use crate::error::{Error, Result};
use ngxedit_syntax::{parse, Tree};
use serde::{Deserialize, Serialize};

/// Name used in provenance comments
pub const GENERATOR: &str = "ngxedit";

/// Redirect target used when none is given
pub const DEFAULT_REDIRECT_TO: &str = "https://$server_name$request_uri";

/// Listen port of the TLS attribute fragment when none is given
pub const DEFAULT_SECURE_PORT: &str = "443";

const API_PROXY: &str = "location /{{location}} {
    proxy_set_header Host $http_host;
    proxy_set_header X-Real-IP $remote_addr;
    proxy_set_header X-Scheme $scheme;
    proxy_set_header X-Forwarded-Proto $scheme;
    proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
    proxy_pass       {{proxy_pass}};
    proxy_redirect   off;
}
";

const WEBSOCKET_PROXY: &str = "location /{{location}} {
    proxy_pass         {{proxy_pass}};
    proxy_http_version 1.1;
    proxy_set_header   Upgrade $http_upgrade;
    proxy_set_header   Connection \"upgrade\";
}
";

const HTML5: &str = "location /{{location}} {
    try_files  $uri$args $uri$args/ /index.html;
    root       {{root}};
    index      index.html index.htm;
    add_header 'Cache-Control' 'no-store, no-cache, must-revalidate, proxy-revalidate, max-age=0';
    expires    off;
}
";

const AUTOINDEX: &str = "location /{{location}} {
    if ($request_method = 'OPTIONS') {
        add_header 'Access-Control-Allow-Origin' 'http://localhost:4400';
        add_header 'Access-Control-Allow-Methods' 'GET, POST, OPTIONS';
        add_header 'Access-Control-Allow-Headers' 'DNT,X-CustomHeader,Keep-Alive,User-Agent,X-Requested-With,If-Modified-Since,Cache-Control,Content-Type,Content-Range,Range';
        # Pre-flight info is valid for 20 days
        add_header 'Access-Control-Max-Age' 1728000;
        add_header 'Content-Type' 'text/plain; charset=utf-8';
        add_header 'Content-Length' 0;
        return     204;
    }
    root                 {{root}};
    autoindex            on;
    autoindex_exact_size off;
    autoindex_format     json;
    autoindex_localtime  on;
}
";

const SERVER: &str = "server {
    # {{comment}}
    server_name {{server_name}};
    listen {{listen}};
{{rest}}}
";

const REDIRECT: &str = "server {
    server_name {{server_name}};
    listen      {{port}};
    return      301 {{redirect_to}};
}
";

const SECURE_ATTR: &str = "listen {{port}} ssl;
ssl_certificate     {{ssl_certificate}};
ssl_certificate_key {{ssl_certificate_key}};
fastcgi_param       HTTPS               on;
fastcgi_param       HTTP_SCHEME         https;
";

/// A renderable configuration fragment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "template", rename_all = "snake_case")]
pub enum Fragment {
    /// Reverse-proxy location with forwarding headers
    ApiProxy { location: String, proxy_pass: String },

    /// HTTP/1.1 proxy location with WebSocket upgrade headers
    WebsocketProxy { location: String, proxy_pass: String },

    /// Static single-page app location falling back to `/index.html`
    Html5 { location: String, root: String },

    /// JSON directory listing with a CORS preflight responder
    Autoindex { location: String, root: String },

    /// `server` block; `rest` lines are appended to the body
    Server {
        server_name: String,
        listen: String,
        #[serde(default)]
        comment: Option<String>,
        #[serde(default)]
        rest: Option<String>,
    },

    /// `server` block answering with a 301
    Redirect {
        server_name: String,
        port: String,
        #[serde(default)]
        redirect_to: Option<String>,
    },

    /// `listen ... ssl` plus certificate and fastcgi HTTPS directives
    SecureAttr {
        ssl_certificate: String,
        ssl_certificate_key: String,
        #[serde(default)]
        port: Option<String>,
    },
}

impl Fragment {
    /// Short name of the template, used in errors and default comments
    pub fn kind(&self) -> &'static str {
        match self {
            Fragment::ApiProxy { .. } => "api_proxy",
            Fragment::WebsocketProxy { .. } => "websocket_proxy",
            Fragment::Html5 { .. } => "html5",
            Fragment::Autoindex { .. } => "autoindex",
            Fragment::Server { .. } => "server",
            Fragment::Redirect { .. } => "redirect",
            Fragment::SecureAttr { .. } => "secure_attr",
        }
    }

    /// Render the fragment to configuration text
    pub fn render(&self) -> Result<String> {
        let kind = self.kind();
        match self {
            Fragment::ApiProxy { location, proxy_pass } => substitute(
                kind,
                API_PROXY,
                &[
                    Field::location(location),
                    Field::required("proxy_pass", proxy_pass),
                ],
            ),
            Fragment::WebsocketProxy { location, proxy_pass } => substitute(
                kind,
                WEBSOCKET_PROXY,
                &[
                    Field::location(location),
                    Field::required("proxy_pass", proxy_pass),
                ],
            ),
            Fragment::Html5 { location, root } => substitute(
                kind,
                HTML5,
                &[Field::location(location), Field::required("root", root)],
            ),
            Fragment::Autoindex { location, root } => substitute(
                kind,
                AUTOINDEX,
                &[Field::location(location), Field::required("root", root)],
            ),
            Fragment::Server {
                server_name,
                listen,
                comment,
                rest,
            } => {
                let comment = match comment {
                    Some(c) if !c.trim().is_empty() => c.lines().collect::<Vec<_>>().join(" "),
                    _ => default_comment(kind),
                };
                let rest = rest.as_deref().map(render_rest).unwrap_or_default();
                substitute(
                    kind,
                    SERVER,
                    &[
                        Field::required("comment", &comment),
                        Field::required("server_name", server_name),
                        Field::required("listen", listen),
                        Field::optional("rest", &rest),
                    ],
                )
            }
            Fragment::Redirect {
                server_name,
                port,
                redirect_to,
            } => substitute(
                kind,
                REDIRECT,
                &[
                    Field::required("server_name", server_name),
                    Field::required("port", port),
                    Field::required(
                        "redirect_to",
                        redirect_to.as_deref().unwrap_or(DEFAULT_REDIRECT_TO),
                    ),
                ],
            ),
            Fragment::SecureAttr {
                ssl_certificate,
                ssl_certificate_key,
                port,
            } => substitute(
                kind,
                SECURE_ATTR,
                &[
                    Field::required("port", port.as_deref().unwrap_or(DEFAULT_SECURE_PORT)),
                    Field::required("ssl_certificate", ssl_certificate),
                    Field::required("ssl_certificate_key", ssl_certificate_key),
                ],
            ),
        }
    }

    /// Render and parse the fragment
    pub fn to_tree(&self) -> Result<Tree> {
        Ok(parse(&self.render()?)?)
    }
}

/// Location path as it is substituted into a template: one leading `/`
/// removed, since the template writes it back
pub fn render_location_path(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}

/// Provenance comment for a block kind
pub fn default_comment(kind: &str) -> String {
    format!("Emitted by {}.{}", GENERATOR, kind)
}

/// Terminate a free-form line with `;` unless it already ends a statement
pub fn ensure_semicolon(line: &str) -> String {
    let line = line.trim_end();
    if line.is_empty() || line.ends_with([';', '{', '}']) {
        line.to_string()
    } else {
        format!("{};", line)
    }
}

fn render_rest(rest: &str) -> String {
    rest.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| format!("    {}\n", ensure_semicolon(line)))
        .collect()
}

struct Field<'a> {
    name: &'static str,
    value: &'a str,
    required: bool,
}

impl<'a> Field<'a> {
    fn required(name: &'static str, value: &'a str) -> Self {
        Self { name, value: value.trim(), required: true }
    }

    fn optional(name: &'static str, value: &'a str) -> Self {
        Self { name, value, required: false }
    }

    /// `location` may be blank: `/` renders as `location / {`
    fn location(path: &'a str) -> Self {
        Self::optional("location", render_location_path(path.trim()))
    }
}

/// Replace every `{{name}}` in `template`; nothing is returned unless every
/// placeholder was filled
fn substitute(kind: &'static str, template: &'static str, fields: &[Field<'_>]) -> Result<String> {
    let mut out = String::with_capacity(template.len() + 64);
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            break;
        };
        let name = &after[..end];

        let field = fields
            .iter()
            .find(|f| f.name == name)
            .filter(|f| !f.required || !f.value.is_empty())
            .ok_or(Error::MissingTemplateField {
                template: kind,
                field: name,
            })?;
        out.push_str(field.value);
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    tracing::trace!("Rendered {} fragment", kind);
    Ok(out)
}
