//! ngxedit - idempotent nginx server-block editor
//!
//! This is the main entry point for the ngxedit CLI.

use anyhow::Context;
use ariadne::{Config, IndexType, Label, Report, ReportKind, Source};
use clap::{Parser, Subcommand};
use ngxedit_core::plan::{resolve_site_path, PlanLoader, DEFAULT_SITES_DIR};
use ngxedit_core::{dumps, normalize, normalize_reader, Fragment, Tree};
use ngxedit_syntax::ParseError;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// ngxedit - Edit nginx server blocks without duplicating anything
#[derive(Parser)]
#[command(name = "ngxedit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a rendered fragment template
    Render {
        #[command(subcommand)]
        template: Template,
    },

    /// Reformat a configuration file
    Fmt {
        /// Path to the configuration file
        file: PathBuf,

        /// Print the nested-list JSON form instead of nginx text
        #[arg(long)]
        json: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        file: PathBuf,
    },

    /// Apply an edit plan to a configuration
    Apply {
        /// Path to the TOML or JSON edit plan
        #[arg(long)]
        plan: PathBuf,

        /// Configuration file to edit (stdin when neither this nor --site is given)
        #[arg(conflicts_with = "site")]
        file: Option<PathBuf>,

        /// Site name, looked up in --sites-dir
        #[arg(long)]
        site: Option<String>,

        /// Directory holding site configurations
        #[arg(long, default_value = DEFAULT_SITES_DIR)]
        sites_dir: PathBuf,

        /// Write the result back instead of printing it
        #[arg(long)]
        in_place: bool,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum Template {
    /// Reverse-proxy location
    #[command(name = "api-proxy")]
    ApiProxy {
        #[arg(long)]
        location: String,
        #[arg(long)]
        proxy_pass: String,
    },

    /// WebSocket proxy location
    #[command(name = "websocket-proxy")]
    WebsocketProxy {
        #[arg(long)]
        location: String,
        #[arg(long)]
        proxy_pass: String,
    },

    /// Single-page app location
    Html5 {
        #[arg(long)]
        location: String,
        #[arg(long)]
        root: String,
    },

    /// JSON directory listing location
    Autoindex {
        #[arg(long)]
        location: String,
        #[arg(long)]
        root: String,
    },

    /// Server block
    Server {
        #[arg(long)]
        server_name: String,
        #[arg(long)]
        listen: String,
        /// Provenance comment written as the first line of the body
        #[arg(long)]
        comment: Option<String>,
        /// Extra body lines; missing semicolons are added
        #[arg(long)]
        rest: Option<String>,
    },

    /// Server block answering with a 301
    Redirect {
        #[arg(long)]
        server_name: String,
        #[arg(long, default_value = "80")]
        port: String,
        #[arg(long)]
        redirect_to: Option<String>,
    },

    /// TLS listen and certificate directives
    #[command(name = "secure-attr")]
    SecureAttr {
        #[arg(long)]
        ssl_certificate: String,
        #[arg(long)]
        ssl_certificate_key: String,
        #[arg(long)]
        port: Option<String>,
    },
}

impl From<Template> for Fragment {
    fn from(template: Template) -> Self {
        match template {
            Template::ApiProxy { location, proxy_pass } => Fragment::ApiProxy { location, proxy_pass },
            Template::WebsocketProxy { location, proxy_pass } => {
                Fragment::WebsocketProxy { location, proxy_pass }
            }
            Template::Html5 { location, root } => Fragment::Html5 { location, root },
            Template::Autoindex { location, root } => Fragment::Autoindex { location, root },
            Template::Server {
                server_name,
                listen,
                comment,
                rest,
            } => Fragment::Server {
                server_name,
                listen,
                comment,
                rest,
            },
            Template::Redirect {
                server_name,
                port,
                redirect_to,
            } => Fragment::Redirect {
                server_name,
                port,
                redirect_to,
            },
            Template::SecureAttr {
                ssl_certificate,
                ssl_certificate_key,
                port,
            } => Fragment::SecureAttr {
                ssl_certificate,
                ssl_certificate_key,
                port,
            },
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; stdout is reserved for configuration output
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    if cli.verbose {
        tracing::info!("Verbose mode enabled");
    }

    match cli.command {
        Commands::Render { template } => {
            let fragment = Fragment::from(template);
            print!("{}", fragment.render()?);
        }

        Commands::Fmt { file, json } => {
            let tree = normalize(file.as_path())
                .with_context(|| format!("Failed to load {}", file.display()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tree)?);
            } else {
                print!("{}", dumps(&tree));
            }
        }

        Commands::Validate { file } => {
            tracing::info!("Validating config: {}", file.display());
            let source = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;

            let result = ngxedit_syntax::parse(&source)
                .map_err(|e| {
                    report_parse_error(&file, &source, &e);
                    anyhow::Error::from(e)
                })
                .and_then(|tree| tree.validate().map_err(anyhow::Error::from));

            match result {
                Ok(()) => println!("✅ Configuration '{}' is valid!", file.display()),
                Err(e) => {
                    eprintln!("❌ Configuration Error: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Apply {
            plan,
            file,
            site,
            sites_dir,
            in_place,
        } => {
            let plan = PlanLoader::load(&plan)
                .with_context(|| format!("Failed to load plan {}", plan.display()))?;

            let target = match (file, site) {
                (Some(file), _) => Some(file),
                (None, Some(site)) => Some(resolve_site_path(&sites_dir, &site)),
                (None, None) => None,
            };

            let tree = match &target {
                Some(path) => {
                    tracing::info!("📄 Editing {}", path.display());
                    plan.apply(path.as_path())?
                }
                None => plan.apply(normalize_reader(std::io::stdin().lock())?)?,
            };

            match (&target, in_place) {
                (Some(path), true) => write_back(path, &tree)?,
                (None, true) => anyhow::bail!("--in-place needs a file or --site"),
                (_, false) => print!("{}", dumps(&tree)),
            }
        }

        Commands::Version => {
            println!("ngxedit v{}", ngxedit_core::VERSION);
            println!("Built with ❤️ in Rust");
        }
    }

    Ok(())
}

/// Replace `path` with the dumped tree, going through a sibling temp file
fn write_back(path: &Path, tree: &Tree) -> anyhow::Result<()> {
    let mut staged = path.as_os_str().to_owned();
    staged.push(".ngxedit");
    let staged = PathBuf::from(staged);

    std::fs::write(&staged, dumps(tree))
        .with_context(|| format!("Failed to write {}", staged.display()))?;
    std::fs::rename(&staged, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;

    tracing::info!("💾 Wrote {}", path.display());
    Ok(())
}

/// Print a parse failure as an annotated source excerpt
fn report_parse_error(file: &Path, source: &str, error: &ParseError) {
    let name = file.display().to_string();
    let at = error.position().unwrap_or(source.len());
    let span = at..(at + 1).min(source.len()).max(at);

    let label = match error {
        ParseError::UnexpectedToken { expected, .. } => format!("expected {}", expected),
        ParseError::UnexpectedEof { expected } => format!("input ends here, expected {}", expected),
        _ => "here".to_string(),
    };

    let report = Report::build(ReportKind::Error, (name.clone(), span.clone()))
        .with_config(Config::default().with_index_type(IndexType::Byte))
        .with_message(error.to_string())
        .with_label(Label::new((name.clone(), span)).with_message(label))
        .finish();

    if let Err(e) = report.eprint((name, Source::from(source))) {
        tracing::warn!("Failed to print report: {}", e);
    }
}
