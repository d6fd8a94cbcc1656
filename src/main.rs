use axum::http::Request;
use clap::{Parser, Subcommand, ValueEnum};
use next_lambda_adapter::bundle::{self, BundlePlan};
use next_lambda_adapter::config::{self, AdapterConfig};
use next_lambda_adapter::exec::CommandLine;
use next_lambda_adapter::manifest::{ManifestError, Manifests};
use next_lambda_adapter::router::{Resolution, Router, RouterConfig};
use next_lambda_adapter::routes::{LambdaKind, PAGE_HEADER};
use next_lambda_adapter::translate::{BundleSpec, PROXY_CONFIG_FILE, Translation, translate};
use next_lambda_adapter::{bridge, output};
use std::error::Error;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        let dirty = if env!("GIT_DIRTY") == "true" { "-dirty" } else { "" };
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup — trivial, called exactly once
            Box::leak(format!("dev@{hash}{dirty}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "next-lambda-adapter")]
#[command(about = "Turn Next.js serverless build output into a proxy config and Lambda bundles")]
#[command(long_about = "\
Turn Next.js serverless build output into a proxy config and Lambda bundles

Reads the manifests the serverless builder writes, emits the routing table
for the proxy and assembles one zip per lambda with a generated router.

Project structure:

  project/
  ├── adapter.toml                  # Adapter config (optional)
  ├── cicd-tool/
  │   ├── launcher.ts               # Bundle entry point source
  │   └── bridge.ts                 # Lambda event <-> HTTP bridge source
  ├── .serverless_nextjs/           # Builder output
  │   ├── api-lambda/manifest.json
  │   └── default-lambda/
  │       ├── manifest.json
  │       ├── prerender-manifest.json
  │       └── routes-manifest.json
  └── build/                        # Output (recreated on every build)
      ├── proxy-config.json
      ├── __NEXT_API_LAMBDA_0.zip
      └── __NEXT_PAGE_LAMBDA_0.zip

Running without a subcommand performs a full build.
Run 'next-lambda-adapter gen-config' to generate a documented adapter.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Project directory
    #[arg(long, default_value = ".", global = true)]
    project: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Lambda {
    Api,
    Page,
}

impl From<Lambda> for LambdaKind {
    fn from(lambda: Lambda) -> Self {
        match lambda {
            Lambda::Api => LambdaKind::Api,
            Lambda::Page => LambdaKind::Page,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Run the full build: upstream build → proxy config → bundles
    Build,
    /// Write proxy-config.json from the builder manifests
    Translate,
    /// Validate the builder manifests and print the route inventory
    Check,
    /// Show which page a request would be routed to
    Resolve {
        /// Request URI, e.g. /posts/42
        uri: String,
        /// x-nextjs-page header value (repeat to send several)
        #[arg(long = "page")]
        pages: Vec<String>,
        #[arg(long, value_enum, default_value = "page")]
        lambda: Lambda,
    },
    /// Serve a lambda's router locally; handlers describe the matched page
    Serve {
        #[arg(long, value_enum, default_value = "page")]
        lambda: Lambda,
        #[arg(long, default_value = "127.0.0.1:3000")]
        addr: SocketAddr,
    },
    /// Print a stock adapter.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("next_lambda_adapter=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let project = cli.project.as_path();

    match cli.command.unwrap_or(Command::Build) {
        Command::Build => build(project)?,
        Command::Translate => {
            let config = config::load_config(project)?;
            let translation = load_translation(project, &config)?;
            let build_dir = project.join(&config.paths.build_dir);
            std::fs::create_dir_all(&build_dir)?;
            let path = write_proxy_config(&translation, &build_dir)?;
            output::print_translation(&translation);
            println!("==> Wrote {}", path.display());
        }
        Command::Check => {
            let config = config::load_config(project)?;
            let builder_output = project.join(&config.paths.builder_output);
            println!("==> Checking {}", builder_output.display());
            let translation = load_translation(project, &config)?;
            output::print_translation(&translation);
            println!("==> Manifests are valid");
        }
        Command::Resolve { uri, pages, lambda } => {
            let config = config::load_config(project)?;
            let translation = load_translation(project, &config)?;
            let spec = bundle_for(&translation, lambda.into())?;
            let router = Router::new(RouterConfig::from_build_info(
                &spec.build_info,
                bridge::describe_loader,
            )?);

            let mut request = Request::builder().uri(uri.as_str());
            for page in &pages {
                request = request.header(PAGE_HEADER, page.as_str());
            }
            let resolution = router.resolve(&request.body(())?);
            let handler = match &resolution {
                Resolution::Page { page, .. } => spec.build_info.pages.get(page).map(String::as_str),
                _ => None,
            };
            output::print_resolution(&uri, &resolution, handler);
        }
        Command::Serve { lambda, addr } => {
            let config = config::load_config(project)?;
            let translation = load_translation(project, &config)?;
            let spec = bundle_for(&translation, lambda.into())?;
            let router = Router::new(RouterConfig::from_build_info(
                &spec.build_info,
                bridge::describe_loader,
            )?);
            println!("==> Serving {} on http://{addr}", spec.kind.id());
            tokio::runtime::Runtime::new()?.block_on(async {
                let listener = tokio::net::TcpListener::bind(addr).await?;
                bridge::serve(router, listener).await
            })?;
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Clean the build directory, run the upstream build, write the proxy
/// config and assemble every bundle. Stops at the first failure.
fn build(project: &Path) -> Result<(), Box<dyn Error>> {
    let config = config::load_config(project)?;
    let build_dir = project.join(&config.paths.build_dir);
    if build_dir.exists() {
        std::fs::remove_dir_all(&build_dir)?;
    }
    std::fs::create_dir_all(&build_dir)?;

    if config.upstream.command.is_empty() {
        println!("==> Stage 1: No upstream command, using existing manifests");
    } else {
        let upstream = CommandLine::new(&config.upstream.command, project);
        println!("==> Stage 1: Running {upstream}");
        upstream.run()?;
    }

    println!("==> Stage 2: Translating manifests");
    let translation = load_translation(project, &config)?;
    output::print_translation(&translation);
    let proxy_config = write_proxy_config(&translation, &build_dir)?;

    println!("==> Stage 3: Assembling bundles");
    let mut reports = Vec::new();
    for spec in translation.bundles {
        let plan = BundlePlan::new(spec.kind, spec.build_info, project, &config);
        let (tx, rx) = std::sync::mpsc::channel();
        let printer = std::thread::spawn(move || {
            for event in rx {
                for line in output::format_bundle_event(&event) {
                    println!("{}", line);
                }
            }
        });
        let result = bundle::bundle(&plan, Some(tx));
        printer
            .join()
            .map_err(|_| "progress printer thread panicked")?;
        reports.push(result?);
    }

    output::print_build_summary(&proxy_config, &reports);
    println!("==> Build complete: {}", build_dir.display());
    Ok(())
}

fn load_translation(project: &Path, config: &AdapterConfig) -> Result<Translation, ManifestError> {
    let builder_output = project.join(&config.paths.builder_output);
    let manifests = Manifests::load(&builder_output)?;
    let translation = translate(&manifests);
    tracing::info!(
        build_id = %translation.proxy_config.build_id,
        routes = translation.proxy_config.routes.len(),
        bundles = translation.bundles.len(),
        "translated manifests"
    );
    Ok(translation)
}

fn write_proxy_config(translation: &Translation, build_dir: &Path) -> Result<PathBuf, Box<dyn Error>> {
    let path = build_dir.join(PROXY_CONFIG_FILE);
    std::fs::write(&path, translation.proxy_config.to_json()?)?;
    tracing::debug!(path = %path.display(), "wrote proxy config");
    Ok(path)
}

fn bundle_for(translation: &Translation, kind: LambdaKind) -> Result<&BundleSpec, String> {
    translation
        .bundles
        .iter()
        .find(|b| b.kind == kind)
        .ok_or_else(|| format!("the {kind} lambda has no routes"))
}
