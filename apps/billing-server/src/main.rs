use anyhow::{Context, Result};
use api_ingress::{ApiIngress, ApiIngressConfig};
use clap::{Parser, Subcommand, ValueEnum};
use contractkit::codegen::render_bindings;
use contractkit::pipeline::StaticAuthStrategy;
use contractkit::schema::{JsonSchemaAdapter, NativeAdapter};
use contractkit::{ContractRouter, RouterRegistry, SchemaAdapter};
use contractkit_bootstrap::{init_logging_unified, shutdown_signal, AppConfig, CliArgs};
use mimalloc::MiMalloc;

use std::path::{Path, PathBuf};
use std::sync::Arc;

mod billing;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Billing Server - contract-driven demo API
#[derive(Parser)]
#[command(name = "billing-server")]
#[command(about = "Billing Server - contract-driven demo API")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port override for HTTP server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Print effective configuration (YAML) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Validation backend the contracts are compiled with
    #[arg(long, value_enum, default_value_t = SchemaBackend::Native)]
    schema_backend: SchemaBackend,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SchemaBackend {
    Native,
    JsonSchema,
}

impl SchemaBackend {
    fn adapter(self) -> Arc<dyn SchemaAdapter> {
        match self {
            SchemaBackend::Native => Arc::new(NativeAdapter),
            SchemaBackend::JsonSchema => Arc::new(JsonSchemaAdapter),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Run,
    /// Validate configuration and routes, then exit
    Check,
    /// Print the OpenAPI document and exit
    Openapi,
    /// Print typed bindings for one contract, or for all of them
    Bindings {
        /// Contract name, e.g. `getInvoice`
        contract: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        port: cli.port,
        print_config: cli.print_config,
        verbose: cli.verbose,
    };

    // Layered config:
    // 1) defaults -> 2) YAML (if provided) -> 3) env (APP__*) -> 4) CLI overrides
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);

    let logging_config = config.logging.clone().unwrap_or_default();
    init_logging_unified(&logging_config, Path::new(&config.server.home_dir));

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    let registry = RouterRegistry::new();
    build_routers(&config, cli.schema_backend.adapter(), registry.clone())?;
    let ingress = ApiIngress::new(ApiIngressConfig::from_app_config(&config), registry);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_server(ingress).await,
        Commands::Check => check_config(&config, &ingress),
        Commands::Openapi => {
            let doc = ingress.build_openapi();
            println!(
                "{}",
                serde_json::to_string_pretty(&doc).context("Failed to render OpenAPI")?
            );
            Ok(())
        }
        Commands::Bindings { contract } => print_bindings(ingress.registry(), contract.as_deref()),
    }
}

fn build_routers(
    config: &AppConfig,
    adapter: Arc<dyn SchemaAdapter>,
    registry: RouterRegistry,
) -> Result<()> {
    let auth = StaticAuthStrategy::from_map(config.api.auth_tokens.clone());
    if auth.is_empty() {
        tracing::warn!("No api.auth_tokens configured; protected routes will answer 401");
    }

    let router = ContractRouter::new("/billing", adapter, registry)
        .with_cors(config.api.cors.clone())
        .with_auth_strategy(Arc::new(auth));
    billing::mount(&router, Arc::new(billing::InvoiceStore::default()))
        .context("Failed to register billing routes")?;

    tracing::info!(routes = router.routes().len(), "Billing router ready");
    Ok(())
}

async fn run_server(ingress: ApiIngress) -> Result<()> {
    tracing::info!("Billing Server starting");
    let result = ingress.serve(shutdown_signal()).await;
    tracing::info!("Billing Server stopped");
    result
}

fn check_config(config: &AppConfig, ingress: &ApiIngress) -> Result<()> {
    tracing::info!("Checking configuration…");
    // Building the router catches route/endpoint collisions.
    ingress.build_router()?;
    println!("Configuration is valid");
    println!("{}", config.to_yaml()?);
    Ok(())
}

fn print_bindings(registry: &RouterRegistry, contract: Option<&str>) -> Result<()> {
    let routes = registry.snapshot();
    let selected: Vec<_> = routes
        .iter()
        .filter(|r| contract.is_none_or(|name| r.name() == name))
        .collect();
    if selected.is_empty() {
        anyhow::bail!("no contract named '{}'", contract.unwrap_or_default());
    }
    for route in selected {
        println!("{}", render_bindings(&route.descriptor));
    }
    Ok(())
}
