use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use pending_catalog::catalog::{CatalogStore, DetailRoute, ProgressSink};
use pending_catalog::client::CatalogHttpClient;
use pending_catalog::config::{ConfigLoader, ResolvedConfig};
use pending_catalog::error::CatalogError;
use pending_catalog::offline::{CacheRequest, OfflineCache};
use pending_catalog::output::{
    CacheEntryResult, CacheGetResult, ClearResult, JsonOutput, ListResult, LogProgress,
    OutputMode, ShowResult, TypesResult,
};

#[derive(Parser)]
#[command(name = "pending-catalog")]
#[command(about = "Browse and search the pending BioThings API catalog")]
#[command(version)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "List APIs, optionally filtered by name and biothing type")]
    List(ListArgs),
    #[command(about = "List the biothing types seen in the catalog")]
    Types,
    #[command(about = "Show one API's metadata")]
    Show(ShowArgs),
    #[command(about = "Manage the offline cache")]
    Cache(CacheArgs),
}

#[derive(Args)]
struct ListArgs {
    #[arg(long, default_value = "")]
    query: String,

    #[arg(long = "type")]
    types: Vec<String>,

    #[arg(long)]
    featured: Option<String>,
}

#[derive(Args)]
struct ShowArgs {
    name: String,
}

#[derive(Args)]
struct CacheArgs {
    #[command(subcommand)]
    command: CacheCommand,
}

#[derive(Subcommand)]
enum CacheCommand {
    #[command(about = "Download every configured precache entry")]
    Precache,
    #[command(about = "Fetch a URL through the cache")]
    Get(CacheGetArgs),
    #[command(about = "List cached URLs")]
    Ls,
    #[command(about = "Remove every cached entry")]
    Clear,
}

#[derive(Args)]
struct CacheGetArgs {
    url: String,

    #[arg(long)]
    navigate: bool,

    #[arg(long)]
    body: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<CatalogError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &CatalogError) -> u8 {
    match error {
        CatalogError::ApiNotFound(_) => 2,
        CatalogError::CacheMiss(_) => 3,
        error if error.is_network() => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let mut config = ConfigLoader::resolve(cli.config.as_deref())?;
    if let Some(base_url) = cli.base_url.as_deref() {
        config.base_url = pending_catalog::client::normalize_base_url(base_url)?;
    }

    let client = CatalogHttpClient::new(&config.base_url, config.timeout)?;
    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Interactive => &LogProgress,
        OutputMode::NonInteractive => &JsonOutput,
    };

    match cli.command {
        Commands::List(args) => run_list(args, &client, sink),
        Commands::Types => {
            let mut store = CatalogStore::new();
            store.fetch_catalog(&client, sink)?;
            JsonOutput::print_types(&TypesResult {
                biothing_types: store.biothing_types().to_vec(),
            })
            .into_diagnostic()
        }
        Commands::Show(args) => {
            let mut store = CatalogStore::new();
            match store.enter_detail(&client, &args.name, sink)? {
                DetailRoute::Detail { id, metadata } => JsonOutput::print_show(&ShowResult {
                    name: id.to_string(),
                    metadata,
                })
                .into_diagnostic(),
                DetailRoute::NotFound => Err(CatalogError::ApiNotFound(args.name).into()),
            }
        }
        Commands::Cache(args) => run_cache(args.command, &config, &client),
    }
}

fn run_list(
    args: ListArgs,
    client: &CatalogHttpClient,
    sink: &dyn ProgressSink,
) -> miette::Result<()> {
    let mut store = CatalogStore::new();
    let report = store.fetch_catalog(client, sink)?;

    for name in &args.types {
        if !store.toggle_type(name, false) {
            tracing::warn!(biothing_type = %name, "unknown biothing type");
        }
    }
    if let Some(name) = args.featured.as_deref() {
        if !store.toggle_type(name, true) {
            tracing::warn!(biothing_type = %name, "unknown biothing type");
        }
    }
    store.set_query(&args.query);

    JsonOutput::print_list(&ListResult {
        query: store.query().to_string(),
        total: store.apis_backup().len(),
        apis: store.apis().to_vec(),
        failed: report.failed,
    })
    .into_diagnostic()
}

fn run_cache(
    command: CacheCommand,
    config: &ResolvedConfig,
    client: &CatalogHttpClient,
) -> miette::Result<()> {
    let root = match &config.cache_dir {
        Some(dir) => dir.clone(),
        None => OfflineCache::default_root()?,
    };
    let mut cache = OfflineCache::open(root, &config.base_url)?;
    for pattern in &config.routes {
        cache.register_route(pattern)?;
    }

    match command {
        CacheCommand::Precache => {
            let report = cache.precache(client, &config.precache)?;
            JsonOutput::print_precache(&report).into_diagnostic()
        }
        CacheCommand::Get(args) => {
            let request = if args.navigate {
                CacheRequest::navigate(args.url)
            } else {
                CacheRequest::asset(args.url)
            };
            let response = cache.respond(client, &request)?;
            JsonOutput::print_cache_get(&CacheGetResult {
                size: response.body.len(),
                body: args
                    .body
                    .then(|| String::from_utf8_lossy(&response.body).into_owned()),
                url: response.url,
                source: response.source,
            })
            .into_diagnostic()
        }
        CacheCommand::Ls => {
            let entries = cache
                .entries()
                .map(|(url, entry)| CacheEntryResult {
                    url: url.clone(),
                    revision: entry.revision.clone(),
                    cached_at: entry.cached_at.clone(),
                })
                .collect::<Vec<_>>();
            JsonOutput::print_cache_entries(&entries).into_diagnostic()
        }
        CacheCommand::Clear => {
            cache.clear()?;
            JsonOutput::print_clear(&ClearResult { cleared: true }).into_diagnostic()
        }
    }
}
