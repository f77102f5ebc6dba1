use clap::{Parser, Subcommand};
use cropserve::config::{self, CropserveConfig};
use cropserve::output;
use cropserve::service::VariantService;
use cropserve::store::{Catalog, MemoryArtifactStore};
use cropserve::transform::TransformRegistry;
use cropserve::types::{ContextId, ImageContext, ImageId, ResolutionId, VariantKey, VariantSpec};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cropserve")]
#[command(about = "Crop resolution for image variants")]
#[command(long_about = "\
Crop resolution for image variants

Decides which crop of an original image to render for a requested
(image, context, resolution), reusing editorially registered crops where
possible and generating one otherwise.

Precedence (first match wins):
  1. Crop registered for the exact context and resolution
  2. Same context, same aspect ratio: smallest larger resolution, else largest smaller
  3. Other contexts, same aspect ratio: same rule
  4. Generated from all registered crops and the whole image

Run 'cropserve gen-config' to generate a documented cropserve.toml.")]
#[command(version)]
struct Cli {
    /// Directory containing cropserve.toml
    #[arg(long, default_value = ".", global = true)]
    config: PathBuf,

    /// Catalog file (overrides the config's `catalog`)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the crop and output size a variant would render with
    Resolve {
        /// Image id
        #[arg(long)]
        image: u64,
        /// Context id or code
        #[arg(long)]
        context: String,
        /// Resolution id
        #[arg(long)]
        resolution: u64,
        /// Print the resolved modification as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate the catalog without rendering
    Check,
    /// Print a stock cropserve.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Resolve {
            image,
            context,
            resolution,
            json,
        } => {
            let (site, catalog) = load(&cli.config, cli.catalog.as_deref())?;
            let context = find_context(&catalog, &context)?;
            let image = catalog
                .image(ImageId(image))
                .ok_or_else(|| format!("unknown image {image}"))?;
            let requested = catalog
                .resolution(ResolutionId(resolution))
                .cloned()
                .ok_or_else(|| format!("unknown resolution {resolution}"))?;
            let service = resolve_only_service(catalog, &site);
            let resolved = service.resolve(image.id, context.id, requested.id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&resolved)?);
            } else {
                let key = VariantKey::new(
                    image.id,
                    context.id,
                    requested.id,
                    VariantSpec::new(image.image_type),
                );
                output::print_resolution(&image, &context, &requested, &resolved, &key);
            }
        }
        Command::Check => {
            let (_, catalog) = load(&cli.config, cli.catalog.as_deref())?;
            let issues = catalog.check();
            output::print_check(&catalog, &issues);
            if !issues.is_empty() {
                std::process::exit(1);
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Load config, set up logging and the worker pool, then load the catalog.
fn load(
    config_dir: &Path,
    catalog_override: Option<&Path>,
) -> Result<(CropserveConfig, Catalog), Box<dyn std::error::Error>> {
    let site = config::load_config(config_dir)?;
    init_tracing(&site.logging);
    init_thread_pool(&site.processing);

    let catalog_path = catalog_override
        .map(Path::to_path_buf)
        .unwrap_or_else(|| site.catalog_path(config_dir));
    tracing::debug!(path = %catalog_path.display(), "loading catalog");
    let catalog = Catalog::load(&catalog_path)?;
    Ok((site, catalog))
}

/// A service without transform engines. Enough for `resolve`, which never
/// renders.
fn resolve_only_service(catalog: Catalog, site: &CropserveConfig) -> VariantService {
    let catalog = Arc::new(catalog);
    VariantService::new(
        catalog.clone(),
        catalog,
        Arc::new(MemoryArtifactStore::new()),
        TransformRegistry::default(),
        site.service_settings(),
    )
}

/// Look a context up by numeric id, then by code.
fn find_context(catalog: &Catalog, arg: &str) -> Result<ImageContext, String> {
    let by_id = arg
        .parse::<u64>()
        .ok()
        .and_then(|id| catalog.context(ContextId(id)));
    by_id
        .or_else(|| catalog.context_by_code(arg))
        .cloned()
        .ok_or_else(|| format!("unknown context {arg}"))
}

/// Install the global tracing subscriber. `RUST_LOG` overrides the
/// configured filter. Logs go to stderr so command output stays clean.
fn init_tracing(logging: &config::LoggingConfig) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores. Users can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
