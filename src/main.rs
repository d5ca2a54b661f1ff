use clap::{Parser, Subcommand};
use rendition::blob::FsBlobStore;
use rendition::catalog::{ImageId, SqliteCatalog};
use rendition::imaging::Crop;
use rendition::storage::{CancelToken, Storage};
use rendition::{config, output};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn version_string() -> &'static str {
    let on_tag = env!("RENDITION_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("RENDITION_GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "rendition")]
#[command(about = "On-demand image derivatives backed by a shared catalog")]
#[command(long_about = "\
On-demand image derivatives backed by a shared catalog

Images are uploaded into namespaces and stored as blobs. Derivatives are
requested by format name and generated the first time they are asked for;
concurrent requests for the same derivative, from any number of processes
sharing the catalog, render it only once.

Layout on disk:

  rendition.toml         # Config (optional, merged over stock defaults)
  rendition.db           # SQLite catalog shared by every process
  blobs/
  ├── images/            # One directory per namespace bucket
  │   └── 000/000/2.jpg  # Serial naming, depth 2
  └── formatted/
      └── 000/000/2_thumb.jpg

Run 'rendition gen-config' to generate a documented rendition.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Config file
    #[arg(long, default_value = "rendition.toml", global = true)]
    config: PathBuf,

    /// Print records as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store an image file in a namespace
    Upload {
        namespace: String,
        file: PathBuf,
        /// Preferred name (defaults to the file stem)
        #[arg(long)]
        name: Option<String>,
        /// Region of interest as left,top,width,height
        #[arg(long)]
        crop: Option<Crop>,
    },
    /// Get (generating if needed) a derivative
    Format { id: ImageId, format: String },
    /// Drop a derivative and generate it again
    Regenerate { id: ImageId, format: String },
    /// Show an image and its derivatives
    Show { id: ImageId },
    /// Move an image to a path generated from a new name
    Rename { id: ImageId, name: String },
    /// Set or clear (no argument) the stored crop
    Crop { id: ImageId, crop: Option<Crop> },
    /// Mirror an image horizontally
    Flop { id: ImageId },
    /// Re-encode an image without metadata
    Normalize { id: ImageId },
    /// Delete an image and its derivatives
    Remove { id: ImageId },
    /// Print a stock rendition.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let storage = match cli.command {
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            return Ok(());
        }
        _ => Storage::<SqliteCatalog, FsBlobStore>::open(config::load_config(&cli.config)?)?,
    };
    let cancel = CancelToken::new();

    let image = match cli.command {
        Command::Upload {
            namespace,
            file,
            name,
            crop,
        } => storage.add_image_from_file(&namespace, &file, name.as_deref(), crop)?,
        Command::Format { id, format } => storage.formatted_image(id, &format, &cancel)?,
        Command::Regenerate { id, format } => {
            storage.regenerate_formatted_image(id, &format, &cancel)?
        }
        Command::Show { id } => storage.image(id)?,
        Command::Rename { id, name } => storage.rename_image(id, &name)?,
        Command::Crop { id, crop } => storage.set_crop(id, crop)?,
        Command::Flop { id } => storage.flop_image(id)?,
        Command::Normalize { id } => storage.normalize_image(id)?,
        Command::Remove { id } => {
            storage.remove_image(id)?;
            println!("Removed #{id}");
            return Ok(());
        }
        Command::GenConfig => return Ok(()),
    };

    let url = storage.url(&image);
    let derivatives = storage.formatted_images(image.id)?;
    if cli.json {
        output::print_image_json(&image, &url, &derivatives);
    } else {
        output::print_image(&image, &url, &derivatives);
    }
    Ok(())
}
