//! # Heritage Media Optimizer - Main Entry Point
//!
//! Questo è il punto di ingresso della command line.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Caricamento della configurazione condivisa (stessa lista categorie del server)
//! - Avvio del server admin, del batch, delle statistiche o di una singola trasformazione
//!
//! ## Esempio di utilizzo:
//! ```bash
//! media-optimizer --config media.json optimize --quality 75
//! media-optimizer optimize --dir public/uploads/events --max-width 1920
//! media-optimizer stats --json
//! media-optimizer serve
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use heritage_media_optimizer::{
    format_signed_bytes, BatchRunner, Config, DirectoryOptimizer, FileManager, TargetFormat,
    Transformer,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "media-optimizer")]
#[command(about = "Optimize uploaded images for the heritage CMS")]
struct Args {
    /// JSON configuration file (defaults are used when missing)
    #[arg(short, long, default_value = "media-optimizer.json")]
    config: PathBuf,

    /// Uploads root directory (overrides the configuration file)
    #[arg(long)]
    uploads_root: Option<PathBuf>,

    /// Number of concurrent encodes (overrides the configuration file)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the admin HTTP endpoints
    Serve {
        /// Listen address, e.g. 0.0.0.0:3000
        #[arg(long)]
        bind: Option<String>,
    },

    /// Optimize every configured upload directory, or a single directory
    Optimize {
        /// Optimize only this directory instead of the configured categories
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Descend into sub-directories of --dir
        #[arg(short, long)]
        recursive: bool,

        #[command(flatten)]
        encoding: EncodingArgs,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Count files and bytes of every configured upload directory
    Stats {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Re-encode a single image file
    Transform {
        file: PathBuf,

        #[command(flatten)]
        encoding: EncodingArgs,
    },
}

#[derive(clap::Args)]
struct EncodingArgs {
    /// Target format
    #[arg(short, long, value_enum)]
    format: Option<TargetFormat>,

    /// Encoder quality (1-100)
    #[arg(short, long)]
    quality: Option<u8>,

    /// Maximum width, aspect ratio preserved
    #[arg(long)]
    max_width: Option<u32>,

    /// Maximum height, aspect ratio preserved
    #[arg(long)]
    max_height: Option<u32>,
}

impl EncodingArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(format) = self.format {
            config.batch.format = format;
        }
        if let Some(quality) = self.quality {
            config.batch.quality = quality;
        }
        if self.max_width.is_some() {
            config.batch.max_width = self.max_width;
        }
        if self.max_height.is_some() {
            config.batch.max_height = self.max_height;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = Config::from_file(&args.config).await?;
    if let Some(root) = args.uploads_root {
        config.uploads_root = root;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }

    match args.command {
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                config.bind_address = bind;
            }
            config.validate()?;
            heritage_media_optimizer::server::run(config).await?;
        }

        Command::Optimize {
            dir,
            recursive,
            encoding,
            json,
        } => {
            encoding.apply(&mut config);
            config.validate()?;
            let transformer = Transformer::new(config.workers);

            match dir {
                Some(dir) => {
                    if !dir.is_dir() {
                        return Err(anyhow::anyhow!("Directory does not exist: {}", dir.display()));
                    }
                    let options = config.batch.clone().with_recursive(recursive);
                    let report = DirectoryOptimizer::new(transformer)
                        .optimize_directory(&dir, &options)
                        .await?;
                    if json {
                        println!("{}", serde_json::to_string_pretty(&report)?);
                    } else {
                        info!("{}: {}", dir.display(), report.format_summary());
                    }
                }
                None => {
                    let report = BatchRunner::new(Arc::new(config), transformer)
                        .with_progress(!json)
                        .run()
                        .await?;
                    if json {
                        println!("{}", serde_json::to_string_pretty(&report)?);
                    }
                }
            }
        }

        Command::Stats { json } => {
            config.validate()?;
            let transformer = Transformer::new(config.workers);
            let report = BatchRunner::new(Arc::new(config), transformer)
                .collect_stats()
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for detail in &report.details {
                    if detail.exists {
                        info!("{}: {} files, {}", detail.directory, detail.file_count, detail.total_size_human);
                    } else {
                        info!("{}: missing", detail.directory);
                    }
                }
            }
        }

        Command::Transform { file, encoding } => {
            encoding.apply(&mut config);
            config.batch.validate()?;
            let outcome = Transformer::new(1).run(&file, &config.batch).await;
            if outcome.success {
                info!(
                    "✅ {} -> {} ({} saved, {:.1}%)",
                    file.display(),
                    outcome.output_path.display(),
                    format_signed_bytes(outcome.saved_bytes()),
                    FileManager::calculate_reduction(outcome.original_size, outcome.output_size)
                );
            } else {
                return Err(anyhow::anyhow!("Could not optimize {}", file.display()));
            }
        }
    }

    Ok(())
}
