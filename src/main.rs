//! easifish-register - register N5 volumes through an external pipeline.
//!
//! This binary parses the command line, configures logging and runs one of
//! the `inspect`, `export` or `register` workflows.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use easifish_register::{
    config::{Cli, Command, ExportConfig, InspectConfig, OutputArgs, RegisterConfig},
    export::{export_volume, ExportOptions},
    format::n5::Compression,
    pipeline::{CommandPipeline, PipelineInvoker, RegistrationRequest},
    volume::{level_spacing, DatasetLoader},
    WorkflowError,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.into_command() {
        Command::Inspect(config) => run_inspect(config).await,
        Command::Export(config) => run_export(config).await,
        Command::Register(config) => run_register(config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Inspect Command
// =============================================================================

async fn run_inspect(config: InspectConfig) -> Result<(), WorkflowError> {
    config.validate().map_err(WorkflowError::Config)?;

    let loader = DatasetLoader::open(&config.location, &config.store.store_options()).await?;
    println!("{}", config.location);
    if let Some(version) = loader.container().version() {
        println!("  N5 version: {}", version);
    }

    for level in &config.levels {
        let volume = loader.container().open_dataset(level).await?;
        println!("  /{}", volume.location().dataset);
        println!("    shape (z, y, x):  {:?}", volume.shape());
        println!("    blocks (z, y, x): {:?}", volume.chunk_shape());
        println!("    data type:        {}", volume.data_type());
        println!(
            "    compression:      {:?}",
            volume.dataset_attributes().compression
        );
        match level_spacing(&volume.location().to_string(), volume.attributes()) {
            Ok(spacing) => println!("    spacing:          {}", spacing),
            Err(e) => println!("    spacing:          unavailable ({})", e),
        }
    }

    Ok(())
}

// =============================================================================
// Export Command
// =============================================================================

async fn run_export(config: ExportConfig) -> Result<(), WorkflowError> {
    config.validate().map_err(WorkflowError::Config)?;
    let spacing = config.spacing().map_err(WorkflowError::Config)?;

    let loader = DatasetLoader::open(&config.location, &config.store.store_options()).await?;
    let level = loader
        .load_level_with_spacing(&config.dataset, spacing)
        .await?;

    let options = export_options(&config.output_args).with_spacing(level.spacing);
    let format = export_volume(&level.volume, &config.output, &options).await?;
    info!("Wrote {} file {}", format, config.output.display());

    Ok(())
}

// =============================================================================
// Register Command
// =============================================================================

async fn run_register(config: RegisterConfig) -> Result<(), WorkflowError> {
    config.validate().map_err(WorkflowError::Config)?;
    let fixed_spacing = config.fixed_spacing().map_err(WorkflowError::Config)?;
    let moving_spacing = config.moving_spacing().map_err(WorkflowError::Config)?;
    if fixed_spacing.is_some() && config.moving_spacing.is_none() {
        warn!("No moving spacing given; using the fixed spacing override for both datasets");
    }
    let store_options = config.store.store_options();

    info!("Configuration:");
    info!("  Fixed: {}", config.fixed);
    info!("  Moving: {}", config.moving);
    info!("  Levels: {} / {}", config.lowres_level, config.highres_level);
    info!("  Block size: {}", config.blocksize);
    info!("  Write directory: {}", config.write_directory.display());
    if let Some(ref endpoint) = store_options.s3_endpoint {
        info!("  S3 endpoint: {}", endpoint);
    }

    // Load the four levels
    let fixed = DatasetLoader::open(&config.fixed, &store_options)
        .await?
        .load_multiscale(&config.lowres_level, &config.highres_level, fixed_spacing)
        .await?;
    let moving = DatasetLoader::open(&config.moving, &store_options)
        .await?
        .load_multiscale(&config.lowres_level, &config.highres_level, moving_spacing)
        .await?;

    // Run the pipeline
    let cluster_config = config.load_cluster_config().await?;
    let request = RegistrationRequest::new(
        fixed,
        moving,
        config.blocksize,
        config.write_directory.clone(),
        cluster_config,
    )
    .with_overlap_factor(config.overlap_factor);

    let pipeline =
        CommandPipeline::new(config.pipeline.clone()).with_args(config.pipeline_args.clone());
    let invoker = PipelineInvoker::new(pipeline).with_store_options(store_options);
    let result = invoker.invoke(&request).await?;

    info!("Affine transform ({}):", result.affine_path.display());
    for row in result.affine.matrix() {
        info!("  {:>12.6} {:>12.6} {:>12.6} {:>12.6}", row[0], row[1], row[2], row[3]);
    }

    // Export the aligned volume
    let output = config.aligned_output();
    let options = export_options(&config.output_args).with_spacing(result.aligned_spacing);
    let format = export_volume(&result.aligned, &output, &options).await?;
    info!("Wrote aligned volume as {} to {}", format, output.display());

    Ok(())
}

fn export_options(args: &OutputArgs) -> ExportOptions {
    ExportOptions {
        compression: Compression::gzip(),
        block_size: args.output_block_size,
        jpeg_quality: args.jpeg_quality,
        ..ExportOptions::default()
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "easifish_register=debug"
    } else {
        "easifish_register=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
