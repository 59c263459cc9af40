use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};

use mlflow_migrate::artifacts::LocalArtifactTransfer;
use mlflow_migrate::bulk::{self, BulkSummary};
use mlflow_migrate::client::RestTrackingClient;
use mlflow_migrate::config::{LogFormat, MigrationConfig};
use mlflow_migrate::experiment::{ExperimentExporter, ExperimentImporter};
use mlflow_migrate::logging;
use mlflow_migrate::model::{ModelExporter, ModelImporter};
use mlflow_migrate::selector::StagePolicy;

#[derive(Parser)]
#[command(name = "mlflow-migrate")]
#[command(version, about = "Export and import MLflow experiments, runs and registered models")]
struct Cli {
    /// TOML config file supplying defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Source tracking server (overrides [source] tracking_uri)
    #[arg(long, global = true, env = "MLFLOW_SOURCE_URI")]
    source_uri: Option<String>,

    /// Destination tracking server (overrides [destination] tracking_uri)
    #[arg(long, global = true, env = "MLFLOW_DESTINATION_URI")]
    destination_uri: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SelectArgs {
    /// Stages to export (comma-separated, case-insensitive)
    #[arg(long, value_delimiter = ',')]
    stages: Vec<String>,

    /// Versions to export (comma-separated)
    #[arg(long, value_delimiter = ',')]
    versions: Vec<String>,

    /// Only the latest version of each stage
    #[arg(long)]
    latest_only: bool,

    /// Skip exporting the runs behind versions
    #[arg(long)]
    no_export_run: bool,

    /// Reject unknown stage names instead of ignoring them
    #[arg(long)]
    strict_stages: bool,
}

#[derive(Args)]
struct ImportArgs {
    /// Delete an existing destination model first
    #[arg(long)]
    delete_model: bool,

    /// Tag imported entities with their origin
    #[arg(long)]
    import_source_tags: bool,

    /// Pause before each stage transition, in milliseconds
    #[arg(long)]
    sleep_time_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a registered model and selected versions
    ExportModel {
        /// Model name
        #[arg(long)]
        model: String,
        /// Output directory
        #[arg(long)]
        output_dir: PathBuf,
        #[command(flatten)]
        select: SelectArgs,
        /// Copy run artifacts (local and dbfs paths only)
        #[arg(long)]
        copy_artifacts: bool,
    },
    /// Import an exported registered model
    ImportModel {
        /// Destination model name
        #[arg(long)]
        model: String,
        /// Destination experiment for the imported runs
        #[arg(long)]
        experiment_name: String,
        /// Directory holding model.json
        #[arg(long)]
        input_dir: PathBuf,
        #[command(flatten)]
        import: ImportArgs,
        /// Upload run artifacts (local and dbfs paths only)
        #[arg(long)]
        copy_artifacts: bool,
    },
    /// Export several registered models
    ExportModels {
        /// Model names (comma-separated)
        #[arg(long, value_delimiter = ',', required = true)]
        models: Vec<String>,
        /// Output directory; one sub-directory per model
        #[arg(long)]
        output_dir: PathBuf,
        #[command(flatten)]
        select: SelectArgs,
        /// Worker threads
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Import every model under a directory
    ImportModels {
        /// Directory written by export-models
        #[arg(long)]
        input_dir: PathBuf,
        #[command(flatten)]
        import: ImportArgs,
        /// Worker threads
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Export an experiment and its runs
    ExportExperiment {
        /// Experiment name or id
        #[arg(long)]
        experiment: String,
        /// Output directory
        #[arg(long)]
        output_dir: PathBuf,
        /// Copy run artifacts (local and dbfs paths only)
        #[arg(long)]
        copy_artifacts: bool,
    },
    /// Import an exported experiment
    ImportExperiment {
        /// Destination experiment name
        #[arg(long)]
        experiment_name: String,
        /// Directory holding experiment.json
        #[arg(long)]
        input_dir: PathBuf,
        /// Tag imported entities with their origin
        #[arg(long)]
        import_source_tags: bool,
        /// Upload run artifacts (local and dbfs paths only)
        #[arg(long)]
        copy_artifacts: bool,
    },
    /// Export several experiments
    ExportExperiments {
        /// Experiment names or ids (comma-separated)
        #[arg(long, value_delimiter = ',', required = true)]
        experiments: Vec<String>,
        /// Output directory; one sub-directory per experiment
        #[arg(long)]
        output_dir: PathBuf,
        /// Worker threads
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Import every experiment under a directory
    ImportExperiments {
        /// Directory written by export-experiments
        #[arg(long)]
        input_dir: PathBuf,
        /// Tag imported entities with their origin
        #[arg(long)]
        import_source_tags: bool,
        /// Worker threads
        #[arg(long)]
        workers: Option<usize>,
    },
}

impl SelectArgs {
    fn apply(self, config: &mut MigrationConfig) {
        if !self.stages.is_empty() {
            config.export.stages = self.stages;
        }
        if !self.versions.is_empty() {
            config.export.versions = self.versions;
        }
        config.export.latest_only |= self.latest_only;
        if self.no_export_run {
            config.export.export_run = false;
        }
        if self.strict_stages {
            config.export.stage_policy = StagePolicy::Strict;
        }
    }
}

impl ImportArgs {
    fn apply(self, config: &mut MigrationConfig) {
        config.import.delete_model |= self.delete_model;
        config.import.import_source_tags |= self.import_source_tags;
        if let Some(ms) = self.sleep_time_ms {
            config.import.sleep_time_ms = ms;
        }
    }
}

fn source(config: &MigrationConfig) -> anyhow::Result<RestTrackingClient> {
    RestTrackingClient::from_config(&config.source).context("cannot create source client")
}

fn destination(config: &MigrationConfig) -> anyhow::Result<RestTrackingClient> {
    RestTrackingClient::from_config(&config.destination)
        .context("cannot create destination client")
}

fn report(what: &str, summary: &BulkSummary) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(summary)?);
    if !summary.is_success() {
        bail!("{} of {} {what} failed", summary.failed.len(), summary.total());
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => MigrationConfig::load(path)?,
        None => MigrationConfig::default(),
    };
    if let Some(uri) = cli.source_uri {
        config.source.tracking_uri = uri;
    }
    if let Some(uri) = cli.destination_uri {
        config.destination.tracking_uri = uri;
    }
    if cli.json_logs {
        config.logging.format = LogFormat::Json;
    }
    logging::init(&config.logging)?;

    match cli.command {
        Commands::ExportModel {
            model,
            output_dir,
            select,
            copy_artifacts,
        } => {
            select.apply(&mut config);
            let mut exporter = ModelExporter::new(source(&config)?, &config.export)?;
            if copy_artifacts {
                exporter = exporter.with_artifacts(Arc::new(LocalArtifactTransfer));
            }
            let record = exporter
                .try_export_model(&model, &output_dir)
                .with_context(|| format!("export of model '{model}' failed"))?;
            println!("{}", serde_json::to_string_pretty(&record.info)?);
        }
        Commands::ImportModel {
            model,
            experiment_name,
            input_dir,
            import,
            copy_artifacts,
        } => {
            import.apply(&mut config);
            let mut importer = ModelImporter::new(destination(&config)?, config.import.clone());
            if copy_artifacts {
                importer = importer.with_artifacts(Arc::new(LocalArtifactTransfer));
            }
            let imported = importer
                .import_model(&model, &input_dir, &experiment_name, config.import.delete_model)
                .with_context(|| format!("import of model '{model}' failed"))?;
            tracing::info!(
                model = %imported.model.name,
                versions = imported.succeeded.len(),
                failed = imported.failures.len(),
                "import finished"
            );
            if !imported.is_complete() {
                println!("{}", serde_json::to_string_pretty(&imported.failures)?);
                bail!("{} version(s) of '{model}' failed to import", imported.failures.len());
            }
        }
        Commands::ExportModels {
            models,
            output_dir,
            select,
            workers,
        } => {
            select.apply(&mut config);
            let workers = workers.unwrap_or(config.bulk.workers);
            let summary =
                bulk::export_models(&source(&config)?, &models, &output_dir, &config.export, workers)?;
            report("models", &summary)?;
        }
        Commands::ImportModels {
            input_dir,
            import,
            workers,
        } => {
            import.apply(&mut config);
            let workers = workers.unwrap_or(config.bulk.workers);
            let summary =
                bulk::import_models(&destination(&config)?, &input_dir, &config.import, workers)?;
            report("models", &summary)?;
        }
        Commands::ExportExperiment {
            experiment,
            output_dir,
            copy_artifacts,
        } => {
            let mut exporter = ExperimentExporter::new(source(&config)?);
            if copy_artifacts {
                exporter = exporter.with_artifacts(Arc::new(LocalArtifactTransfer));
            }
            let record = exporter
                .try_export_experiment(&experiment, &output_dir)
                .with_context(|| format!("export of experiment '{experiment}' failed"))?;
            println!("{}", serde_json::to_string_pretty(&record.info)?);
        }
        Commands::ImportExperiment {
            experiment_name,
            input_dir,
            import_source_tags,
            copy_artifacts,
        } => {
            let source_tags = import_source_tags || config.import.import_source_tags;
            let mut importer = ExperimentImporter::new(destination(&config)?, source_tags);
            if copy_artifacts {
                importer = importer.with_artifacts(Arc::new(LocalArtifactTransfer));
            }
            let imported = importer
                .import_experiment(&experiment_name, &input_dir)
                .with_context(|| format!("import of experiment '{experiment_name}' failed"))?;
            println!("{}", serde_json::to_string_pretty(&imported.runs)?);
            if !imported.failures.is_empty() {
                bail!("{} run(s) failed to import", imported.failures.len());
            }
        }
        Commands::ExportExperiments {
            experiments,
            output_dir,
            workers,
        } => {
            let workers = workers.unwrap_or(config.bulk.workers);
            let summary =
                bulk::export_experiments(&source(&config)?, &experiments, &output_dir, workers)?;
            report("experiments", &summary)?;
        }
        Commands::ImportExperiments {
            input_dir,
            import_source_tags,
            workers,
        } => {
            let workers = workers.unwrap_or(config.bulk.workers);
            let source_tags = import_source_tags || config.import.import_source_tags;
            let summary = bulk::import_experiments(
                &destination(&config)?,
                &input_dir,
                source_tags,
                workers,
            )?;
            report("experiments", &summary)?;
        }
    }

    Ok(())
}
