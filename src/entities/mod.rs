//! Tracking-server data model
//!
//! ## Schema Overview
//!
//! ```text
//! Experiment (1) ──< Run (N) >── (0..N) ModelVersion >── (1) RegisteredModel
//! ```
//!
//! Every `ModelVersion` references exactly one `Run`; a run may back any
//! number of versions. None of the server-assigned identifiers
//! (`experiment_id`, `run_id`, `version`) are portable between servers.
//!
//! ## Usage
//!
//! ```rust
//! use mlflow_migrate::entities::{Experiment, ModelVersion, Run, Stage};
//!
//! let experiment = Experiment::new("1", "churn");
//! let run = Run::builder("abc", &experiment.experiment_id)
//!     .param("lr", "0.01")
//!     .build();
//! let version = ModelVersion::new("churn-model", "1", run.run_id(), "runs:/abc/model")
//!     .with_stage(Stage::Production);
//! assert_eq!(version.version_number(), Some(1));
//! ```

mod experiment;
mod model;
mod run;
mod stage;

pub use experiment::{Experiment, ExperimentBuilder, LifecycleStage};
pub use model::{ModelVersion, RegisteredModel};
pub use run::{Metric, Run, RunBuilder, RunData, RunInfo, RunStatus};
pub use stage::Stage;
