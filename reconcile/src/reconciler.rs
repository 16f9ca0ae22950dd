//! The reconciliation run.
//!
//! Discovers history, computes and serializes the convergence plan, then asks
//! the generator for a destination file and writes the SQL into it. Everything
//! that can fail without side effects happens before the generator runs.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ReconcileConfig;
use crate::error::{DiscoveryError, ReconcileError, Result};
use crate::generator::{MigrationFileGenerator, generator_from_config};
use crate::history::{History, scan_history};
use crate::plan::ConvergencePlan;
use crate::source::{DeclarationFiles, TriggerRegistry, TriggerSource};

/// A computed but unwritten migration.
#[derive(Debug, Clone)]
pub struct PlannedMigration {
    pub history: History,
    pub plan: ConvergencePlan,
    /// The plan serialized as literal SQL.
    pub sql: String,
}

/// Outcome of a reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// File written, or `None` when there was nothing to converge.
    pub artifact: Option<PathBuf>,
    /// Trigger names found in prior artifacts.
    pub historical: Vec<String>,
    /// Trigger names recreated by this run.
    pub current: Vec<String>,
    /// Top-level statements written.
    pub statement_count: usize,
}

/// Converges the migration directory's trigger history to a registry.
pub struct Reconciler {
    migrations_dir: PathBuf,
    generator: Box<dyn MigrationFileGenerator>,
}

impl Reconciler {
    pub fn new(
        migrations_dir: impl Into<PathBuf>,
        generator: Box<dyn MigrationFileGenerator>,
    ) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
            generator,
        }
    }

    pub fn from_config(config: &ReconcileConfig) -> Result<Self> {
        Ok(Self::new(
            config.migrations.clone(),
            generator_from_config(&config.generator)?,
        ))
    }

    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    /// Computes the migration without touching the filesystem.
    pub fn plan(&self, registry: &TriggerRegistry) -> Result<PlannedMigration> {
        let history = scan_history(&self.migrations_dir)?;
        debug!(
            dir = %self.migrations_dir.display(),
            files = history.files.len(),
            historical = history.names.len(),
            "discovered trigger history"
        );
        let plan = ConvergencePlan::compute(&history.names, registry.specs())?;
        let sql = plan.render()?;
        Ok(PlannedMigration { history, plan, sql })
    }

    /// Runs the reconciliation, consuming the registry.
    ///
    /// # Errors
    ///
    /// Fails without creating a file when discovery, compilation or
    /// serialization fails. A destination that is a prior artifact or
    /// already has content is rejected untouched. Fails after the generator
    /// created a file only when the write itself fails, in which case the
    /// file is removed.
    pub fn run(&self, registry: TriggerRegistry) -> Result<ReconcileReport> {
        let planned = self.plan(&registry)?;
        let current = registry.names();

        if planned.plan.is_empty() {
            warn!(
                dir = %self.migrations_dir.display(),
                "no historical or declared triggers; skipping migration file"
            );
            return Ok(ReconcileReport {
                artifact: None,
                historical: planned.history.names,
                current,
                statement_count: 0,
            });
        }

        let artifact = self.generator.create_file(&self.migrations_dir)?;
        if is_prior_artifact(&artifact, &planned.history) {
            return Err(DiscoveryError::ExistingArtifact(artifact).into());
        }
        if fs::metadata(&artifact).is_ok_and(|meta| meta.is_file() && meta.len() != 0) {
            return Err(DiscoveryError::NotEmpty(artifact).into());
        }
        if let Err(source) = fs::write(&artifact, &planned.sql) {
            if let Err(err) = fs::remove_file(&artifact) {
                warn!(file = %artifact.display(), error = %err, "failed to remove unwritten migration file");
            }
            return Err(ReconcileError::WriteError {
                path: artifact,
                source,
            });
        }

        let statement_count = planned.plan.statement_count();
        info!(
            file = %artifact.display(),
            dropped = planned.history.names.len(),
            recreated = current.len(),
            statements = statement_count,
            "wrote trigger migration"
        );
        Ok(ReconcileReport {
            artifact: Some(artifact),
            historical: planned.history.names,
            current,
            statement_count,
        })
    }
}

fn is_prior_artifact(artifact: &Path, history: &History) -> bool {
    let Ok(artifact) = artifact.canonicalize() else {
        return false;
    };
    history
        .files
        .iter()
        .filter_map(|file| file.canonicalize().ok())
        .any(|file| file == artifact)
}

/// Loads the registry named by a configuration.
pub fn load_registry(config: &ReconcileConfig) -> Result<TriggerRegistry> {
    let declarations = DeclarationFiles::new(config.schema.iter().cloned());
    let specs = declarations.load()?;
    let mut registry = TriggerRegistry::new();
    registry.extend(specs)?;
    info!(triggers = registry.len(), "loaded trigger declarations");
    Ok(registry)
}

/// Loads declarations and runs one reconciliation as configured.
pub fn reconcile(config: &ReconcileConfig) -> Result<ReconcileReport> {
    let registry = load_registry(config)?;
    Reconciler::from_config(config)?.run(registry)
}
