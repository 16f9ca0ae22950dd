//! Project configuration for reconciliation runs.
//!
//! Defines the YAML configuration naming the declaration sources, the
//! migration directory and the migration-file generator.
//!
//! # Example YAML
//!
//! ```yaml
//! version: "1.0"
//! schema:
//!   - triggers
//! migrations: migrations
//! generator:
//!   kind: command
//!   program: bunx
//!   args: [--bun, drizzle-kit, generate, --custom]
//!   timeout_secs: 120
//! ```
//!
//! Relative paths are resolved against the directory containing the
//! configuration file.

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default configuration file name looked up by the CLI.
pub const DEFAULT_CONFIG_FILE: &str = "trigger-migrate.yaml";

/// Default generator timeout in seconds.
pub const DEFAULT_GENERATOR_TIMEOUT_SECS: u64 = 120;

/// Default pattern locating the created file in drizzle-kit's output.
pub const DEFAULT_OUTPUT_PATTERN: &str = r"Your SQL migration file.+?(\S+\.sql)";

/// Settings for an external migration-file generator process.
///
/// # Examples
///
/// ```
/// use trigger_migrate_reconcile::CommandGeneratorConfig;
///
/// let drizzle = CommandGeneratorConfig::drizzle_kit();
/// assert_eq!(drizzle.program, "bunx");
/// assert_eq!(drizzle.args, ["--bun", "drizzle-kit", "generate", "--custom"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandGeneratorConfig {
    /// Program to run.
    pub program: String,
    /// Arguments passed to the program.
    #[serde(default)]
    pub args: Vec<String>,
    /// Seconds to wait before killing the process.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Regex with one capture group for the created file's path.
    #[serde(default = "default_output_pattern")]
    pub output_pattern: String,
    /// Directory the program runs in and reported paths are relative to.
    /// Defaults to the configuration file's directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

impl CommandGeneratorConfig {
    /// `bunx --bun drizzle-kit generate --custom`
    pub fn drizzle_kit() -> Self {
        Self {
            program: "bunx".to_string(),
            args: ["--bun", "drizzle-kit", "generate", "--custom"]
                .into_iter()
                .map(String::from)
                .collect(),
            timeout_secs: DEFAULT_GENERATOR_TIMEOUT_SECS,
            output_pattern: DEFAULT_OUTPUT_PATTERN.to_string(),
            working_dir: None,
        }
    }
}

/// Settings for the built-in timestamped file generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampGeneratorConfig {
    /// File name suffix after the timestamp, without extension.
    #[serde(default = "default_suffix")]
    pub suffix: String,
}

impl Default for TimestampGeneratorConfig {
    fn default() -> Self {
        Self {
            suffix: default_suffix(),
        }
    }
}

/// Which generator materializes the new migration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GeneratorConfig {
    /// Run an external program (e.g. drizzle-kit).
    Command(CommandGeneratorConfig),
    /// Create `<YYYYMMDDHHMMSS>_<suffix>.sql` directly.
    Timestamp(TimestampGeneratorConfig),
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self::Timestamp(TimestampGeneratorConfig::default())
    }
}

/// Top-level reconciliation configuration.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use trigger_migrate_reconcile::{GeneratorConfig, ReconcileConfig};
///
/// let yaml = "schema: [triggers]\nmigrations: db/migrations\n";
/// let mut config: ReconcileConfig = serde_yaml::from_str(yaml).unwrap();
/// config.resolve_relative_to(Path::new("/srv/app"));
///
/// assert_eq!(config.schema, [Path::new("/srv/app/triggers")]);
/// assert_eq!(config.migrations, Path::new("/srv/app/db/migrations"));
/// assert!(matches!(config.generator, GeneratorConfig::Timestamp(_)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Configuration format version (e.g., `"1.0"`).
    #[serde(default = "default_version")]
    pub version: String,
    /// Declaration files and/or directories of declaration files.
    pub schema: Vec<PathBuf>,
    /// Directory holding migration artifacts.
    #[serde(default = "default_migrations")]
    pub migrations: PathBuf,
    /// How new migration files are created.
    #[serde(default)]
    pub generator: GeneratorConfig,
}

impl ReconcileConfig {
    /// Creates a configuration with the given sources and migration directory
    /// and the built-in timestamp generator.
    pub fn new(schema: Vec<PathBuf>, migrations: impl Into<PathBuf>) -> Self {
        Self {
            version: default_version(),
            schema,
            migrations: migrations.into(),
            generator: GeneratorConfig::default(),
        }
    }

    /// Loads configuration from a YAML file and resolves relative paths
    /// against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::ReconcileError::IoError) if the file cannot
    /// be read, or [`YamlError`](crate::ReconcileError::YamlError) if parsing
    /// fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let mut config: Self = serde_yaml::from_reader(reader)?;
        let base = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        config.resolve_relative_to(base);
        Ok(config)
    }

    /// Saves the configuration as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::ReconcileError::IoError) if the file cannot
    /// be written, or [`YamlError`](crate::ReconcileError::YamlError) if
    /// serialization fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    /// Makes every relative path absolute with respect to `base`.
    ///
    /// A command generator without a working directory gets `base`.
    pub fn resolve_relative_to(&mut self, base: &Path) {
        let resolve = |p: &Path| {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                base.join(p)
            }
        };
        self.schema = self.schema.iter().map(|p| resolve(p)).collect();
        self.migrations = resolve(&self.migrations);
        if let GeneratorConfig::Command(command) = &mut self.generator {
            command.working_dir = Some(match &command.working_dir {
                Some(dir) => resolve(dir),
                None => base.to_path_buf(),
            });
        }
    }
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_migrations() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_timeout_secs() -> u64 {
    DEFAULT_GENERATOR_TIMEOUT_SECS
}

fn default_output_pattern() -> String {
    DEFAULT_OUTPUT_PATTERN.to_string()
}

fn default_suffix() -> String {
    "triggers".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_yaml() -> &'static str {
        r#"
version: "1.0"
schema:
  - src/db/triggers
  - extra.yaml
migrations: ./migrations
generator:
  kind: command
  program: bunx
  args: [--bun, drizzle-kit, generate, --custom]
  timeout_secs: 30
"#
    }

    #[test]
    fn test_deserialize_command_generator() {
        let config: ReconcileConfig = serde_yaml::from_str(sample_yaml()).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.schema.len(), 2);
        let GeneratorConfig::Command(command) = &config.generator else {
            panic!("expected command generator");
        };
        assert_eq!(command.program, "bunx");
        assert_eq!(command.timeout_secs, 30);
        assert_eq!(command.output_pattern, DEFAULT_OUTPUT_PATTERN);
        assert!(command.working_dir.is_none());
    }

    #[test]
    fn test_deserialize_minimal_uses_defaults() {
        let config: ReconcileConfig = serde_yaml::from_str("schema: [triggers]").unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.migrations, PathBuf::from("migrations"));
        assert_eq!(
            config.generator,
            GeneratorConfig::Timestamp(TimestampGeneratorConfig {
                suffix: "triggers".to_string()
            })
        );
    }

    #[test]
    fn test_deserialize_timestamp_generator_suffix() {
        let yaml = "schema: []\ngenerator:\n  kind: timestamp\n  suffix: sync_triggers\n";
        let config: ReconcileConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            config.generator,
            GeneratorConfig::Timestamp(TimestampGeneratorConfig {
                suffix: "sync_triggers".to_string()
            })
        );
    }

    #[test]
    fn test_unknown_generator_kind_is_rejected() {
        let yaml = "schema: []\ngenerator:\n  kind: magic\n";
        assert!(serde_yaml::from_str::<ReconcileConfig>(yaml).is_err());
    }

    #[test]
    fn test_resolve_relative_paths() {
        let mut config: ReconcileConfig = serde_yaml::from_str(sample_yaml()).unwrap();
        config.resolve_relative_to(Path::new("/project"));
        assert_eq!(
            config.schema,
            vec![
                PathBuf::from("/project/src/db/triggers"),
                PathBuf::from("/project/extra.yaml")
            ]
        );
        assert_eq!(config.migrations, PathBuf::from("/project/./migrations"));
        let GeneratorConfig::Command(command) = &config.generator else {
            panic!("expected command generator");
        };
        assert_eq!(command.working_dir, Some(PathBuf::from("/project")));
    }

    #[test]
    fn test_absolute_paths_are_kept() {
        let mut config = ReconcileConfig::new(vec![PathBuf::from("/abs/triggers")], "/abs/migrations");
        config.resolve_relative_to(Path::new("/elsewhere"));
        assert_eq!(config.schema, vec![PathBuf::from("/abs/triggers")]);
        assert_eq!(config.migrations, PathBuf::from("/abs/migrations"));
    }

    #[test]
    fn test_load_save_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);

        let mut original = ReconcileConfig::new(vec![PathBuf::from("triggers")], "migrations");
        original.generator = GeneratorConfig::Command(CommandGeneratorConfig::drizzle_kit());
        original.save(&path).unwrap();

        let loaded = ReconcileConfig::load(&path).unwrap();
        assert_eq!(loaded.version, original.version);
        assert_eq!(loaded.schema, vec![dir.path().join("triggers")]);
        assert_eq!(loaded.migrations, dir.path().join("migrations"));
        let GeneratorConfig::Command(command) = loaded.generator else {
            panic!("expected command generator");
        };
        assert_eq!(command.args, CommandGeneratorConfig::drizzle_kit().args);
        assert_eq!(command.working_dir, Some(dir.path().to_path_buf()));
    }
}
