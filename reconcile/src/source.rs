//! Declaration files and the trigger registry.
//!
//! Declarations are YAML (`.yaml`/`.yml`) or JSON (`.json`) documents that
//! list tables and the triggers defined on them. Tables are shared across
//! every file loaded in one run, so a trigger may reference a table declared
//! in a sibling file.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use trigger_migrate_core::{
    Expr, Operation, Statement, Table, Timing, TriggerSpec, ValidationError,
};

use crate::error::{DiscoveryError, Result};

const DECLARATION_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// One declaration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeclarationFile {
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub triggers: Vec<TriggerDecl>,
}

/// A trigger as written in a declaration file.
///
/// Fields stay optional so that incomplete entries are reported as
/// validation errors naming the trigger rather than as parse errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TriggerDecl {
    pub name: Option<String>,
    pub operation: Option<Operation>,
    pub timing: Option<Timing>,
    /// Name of a table declared in any loaded file.
    pub table: Option<String>,
    #[serde(rename = "of", default, skip_serializing_if = "Option::is_none")]
    pub of_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<Expr>,
    pub action: Option<Statement>,
}

impl TriggerDecl {
    /// Resolves the table reference and validates the declaration.
    pub fn resolve(self, tables: &BTreeMap<String, Table>) -> Result<TriggerSpec> {
        let name = self.name.unwrap_or_default();
        let mut builder = TriggerSpec::builder(name.clone());
        builder.operation = self.operation;
        builder.timing = self.timing;
        builder.of_column = self.of_column;
        builder.when = self.when;
        builder.action = self.action;
        if let Some(table_name) = self.table {
            let table = tables.get(&table_name).cloned().ok_or_else(|| {
                ValidationError::UnknownTable {
                    trigger: name.clone(),
                    table: table_name.clone(),
                }
            })?;
            builder.table = Some(table);
        }
        Ok(builder.build()?)
    }
}

/// Parses one declaration file by extension.
pub fn parse_declaration_file(path: &Path) -> Result<DeclarationFile> {
    let content = fs::read_to_string(path).map_err(|source| DiscoveryError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed = if path.extension() == Some(OsStr::new("json")) {
        serde_json::from_str(&content).map_err(|err| err.to_string())
    } else {
        serde_yaml::from_str(&content).map_err(|err| err.to_string())
    };
    parsed.map_err(|message| {
        DiscoveryError::Parse {
            path: path.to_path_buf(),
            message,
        }
        .into()
    })
}

fn is_declaration_file(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| DECLARATION_EXTENSIONS.contains(&ext))
}

/// Expands files and directories into a sorted, de-duplicated list of
/// declaration files.
///
/// Directories contribute their direct children with a declaration
/// extension. Explicit files must have one.
pub fn collect_declaration_paths(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    if inputs.is_empty() {
        return Err(
            DiscoveryError::InvalidInput("No declaration paths were provided".to_string()).into(),
        );
    }

    let mut paths = BTreeSet::new();

    for input in inputs {
        if input.is_dir() {
            let entries = fs::read_dir(input).map_err(|source| DiscoveryError::ReadFile {
                path: input.clone(),
                source,
            })?;

            for entry in entries {
                let entry = entry.map_err(|source| DiscoveryError::ReadFile {
                    path: input.clone(),
                    source,
                })?;
                let path = entry.path();
                if path.is_file() && is_declaration_file(&path) {
                    paths.insert(path);
                }
            }
            continue;
        }

        if input.is_file() {
            if !is_declaration_file(input) {
                return Err(DiscoveryError::InvalidInput(format!(
                    "Declaration file '{}' must end in .yaml, .yml or .json",
                    input.display()
                ))
                .into());
            }
            paths.insert(input.clone());
            continue;
        }

        return Err(DiscoveryError::InvalidInput(format!(
            "Declaration path '{}' does not exist",
            input.display(),
        ))
        .into());
    }

    Ok(paths.into_iter().collect())
}

/// Anything that can contribute trigger specs to a registry.
pub trait TriggerSource {
    fn load(&self) -> Result<Vec<TriggerSpec>>;
}

impl TriggerSource for Vec<TriggerSpec> {
    fn load(&self) -> Result<Vec<TriggerSpec>> {
        Ok(self.clone())
    }
}

/// Declaration files and directories loaded together.
#[derive(Debug, Clone)]
pub struct DeclarationFiles {
    inputs: Vec<PathBuf>,
}

impl DeclarationFiles {
    pub fn new(inputs: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
        }
    }

    /// Parses every file in sorted path order and merges their tables.
    fn read(&self) -> Result<(Vec<DeclarationFile>, BTreeMap<String, Table>)> {
        let paths = collect_declaration_paths(&self.inputs)?;
        let mut files = Vec::with_capacity(paths.len());
        for path in &paths {
            let file = parse_declaration_file(path)?;
            debug!(
                path = %path.display(),
                tables = file.tables.len(),
                triggers = file.triggers.len(),
                "loaded declaration file"
            );
            files.push(file);
        }

        let mut tables: BTreeMap<String, Table> = BTreeMap::new();
        for table in files.iter().flat_map(|file| file.tables.iter()) {
            match tables.get(&table.name) {
                Some(existing) if existing != table => {
                    return Err(ValidationError::ConflictingTable(table.name.clone()).into());
                }
                Some(_) => {}
                None => {
                    tables.insert(table.name.clone(), table.clone());
                }
            }
        }
        Ok((files, tables))
    }

    /// Every declared table, sorted by name.
    pub fn tables(&self) -> Result<Vec<Table>> {
        let (_, tables) = self.read()?;
        Ok(tables.into_values().collect())
    }
}

impl TriggerSource for DeclarationFiles {
    /// Resolves triggers in file order, then declaration order, against the
    /// tables of all files.
    fn load(&self) -> Result<Vec<TriggerSpec>> {
        let (files, tables) = self.read()?;
        files
            .into_iter()
            .flat_map(|file| file.triggers)
            .map(|decl| decl.resolve(&tables))
            .collect()
    }
}

/// The current trigger set of one run, in registration order.
///
/// Names are unique; registering a second trigger with a taken name fails.
#[derive(Debug, Clone, Default)]
pub struct TriggerRegistry {
    specs: Vec<TriggerSpec>,
    names: HashSet<String>,
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from several sources, in order.
    pub fn from_sources(sources: &[&dyn TriggerSource]) -> Result<Self> {
        let mut registry = Self::new();
        for source in sources {
            registry.extend(source.load()?)?;
        }
        Ok(registry)
    }

    /// Adds one trigger.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::DuplicateTrigger`] when the name is taken.
    pub fn register(&mut self, spec: TriggerSpec) -> std::result::Result<(), ValidationError> {
        if !self.names.insert(spec.name().to_string()) {
            return Err(ValidationError::DuplicateTrigger(spec.name().to_string()));
        }
        self.specs.push(spec);
        Ok(())
    }

    pub fn extend(&mut self, specs: impl IntoIterator<Item = TriggerSpec>) -> Result<()> {
        for spec in specs {
            self.register(spec)?;
        }
        Ok(())
    }

    pub fn specs(&self) -> &[TriggerSpec] {
        &self.specs
    }

    pub fn names(&self) -> Vec<String> {
        self.specs.iter().map(|s| s.name().to_string()).collect()
    }

    /// Tables referenced by registered triggers, in first-use order.
    pub fn tables(&self) -> Vec<&Table> {
        let mut seen = HashSet::new();
        self.specs
            .iter()
            .map(TriggerSpec::table)
            .filter(|table| seen.insert(table.name.as_str()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn into_specs(self) -> Vec<TriggerSpec> {
        self.specs
    }
}
