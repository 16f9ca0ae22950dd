//! Migration-file generators.
//!
//! A generator creates one new, empty, chronologically named file inside the
//! migration directory and returns its path. The reconciler writes the
//! convergence SQL into that file and nowhere else.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::LazyLock;
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{NaiveDateTime, TimeDelta, Utc};
use regex::Regex;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

use crate::config::{CommandGeneratorConfig, GeneratorConfig, TimestampGeneratorConfig};
use crate::error::DiscoveryError;

static ANSI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").expect("static regex must compile")
});

static TIMESTAMP_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{14})_").expect("static regex must compile"));

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";
const MAX_CREATE_ATTEMPTS: usize = 16;

/// Creates the destination file for a new migration artifact.
pub trait MigrationFileGenerator {
    /// Creates an empty file inside `migrations_dir` and returns its path.
    fn create_file(&self, migrations_dir: &Path) -> Result<PathBuf, DiscoveryError>;
}

/// Builds the generator described by `config`.
pub fn generator_from_config(
    config: &GeneratorConfig,
) -> Result<Box<dyn MigrationFileGenerator>, DiscoveryError> {
    let generator: Box<dyn MigrationFileGenerator> = match config {
        GeneratorConfig::Command(command) => Box::new(CommandGenerator::from_config(command)?),
        GeneratorConfig::Timestamp(timestamp) => {
            Box::new(TimestampGenerator::from_config(timestamp))
        }
    };
    Ok(generator)
}

fn strip_ansi(text: &str) -> String {
    ANSI_RE.replace_all(text, "").into_owned()
}

type PipeReader = JoinHandle<(Vec<u8>, std::io::Result<usize>)>;

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<PipeReader> {
    pipe.map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let result = pipe.read_to_end(&mut buf);
            (buf, result)
        })
    })
}

fn collect(reader: Option<PipeReader>, stream: &str) -> String {
    let buf = reader
        .and_then(|t| t.join().ok())
        .map(|(buf, res)| {
            if let Err(e) = res {
                debug!(stream, error = %e, "failed to read generator output");
            }
            buf
        })
        .unwrap_or_default();
    strip_ansi(&String::from_utf8_lossy(&buf))
}

/// Runs an external program that creates the file and reports its path.
///
/// The program's stdout is matched against an output pattern whose first
/// capture group is the created file's path, relative to the working
/// directory unless absolute.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    output_pattern: Regex,
    working_dir: Option<PathBuf>,
}

impl CommandGenerator {
    /// # Errors
    ///
    /// Returns [`DiscoveryError::InvalidInput`] if the output pattern is not
    /// a valid regex.
    pub fn from_config(config: &CommandGeneratorConfig) -> Result<Self, DiscoveryError> {
        let output_pattern = Regex::new(&config.output_pattern).map_err(|err| {
            DiscoveryError::InvalidInput(format!(
                "invalid generator output pattern '{}': {err}",
                config.output_pattern
            ))
        })?;
        Ok(Self {
            program: config.program.clone(),
            args: config.args.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            output_pattern,
            working_dir: config.working_dir.clone(),
        })
    }

    /// `bunx --bun drizzle-kit generate --custom` in the current directory.
    pub fn drizzle_kit() -> Self {
        Self {
            program: "bunx".to_string(),
            args: ["--bun", "drizzle-kit", "generate", "--custom"]
                .into_iter()
                .map(String::from)
                .collect(),
            timeout: Duration::from_secs(crate::config::DEFAULT_GENERATOR_TIMEOUT_SECS),
            output_pattern: Regex::new(crate::config::DEFAULT_OUTPUT_PATTERN)
                .expect("static regex must compile"),
            working_dir: None,
        }
    }

    fn working_dir(&self) -> Result<PathBuf, DiscoveryError> {
        match &self.working_dir {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir().map_err(|source| DiscoveryError::Spawn {
                program: self.program.clone(),
                source,
            }),
        }
    }

    /// Runs the program to completion and returns its stdout.
    fn run(&self, working_dir: &Path) -> Result<String, DiscoveryError> {
        debug!(
            program = %self.program,
            args = ?self.args,
            dir = %working_dir.display(),
            "running migration generator"
        );
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| DiscoveryError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // Drain both pipes so a chatty child cannot block on a full buffer.
        let stdout_thread = drain(child.stdout.take());
        let stderr_thread = drain(child.stderr.take());

        let status = match child.wait_timeout(self.timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                warn!(
                    program = %self.program,
                    timeout_secs = self.timeout.as_secs(),
                    "migration generator timed out, killing process"
                );
                let _ = child.kill();
                let _ = child.wait();
                return Err(DiscoveryError::Timeout(self.timeout));
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(DiscoveryError::Wait(e));
            }
        };

        let stdout = collect(stdout_thread, "stdout");
        let stderr = collect(stderr_thread, "stderr");

        if !status.success() {
            return Err(DiscoveryError::GeneratorFailed {
                status: status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }
        if !stderr.trim().is_empty() {
            warn!(program = %self.program, stderr = %stderr.trim(), "migration generator wrote to stderr");
        }
        Ok(stdout)
    }

    /// Extracts the reported path from generator output.
    pub fn reported_path(&self, output: &str) -> Option<PathBuf> {
        output.lines().find_map(|line| {
            self.output_pattern
                .captures(line)
                .and_then(|caps| caps.get(1))
                .map(|m| PathBuf::from(m.as_str()))
        })
    }
}

impl MigrationFileGenerator for CommandGenerator {
    fn create_file(&self, migrations_dir: &Path) -> Result<PathBuf, DiscoveryError> {
        let working_dir = self.working_dir()?;
        let stdout = self.run(&working_dir)?;

        let reported = self
            .reported_path(&stdout)
            .ok_or_else(|| DiscoveryError::UnparseableOutput {
                output: stdout.trim().to_string(),
            })?;
        let file = if reported.is_absolute() {
            reported
        } else {
            working_dir.join(reported)
        };

        let canonical_file = file
            .canonicalize()
            .map_err(|_| DiscoveryError::MissingFile(file.clone()))?;
        if !canonical_file.is_file() {
            return Err(DiscoveryError::MissingFile(file));
        }
        let canonical_dir =
            migrations_dir
                .canonicalize()
                .map_err(|source| DiscoveryError::MigrationDir {
                    path: migrations_dir.to_path_buf(),
                    source,
                })?;
        if !canonical_file.starts_with(&canonical_dir) {
            return Err(DiscoveryError::OutsideMigrationDir {
                file,
                migrations: migrations_dir.to_path_buf(),
            });
        }
        let len = fs::metadata(&canonical_file)
            .map_err(|_| DiscoveryError::MissingFile(file.clone()))?
            .len();
        if len != 0 {
            return Err(DiscoveryError::NotEmpty(file));
        }

        debug!(file = %file.display(), "migration generator created file");
        Ok(file)
    }
}

/// Creates `<YYYYMMDDHHMMSS>_<suffix>.sql` directly.
///
/// The timestamp is the current UTC time, or one second after the newest
/// timestamped artifact when that is later, so new files always sort last.
#[derive(Debug, Clone)]
pub struct TimestampGenerator {
    suffix: String,
}

impl Default for TimestampGenerator {
    fn default() -> Self {
        Self::from_config(&TimestampGeneratorConfig::default())
    }
}

impl TimestampGenerator {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
        }
    }

    pub fn from_config(config: &TimestampGeneratorConfig) -> Self {
        Self::new(config.suffix.clone())
    }

    /// Latest timestamp prefix among files in `dir`.
    fn latest_timestamp(dir: &Path) -> Result<Option<NaiveDateTime>, DiscoveryError> {
        let entries = fs::read_dir(dir).map_err(|source| DiscoveryError::MigrationDir {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut latest = None;
        for entry in entries {
            let entry = entry.map_err(|source| DiscoveryError::MigrationDir {
                path: dir.to_path_buf(),
                source,
            })?;
            let name = entry.file_name();
            let Some(caps) = name.to_str().and_then(|n| TIMESTAMP_PREFIX_RE.captures(n)) else {
                continue;
            };
            if let Ok(ts) = NaiveDateTime::parse_from_str(&caps[1], TIMESTAMP_FORMAT) {
                latest = latest.max(Some(ts));
            }
        }
        Ok(latest)
    }

    /// Creates the file as if the current time were `now`.
    pub fn create_file_at(
        &self,
        migrations_dir: &Path,
        now: NaiveDateTime,
    ) -> Result<PathBuf, DiscoveryError> {
        fs::create_dir_all(migrations_dir).map_err(|source| DiscoveryError::MigrationDir {
            path: migrations_dir.to_path_buf(),
            source,
        })?;

        let mut stamp = match Self::latest_timestamp(migrations_dir)? {
            Some(latest) if latest >= now => latest + TimeDelta::seconds(1),
            _ => now,
        };

        for _ in 0..MAX_CREATE_ATTEMPTS {
            let path = migrations_dir.join(format!(
                "{}_{}.sql",
                stamp.format(TIMESTAMP_FORMAT),
                self.suffix
            ));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => {
                    debug!(file = %path.display(), "created migration file");
                    return Ok(path);
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    stamp += TimeDelta::seconds(1);
                }
                Err(source) => return Err(DiscoveryError::CreateFile { path, source }),
            }
        }

        Err(DiscoveryError::CreateFile {
            path: migrations_dir.to_path_buf(),
            source: std::io::Error::new(
                ErrorKind::AlreadyExists,
                "no free timestamped file name",
            ),
        })
    }
}

impl MigrationFileGenerator for TimestampGenerator {
    fn create_file(&self, migrations_dir: &Path) -> Result<PathBuf, DiscoveryError> {
        self.create_file_at(migrations_dir, Utc::now().naive_utc())
    }
}
