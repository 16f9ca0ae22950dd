use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use trigger_migrate_reconcile::{
    CommandGeneratorConfig, ConvergencePlan, DEFAULT_CONFIG_FILE, DeclarationFiles,
    GeneratorConfig, ReconcileConfig, Reconciler, load_registry, migration_files, reconcile,
    scan_history,
};
use trigger_migrate_sqlite::verify_idempotence;

/// Generator choice for `init`.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliGenerator {
    /// Create timestamped files directly.
    Timestamp,
    /// Run `bunx --bun drizzle-kit generate --custom`.
    DrizzleKit,
}

impl From<CliGenerator> for GeneratorConfig {
    fn from(generator: CliGenerator) -> Self {
        match generator {
            CliGenerator::Timestamp => Self::default(),
            CliGenerator::DrizzleKit => Self::Command(CommandGeneratorConfig::drizzle_kit()),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "trigger-migrate")]
#[command(about = "Compile declared triggers into idempotent, converging SQL migrations")]
#[command(version)]
struct Cli {
    /// Configuration file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Increase log verbosity (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write a starter configuration file.
    Init(InitArgs),
    /// Reconcile and write a new migration file.
    Generate,
    /// Print the migration SQL without writing anything.
    Plan,
    /// List trigger names created by existing migration files.
    History(HistoryArgs),
    /// Validate and compile every declared trigger.
    Check,
    /// Apply the plan twice to a scratch SQLite database and compare.
    Verify(VerifyArgs),
}

#[derive(Debug, Args)]
struct InitArgs {
    /// Declaration file or directory, relative to the config file.
    #[arg(long, default_value = "triggers")]
    schema: PathBuf,
    /// Migration directory, relative to the config file.
    #[arg(long, default_value = "migrations")]
    migrations: PathBuf,
    /// How new migration files are created.
    #[arg(long, default_value = "timestamp")]
    generator: CliGenerator,
    /// Overwrite an existing configuration file.
    #[arg(long)]
    force: bool,
}

#[derive(Debug, Args)]
struct HistoryArgs {
    /// Output as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct VerifyArgs {
    /// Apply existing migration files before the plan.
    #[arg(long)]
    with_history: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Command::Init(args) => run_init(&cli.config, args),
        Command::Generate => run_generate(&cli.config),
        Command::Plan => run_plan(&cli.config),
        Command::History(args) => run_history(&cli.config, args),
        Command::Check => run_check(&cli.config),
        Command::Verify(args) => run_verify(&cli.config, args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}

fn load_config(path: &Path) -> Result<ReconcileConfig, String> {
    let config = ReconcileConfig::load(path)
        .map_err(|e| format!("Failed to load config '{}': {e}", path.display()))?;
    debug!(config = %path.display(), migrations = %config.migrations.display(), "loaded configuration");
    Ok(config)
}

fn run_init(config_path: &Path, args: InitArgs) -> Result<(), String> {
    if config_path.exists() && !args.force {
        return Err(format!(
            "'{}' already exists (use --force to overwrite)",
            config_path.display()
        ));
    }

    let mut config = ReconcileConfig::new(vec![args.schema.clone()], args.migrations);
    config.generator = args.generator.into();
    config
        .save(config_path)
        .map_err(|e| format!("Failed to write '{}': {e}", config_path.display()))?;

    let base = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let schema_dir = base.join(&args.schema);
    if args.schema.extension().is_none() {
        fs::create_dir_all(&schema_dir).map_err(|err| {
            format!(
                "Failed to create declaration directory '{}': {err}",
                schema_dir.display()
            )
        })?;
    }

    println!("Wrote '{}'.", config_path.display());
    Ok(())
}

fn run_generate(config_path: &Path) -> Result<(), String> {
    let config = load_config(config_path)?;
    let report = reconcile(&config).map_err(|e| e.to_string())?;
    match report.artifact {
        Some(artifact) => println!(
            "Wrote {} statement(s) to '{}' ({} dropped, {} recreated).",
            report.statement_count,
            artifact.display(),
            report.historical.len(),
            report.current.len()
        ),
        None => println!("Nothing to reconcile: no declared or historical triggers."),
    }
    Ok(())
}

fn run_plan(config_path: &Path) -> Result<(), String> {
    let config = load_config(config_path)?;
    let registry = load_registry(&config).map_err(|e| e.to_string())?;
    let planned = Reconciler::from_config(&config)
        .and_then(|reconciler| reconciler.plan(&registry))
        .map_err(|e| e.to_string())?;
    if !planned.sql.is_empty() {
        println!("{}", planned.sql);
    }
    Ok(())
}

fn run_history(config_path: &Path, args: HistoryArgs) -> Result<(), String> {
    let config = load_config(config_path)?;
    let history = scan_history(&config.migrations).map_err(|e| e.to_string())?;
    if args.json {
        let raw = serde_json::to_string_pretty(&history)
            .map_err(|err| format!("Failed to serialize history: {err}"))?;
        println!("{raw}");
    } else {
        for name in &history.names {
            println!("{name}");
        }
    }
    Ok(())
}

fn run_check(config_path: &Path) -> Result<(), String> {
    let config = load_config(config_path)?;
    let registry = load_registry(&config).map_err(|e| e.to_string())?;
    let plan = ConvergencePlan::compute(&[], registry.specs()).map_err(|e| e.to_string())?;
    println!(
        "Checked {} trigger(s); all compile ({} statement(s)).",
        registry.len(),
        plan.statement_count()
    );
    Ok(())
}

fn run_verify(config_path: &Path, args: VerifyArgs) -> Result<(), String> {
    let config = load_config(config_path)?;
    let tables = DeclarationFiles::new(config.schema.iter().cloned())
        .tables()
        .map_err(|e| e.to_string())?;
    let registry = load_registry(&config).map_err(|e| e.to_string())?;
    let planned = Reconciler::from_config(&config)
        .and_then(|reconciler| reconciler.plan(&registry))
        .map_err(|e| e.to_string())?;

    let mut history = Vec::new();
    if args.with_history {
        for file in migration_files(&config.migrations).map_err(|e| e.to_string())? {
            let sql = fs::read_to_string(&file)
                .map_err(|err| format!("Failed to read '{}': {err}", file.display()))?;
            history.push(sql);
        }
    }

    let report = verify_idempotence(&tables, &history, &planned.sql)
        .map_err(|e| format!("Verification failed: {e}"))?;
    if !report.is_idempotent() {
        return Err(format!(
            "applying the plan twice changed the live triggers: {:?} then {:?}",
            report.after_first.iter().map(|t| &t.name).collect::<Vec<_>>(),
            report.trigger_names()
        ));
    }

    println!(
        "Verified {} statement(s); live triggers after repeat apply: {}.",
        report.statements,
        if report.after_second.is_empty() {
            "none".to_string()
        } else {
            report.trigger_names().join(", ")
        }
    );
    Ok(())
}
