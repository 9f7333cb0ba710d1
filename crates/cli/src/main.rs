//! `automation` CLI entry-point.
//!
//! Available sub-commands:
//! - `validate` — check a script and print its diagnostics.
//! - `tokens`   — dump the token stream of a script.
//! - `run`      — run a script against an echo command registry.
//! - `convert`  — print the workflow generated from a script.
//! - `execute`  — run an exported workflow JSON file.
//! - `serve`    — start the API server.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use clap::{Parser, Subcommand};
use engine::{AutomationEngine, Context, EngineConfig, ExecutionOrder, Script, TemplateCatalog};
use nodes::{BehaviorTable, CommandError, CommandRegistry, FnCommand};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Commands the built-in node behaviours forward to.
const FORWARDED_COMMANDS: &[&str] = &["switchScene", "playSound", "showAlert", "speak"];

#[derive(Parser)]
#[command(name = "automation", about = "Stream automation scripting and workflow engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a script file and print its diagnostics.
    Validate {
        path: PathBuf,
    },
    /// Print the tokens of a script file.
    Tokens {
        path: PathBuf,
    },
    /// Run a script. Commands are echoed to stdout instead of executed.
    Run {
        path: PathBuf,
        /// Deliver this event instead of running every rule once.
        #[arg(long)]
        event: Option<String>,
        /// Context entry, repeatable.
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        set: Vec<(String, String)>,
    },
    /// Convert a script's first rule to workflow JSON.
    Convert {
        path: PathBuf,
    },
    /// Execute an exported workflow JSON file.
    Execute {
        path: PathBuf,
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        set: Vec<(String, String)>,
        /// Run nodes in connection order instead of stored order.
        #[arg(long)]
        topological: bool,
    },
    /// Start the REST API server.
    Serve {
        #[arg(long, env = "AUTOMATION_BIND", default_value = "127.0.0.1:8080")]
        bind: String,
        /// Persist scripts and workflows here; in-memory when omitted.
        #[arg(long, env = "AUTOMATION_DATA_DIR")]
        data_dir: Option<PathBuf>,
        /// Run workflow nodes in connection order instead of stored order.
        #[arg(long, env = "AUTOMATION_TOPOLOGICAL")]
        topological: bool,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    Ok((key.trim().to_owned(), value.to_owned()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Validate { path } => validate(&path),
        Command::Tokens { path } => {
            for token in dsl::tokenize(&read(&path)?) {
                println!("{}:{}\t{:?}\t{}", token.line, token.column, token.kind, token.value);
            }
            Ok(())
        }
        Command::Run { path, event, set } => run(&path, event, set.into_iter().collect()).await,
        Command::Convert { path } => {
            let script = Script::new(file_name(&path), read(&path)?);
            let workflow = engine::convert_to_workflow(&script, &TemplateCatalog::builtin())
                .with_context(|| format!("cannot convert {}", path.display()))?;
            println!("{}", serde_json::to_string_pretty(&workflow)?);
            Ok(())
        }
        Command::Execute { path, set, topological } => {
            execute(&path, set.into_iter().collect(), engine_config(None, topological)).await
        }
        Command::Serve {
            bind,
            data_dir,
            topological,
        } => {
            let engine = open_engine(engine_config(data_dir, topological)).await?;

            info!("Starting API server on {bind}");
            api::serve(&bind, engine).await.context("API server failed")?;
            Ok(())
        }
    }
}

fn engine_config(data_dir: Option<PathBuf>, topological: bool) -> EngineConfig {
    let mut config = EngineConfig {
        data_dir,
        ..Default::default()
    };
    if topological {
        config.executor.order = ExecutionOrder::Topological;
    }
    config
}

async fn open_engine(config: EngineConfig) -> Result<AutomationEngine> {
    AutomationEngine::open(
        config,
        echo_registry(FORWARDED_COMMANDS.iter().copied()),
        BehaviorTable::builtin(),
        TemplateCatalog::builtin(),
    )
    .await
    .context("failed to open the automation engine")
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("cannot read file {}", path.display()))
}

fn file_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "script".to_owned())
}

/// A registry whose handlers print the call and return `null`.
fn echo_registry<'a>(names: impl IntoIterator<Item = &'a str>) -> CommandRegistry {
    let mut registry = CommandRegistry::new();
    for name in names {
        let label = name.to_owned();
        registry.register(
            name,
            Arc::new(FnCommand(move |args: &[Value]| {
                let args: Vec<String> = args.iter().map(Value::to_string).collect();
                println!("{}({})", label, args.join(", "));
                Ok::<_, CommandError>(Value::Null)
            })),
        );
    }
    registry
}

fn validate(path: &Path) -> Result<()> {
    let diagnostics = dsl::validate(&read(path)?);
    if diagnostics.is_empty() {
        println!("✅ {} is valid", path.display());
        return Ok(());
    }
    for d in &diagnostics {
        eprintln!("{}:{}:{}: {:?}: {}", path.display(), d.line, d.column, d.severity, d.message);
    }
    bail!("{} has {} error(s)", path.display(), diagnostics.len())
}

async fn run(path: &Path, event: Option<String>, context: Context) -> Result<()> {
    let code = read(path)?;
    let program = dsl::compile(&code)
        .map_err(|d| {
            let reason = d.first().map(|d| d.message.as_str()).unwrap_or_default();
            anyhow::anyhow!("{} does not compile: {}", path.display(), reason)
        })?;

    let commands = program
        .commands()
        .into_iter()
        .filter(|c| !dsl::BUILTIN_COMMANDS.contains(c));
    let engine = AutomationEngine::in_memory(echo_registry(commands));
    let script = engine.scripts().create(file_name(path), code).await?;

    let runs = match event {
        Some(name) => engine.handle_event(&name, context).await.script_runs,
        None => engine.run_script(script.id, &context).await?,
    };
    if runs.is_empty() {
        println!("no rule matched");
    }
    for run in &runs {
        println!("rule #{}: {}", run.rule_index, serde_json::to_string(&run.result)?);
    }
    if let Some(failed) = runs.iter().find_map(|r| r.result.error.as_ref()) {
        bail!("{failed}");
    }
    Ok(())
}

async fn execute(path: &Path, context: Context, config: EngineConfig) -> Result<()> {
    let engine = open_engine(config).await?;
    let Some(workflow) = engine.import_workflow(&read(path)?).await else {
        bail!("{} is not a workflow export", path.display());
    };

    let execution = engine.execute_workflow(workflow.id, &context).await?;
    println!("{}", serde_json::to_string_pretty(&execution)?);
    if let Some(error) = &execution.error {
        bail!("execution failed: {error}");
    }
    Ok(())
}
