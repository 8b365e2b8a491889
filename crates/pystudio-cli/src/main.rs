//! Command-line front end: run a Python file, grade it against lesson tests,
//! or check that an interpreter can be started.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use pystudio_core::{
    ConfigLoader, Engine, ExecutionRequest, ExecutionResult, PythonLauncher, StudioConfig,
    TestOutcome,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

mod lesson;

#[derive(Parser, Debug)]
#[clap(name = "pystudio", author, version, about = "Run and grade Python lesson code")]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    /// YAML configuration file (defaults to ./pystudio.yaml when present)
    #[clap(long, short, global = true)]
    config: Option<PathBuf>,

    /// Overrides the level from the configuration file
    #[clap(long, short, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a program and print what it wrote
    Run {
        file: PathBuf,

        #[clap(long = "input", short, help = "Queued answer for input() (repeatable)")]
        inputs: Vec<String>,

        #[clap(long, help = "Print the result as JSON")]
        json: bool,
    },
    /// Grade a program against acceptance tests
    Test {
        file: PathBuf,

        #[clap(long, short, help = "YAML or JSON file with the tests")]
        tests: PathBuf,

        #[clap(long, help = "Section index when the tests file is a whole lesson")]
        section: Option<usize>,

        #[clap(long = "input", short, help = "Queued answer for input() (repeatable)")]
        inputs: Vec<String>,

        #[clap(long, help = "Print the outcomes as JSON")]
        json: bool,
    },
    /// Start the interpreter and report its version
    Doctor,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = ConfigLoader::from_optional_file(cli.config.as_deref()).await?;

    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    let log_level_filter = level.parse().unwrap_or(LevelFilter::Warn);
    env_logger::Builder::new()
        .filter_level(log_level_filter)
        .init();

    match cli.command {
        Commands::Run { file, inputs, json } => run_file(&config, &file, inputs, json).await,
        Commands::Test {
            file,
            tests,
            section,
            inputs,
            json,
        } => test_file(&config, &file, &tests, section, inputs, json).await,
        Commands::Doctor => doctor(&config).await,
    }
}

async fn read_source(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

async fn run_file(
    config: &StudioConfig,
    file: &Path,
    inputs: Vec<String>,
    json: bool,
) -> Result<ExitCode> {
    let source = read_source(file).await?;
    let engine = Engine::from_config(config);
    let result = engine
        .run(&ExecutionRequest::new(source).with_inputs(inputs))
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_run(&result);
    }
    Ok(if result.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_run(result: &ExecutionResult) {
    print!("{}", result.stdout);
    eprint!("{}", result.stderr);
    if let Some(error) = &result.error {
        eprintln!("{}", error);
    }
    log::info!("Finished in {} ms", result.duration_ms);
}

async fn test_file(
    config: &StudioConfig,
    file: &Path,
    tests_path: &Path,
    section: Option<usize>,
    inputs: Vec<String>,
    json: bool,
) -> Result<ExitCode> {
    let source = read_source(file).await?;
    let tests = lesson::load_tests(tests_path, section).await?;
    if tests.is_empty() {
        log::warn!("{} contains no tests", tests_path.display());
    }

    let engine = Engine::from_config(config);
    let outcomes = engine.grade(&source, &tests, &inputs).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
    } else {
        print_outcomes(&outcomes);
    }
    Ok(if outcomes.iter().all(|o| o.passed) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_outcomes(outcomes: &[TestOutcome]) {
    for outcome in outcomes {
        let points = outcome
            .points
            .map(|p| format!(" ({} pts)", p))
            .unwrap_or_default();
        if outcome.passed {
            println!("PASS {}{}", outcome.name, points);
        } else {
            println!("FAIL {}{}: {}", outcome.name, points, outcome.message);
        }
    }

    let passed = outcomes.iter().filter(|o| o.passed).count();
    let earned: f64 = outcomes
        .iter()
        .filter(|o| o.passed)
        .filter_map(|o| o.points)
        .sum();
    let available: f64 = outcomes.iter().filter_map(|o| o.points).sum();
    if available > 0.0 {
        println!(
            "\n{}/{} passed, {}/{} points",
            passed,
            outcomes.len(),
            earned,
            available
        );
    } else {
        println!("\n{}/{} passed", passed, outcomes.len());
    }
}

async fn doctor(config: &StudioConfig) -> Result<ExitCode> {
    let launcher = PythonLauncher::from_config(config);
    let python = launcher.resolve_python()?;
    println!("interpreter: {}", python.display());

    let engine = Engine::from_config(config);
    let version = engine.warm_up().await?;
    println!("version:     {}", version);

    let result = engine
        .run(&ExecutionRequest::new("print('ok')"))
        .await?;
    if result.stdout == "ok\n" {
        println!("sandbox:     ok ({} ms)", result.duration_ms);
        Ok(ExitCode::SUCCESS)
    } else {
        println!("sandbox:     unexpected output {:?}", result.stdout);
        Ok(ExitCode::FAILURE)
    }
}
