#![warn(missing_docs)]

//! # gamecheck-cli
//!
//! Command-line driver for the gamecheck evaluation harness.
//!
//! Evaluates a generated pygame program and prints the result record as JSON.
//!
//! ## Usage
//!
//! ```bash
//! gamecheck evaluate game.py --game tic_tac_toe --mode game-logic
//! gamecheck evaluate - --game snake_game < generated.py
//! gamecheck syntax game.py
//! gamecheck neutralize game.py
//! gamecheck games
//! ```
//!
//! ## Configuration
//!
//! Settings come from `GAMECHECK_CONFIG` or `./gamecheck.toml` when present.
//! Command-line flags take precedence over the file.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gamecheck_config::GamecheckConfig;
use gamecheck_harness::{
    neutralize, EvaluationMode, Evaluator, EvaluatorConfig, GameId, Interpreter, NeutralizerRules,
    ParsedModule, RenderingBackend, RuntimeProbeConfig, SandboxConfig, SyntaxValidator,
};

#[derive(Debug, Parser)]
#[command(name = "gamecheck", version, about = "Evaluate generated pygame programs")]
struct Cli {
    /// Python interpreter (overrides python.interpreter).
    #[arg(long, global = true, env = "GAMECHECK_PYTHON")]
    python: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the full evaluation pipeline and print the result record.
    Evaluate {
        /// Program to evaluate, or `-` for stdin.
        file: PathBuf,
        /// Game the program claims to implement.
        #[arg(long)]
        game: String,
        /// `static` or `game-logic`.
        #[arg(long, default_value = "static")]
        mode: EvaluationMode,
        /// Runtime iterations (overrides runtime.iterations).
        #[arg(long)]
        iterations: Option<u32>,
        /// Per-run timeout in milliseconds (overrides runtime.timeout_ms).
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Print only the pass/fail summary.
        #[arg(long)]
        summary: bool,
    },
    /// Parse and compile a program.
    Syntax {
        /// Program to check, or `-` for stdin.
        file: PathBuf,
    },
    /// Print a program with its blocking constructs removed.
    Neutralize {
        /// Program to rewrite, or `-` for stdin.
        file: PathBuf,
        /// Print the removed statements as JSON instead of the source.
        #[arg(long)]
        elisions: bool,
    },
    /// List the games the harness can probe.
    Games,
}

fn build_interpreter(config: &GamecheckConfig) -> Result<Interpreter> {
    let mut interpreter = Interpreter::default();
    if let Some(ref program) = config.python.interpreter {
        interpreter = Interpreter::new(program);
    }
    if let Some(ref backend) = config.python.rendering_backend {
        let backend: RenderingBackend = backend.parse().map_err(anyhow::Error::msg)?;
        interpreter = interpreter.with_rendering(backend);
    }
    Ok(interpreter)
}

fn build_runtime_config(config: &GamecheckConfig) -> RuntimeProbeConfig {
    let mut runtime = RuntimeProbeConfig::default();
    let overrides = &config.runtime;
    if let Some(v) = overrides.iterations {
        runtime.iterations = v;
    }
    if let Some(v) = overrides.timeout_ms {
        runtime.timeout_per_run = Duration::from_millis(v);
    }
    if let Some(v) = overrides.pass_threshold {
        runtime.pass_threshold = v;
    }
    if let Some(v) = overrides.pause_ms {
        runtime.pause = Duration::from_millis(v);
    }
    if let Some(v) = overrides.concurrency {
        runtime.concurrency = v;
    }
    if let Some(ref v) = overrides.missing_dependency_markers {
        runtime.missing_dependency_markers = v.clone();
    }
    runtime
}

fn build_neutralizer_rules(config: &GamecheckConfig) -> NeutralizerRules {
    let mut rules = NeutralizerRules::default();
    if let Some(ref v) = config.neutralizer.blocking_methods {
        rules.blocking_methods = v.clone();
    }
    if let Some(ref v) = config.neutralizer.blocking_functions {
        rules.blocking_functions = v.clone();
    }
    rules
}

fn build_sandbox_config(config: &GamecheckConfig, interpreter: &Interpreter) -> SandboxConfig {
    let mut sandbox = SandboxConfig {
        interpreter: interpreter.clone(),
        neutralizer: build_neutralizer_rules(config),
        ..SandboxConfig::default()
    };
    if let Some(v) = config.sandbox.load_timeout_secs {
        sandbox.load_timeout = Duration::from_secs(v);
    }
    if let Some(v) = config.sandbox.call_timeout_secs {
        sandbox.call_timeout = Duration::from_secs(v);
    }
    if let Some(v) = config.sandbox.stub_numpy {
        sandbox.stub_numpy = v;
    }
    sandbox
}

fn build_evaluator_config(config: &GamecheckConfig) -> Result<EvaluatorConfig> {
    let interpreter = build_interpreter(config)?;
    let mut evaluator = EvaluatorConfig {
        runtime: build_runtime_config(config),
        sandbox: build_sandbox_config(config, &interpreter),
        interpreter,
        ..EvaluatorConfig::default()
    };
    if let Some(v) = config.python.compile_timeout_secs {
        evaluator.compile_timeout = Duration::from_secs(v);
    }
    if let Some(v) = config.report.max_error_chars {
        evaluator.max_error_chars = v;
    }
    Ok(evaluator)
}

/// Layer command-line flags over the file values and validate the result.
fn apply_cli_overrides(config: &mut GamecheckConfig, cli: &Cli) -> Result<()> {
    if let Some(ref python) = cli.python {
        config.python.interpreter = Some(python.clone());
    }
    if let Command::Evaluate {
        iterations,
        timeout_ms,
        ..
    } = cli.command
    {
        if iterations.is_some() {
            config.runtime.iterations = iterations;
        }
        if timeout_ms.is_some() {
            config.runtime.timeout_ms = timeout_ms;
        }
    }
    config.validate().context("invalid command-line override")
}

/// Search for a config file: `$GAMECHECK_CONFIG`, then `./gamecheck.toml`.
fn find_config_file() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("GAMECHECK_CONFIG") {
        let path = PathBuf::from(p);
        if path.exists() {
            return Some(path);
        }
    }

    let cwd = PathBuf::from("gamecheck.toml");
    if cwd.exists() {
        return Some(cwd);
    }

    None
}

fn load_config() -> Result<GamecheckConfig> {
    match find_config_file() {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading config");
            GamecheckConfig::from_file_with_env(&path)
                .with_context(|| format!("failed to load config from {}", path.display()))
        }
        None => {
            tracing::debug!("no config file found, using defaults");
            Ok(GamecheckConfig::from_toml("")?)
        }
    }
}

fn read_source(file: &Path) -> Result<String> {
    if file == Path::new("-") {
        let mut source = String::new();
        std::io::stdin()
            .read_to_string(&mut source)
            .context("failed to read program from stdin")?;
        return Ok(source);
    }
    std::fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = load_config()?;
    apply_cli_overrides(&mut config, &cli)?;
    let evaluator_config = build_evaluator_config(&config)?;

    match cli.command {
        Command::Evaluate {
            file,
            game,
            mode,
            summary,
            ..
        } => {
            let source = read_source(&file)?;
            let evaluator = Evaluator::new(evaluator_config);
            let result = evaluator.evaluate(&source, &game, mode).await;
            let output = if summary {
                serde_json::to_string_pretty(&result.summary())?
            } else {
                serde_json::to_string_pretty(&result)?
            };
            println!("{output}");
        }
        Command::Syntax { file } => {
            let source = read_source(&file)?;
            let validator = SyntaxValidator::new(
                evaluator_config.interpreter,
                evaluator_config.compile_timeout,
            );
            let report = validator.validate(&source).await;
            let output = serde_json::json!({
                "passed": report.passed,
                "stage": report.stage,
                "error": report.error,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Neutralize { file, elisions } => {
            let source = read_source(&file)?;
            let module = ParsedModule::parse(&source)?;
            let program = neutralize(&module, &evaluator_config.sandbox.neutralizer)?;
            tracing::info!(removed = program.elisions().len(), "neutralized");
            if elisions {
                println!("{}", serde_json::to_string_pretty(program.elisions())?);
            } else {
                print!("{}", program.source());
            }
        }
        Command::Games => {
            for game in GameId::ALL {
                println!("{game}");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_overrides() {
        let config = GamecheckConfig::from_toml("").unwrap();
        let evaluator = build_evaluator_config(&config).unwrap();
        assert_eq!(evaluator.runtime.iterations, 50);
        assert_eq!(evaluator.interpreter.program(), Interpreter::default().program());
        assert_eq!(evaluator.sandbox.neutralizer, NeutralizerRules::default());
    }

    #[test]
    fn file_overrides_apply() {
        let config = GamecheckConfig::from_toml(
            r#"
            [python]
            interpreter = "python3.12"
            compile_timeout_secs = 3

            [runtime]
            iterations = 5
            timeout_ms = 750
            concurrency = 2

            [sandbox]
            call_timeout_secs = 1
            stub_numpy = false

            [neutralizer]
            blocking_functions = ["start"]

            [report]
            max_error_chars = 120
            "#,
        )
        .unwrap();
        let evaluator = build_evaluator_config(&config).unwrap();
        assert_eq!(evaluator.interpreter.program(), "python3.12");
        assert_eq!(evaluator.sandbox.interpreter.program(), "python3.12");
        assert_eq!(evaluator.compile_timeout, Duration::from_secs(3));
        assert_eq!(evaluator.runtime.iterations, 5);
        assert_eq!(evaluator.runtime.timeout_per_run, Duration::from_millis(750));
        assert_eq!(evaluator.runtime.concurrency, 2);
        assert_eq!(evaluator.sandbox.call_timeout, Duration::from_secs(1));
        assert!(!evaluator.sandbox.stub_numpy);
        assert_eq!(evaluator.sandbox.neutralizer.blocking_functions, vec!["start"]);
        assert_eq!(
            evaluator.sandbox.neutralizer.blocking_methods,
            NeutralizerRules::default().blocking_methods
        );
        assert_eq!(evaluator.max_error_chars, 120);
    }

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("gamecheck").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn cli_flags_win_over_file() {
        let mut config = GamecheckConfig::from_toml(
            "[python]\ninterpreter = \"python3.11\"\n[runtime]\niterations = 20\ntimeout_ms = 900\n",
        )
        .unwrap();
        let cli = parse(&[
            "--python",
            "/opt/py/bin/python",
            "evaluate",
            "game.py",
            "--game",
            "snake_game",
            "--iterations",
            "4",
        ]);
        apply_cli_overrides(&mut config, &cli).unwrap();
        let evaluator = build_evaluator_config(&config).unwrap();
        assert_eq!(evaluator.interpreter.program(), "/opt/py/bin/python");
        assert_eq!(evaluator.runtime.iterations, 4);
        assert_eq!(evaluator.runtime.timeout_per_run, Duration::from_millis(900));
    }

    #[test]
    fn zero_flags_are_rejected_like_file_values() {
        let cli = parse(&["evaluate", "game.py", "--game", "snake_game", "--iterations", "0"]);
        let mut config = GamecheckConfig::from_toml("").unwrap();
        let err = apply_cli_overrides(&mut config, &cli).unwrap_err();
        assert!(format!("{err:#}").contains("runtime.iterations"), "{err:#}");

        let cli = parse(&["evaluate", "game.py", "--game", "snake_game", "--timeout-ms", "0"]);
        let mut config = GamecheckConfig::from_toml("").unwrap();
        let err = apply_cli_overrides(&mut config, &cli).unwrap_err();
        assert!(format!("{err:#}").contains("runtime.timeout_ms"), "{err:#}");

        let cli = parse(&["--python", " ", "games"]);
        let mut config = GamecheckConfig::from_toml("").unwrap();
        assert!(apply_cli_overrides(&mut config, &cli).is_err());
    }

    #[test]
    fn rendering_backend_from_file() {
        let config = GamecheckConfig::from_toml("[python]\nrendering_backend = \"native\"\n").unwrap();
        let interpreter = build_interpreter(&config).unwrap();
        assert_eq!(interpreter.rendering(), RenderingBackend::Native);
    }

    #[test]
    fn cli_parses_evaluate() {
        let cli = Cli::try_parse_from([
            "gamecheck",
            "evaluate",
            "game.py",
            "--game",
            "tic_tac_toe",
            "--mode",
            "game-logic",
            "--iterations",
            "3",
        ])
        .unwrap();
        match cli.command {
            Command::Evaluate {
                game,
                mode,
                iterations,
                summary,
                ..
            } => {
                assert_eq!(game, "tic_tac_toe");
                assert_eq!(mode, EvaluationMode::GameLogic);
                assert_eq!(iterations, Some(3));
                assert!(!summary);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let err = Cli::try_parse_from([
            "gamecheck", "evaluate", "game.py", "--game", "snake_game", "--mode", "fuzzy",
        ])
        .unwrap_err();
        assert!(err.to_string().contains("fuzzy"), "{err}");
    }
}
