//! # Solidity-Sentinel CLI Entry Point
//!
//! @title Solidity-Sentinel CLI
//! @author Ramprasad
//!
//! This module provides the main entry point for the Solidity-Sentinel
//! command-line analyzer.

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use solidity_sentinel::cli::{AnalyzeArgs, Commands, RuleSelection};
use solidity_sentinel::detectors::catalog::load_catalog_file;
use solidity_sentinel::parser::{collect_input_files, display_path, parse_contract_file, LoadedFile};
use solidity_sentinel::report::render;
use solidity_sentinel::suppression::Baseline;
use solidity_sentinel::{
    AnalysisEngine, AnalysisOutcome, CancellationToken, Cli, EngineConfig, RuleRegistry,
    SuppressionSet,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

/// ASCII art banner displayed at startup.
const BANNER: &str = r#"
 ____        _ _     _ _ _            ____             _   _            _
/ ___|  ___ | (_) __| (_) |_ _   _   / ___|  ___ _ __ | |_(_)_ __   ___| |
\___ \ / _ \| | |/ _` | | __| | | |  \___ \ / _ \ '_ \| __| | '_ \ / _ \ |
 ___) | (_) | | | (_| | | |_| |_| |   ___) |  __/ | | | |_| | | | |  __/ |
|____/ \___/|_|_|\__,_|_|\__|\__, |  |____/ \___|_| |_|\__|_|_| |_|\___|_|
                             |___/
              Smart Contract Static Analysis Engine
"#;

/// Exit code for configuration and I/O errors.
const EXIT_CONFIG_ERROR: u8 = 2;

/// Application entry point.
///
/// Initializes the logging system, parses command-line arguments, and
/// dispatches to the appropriate command handler. Errors exit with code 2.
fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Analyze(args) => run_analyze(args),
        Commands::Baseline {
            paths,
            output,
            selection,
        } => run_baseline(&paths, &output, &selection).map(|_| ExitCode::SUCCESS),
        Commands::List { rules } => list_rules(rules.as_deref()).map(|_| ExitCode::SUCCESS),
        Commands::Version => {
            println!(
                "{} {}",
                "Solidity-Sentinel version:".green(),
                env!("CARGO_PKG_VERSION").yellow()
            );
            Ok(ExitCode::SUCCESS)
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "[x] Error:".red().bold(), e);
            ExitCode::from(EXIT_CONFIG_ERROR)
        }
    }
}

/// Builds the standard registry plus an optional user catalog.
fn build_registry(rules: Option<&Path>) -> Result<RuleRegistry> {
    let mut registry = RuleRegistry::standard().context("failed to load built-in rules")?;
    if let Some(path) = rules {
        load_catalog_file(&mut registry, path)?;
        log::info!("Loaded rule catalog {}", path.display());
    }
    Ok(registry)
}

fn progress_bar(len: usize, hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("=>-"));
    }
    pb
}

/// Loads every input document.
fn load_inputs(paths: &[PathBuf], quiet: bool) -> Result<(Vec<PathBuf>, Vec<LoadedFile>)> {
    let inputs = collect_input_files(paths)?;
    if inputs.is_empty() {
        anyhow::bail!("no front-end documents (*.json) found in the given paths");
    }

    let pb = progress_bar(inputs.len(), quiet);
    let mut files = Vec::with_capacity(inputs.len());
    for path in &inputs {
        pb.set_message(format!(
            "Loading {}",
            path.file_name().unwrap_or_default().to_string_lossy()
        ));
        files.push(parse_contract_file(path)?);
        pb.inc(1);
    }
    pb.finish_and_clear();

    Ok((inputs, files))
}

/// Runs the engine over loaded files with a progress bar.
fn run_engine(engine: &AnalysisEngine, files: &[LoadedFile], quiet: bool) -> AnalysisOutcome {
    let total = files.iter().map(LoadedFile::contract_count).sum();
    let pb = progress_bar(total, quiet);
    pb.set_message("Analyzing");

    let outcome = engine.analyze(files, &CancellationToken::new(), |_| pb.inc(1));
    pb.finish_and_clear();
    outcome
}

/// Executes the `analyze` command.
///
/// This function orchestrates the complete workflow:
/// 1. Loads rules, suppressions and the baseline (errors exit with 2)
/// 2. Collects and lowers the front-end documents
/// 3. Runs the analysis engine
/// 4. Applies suppressions and renders the report
///
/// # Returns
///
/// Exit code 1 when a reported finding is at or above the severity floor,
/// 0 otherwise.
fn run_analyze(args: AnalyzeArgs) -> Result<ExitCode> {
    let quiet = args.no_progress;
    if !quiet {
        eprintln!("{}", BANNER.cyan().bold());
    }

    let registry = build_registry(args.selection.rules.as_deref())?;

    let mut suppressions = SuppressionSet::new();
    if let Some(path) = &args.suppressions {
        suppressions.extend_from_file(path)?;
    }
    if let Some(path) = &args.baseline {
        let baseline = Baseline::load(path)?;
        log::info!("Baseline {} holds {} finding(s)", path.display(), baseline.len());
        suppressions.extend_baseline(&baseline);
    }
    let as_of = args
        .as_of
        .unwrap_or_else(|| chrono::Local::now().date_naive());

    let config = EngineConfig {
        parallel: true,
        threads: args.threads,
        contract_budget: args.timeout_ms.map(Duration::from_millis),
        min_severity: args.severity,
        only: args.selection.only.clone(),
        exclude: args.selection.exclude.clone(),
        verbose: args.verbose,
    };
    let engine = AnalysisEngine::new(registry, config);

    let (inputs, files) = load_inputs(&args.paths, quiet)?;
    for file in &files {
        if let Some(source) = &file.source {
            suppressions.extend_inline(&file.path, source);
        }
    }

    if !quiet {
        eprintln!(
            "{} {} document(s), {} rule(s)",
            "[*] Analyzing:".green().bold(),
            files.len(),
            engine.registry().len()
        );
    }
    let outcome = run_engine(&engine, &files, quiet);

    let applied = suppressions.apply(outcome.findings, as_of);
    let report = engine.report(
        applied,
        inputs.iter().map(|p| display_path(p)).collect(),
        outcome.contracts_analyzed,
    );

    let rendered = render(&report, args.format).context("failed to render report")?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, &rendered)
                .with_context(|| format!("failed to write report to {}", path.display()))?;
            eprintln!(
                "{} {}",
                "[+] Report saved to:".green(),
                path.display().to_string().yellow()
            );
        }
        None => print!("{}", rendered),
    }

    if !quiet {
        eprintln!("{}", "=".repeat(60).cyan());
        report.print_summary();
    }

    Ok(if report.has_findings_at_or_above(engine.config().min_severity) {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}

/// Executes the `baseline` command: analyzes without suppressions and
/// records every finding's fingerprint.
fn run_baseline(paths: &[PathBuf], output: &Path, selection: &RuleSelection) -> Result<()> {
    let registry = build_registry(selection.rules.as_deref())?;
    let config = EngineConfig {
        only: selection.only.clone(),
        exclude: selection.exclude.clone(),
        ..EngineConfig::default()
    };
    let engine = AnalysisEngine::new(registry, config);

    let (_, files) = load_inputs(paths, true)?;
    let outcome = run_engine(&engine, &files, true);

    let baseline = Baseline::from_findings(&outcome.findings);
    baseline.save(output)?;

    println!(
        "{} {} finding(s) to {}",
        "[+] Baseline recorded".green().bold(),
        baseline.len(),
        output.display().to_string().yellow()
    );
    Ok(())
}

/// Displays all available rules.
///
/// Prints the registered rules including their IDs, titles, severity
/// levels, scope and descriptions.
fn list_rules(rules: Option<&Path>) -> Result<()> {
    let registry = build_registry(rules)?;

    println!("{}", "[*] Available Rules:".green().bold());
    println!("{}", "-".repeat(60).cyan());

    for rule in registry.rules() {
        let meta = rule.meta();
        println!(
            "  {} {} {} ({})",
            meta.severity.colored_label(),
            meta.id.cyan().bold(),
            meta.title.white(),
            meta.scope.as_str()
        );
        println!("     {}", meta.description.dimmed());
        println!();
    }
    Ok(())
}
