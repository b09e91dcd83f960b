use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing::error;
use tracing_subscriber::EnvFilter;

use weaveplan::scan::{INPUT_LOADER, scan_inputs};
use weaveplan::{
    AdviceRegistry, Conflict, HierarchyAnalyzer, LoaderId, Snapshot, WeavingPlan, load_rules,
    plan, report,
};

/// CLI arguments for weaveplan execution.
#[derive(Parser, Debug)]
#[command(
    name = "weaveplan",
    about = "Deterministic load-time weaving plans for JVM class files and JAR files.",
    version
)]
struct Cli {
    /// Class file, JAR file, or directory whose classes get planned.
    #[arg(long, value_name = "PATH")]
    input: PathBuf,
    /// Ancestor sources; read for hierarchy facts but never planned.
    #[arg(long, value_name = "PATH")]
    classpath: Vec<PathBuf>,
    /// JSON rule set with advice, mixins and shims.
    #[arg(long, value_name = "PATH")]
    rules: PathBuf,
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = Format::Json)]
    format: Format,
    /// Include classes with nothing to weave.
    #[arg(long)]
    all: bool,
    #[arg(long)]
    quiet: bool,
    #[arg(long)]
    timing: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Json,
    Sarif,
}

#[derive(Serialize)]
struct PlanOutput<'a> {
    plans: Vec<WeavingPlan>,
    rejected: &'a [Conflict],
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet);
    run(cli)
}

fn init_tracing(quiet: bool) {
    let default = if quiet { "error" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("WEAVEPLAN_LOG").unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    if !cli.input.exists() {
        anyhow::bail!("input not found: {}", cli.input.display());
    }
    for entry in &cli.classpath {
        if !entry.exists() {
            anyhow::bail!("classpath entry not found: {}", entry.display());
        }
    }

    let started_at = Instant::now();
    let rules = load_rules(&cli.rules)?;
    let registry = Arc::new(AdviceRegistry::new(Snapshot::compile(rules)));
    let snapshot = registry.snapshot();
    let scan = scan_inputs(&cli.input, &cli.classpath)?;
    let class_count = scan.class_count();
    let analyzer = HierarchyAnalyzer::new(scan.index, Arc::clone(&registry));

    let loader = LoaderId::new(INPUT_LOADER);
    let mut plans = Vec::new();
    let mut failed = 0;
    for target in &scan.targets {
        let analyzed = analyzer.analyze(&loader, &target.class);
        match plan::build(&analyzed) {
            Ok(plan) if cli.all || !plan.is_empty() || !plan.conflicts.is_empty() => {
                plans.push(plan);
            }
            Ok(_) => {}
            Err(err) => {
                failed += 1;
                error!(uri = %target.uri, %err, "failed to plan class");
            }
        }
    }

    let mut writer = output_writer(cli.output.as_deref())?;
    match cli.format {
        Format::Json => {
            let output = PlanOutput {
                plans,
                rejected: snapshot.rejected(),
            };
            serde_json::to_writer_pretty(&mut writer, &output)
                .context("failed to serialize weaving plans")?;
        }
        Format::Sarif => {
            let conflicts: Vec<Conflict> = snapshot
                .rejected()
                .iter()
                .chain(plans.iter().flat_map(|plan| &plan.conflicts))
                .cloned()
                .collect();
            let invocation = report::build_invocation(failed == 0);
            let sarif = report::build_sarif(&conflicts, scan.artifacts, invocation);
            serde_json::to_writer_pretty(&mut writer, &sarif)
                .context("failed to serialize SARIF output")?;
        }
    }
    writer
        .write_all(b"\n")
        .context("failed to write output")?;

    if cli.timing && !cli.quiet {
        eprintln!(
            "timing: total_ms={} classes={} targets={} analyzed={}",
            started_at.elapsed().as_millis(),
            class_count,
            scan.targets.len(),
            analyzer.len()
        );
    }

    if failed > 0 {
        anyhow::bail!("{failed} class(es) could not be planned");
    }
    Ok(())
}

fn output_writer(output: Option<&Path>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) if path == Path::new("-") => Ok(Box::new(io::stdout())),
        Some(path) => Ok(Box::new(
            File::create(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Ok(Box::new(io::stdout())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_accepts_repeated_classpath_and_sarif_format() {
        let cli = Cli::try_parse_from([
            "weaveplan",
            "--input",
            "app.jar",
            "--classpath",
            "a.jar",
            "--classpath",
            "b.jar",
            "--rules",
            "rules.json",
            "--format",
            "sarif",
        ])
        .expect("parse arguments");

        assert_eq!(cli.classpath.len(), 2);
        assert_eq!(cli.format, Format::Sarif);
        assert!(!cli.all);
    }

    #[test]
    fn cli_requires_rules() {
        assert!(Cli::try_parse_from(["weaveplan", "--input", "app.jar"]).is_err());
    }

    #[test]
    fn output_writer_creates_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("plans.json");

        let mut writer = output_writer(Some(&path)).expect("open output");
        writer.write_all(b"{}").expect("write output");
        drop(writer);

        assert_eq!(std::fs::read_to_string(&path).expect("read output"), "{}");
    }
}
