use anyhow::Context;
use clap::{Parser, Subcommand};
use schemars::{Schema, schema_for};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "xtask", about = "Repo automation for repograde")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// (Re)generate JSON Schemas for evaluation records, reports and config files.
    Schema {
        /// Output directory
        #[arg(long, default_value = "schemas")]
        out_dir: PathBuf,
    },

    /// Run the usual repo checks (fmt, clippy, test, schema).
    Ci,

    /// Run mutation testing via cargo-mutants (must be installed).
    Mutants {
        /// Extra args forwarded to cargo-mutants
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Command::Schema { out_dir } => cmd_schema(&out_dir),
        Command::Ci => cmd_ci(),
        Command::Mutants { args } => cmd_mutants(args),
    }
}

fn cmd_ci() -> anyhow::Result<()> {
    run("cargo", ["fmt", "--all", "--", "--check"])?;
    run(
        "cargo",
        ["clippy", "--all-targets", "--all-features", "--", "-D", "warnings"],
    )?;
    run("cargo", ["test", "--workspace"])?;
    run("cargo", ["run", "-p", "xtask", "--", "schema"])?;
    Ok(())
}

fn cmd_mutants(args: Vec<String>) -> anyhow::Result<()> {
    // The scoring and ranking crates are where mutants matter most.
    let mut cmd = std::process::Command::new("cargo");
    cmd.arg("mutants");
    if args.is_empty() {
        cmd.args(["-p", "repograde-domain", "-p", "repograde-stats"]);
    }
    cmd.args(args);
    let status = cmd.status().context("running cargo mutants")?;
    if !status.success() {
        anyhow::bail!("cargo mutants failed: {status}");
    }
    Ok(())
}

fn run<const N: usize>(bin: &str, args: [&str; N]) -> anyhow::Result<()> {
    let status = std::process::Command::new(bin)
        .args(args)
        .status()
        .with_context(|| format!("running {bin}"))?;
    if !status.success() {
        anyhow::bail!("{bin} failed: {status}");
    }
    Ok(())
}

fn schemas() -> Vec<(&'static str, Schema)> {
    use repograde_types::{AnalysisConfig, BaselineReport, CandidateEvaluation, ConfidenceReport};
    vec![
        (
            "repograde.evaluation.v1.schema.json",
            schema_for!(CandidateEvaluation),
        ),
        ("repograde.baseline.v1.schema.json", schema_for!(BaselineReport)),
        (
            "repograde.confidence.v1.schema.json",
            schema_for!(ConfidenceReport),
        ),
        (
            "repograde.task.v1.schema.json",
            schema_for!(repograde_config::TaskConfigFile),
        ),
        ("repograde.analysis.v1.schema.json", schema_for!(AnalysisConfig)),
    ]
}

fn cmd_schema(out_dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(out_dir).with_context(|| format!("create dir {}", out_dir.display()))?;
    for (name, schema) in schemas() {
        write_schema(out_dir, name, &schema)?;
    }
    Ok(())
}

fn write_schema<T: serde::Serialize>(out_dir: &Path, name: &str, schema: &T) -> anyhow::Result<()> {
    let path = out_dir.join(name);
    let json = serde_json::to_vec_pretty(schema)?;
    fs::write(&path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
