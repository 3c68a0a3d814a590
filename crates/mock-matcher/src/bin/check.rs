//! mock-matcher-check: match a recorded request against a set of expectations.
//!
//! Usage:
//!   mock-matcher-check --expectations expectations.json --request request.json [--config matcher.yaml] [--all]
//!
//! Exits with status 0 when at least one expectation matches, 1 otherwise.

use anyhow::Context;
use clap::Parser;
use mock_matcher::{parse_expectations, telemetry, HttpRequest, MatcherConfig, RequestMatchers};
use std::path::PathBuf;
use std::process::ExitCode;

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// Check which expectations match a request
#[derive(Parser, Debug)]
#[command(name = "mock-matcher-check")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON file holding one expectation or a list of expectations
    #[arg(short, long)]
    expectations: PathBuf,

    /// JSON file holding the request to match
    #[arg(short, long)]
    request: PathBuf,

    /// Matcher configuration (YAML or JSON)
    #[arg(short, long, env = "MOCK_MATCHER_CONFIG")]
    config: Option<PathBuf>,

    /// Report every matching expectation instead of the first
    #[arg(short, long)]
    all: bool,
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => MatcherConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => MatcherConfig::default(),
    };
    config.apply_env_overrides()?;
    config.validate()?;
    telemetry::init_tracing(&config.log_level)?;

    let expectations = std::fs::read_to_string(&args.expectations)
        .with_context(|| format!("reading {}", args.expectations.display()))?;
    let expectations = parse_expectations(&expectations)
        .with_context(|| format!("parsing {}", args.expectations.display()))?;

    let request = std::fs::read_to_string(&args.request)
        .with_context(|| format!("reading {}", args.request.display()))?;
    let request: HttpRequest = serde_json::from_str(&request)
        .with_context(|| format!("parsing {}", args.request.display()))?;

    let registry = RequestMatchers::from_config(&config);
    for expectation in expectations {
        registry.add(expectation)?;
    }
    println!("{DIM}Loaded {} expectation(s){RESET}", registry.len());

    let matched: Vec<_> = if args.all {
        registry.all_matches(&request)
    } else {
        registry.first_match(&request).into_iter().collect()
    };

    if matched.is_empty() {
        println!("{RED}No expectation matched{RESET} {request}");
        for expectation in registry.retrieve_expectations() {
            if let Some((_, diagnostics)) = registry.explain(&expectation.id, &request) {
                println!("\n{DIM}{}:{RESET}\n{}", expectation.id, diagnostics.report());
            }
        }
        return Ok(ExitCode::FAILURE);
    }

    for matcher in matched {
        let expectation = matcher.expectation();
        println!(
            "{GREEN}Matched{RESET} {} (priority {})",
            expectation.id, expectation.priority
        );
        if !expectation.action.is_null() {
            println!("{}", serde_json::to_string_pretty(&expectation.action)?);
        }
    }
    Ok(ExitCode::SUCCESS)
}
