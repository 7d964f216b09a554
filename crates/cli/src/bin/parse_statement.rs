use anyhow::{Context, Result, anyhow};
use clap::Parser;
use general_parser::{CancellationToken, StatementInput, StatementParser};
use models::{ParseResult, Transaction};
use serde::Deserialize;
use std::{fs, path::PathBuf, process::ExitCode};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "parse-statement",
    about = "Parse a bank statement (xlsx, xls, csv, pdf) into reconciled transactions JSON."
)]
struct Args {
    /// Statement file
    file: PathBuf,

    /// Previously imported transactions, used for duplicate detection
    #[arg(short, long)]
    prior: Option<PathBuf>,

    /// Parser settings JSON (defaults to ./settings.json when present)
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Where to write the result (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Exit with a non-zero status when totals do not reconcile
    #[arg(long, default_value_t = false)]
    strict: bool,
}

/// Prior history is either a bare transaction list or an earlier parse result.
#[derive(Deserialize)]
#[serde(untagged)]
enum PriorFile {
    List(Vec<Transaction>),
    Result(ParseResult),
}

fn load_prior(path: &PathBuf) -> Result<Vec<Transaction>> {
    let txt = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let prior: PriorFile =
        serde_json::from_str(&txt).with_context(|| format!("parsing {}", path.display()))?;
    Ok(match prior {
        PriorFile::List(list) => list,
        PriorFile::Result(result) => result.transactions,
    })
}

fn print_report(file: &str, result: &ParseResult) {
    for w in &result.validation.warnings {
        warn!("{}: {}", file, w);
    }
    for e in &result.validation.errors {
        error!("{}: {}", file, e);
    }
    if result.validation.is_valid {
        info!(
            "{}: {} transactions, totals reconcile (debit {}, credit {})",
            file,
            result.transactions.len(),
            result.validation.computed_debit,
            result.validation.computed_credit
        );
    } else {
        warn!(
            "{}: {} transactions, Validation Failed: totals do not reconcile",
            file,
            result.transactions.len()
        );
    }
}

fn run(args: &Args) -> Result<ParseResult> {
    let settings = settings_loader::load_settings_with_fallback(args.settings.as_ref())?;
    let prior = match &args.prior {
        Some(path) => load_prior(path)?,
        None => Vec::new(),
    };

    let bytes = fs::read(&args.file).with_context(|| format!("reading {}", args.file.display()))?;
    let file_name = args
        .file
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("invalid file name: {}", args.file.display()))?;

    let parser = StatementParser::new(settings);
    let result = parser
        .parse_against(
            &StatementInput::new(&bytes).with_file_name(file_name),
            &prior,
            &CancellationToken::new(),
        )
        .with_context(|| format!("parsing {}", args.file.display()))?;

    print_report(file_name, &result);

    let json = serde_json::to_string_pretty(&result)?;
    match &args.output {
        Some(out_path) => {
            fs::write(out_path, json).with_context(|| format!("writing {}", out_path.display()))?;
            info!("Wrote {}", out_path.display());
        }
        None => println!("{}", json),
    }
    Ok(result)
}

fn main() -> Result<ExitCode> {
    logger::init();
    let args = Args::parse();
    let result = run(&args)?;

    if args.strict && !result.validation.is_valid {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
