//! Lower command - replace closure sites with adapter types

use anyhow::{anyhow, Context, Result};
use clap::Args;
use kestrel_transform::{convert_closures, LoweringSummary};
use std::path::PathBuf;

use super::{read_unit, report_failure};
use crate::config::LoweringFlags;
use crate::OutputFormat;

#[derive(Args, Debug)]
pub struct LowerArgs {
    /// Resolved compilation unit (JSON)
    pub input: PathBuf,

    /// Write the lowered unit here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub lowering: LoweringFlags,
}

pub fn run(args: LowerArgs, format: OutputFormat, use_color: bool, quiet: bool) -> Result<()> {
    let options = args.lowering.resolve()?;
    let mut unit = read_unit(&args.input, format, use_color)?;

    let summary = match convert_closures(&mut unit, &options) {
        Ok(summary) => summary,
        Err(err) => {
            report_failure(&err, &unit, format, use_color)?;
            return Err(anyhow!("Lowering {} failed ({})", unit.name, err.kind.code()));
        }
    };

    let lowered = serde_json::to_string_pretty(&unit)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, lowered + "\n").with_context(|| format!("Failed to write {}", path.display()))?
        }
        None => println!("{}", lowered),
    }

    // With no output file stdout carries the unit itself, so the summary stays off it.
    match format {
        OutputFormat::Json if args.output.is_some() => {
            println!("{}", serde_json::to_string(&summary_json(&unit.name, &summary))?);
        }
        _ if !quiet => eprintln!("{}", summary_line(&unit.name, &summary, use_color)),
        _ => {}
    }
    Ok(())
}

fn summary_json(unit: &str, summary: &LoweringSummary) -> serde_json::Value {
    serde_json::json!({
        "type": "summary",
        "unit": unit,
        "sites": summary.sites,
        "capturing": summary.capturing,
        "singletons": summary.singletons,
        "adapters": summary.adapters.iter().map(|(id, name)| serde_json::json!({
            "id": id.0,
            "name": name,
        })).collect::<Vec<_>>(),
    })
}

fn summary_line(unit: &str, summary: &LoweringSummary, use_color: bool) -> String {
    let line = format!(
        "Lowered {} closure site(s) in {}: {} capturing, {} singleton",
        summary.sites, unit, summary.capturing, summary.singletons
    );
    if use_color {
        console::style(line).green().bold().to_string()
    } else {
        line
    }
}
