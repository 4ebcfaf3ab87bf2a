//! Run command - lower a unit and evaluate one static method

use anyhow::{anyhow, Result};
use clap::Args;
use kestrel_runtime::{Interpreter, Value};
use kestrel_transform::convert_closures;
use std::path::PathBuf;

use super::{read_unit, report_failure};
use crate::config::LoweringFlags;
use crate::OutputFormat;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Resolved compilation unit (JSON)
    pub input: PathBuf,

    /// Static no-argument method to evaluate
    #[arg(long, value_name = "CLASS.METHOD")]
    pub entry: String,

    #[command(flatten)]
    pub lowering: LoweringFlags,
}

/// `Outer.main` -> (`Outer`, `main`)
fn parse_entry(entry: &str) -> Result<(&str, &str)> {
    match entry.rsplit_once('.') {
        Some((class, method)) if !class.is_empty() && !method.is_empty() => Ok((class, method)),
        _ => Err(anyhow!("Entry point must be CLASS.METHOD, got `{}`", entry)),
    }
}

pub fn run(args: RunArgs, format: OutputFormat, use_color: bool) -> Result<()> {
    let (class, method) = parse_entry(&args.entry)?;
    let options = args.lowering.resolve()?;
    let mut unit = read_unit(&args.input, format, use_color)?;

    if let Err(err) = convert_closures(&mut unit, &options) {
        report_failure(&err, &unit, format, use_color)?;
        return Err(anyhow!("Lowering {} failed ({})", unit.name, err.kind.code()));
    }

    let mut interpreter = Interpreter::new(&unit).map_err(|e| anyhow!("Static initialization failed: {}", e))?;
    let result = interpreter.run(class, method, Vec::new());
    let output = interpreter.take_output();

    match format {
        OutputFormat::Text => {
            for line in &output {
                println!("{}", line);
            }
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "entry": args.entry,
                "output": output,
                "result": result.as_ref().ok().filter(|v| !matches!(v, Value::Void)).map(|v| v.to_string()),
                "error": result.as_ref().err().map(|e| e.to_string()),
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }

    match result {
        Ok(value) => {
            log::info!("{} returned {:?}", args.entry, value);
            Ok(())
        }
        Err(err) => Err(anyhow!("{} failed: {}", args.entry, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entry() {
        assert_eq!(parse_entry("Main.main").unwrap(), ("Main", "main"));
        assert_eq!(parse_entry("pkg.Main.run").unwrap(), ("pkg.Main", "run"));
        assert!(parse_entry("main").is_err());
        assert!(parse_entry("Main.").is_err());
        assert!(parse_entry(".main").is_err());
    }
}
