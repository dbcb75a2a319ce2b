use anyhow::{Result, bail};
use colored::Colorize;

use crate::cli::CheckArgs;
use crate::output::{OutputFormat, json::print_json};
use warden_core::security::CommandFilter;

/// Exits non-zero when the command is blocked, so scripts can gate on it.
pub fn run(args: CheckArgs, format: OutputFormat) -> Result<()> {
    let filter = CommandFilter::new(args.mode, &args.patterns);
    let result = filter.check(&args.command);

    if format.is_json() {
        print_json(&result)?;
    } else {
        let verdict = if result.allowed {
            "ALLOWED".green().bold()
        } else {
            "BLOCKED".red().bold()
        };
        println!("{verdict} {}", result.reason);
        println!("  Mode:       {}", filter.mode());
        println!("  Risk score: {:.2}", result.risk_score);
        if let Some(pattern) = &result.matched_pattern {
            println!("  Pattern:    {pattern}");
        }
    }

    if !result.allowed {
        bail!("Command blocked");
    }
    Ok(())
}
