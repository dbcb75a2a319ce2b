use colored::Colorize;

pub fn handle_error(err: anyhow::Error) -> ! {
    eprintln!("{} {}", "Error:".red().bold(), err);

    let msg = err.to_string().to_lowercase();

    if msg.contains("not authorized") {
        eprintln!("\n{}", "Suggestion:".yellow().bold());
        eprintln!("  Check the approver's role against the server's policies with:");
        eprintln!("  {} warden policy list", "$".dimmed());
    }

    if msg.contains("integrity check") {
        eprintln!("\n{}", "Suggestion:".yellow().bold());
        eprintln!("  The stored recording was modified after it was sealed.");
        eprintln!("  Preserve the database file for investigation.");
    }

    if msg.contains("database already open") || msg.contains("cannot acquire lock") {
        eprintln!("\n{}", "Suggestion:".yellow().bold());
        eprintln!("  Another warden process holds the database; stop it and retry.");
    }

    std::process::exit(1);
}
