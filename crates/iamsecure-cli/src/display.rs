use colored::*;
use iamsecure_core::{CheckKind, CheckResult, CheckStatus};
use serde_json::Value;

/// Print the aggregated security report to the terminal.
pub fn print_security_report(report: &CheckResult, source: &str) {
    println!();
    println!(
        "{}",
        format!(
            " IAMSecure v{} — Auditing {}",
            env!("CARGO_PKG_VERSION"),
            source
        )
        .bold()
    );
    println!();

    let entries = report.data().as_array().cloned().unwrap_or_default();

    for entry in &entries {
        let name = entry["name"].as_str().unwrap_or("unknown");
        print_check_entry(name, &entry["report"]);
        println!();
    }

    println!(" {}", "=".repeat(60).dimmed());
    println!();

    println!(" {}", "Summary".bold().underline());
    println!(" {} Checks run: {}", "|-".dimmed(), entries.len());
    println!(
        " {} Overall status: {}",
        "|-".dimmed(),
        status_tag(report.status())
    );
    if let Some(message) = report.message() {
        println!(" {} {}", "|-".dimmed(), message);
    }
    println!(
        " {} Detected at: {}",
        "|-".dimmed(),
        report.detected_time().to_rfc3339().dimmed()
    );
    println!();
}

fn status_tag(status: CheckStatus) -> String {
    match status {
        CheckStatus::Passed => format!(" {} ", status.symbol())
            .on_green()
            .black()
            .bold()
            .to_string(),
        CheckStatus::ActionRequired => format!(" {} ", status.symbol())
            .on_red()
            .white()
            .bold()
            .to_string(),
    }
}

fn print_check_entry(name: &str, report: &Value) {
    let status = match report["resultStatus"].as_str() {
        Some("Passed") => CheckStatus::Passed,
        _ => CheckStatus::ActionRequired,
    };

    println!(" {} {}", status_tag(status), name.bold());

    if let Some(message) = report["message"].as_str() {
        println!("   {} {}", "|".dimmed(), message);
    }

    let data = &report["data"];
    if let Some(count) = data["count"].as_u64() {
        println!("   {} Findings: {}", "|".dimmed(), count);
    }

    if let Some(users) = data["noMfaUsers"].as_array() {
        for user in users {
            println!(
                "   {} {} {}",
                "|".dimmed(),
                user["identityName"].as_str().unwrap_or_default().yellow(),
                user["arn"].as_str().unwrap_or_default().dimmed()
            );
        }
    }

    if let Some(findings) = data["findings"].as_array() {
        for finding in findings {
            let age = if finding["neverUsed"].as_bool().unwrap_or(false) {
                format!("never used, created {} days ago", finding["daysSinceLastUse"])
            } else {
                format!("last used {} days ago", finding["daysSinceLastUse"])
            };
            println!(
                "   {} {} key {} ({})",
                "|".dimmed(),
                finding["identityName"].as_str().unwrap_or_default().yellow(),
                finding["maskedKeyId"].as_str().unwrap_or_default().cyan(),
                age
            );
        }
    }

    if data.is_array() {
        // Nested aggregate: summarize its children.
        for child in data.as_array().into_iter().flatten() {
            println!(
                "   {} {} {}",
                "|".dimmed(),
                child["name"].as_str().unwrap_or("unknown"),
                child["report"]["resultStatus"].as_str().unwrap_or_default().dimmed()
            );
        }
    }
}

/// Print the supported check names.
pub fn print_supported_checks() {
    println!();
    println!(" {}", "Supported Checks".bold().underline());
    for kind in CheckKind::all() {
        println!(
            " {} {:<16} {}",
            "|-".dimmed(),
            kind.as_str().cyan(),
            kind.description().dimmed()
        );
    }
    println!();
}
