use colored::Colorize;

use crate::provision::CleanupSummary;
use crate::state::{ResourceStatus, StateDocument};
use crate::wls::NmState;
use crate::workflow::{HealthReport, StepOutcome, WorkflowReport};

/// Print a success message.
pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg.green());
}

/// Print an error message.
pub fn print_error(msg: &str) {
    println!("{} {}", "✗".red().bold(), msg.red());
}

/// Print a step banner.
pub fn print_step(msg: &str) {
    println!("{} {}", "→".cyan().bold(), msg.bold());
}

/// Print a warning.
pub fn print_warning(msg: &str) {
    println!("{} {}", "!".yellow().bold(), msg.yellow());
}

fn outcome_colored(outcome: &StepOutcome) -> String {
    match outcome {
        StepOutcome::Done => outcome.to_string().green().to_string(),
        StepOutcome::NoOp => outcome.to_string().dimmed().to_string(),
        StepOutcome::Warning(_) => outcome.to_string().yellow().to_string(),
        StepOutcome::Failed(_) => outcome.to_string().red().to_string(),
    }
}

/// Print the ordered steps of a workflow with their outcome and duration.
pub fn print_workflow_report(report: &WorkflowReport) {
    println!();
    println!("{} {}", "Workflow".bold().cyan(), report.workflow.bold());
    println!("{}", "─".repeat(80));
    println!("  {:<40} {:>10}  {}", "STEP".bold(), "ELAPSED".bold(), "OUTCOME".bold());
    println!("{}", "─".repeat(80));

    for step in &report.steps {
        println!(
            "  {:<40} {:>9.1}s  {}",
            step.name,
            step.elapsed.as_secs_f64(),
            outcome_colored(&step.outcome)
        );
    }

    println!("{}", "─".repeat(80));
    println!(
        "  {} step(s) in {:.1}s.",
        report.steps.len(),
        report.elapsed().as_secs_f64()
    );
    println!();
}

fn state_colored(label: &str, good: bool) -> String {
    if good {
        label.green().to_string()
    } else {
        label.red().to_string()
    }
}

/// Print the per-site health table.
pub fn print_health_report(report: &HealthReport) {
    println!();
    println!("{}", "DR Health".bold().cyan());
    println!("{}", "─".repeat(80));
    let dg = report.dg_status.as_deref().unwrap_or("UNAVAILABLE");
    let dg_ok = dg.eq_ignore_ascii_case(crate::constants::tokens::SUCCESS);
    println!("  {:<18} {}", "Data Guard:".bold(), state_colored(dg, dg_ok));

    for site in &report.sites {
        println!();
        println!("  {} {}", "Site:".bold(), site.label.bold());
        if let Some(e) = &site.error {
            println!("    {}", format!("unreachable: {}", e).red());
            continue;
        }
        let role = site
            .db_role
            .map(|r| r.to_string())
            .unwrap_or_else(|| "UNKNOWN".to_string());
        println!("    {:<24} {} ({})", "Database role:".bold(), role, site.db_unique_name.dimmed());
        println!("    {:<30} {:<20} {}", "COMPONENT".bold(), "HOST".bold(), "STATE".bold());
        for (host, state) in &site.node_managers {
            let ok = *state == NmState::Running;
            println!("    {:<30} {:<20} {}", "node manager", host, state_colored(&state.to_string(), ok));
        }
        for server in site.admin.iter().chain(site.managed.iter()) {
            println!(
                "    {:<30} {:<20} {}",
                server.name,
                server.host,
                state_colored(&server.state_label(), server.is_running())
            );
        }
    }

    println!("{}", "─".repeat(80));
    let problems = report.problems();
    if problems.is_empty() {
        println!("  {}", "Healthy.".green());
    } else {
        for p in &problems {
            println!("  {} {}", "✗".red(), p);
        }
    }
    println!();
}

/// Print the resources recorded in a state document.
pub fn print_resource_list(doc: &StateDocument) {
    if doc.resources.is_empty() {
        println!("{}", "No resources in state.".dimmed());
        return;
    }

    println!();
    println!("{}", "Resources".bold().cyan());
    println!("{}", "─".repeat(80));
    println!(
        "  {:<35} {:<20} {:<14} {}",
        "ADDRESS".bold(),
        "TYPE".bold(),
        "STATUS".bold(),
        "ID".bold()
    );
    println!("{}", "─".repeat(80));

    let mut rows: Vec<_> = doc.resources.iter().collect();
    rows.sort_by_key(|(_, r)| r.seq);
    for (address, resource) in rows {
        let status = resource.status.as_str();
        let status_colored = match resource.status {
            ResourceStatus::Created => status.green().to_string(),
            ResourceStatus::Preexisting => status.blue().to_string(),
            ResourceStatus::Deleted => status.dimmed().to_string(),
            ResourceStatus::FailedDelete => status.red().to_string(),
        };
        println!(
            "  {:<35} {:<20} {:<14} {}",
            address,
            resource.kind.as_str(),
            status_colored,
            resource.id.dimmed()
        );
    }

    println!();
    println!("  {} resource(s) total.", doc.resources.len());
    println!();
}

pub fn print_cleanup_summary(summary: &CleanupSummary) {
    println!();
    println!(
        "  {} deleted, {} skipped, {} failed.",
        summary.deleted.to_string().green(),
        summary.skipped.to_string().dimmed(),
        if summary.failed.is_empty() {
            "0".normal()
        } else {
            summary.failed.len().to_string().red()
        }
    );
    for address in &summary.failed {
        println!("    {} {}", "✗".red(), address);
    }
    println!();
}
