use anyhow::Result;
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use crate::models::{DetectedService, RepoStatus, ScanResults, ScanRun, ServiceComponent};

/// Render a colored terminal report.
pub fn render(run: &ScanRun, results: Option<&ScanResults>, verbose: bool, quiet: bool) -> Result<()> {
    let failed = run
        .progress
        .values()
        .filter(|p| p.status == RepoStatus::Failed)
        .count();
    let totals = results.map(|r| r.totals.clone()).unwrap_or_default();

    if quiet {
        println!(
            "Repos: {}  Failed: {}  Services: {}  Components: {}  Flagged: {}  EOL: {}",
            run.total_repos,
            colored_count(failed, true),
            totals.services,
            totals.components,
            colored_count(totals.flagged, true),
            colored_count(totals.eol, false),
        );
        return Ok(());
    }

    println!("\n {} v{}", "depscan".bold(), env!("CARGO_PKG_VERSION"));
    println!(" Run: {} ({}, {})\n", run.id, run.depth, run.status);

    println!(" ┌────────────────────────────────────────────────────┐");
    println!(" │  {:<48} │", "SUMMARY".bold());
    println!(" │  {:<48} │", format!("Repositories   : {:>4}", run.total_repos));
    println!(
        " │  {:<48} │",
        format!("{}  Failed       : {:>4}", "✗".red(), failed)
    );
    println!(" │  {:<48} │", format!("Services       : {:>4}", totals.services));
    println!(" │  {:<48} │", format!("Components     : {:>4}", totals.components));
    println!(
        " │  {:<48} │",
        format!("{}  Flagged      : {:>4}", "⚠".red(), totals.flagged)
    );
    println!(
        " │  {:<48} │",
        format!("{}  End of life  : {:>4}", "⌛".yellow(), totals.eol)
    );
    println!(" └────────────────────────────────────────────────────┘\n");

    for progress in run.progress.values() {
        let label = match progress.status {
            RepoStatus::Completed => "[OK]".green().bold(),
            RepoStatus::Failed => "[FAILED]".red().bold(),
            _ => "[PENDING]".dimmed(),
        };
        println!(" {} {}: {}", label, progress.repo_name.bold(), progress.message);

        let Some(result) = results.and_then(|r| r.repositories.get(&progress.repo_id)) else {
            continue;
        };
        for warning in &result.warnings {
            println!("   {} {}", "warning:".yellow(), warning);
        }
        for service in &result.services {
            render_service(service, verbose);
        }
        println!();
    }

    if let Some(results) = results.filter(|r| r.partial) {
        println!(
            " {} Results cover {} of {} repositories.\n",
            "[PARTIAL]".yellow().bold(),
            results.repositories.len(),
            run.total_repos
        );
    }

    Ok(())
}

fn colored_count(count: usize, severe: bool) -> ColoredString {
    let text = count.to_string();
    if count == 0 {
        text.green()
    } else if severe {
        text.red()
    } else {
        text.yellow()
    }
}

/// Components worth showing without `--verbose`.
fn needs_attention(component: &ServiceComponent) -> bool {
    component.flagged || component.eol || component.vulnerabilities > 0
}

fn render_service(service: &DetectedService, verbose: bool) {
    let runtime = match (&service.runtime, &service.runtime_version) {
        (Some(runtime), Some(version)) => format!(" [{} {}]", runtime, version),
        (Some(runtime), None) => format!(" [{}]", runtime),
        _ => String::new(),
    };
    let path = if service.path.is_empty() { "." } else { service.path.as_str() };
    println!(
        "   {} {} ({}){} - {} components",
        "→".cyan(),
        service.name,
        path,
        runtime,
        service.components.len()
    );

    let shown: Vec<&ServiceComponent> = service
        .components
        .iter()
        .filter(|c| verbose || needs_attention(c))
        .collect();
    if shown.is_empty() {
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Name").add_attribute(Attribute::Bold),
            Cell::new("Version").add_attribute(Attribute::Bold),
            Cell::new("Latest").add_attribute(Attribute::Bold),
            Cell::new("Ecosystem").add_attribute(Attribute::Bold),
            Cell::new("Type").add_attribute(Attribute::Bold),
            Cell::new("Vulns").add_attribute(Attribute::Bold),
            Cell::new("Notes").add_attribute(Attribute::Bold),
        ]);

    for component in shown {
        let latest = component.latest_version.as_deref().unwrap_or("-");
        let latest_color = match &component.latest_version {
            Some(latest) if *latest != component.version => Color::Yellow,
            _ => Color::Reset,
        };
        let vulns_color = if component.vulnerabilities > 0 {
            Color::Red
        } else {
            Color::Green
        };

        let mut notes = Vec::new();
        if component.eol {
            notes.push("end of life".to_string());
        }
        if let Some(reason) = &component.flag_reason {
            notes.push(reason.clone());
        }
        let notes_color = if component.flagged {
            Color::Red
        } else if component.eol {
            Color::Yellow
        } else {
            Color::Reset
        };

        table.add_row(vec![
            Cell::new(&component.name),
            Cell::new(&component.version),
            Cell::new(latest).fg(latest_color),
            Cell::new(component.ecosystem.to_string()),
            Cell::new(component.component_type.to_string()),
            Cell::new(component.vulnerabilities)
                .fg(vulns_color)
                .set_alignment(CellAlignment::Right),
            Cell::new(notes.join("; ")).fg(notes_color),
        ]);
    }

    println!("{}", table);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ComponentType, Ecosystem};

    fn component(name: &str) -> ServiceComponent {
        ServiceComponent {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            latest_version: None,
            component_type: ComponentType::Dependency,
            scope: None,
            ecosystem: Ecosystem::Node,
            eol: false,
            vulnerabilities: 0,
            flagged: false,
            flag_reason: None,
        }
    }

    #[test]
    fn test_needs_attention() {
        assert!(!needs_attention(&component("left-pad")));

        let mut eol = component("node");
        eol.eol = true;
        assert!(needs_attention(&eol));

        let mut vulnerable = component("lodash");
        vulnerable.vulnerabilities = 2;
        assert!(needs_attention(&vulnerable));

        let mut flagged = component("event-stream");
        flagged.flagged = true;
        assert!(needs_attention(&flagged));
    }
}
