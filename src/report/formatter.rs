//! Report renderers.

use super::{Finding, Report};
use std::fmt::Write;

/// Supported report formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable plain text.
    #[default]
    Text,
    /// Structured JSON.
    Json,
    /// Markdown document.
    Markdown,
    /// GitHub Actions workflow annotations.
    Github,
}

/// Renders a report. Identical reports always render to identical bytes.
pub fn render(report: &Report, format: OutputFormat) -> Result<String, serde_json::Error> {
    Ok(match format {
        OutputFormat::Text => to_text(report),
        OutputFormat::Json => {
            let mut json = serde_json::to_string_pretty(report)?;
            json.push('\n');
            json
        }
        OutputFormat::Markdown => to_markdown(report),
        OutputFormat::Github => to_github(report),
    })
}

fn scope_of(finding: &Finding) -> String {
    match &finding.function {
        Some(function) if !finding.contract.is_empty() => {
            format!("{}.{}", finding.contract, function)
        }
        Some(function) => function.clone(),
        None => finding.contract.clone(),
    }
}

fn to_text(report: &Report) -> String {
    let mut out = String::new();
    let meta = &report.metadata;
    let _ = writeln!(
        out,
        "{} {} | {} contract(s) | severity >= {}",
        meta.tool,
        meta.version,
        meta.contracts,
        meta.min_severity.as_str()
    );

    if report.findings.is_empty() {
        out.push_str("\nNo findings.\n");
    }

    for (i, finding) in report.findings.iter().enumerate() {
        let _ = writeln!(
            out,
            "\n{}. {} {} [{}] {}",
            i + 1,
            finding.severity.indicator(),
            finding.severity.as_str().to_uppercase(),
            finding.rule_id,
            finding.title
        );
        let _ = writeln!(out, "   at {} ({})", finding.location, scope_of(finding));
        let _ = writeln!(out, "   {}", finding.message);
        let _ = writeln!(
            out,
            "   confidence: {} | fingerprint: {}",
            finding.confidence.as_str(),
            finding.fingerprint
        );
        if let Some(remediation) = &finding.remediation {
            for (j, line) in remediation.lines().enumerate() {
                let label = if j == 0 { "fix:" } else { "    " };
                let _ = writeln!(out, "   {} {}", label, line);
            }
        }
    }

    if !report.suppressed.is_empty() {
        out.push_str("\nSuppressed:\n");
        for s in &report.suppressed {
            let _ = writeln!(
                out,
                "  - [{}] {} at {}{}",
                s.finding.rule_id,
                scope_of(&s.finding),
                s.finding.location,
                s.reason
                    .as_ref()
                    .map(|r| format!(" ({})", r))
                    .unwrap_or_default()
            );
        }
    }

    let summary = &report.summary;
    let _ = writeln!(
        out,
        "\nSummary: {} critical | {} high | {} medium | {} low | {} info | {} total | {} suppressed",
        summary.critical,
        summary.high,
        summary.medium,
        summary.low,
        summary.info,
        summary.total,
        summary.suppressed
    );
    out
}

/// Escapes pipes so messages stay inside their table cell.
fn md_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

fn to_markdown(report: &Report) -> String {
    let mut out = String::new();
    let meta = &report.metadata;
    let summary = &report.summary;

    out.push_str("# Security Analysis Report\n\n");
    let _ = writeln!(out, "- **Tool:** {} {}", meta.tool, meta.version);
    let _ = writeln!(out, "- **Contracts analyzed:** {}", meta.contracts);
    let _ = writeln!(out, "- **Minimum severity:** {}", meta.min_severity);
    if !meta.inputs.is_empty() {
        let _ = writeln!(out, "- **Inputs:** {}", meta.inputs.join(", "));
    }

    out.push_str("\n## Summary\n\n");
    out.push_str("| Critical | High | Medium | Low | Info | Total | Suppressed |\n");
    out.push_str("|---------:|-----:|-------:|----:|-----:|------:|-----------:|\n");
    let _ = writeln!(
        out,
        "| {} | {} | {} | {} | {} | {} | {} |",
        summary.critical,
        summary.high,
        summary.medium,
        summary.low,
        summary.info,
        summary.total,
        summary.suppressed
    );

    out.push_str("\n## Findings\n");
    if report.findings.is_empty() {
        out.push_str("\nNo findings.\n");
    }

    for finding in &report.findings {
        let _ = writeln!(out, "\n### {} `{}`\n", finding.title, finding.rule_id);
        let _ = writeln!(out, "{}\n", finding.severity.markdown_badge());
        let _ = writeln!(out, "| | |\n|---|---|");
        let _ = writeln!(out, "| Location | `{}` |", finding.location);
        let _ = writeln!(out, "| Scope | `{}` |", scope_of(finding));
        let _ = writeln!(out, "| Confidence | {} |", finding.confidence.as_str());
        let _ = writeln!(out, "| Fingerprint | `{}` |", finding.fingerprint);
        let _ = writeln!(out, "\n{}", md_cell(&finding.message));
        if let Some(remediation) = &finding.remediation {
            let _ = writeln!(out, "\n**Remediation:**\n\n{}", remediation);
        }
    }

    if !report.suppressed.is_empty() {
        out.push_str("\n## Suppressed Findings\n\n");
        out.push_str("| Rule | Scope | Location | Reason |\n|---|---|---|---|\n");
        for s in &report.suppressed {
            let _ = writeln!(
                out,
                "| `{}` | `{}` | `{}` | {} |",
                s.finding.rule_id,
                scope_of(&s.finding),
                s.finding.location,
                md_cell(s.reason.as_deref().unwrap_or("-"))
            );
        }
    }

    out
}

/// Escapes workflow command data.
fn gh_data(text: &str) -> String {
    text.replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// Escapes workflow command properties.
fn gh_property(text: &str) -> String {
    gh_data(text).replace(':', "%3A").replace(',', "%2C")
}

fn to_github(report: &Report) -> String {
    let mut out = String::new();
    for finding in &report.findings {
        let mut properties = format!("file={}", gh_property(&finding.location.file));
        if finding.location.line > 0 {
            let _ = write!(properties, ",line={}", finding.location.line);
        }
        if finding.location.column > 0 {
            let _ = write!(properties, ",col={}", finding.location.column);
        }
        let _ = write!(
            properties,
            ",title={}",
            gh_property(&format!("{} ({})", finding.title, finding.rule_id))
        );

        let _ = writeln!(
            out,
            "::{} {}::{}",
            finding.severity.annotation_level(),
            properties,
            gh_data(&finding.message)
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::super::tests::sample;
    use super::*;
    use crate::report::Severity;

    fn report() -> Report {
        let mut finding = sample("unchecked-low-level-call", Severity::Medium, 12);
        finding.message = "return value of `send`, 100% ignored".to_string();
        Report::new(
            vec![finding, sample("tx-origin-auth", Severity::High, 3)],
            Vec::new(),
            vec!["Bank.json".to_string()],
            1,
            Severity::Low,
            false,
        )
    }

    #[test]
    fn test_render_is_deterministic() {
        for format in [
            OutputFormat::Text,
            OutputFormat::Json,
            OutputFormat::Markdown,
            OutputFormat::Github,
        ] {
            assert_eq!(
                render(&report(), format).unwrap(),
                render(&report(), format).unwrap()
            );
        }
    }

    #[test]
    fn test_github_annotations() {
        let out = render(&report(), OutputFormat::Github).unwrap();
        let lines: Vec<_> = out.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("::error file=Bank.sol,line=3,col=9,title="));
        assert!(lines[1].starts_with("::warning "));
        assert!(lines[1].ends_with("100%25 ignored"));
    }

    #[test]
    fn test_json_has_no_group_field() {
        let out = render(&report(), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();

        assert_eq!(value["summary"]["total"], 2);
        assert_eq!(value["findings"][0]["rule_id"], "tx-origin-auth");
        assert!(value["findings"][0].get("group").is_none());
        assert!(value.get("suppressed").is_none());
    }
}
