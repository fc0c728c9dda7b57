//! HTML report generator.
//!
//! Produces a self-contained HTML file with all CSS/JS inlined.

use anyhow::Result;
use std::path::Path;

use samplecoach_core::report::EvaluationReport;

/// Escape a string for safe HTML insertion.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Generate an HTML report from an evaluation report.
pub fn generate_html(report: &EvaluationReport) -> String {
    let mut html = String::new();

    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str(&format!(
        "<title>samplecoach report: {}</title>\n",
        html_escape(&report.model)
    ));
    html.push_str("<style>\n");
    html.push_str(CSS);
    html.push_str("</style>\n");
    html.push_str("</head>\n<body>\n");

    // Header
    html.push_str("<header>\n");
    html.push_str("<h1>samplecoach report</h1>\n");
    html.push_str(&format!(
        "<p class=\"meta\">Model: <strong>{}</strong> | {} samples | {} questions | {}</p>\n",
        html_escape(&report.model),
        report.results.len(),
        report.questions.active_count(),
        report.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    html.push_str("</header>\n");

    // Summary dashboard
    let summary = &report.summary;
    html.push_str("<section class=\"dashboard\">\n");
    html.push_str("<h2>Summary</h2>\n");
    html.push_str("<table class=\"summary\">\n");
    html.push_str("<thead><tr><th>Tasks</th><th>Windows</th><th>Succeeded</th><th>Failed</th><th>Timed out</th><th>Cancelled</th><th>Mean score</th><th>Duration</th></tr></thead>\n");
    html.push_str(&format!(
        "<tbody><tr><td>{}</td><td>{}</td><td class=\"pass\">{}</td><td>{}</td><td>{}</td><td>{}</td><td>{:.2}</td><td>{:.1}s</td></tr></tbody>\n",
        summary.total_tasks,
        summary.buckets,
        summary.succeeded,
        summary.failed,
        summary.timed_out,
        summary.cancelled,
        summary.mean_weighted_score,
        report.duration_ms as f64 / 1000.0,
    ));
    html.push_str("</table>\n");

    // SVG bar chart of mean score per question
    let means = question_means(report);
    if !means.is_empty() {
        html.push_str(&generate_bar_chart(&means));
    }

    html.push_str("</section>\n");

    // Per-sample results
    let header = report.table_header();
    let score_start = report.columns.len();
    html.push_str("<section class=\"results\">\n");
    html.push_str("<h2>Results</h2>\n");
    html.push_str("<table class=\"results-table\" id=\"results\">\n<thead><tr>");
    for (i, name) in header.iter().enumerate() {
        html.push_str(&format!(
            "<th onclick=\"sortTable({i})\">{}</th>",
            html_escape(name)
        ));
    }
    html.push_str("</tr></thead>\n");
    html.push_str("<tbody>\n");

    for (result, row) in report.results.iter().zip(report.table_rows()) {
        html.push_str("<tr>");
        for (i, cell) in row.iter().enumerate() {
            let class = if i < score_start {
                ""
            } else if i == score_start {
                score_class(result.weighted_score)
            } else {
                match result.questions.get(&header[i]) {
                    Some(q) if !q.success => "fail",
                    Some(q) => score_class(q.scored.normalized_score),
                    None => "",
                }
            };
            if class.is_empty() {
                html.push_str(&format!("<td>{}</td>", html_escape(cell)));
            } else {
                html.push_str(&format!("<td class=\"{class}\">{}</td>", html_escape(cell)));
            }
        }
        html.push_str("</tr>\n");
    }

    html.push_str("</tbody></table>\n");
    html.push_str("</section>\n");

    // Raw JSON
    html.push_str("<section class=\"raw-data\">\n");
    html.push_str("<details>\n<summary>Raw JSON Data</summary>\n");
    html.push_str("<pre><code>");
    html.push_str(&html_escape(
        &serde_json::to_string_pretty(report).unwrap_or_default(),
    ));
    html.push_str("</code></pre>\n");
    html.push_str("</details>\n</section>\n");

    // JavaScript for sorting
    html.push_str("<script>\n");
    html.push_str(JS);
    html.push_str("</script>\n");

    html.push_str("</body>\n</html>");
    html
}

/// Write an HTML report to a file.
pub fn write_html_report(report: &EvaluationReport, path: &Path) -> Result<()> {
    let html = generate_html(report);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, html)?;
    Ok(())
}

fn score_class(score: f64) -> &'static str {
    if score >= 0.8 {
        "pass"
    } else if score >= 0.5 {
        "warn"
    } else {
        "fail"
    }
}

/// Mean normalized score of each question over samples where it succeeded.
fn question_means(report: &EvaluationReport) -> Vec<(String, f64)> {
    report
        .questions
        .active()
        .filter_map(|(key, _)| {
            let scores: Vec<f64> = report
                .results
                .iter()
                .filter_map(|r| r.questions.get(key))
                .filter(|q| q.success)
                .map(|q| q.scored.normalized_score)
                .collect();
            if scores.is_empty() {
                None
            } else {
                Some((key.to_string(), scores.iter().sum::<f64>() / scores.len() as f64))
            }
        })
        .collect()
}

fn generate_bar_chart(means: &[(String, f64)]) -> String {
    let bar_height = 30;
    let max_width = 400;
    let padding = 10;
    let label_width = 200;

    let total_height = means.len() * (bar_height + padding) + padding;

    let mut svg = format!(
        "<svg width=\"{}\" height=\"{}\" xmlns=\"http://www.w3.org/2000/svg\">\n",
        label_width + max_width + 60,
        total_height
    );

    for (i, (question, score)) in means.iter().enumerate() {
        let y = i * (bar_height + padding) + padding;
        let width = (score.clamp(0.0, 1.0) * max_width as f64) as usize;

        let color = if *score >= 0.8 {
            "#22c55e"
        } else if *score >= 0.5 {
            "#eab308"
        } else {
            "#ef4444"
        };

        svg.push_str(&format!(
            "  <text x=\"{}\" y=\"{}\" font-size=\"14\" fill=\"currentColor\" text-anchor=\"end\" dominant-baseline=\"middle\">{}</text>\n",
            label_width - 10,
            y + bar_height / 2,
            html_escape(question)
        ));
        svg.push_str(&format!(
            "  <rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" fill=\"{}\" rx=\"4\"/>\n",
            label_width, y, width, bar_height, color
        ));
        svg.push_str(&format!(
            "  <text x=\"{}\" y=\"{}\" font-size=\"12\" fill=\"currentColor\" dominant-baseline=\"middle\">{:.2}</text>\n",
            label_width + width + 8,
            y + bar_height / 2,
            score
        ));
    }

    svg.push_str("</svg>\n");
    svg
}

const CSS: &str = r#"
:root { --bg: #fff; --fg: #1a1a1a; --border: #e5e7eb; --pass: #dcfce7; --warn: #fef9c3; --fail: #fde2e2; }
@media (prefers-color-scheme: dark) {
  :root { --bg: #111827; --fg: #f9fafb; --border: #374151; --pass: #064e3b; --warn: #713f12; --fail: #7f1d1d; }
}
body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif; margin: 0; padding: 2rem; background: var(--bg); color: var(--fg); }
h1, h2 { margin-top: 2rem; }
.meta { color: #6b7280; }
table { border-collapse: collapse; width: 100%; margin: 1rem 0; }
th, td { border: 1px solid var(--border); padding: 0.5rem 1rem; text-align: left; }
th { background: var(--border); cursor: pointer; }
.pass { background: var(--pass); }
.warn { background: var(--warn); }
.fail { background: var(--fail); }
pre { overflow-x: auto; padding: 1rem; background: var(--border); border-radius: 8px; }
code { font-family: 'JetBrains Mono', 'Fira Code', monospace; font-size: 0.85rem; }
details { margin: 1rem 0; }
summary { cursor: pointer; font-weight: bold; }
svg { margin: 1rem 0; }
"#;

const JS: &str = r#"
function sortTable(col) {
  const table = document.getElementById('results');
  const tbody = table.querySelector('tbody');
  const rows = Array.from(tbody.querySelectorAll('tr'));
  const asc = table.dataset.sortCol == col && table.dataset.sortDir == 'asc' ? false : true;
  rows.sort((a, b) => {
    const va = a.cells[col].textContent;
    const vb = b.cells[col].textContent;
    const na = parseFloat(va), nb = parseFloat(vb);
    const cmp = !isNaN(na) && !isNaN(nb) ? na - nb : va.localeCompare(vb);
    return asc ? cmp : -cmp;
  });
  table.dataset.sortCol = col;
  table.dataset.sortDir = asc ? 'asc' : 'desc';
  rows.forEach(r => tbody.appendChild(r));
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn html_report_contains_required_elements() {
        let report = fixtures::report();
        let html = generate_html(&report);

        assert!(html.contains("<html"));
        assert!(html.contains("</html>"));
        assert!(html.contains("gpt-3.5-turbo"));
        assert!(html.contains("weightedScore"));
        assert!(html.contains("<th onclick=\"sortTable(3)\">grammar</th>"));
        assert!(html.contains("<td class=\"fail\">0</td>"));
    }

    #[test]
    fn sample_text_is_escaped() {
        let html = generate_html(&fixtures::report());
        assert!(html.contains("Buy &lt;our&gt; shoes, &quot;now&quot;"));
        assert!(!html.contains("Buy <our>"));
    }

    #[test]
    fn chart_skips_questions_without_successes() {
        let means = question_means(&fixtures::report());
        assert_eq!(means, vec![("grammar".to_string(), 1.0)]);
    }

    #[test]
    fn html_report_write_to_file() {
        let report = fixtures::report();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.html");

        write_html_report(&report, &path).unwrap();
        assert!(path.exists());

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("<html"));
    }
}
