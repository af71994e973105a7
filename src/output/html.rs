// HTML Report Generator

use crate::findings::Severity;
use crate::output::Report;
use crate::Result;
use handlebars::Handlebars;
use serde_json::json;

const HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Vulnerability Scan Report - {{target}}</title>
    <style>
        * { margin: 0; padding: 0; box-sizing: border-box; }
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; line-height: 1.6; color: #333; background: #f5f5f5; padding: 20px; }
        .container { max-width: 1200px; margin: 0 auto; background: white; padding: 30px; border-radius: 8px; box-shadow: 0 2px 10px rgba(0,0,0,0.1); }
        h2 { color: #34495e; margin-top: 30px; margin-bottom: 15px; padding-bottom: 10px; border-bottom: 2px solid #3498db; }
        .header { background: linear-gradient(135deg, #667eea 0%, #764ba2 100%); color: white; padding: 40px; border-radius: 8px; margin-bottom: 30px; }
        .summary-grid { display: grid; grid-template-columns: repeat(auto-fit, minmax(150px, 1fr)); gap: 20px; margin: 20px 0; }
        .summary-card { background: #f8f9fa; padding: 20px; border-radius: 8px; border-left: 4px solid #3498db; }
        .summary-card .value { font-size: 2em; font-weight: bold; color: #3498db; margin-top: 10px; }
        table { width: 100%; border-collapse: collapse; margin: 20px 0; }
        th, td { padding: 12px; text-align: left; border-bottom: 1px solid #ddd; vertical-align: top; }
        th { background: #34495e; color: white; }
        code { background: #f4f4f4; padding: 2px 4px; border-radius: 3px; word-break: break-all; }
        .severity-critical { background: #c0392b; color: white; padding: 4px 8px; border-radius: 4px; }
        .severity-high { background: #e74c3c; color: white; padding: 4px 8px; border-radius: 4px; }
        .severity-medium { background: #f39c12; color: white; padding: 4px 8px; border-radius: 4px; }
        .severity-low { background: #95a5a6; color: white; padding: 4px 8px; border-radius: 4px; }
        .severity-info { background: #3498db; color: white; padding: 4px 8px; border-radius: 4px; }
        .footer { margin-top: 40px; padding-top: 20px; border-top: 1px solid #ddd; color: #7f8c8d; text-align: center; }
    </style>
</head>
<body>
    <div class="container">
        <div class="header">
            <h1>Vulnerability Scan Report</h1>
            <div>Target: {{target}} | Mode: {{mode}} | Scan: {{scan_id}} | Duration: {{duration}}</div>
        </div>

        <section>
            <h2>Summary</h2>
            <div class="summary-grid">
                <div class="summary-card"><h3>Total</h3><div class="value">{{total}}</div></div>
                {{#each counts}}
                <div class="summary-card"><h3><span class="severity-{{severity}}">{{severity}}</span></h3><div class="value">{{count}}</div></div>
                {{/each}}
            </div>
        </section>

        <section>
            <h2>Findings</h2>
            {{#if findings}}
            <table>
                <thead><tr><th>Severity</th><th>Finding</th><th>Path</th><th>Details</th></tr></thead>
                <tbody>
                {{#each findings}}
                    <tr>
                        <td><span class="severity-{{severity}}">{{severity}}</span></td>
                        <td>{{name}}<br><small>{{id}}</small></td>
                        <td><code>{{path}}</code></td>
                        <td>
                            <p>{{description}}</p>
                            <p><strong>Impact:</strong> {{impact}}</p>
                            <p><strong>Remediation:</strong> {{remediation}}</p>
                            {{#if evidence}}<p><strong>Evidence:</strong> <code>{{evidence}}</code></p>{{/if}}
                            {{#each references}}<p><a href="{{this}}">{{this}}</a></p>{{/each}}
                        </td>
                    </tr>
                {{/each}}
                </tbody>
            </table>
            {{else}}
            <p>No findings.</p>
            {{/if}}
        </section>

        <div class="footer">
            <p>Generated by VulnScan</p>
        </div>
    </div>
</body>
</html>"#;

/// Generate HTML report. Finding text comes from scanned hosts, so the
/// default HTML escaping stays on.
pub fn generate_html_report(report: &Report) -> Result<String> {
    let handlebars = Handlebars::new();

    let data = json!({
        "scan_id": report.scan_id,
        "target": report.target,
        "mode": report.mode,
        "duration": report.summary.duration,
        "total": report.summary.total,
        "counts": Severity::ALL.iter().map(|s| json!({
            "severity": s.as_str(),
            "count": report.summary.count(*s),
        })).collect::<Vec<_>>(),
        "findings": report.vulnerabilities,
    });

    let html = handlebars.render_template(HTML_TEMPLATE, &data)?;
    Ok(html)
}
