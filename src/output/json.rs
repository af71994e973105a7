// JSON Output Module

use crate::output::Report;
use crate::Result;

/// Generate JSON output from a report
pub fn generate_json(report: &Report, pretty: bool) -> Result<String> {
    if pretty {
        Ok(serde_json::to_string_pretty(report)?)
    } else {
        Ok(serde_json::to_string(report)?)
    }
}
