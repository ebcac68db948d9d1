//! End-of-run report rendering

use std::fmt::Write;

use clap::ValueEnum;

use nbsync_api::RunReport;

/// How the run report is printed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

/// Render `report` for stdout
///
/// # Errors
/// Returns error if JSON serialization fails
pub fn render(report: &RunReport, format: ReportFormat) -> eyre::Result<String> {
    match format {
        ReportFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        ReportFormat::Text => Ok(render_text(report)),
    }
}

fn render_text(report: &RunReport) -> String {
    let mut out = String::new();
    let elapsed = report
        .finished_at
        .map(|end| (end - report.started_at).num_milliseconds() as f64 / 1000.0)
        .unwrap_or_default();

    let _ = writeln!(
        out,
        "{} devices, {} synced, {} failed in {elapsed:.1}s",
        report.devices_total,
        report.devices_synced.len(),
        report.device_failures.len()
    );

    if report.total_changes().total() == 0 {
        let _ = writeln!(out, "no changes");
    } else {
        let _ = writeln!(out, "changes:");
        for (kind, counts) in report.changes.iter().filter(|(_, c)| c.total() > 0) {
            let _ = writeln!(
                out,
                "  {:<12} +{} ~{} -{}",
                kind.to_string(),
                counts.created,
                counts.updated,
                counts.deleted
            );
        }
    }

    if !report.device_failures.is_empty() {
        let _ = writeln!(out, "failed devices:");
        for failure in &report.device_failures {
            let stage = match &failure.step {
                Some(step) => format!("{:?}/{step}", failure.stage).to_lowercase(),
                None => format!("{:?}", failure.stage).to_lowercase(),
            };
            let _ = writeln!(out, "  {} [{stage}] {}", failure.host, failure.reason);
        }
    }

    if !report.entity_failures.is_empty() {
        let _ = writeln!(out, "skipped entities:");
        for failure in &report.entity_failures {
            let _ = writeln!(
                out,
                "  {} {} {}: {}",
                failure.host, failure.kind, failure.key, failure.reason
            );
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use nbsync_api::{Change, DeviceFailure, EntityFailure, EntityKind, FailureStage};

    use super::*;

    fn report() -> RunReport {
        let mut report = RunReport::new(3);
        report.devices_synced.push("msk02-asw02".into());
        report.record_change(EntityKind::IpAddress, Change::Created);
        report.record_change(EntityKind::IpAddress, Change::Deleted);
        report.device_failures.push(DeviceFailure {
            host: "10.9.9.9".into(),
            stage: FailureStage::Collect,
            step: None,
            reason: "connection failed: refused".into(),
        });
        report.device_failures.push(DeviceFailure {
            host: "msk02-xyz01".into(),
            stage: FailureStage::Reconcile,
            step: Some("role".into()),
            reason: "role unresolved for token 'xyz01'".into(),
        });
        report.entity_failures.push(EntityFailure {
            host: "msk02-asw02".into(),
            kind: EntityKind::Interface,
            key: "Gi0/9".into(),
            reason: "store error: conflict".into(),
        });
        report.finish();
        report
    }

    #[test]
    fn test_text_report() {
        let text = render(&report(), ReportFormat::Text).unwrap();

        assert!(text.starts_with("3 devices, 1 synced, 2 failed"));
        assert!(text.contains("+1 ~0 -1"));
        assert!(text.contains("10.9.9.9 [collect] connection failed"));
        assert!(text.contains("msk02-xyz01 [reconcile/role]"));
        assert!(text.contains("msk02-asw02 interface Gi0/9"));
    }

    #[test]
    fn test_empty_run_reports_no_changes() {
        let mut report = RunReport::new(0);
        report.finish();
        let text = render(&report, ReportFormat::Text).unwrap();
        assert!(text.contains("no changes"));
        assert!(!text.contains("failed devices"));
    }

    #[test]
    fn test_json_report() {
        let json = render(&report(), ReportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["devices_total"], 3);
        assert_eq!(value["changes"]["ip_address"]["created"], 1);
        assert_eq!(value["device_failures"][1]["step"], "role");
        assert!(value["device_failures"][0].get("step").is_none());
    }
}
