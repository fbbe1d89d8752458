use docsync_core::sync::SyncReport;

use crate::commands::common::{format_health_lines, format_status_lines, open_service, sync_user};
use crate::config::CliConfig;
use crate::error::CliError;

pub async fn run_sync(config: &CliConfig) -> Result<(), CliError> {
    let user = sync_user(config)?;
    let service = open_service(config)?;

    let report = service.force_sync_now(&user).await?;
    for line in format_sync_report(&report, config.offline) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_status(as_json: bool, config: &CliConfig) -> Result<(), CliError> {
    let service = open_service(config)?;
    let status = service.get_sync_status(None).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        for line in format_status_lines(&status) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_health(as_json: bool, config: &CliConfig) -> Result<(), CliError> {
    let service = open_service(config)?;
    let health = service.check_sync_health(None).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&health)?);
    } else {
        for line in format_health_lines(&health) {
            println!("{line}");
        }
    }
    Ok(())
}

pub fn format_sync_report(report: &SyncReport, offline: bool) -> Vec<String> {
    let drain = &report.drain;
    if offline {
        return vec![format!(
            "Offline: {} change(s) queued, they will sync when connection is restored",
            drain.remaining
        )];
    }

    let mut lines = vec![format!(
        "Sync completed: {} processed, {} succeeded, {} skipped",
        drain.processed, drain.succeeded, drain.skipped
    )];
    if drain.conflicted > 0 {
        lines.push(format!(
            "{} document(s) have conflicts, see `docsync conflicts`",
            drain.conflicted
        ));
    }
    if drain.retrying > 0 {
        lines.push(format!(
            "{} operation(s) failed with a transient error and will be retried on the next sync",
            drain.retrying
        ));
    }
    if drain.failed > 0 {
        lines.push(format!("{} operation(s) failed, see `docsync status`", drain.failed));
    }
    lines
}
