use docsync_core::EntityKind;

use crate::cli::ResolveChoice;
use crate::commands::common::{
    build_choices, conflict_items, format_conflict_lines, normalize_document_identifier,
    open_service, resolve_document, sync_user, ConflictItem,
};
use crate::config::CliConfig;
use crate::error::CliError;

pub async fn run_conflicts(as_json: bool, config: &CliConfig) -> Result<(), CliError> {
    let service = open_service(config)?;
    let items = service
        .conflicted()
        .await?
        .iter()
        .flat_map(conflict_items)
        .collect::<Vec<ConflictItem>>();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("No unresolved sync conflicts.");
        return Ok(());
    }

    for line in format_conflict_lines(&items) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_resolve(
    id: &str,
    choice: Option<ResolveChoice>,
    field_choices: &[String],
    config: &CliConfig,
) -> Result<(), CliError> {
    let query = normalize_document_identifier(id)?;
    let service = open_service(config)?;
    let document = resolve_document(&query, &service).await?;
    if !document.sync.has_unresolved_conflicts() {
        println!("{} has no unresolved conflicts", document.id);
        return Ok(());
    }

    let choices = build_choices(&document.sync.conflicts, choice, field_choices)?;
    let resolved = service
        .resolve_conflicts(EntityKind::Document, &document.id, &choices)
        .await?;

    let remaining = resolved.sync().unresolved_conflicts();
    if remaining > 0 {
        println!("{}: {remaining} conflict(s) still need a choice", resolved.id());
        return Ok(());
    }

    // Push a winning local value right away when sync is available.
    if config.sync_enabled() && !config.offline {
        service.force_sync_now(&sync_user(config)?).await?;
    }
    println!("{}", resolved.id());
    Ok(())
}
