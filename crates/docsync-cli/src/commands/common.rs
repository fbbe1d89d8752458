use std::collections::HashMap;
use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use docsync_core::models::{Conflict, ConflictId, Entity, Resolution, TrackedField};
use docsync_core::monitor::{NetworkMonitor, SessionSlot, UserId};
use docsync_core::remote::{HttpRemote, RemoteReplica};
use docsync_core::store::{EntityFilter, FileStore};
use docsync_core::sync::{DetailedStatus, SyncHealth};
use docsync_core::{Document, EntityId, EntityKind, SyncService};
use serde::Serialize;
use serde_json::Value;

use crate::cli::ResolveChoice;
use crate::config::CliConfig;
use crate::error::CliError;
use crate::remote::LocalOnlyRemote;

#[derive(Debug, Serialize)]
pub struct DocumentListItem {
    pub id: String,
    pub title: String,
    pub preview: String,
    pub workspace_id: Option<String>,
    pub is_favorite: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub relative_time: String,
    pub synced: bool,
    pub dirty: bool,
    pub conflicts: usize,
}

#[derive(Debug, Serialize)]
pub struct ConflictItem {
    pub document_id: String,
    pub title: String,
    pub conflict_id: String,
    pub field: String,
    pub local_value: Value,
    pub remote_value: Value,
    pub local_updated_at: i64,
    pub remote_updated_at: i64,
}

/// Build the sync facade over the file store and the configured remote.
///
/// Without a remote endpoint or account the service runs local-only: the
/// network reads offline and changes stay queued in the store.
pub fn open_service(config: &CliConfig) -> Result<SyncService, CliError> {
    let store = FileStore::open(config.store_path.clone())?;

    let remote: Arc<dyn RemoteReplica> = match &config.remote_url {
        Some(url) if config.sync_enabled() => Arc::new(HttpRemote::new(
            url.clone(),
            config.token.clone(),
            config.settings.request_timeout,
        )?),
        _ => Arc::new(LocalOnlyRemote),
    };
    let network = NetworkMonitor::new(config.sync_enabled() && !config.offline);
    let session = SessionSlot::new(config.user.clone().filter(|_| config.sync_enabled()));

    Ok(SyncService::builder(Arc::new(store), remote)
        .settings(config.settings.clone())
        .network(network)
        .session(Arc::new(session))
        .build()?)
}

/// The account to sync as, or an error when sync is not configured
pub fn sync_user(config: &CliConfig) -> Result<UserId, CliError> {
    match &config.user {
        Some(user) if config.sync_enabled() => Ok(user.clone()),
        _ => Err(CliError::SyncNotConfigured),
    }
}

pub async fn list_documents(
    service: &SyncService,
    limit: usize,
    dirty_only: bool,
) -> Result<Vec<Document>, CliError> {
    let filter = EntityFilter {
        dirty_only,
        ..EntityFilter::default()
    };
    Ok(service
        .store()
        .list(EntityKind::Document, &filter)
        .await?
        .into_iter()
        .filter_map(Entity::into_document)
        .take(limit)
        .collect())
}

/// Find a live document by full ID or unique ID prefix
pub async fn resolve_document(query: &str, service: &SyncService) -> Result<Document, CliError> {
    let exact = service
        .store()
        .get(EntityKind::Document, &EntityId::from(query))
        .await?
        .and_then(Entity::into_document)
        .filter(|document| !document.is_deleted);
    if let Some(document) = exact {
        return Ok(document);
    }

    let mut matching: Vec<Document> = service
        .store()
        .list(EntityKind::Document, &EntityFilter::default())
        .await?
        .into_iter()
        .filter_map(Entity::into_document)
        .filter(|document| document.id.as_str().starts_with(query))
        .collect();

    match matching.len() {
        0 => Err(CliError::DocumentNotFound(query.to_string())),
        1 => Ok(matching.remove(0)),
        _ => {
            let options = matching
                .iter()
                .take(3)
                .map(|document| short_id(&document.id))
                .collect::<Vec<_>>()
                .join(", ");

            Err(CliError::AmbiguousDocumentId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn short_id(id: &EntityId) -> String {
    id.as_str().chars().take(13).collect()
}

pub fn format_document_lines(documents: &[Document]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    documents
        .iter()
        .map(|document| {
            let short_id = short_id(&document.id);
            let title = document.title_preview(40);
            let relative_time = format_relative_time(document.updated_at, now_ms);
            let marker = sync_marker(document);

            if marker.is_empty() {
                format!("{short_id:<13}  {title:<40}  {relative_time}")
            } else {
                format!("{short_id:<13}  {title:<40}  {relative_time:<10}  {marker}")
            }
        })
        .collect()
}

fn sync_marker(document: &Document) -> &'static str {
    if document.sync.has_unresolved_conflicts() {
        "conflict"
    } else if document.sync.sync_error.is_some() {
        "failed"
    } else if document.sync.is_dirty(document.updated_at) {
        "pending"
    } else {
        ""
    }
}

pub fn document_to_list_item(document: &Document) -> DocumentListItem {
    let now_ms = Utc::now().timestamp_millis();
    DocumentListItem {
        id: document.id.to_string(),
        title: document.title.clone(),
        preview: content_preview(&document.content, 80),
        workspace_id: document.workspace_id.as_ref().map(ToString::to_string),
        is_favorite: document.is_favorite,
        created_at: document.created_at,
        updated_at: document.updated_at,
        relative_time: format_relative_time(document.updated_at, now_ms),
        synced: document.sync.cloud_synced,
        dirty: document.sync.is_dirty(document.updated_at),
        conflicts: document.sync.unresolved_conflicts(),
    }
}

pub fn conflict_items(entity: &Entity) -> Vec<ConflictItem> {
    let title = entity
        .as_document()
        .map_or_else(String::new, |document| document.title.clone());
    entity
        .sync()
        .conflicts
        .iter()
        .filter(|conflict| !conflict.resolved)
        .map(|conflict| ConflictItem {
            document_id: entity.id().to_string(),
            title: title.clone(),
            conflict_id: conflict.id.to_string(),
            field: conflict.field.to_string(),
            local_value: conflict.local_value.clone(),
            remote_value: conflict.remote_value.clone(),
            local_updated_at: conflict.local_updated_at,
            remote_updated_at: conflict.remote_updated_at,
        })
        .collect()
}

pub fn format_conflict_lines(items: &[ConflictItem]) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            let short_id = item.document_id.chars().take(13).collect::<String>();
            format!(
                "{short_id:<13}  {:<14}  local={} ({})  remote={} ({})",
                item.field,
                value_preview(&item.local_value, 30),
                format_timestamp(item.local_updated_at),
                value_preview(&item.remote_value, 30),
                format_timestamp(item.remote_updated_at),
            )
        })
        .collect()
}

pub fn format_status_lines(status: &DetailedStatus) -> Vec<String> {
    let mut lines = vec![format!("{}: {}", status.level, status.message)];
    lines.push(format!(
        "queue={} pending={} unsynced={} conflicts={} failed={}",
        status.queue_depth,
        status.pending_changes,
        status.dirty_count,
        status.conflict_count,
        status.failed_count
    ));
    if let Some(last_sync_at) = status.last_sync_at {
        lines.push(format!("last sync: {}", format_timestamp(last_sync_at)));
    }
    if let Some(error) = &status.last_error {
        lines.push(format!("last error: {error}"));
    }
    lines
}

pub fn format_health_lines(health: &SyncHealth) -> Vec<String> {
    if health.healthy {
        return vec!["Sync is healthy".to_string()];
    }
    health
        .issues
        .iter()
        .zip(&health.recommendations)
        .map(|(issue, recommendation)| format!("- {issue}: {recommendation}"))
        .collect()
}

/// Turn `--use` and `--field` arguments into per-conflict choices
pub fn build_choices(
    conflicts: &[Conflict],
    default: Option<ResolveChoice>,
    field_choices: &[String],
) -> Result<HashMap<ConflictId, Resolution>, CliError> {
    let mut by_field: HashMap<TrackedField, Resolution> = HashMap::new();
    for raw in field_choices {
        let Some((field, choice)) = raw.split_once('=') else {
            return Err(CliError::InvalidChoice(format!(
                "expected FIELD=CHOICE, got '{raw}'"
            )));
        };
        let field = field
            .parse::<TrackedField>()
            .map_err(|error| CliError::InvalidChoice(error.to_string()))?;
        let resolution = choice
            .parse::<Resolution>()
            .map_err(|error| CliError::InvalidChoice(error.to_string()))?;
        if resolution == Resolution::Manual {
            return Err(CliError::InvalidChoice(format!(
                "{field}: choose local, remote or merge"
            )));
        }
        if !conflicts.iter().any(|conflict| conflict.field == field) {
            return Err(CliError::InvalidChoice(format!("no conflict on field {field}")));
        }
        by_field.insert(field, resolution);
    }

    let default = default.map(|choice| match choice {
        ResolveChoice::Local => Resolution::Local,
        ResolveChoice::Remote => Resolution::Remote,
        ResolveChoice::Merge => Resolution::Merge,
    });
    if default.is_none() && by_field.is_empty() {
        return Err(CliError::InvalidChoice(
            "pass --use or at least one --field".to_string(),
        ));
    }

    Ok(conflicts
        .iter()
        .filter(|conflict| !conflict.resolved)
        .filter_map(|conflict| {
            by_field
                .get(&conflict.field)
                .copied()
                .or(default)
                .map(|resolution| (conflict.id, resolution))
        })
        .collect())
}

pub fn content_preview(content: &str, max_chars: usize) -> String {
    let first_line = content.lines().next().unwrap_or("").trim();
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate(collapsed, max_chars)
}

fn value_preview(value: &Value, max_chars: usize) -> String {
    let rendered = match value {
        Value::String(text) => content_preview(text, usize::MAX),
        other => other.to_string(),
    };
    truncate(rendered, max_chars)
}

fn truncate(text: String, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = text.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}

pub fn normalize_text(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_document_identifier(id: &str) -> Result<String, CliError> {
    normalize_text(id).ok_or(CliError::EmptyDocumentId)
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_text(&buffer))
}

pub fn capture_editor_input_with_initial(
    initial_content: &str,
) -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_document_path();
    std::fs::write(&temp_file, initial_content)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let content = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(normalize_text(&content))
}

pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    match Command::new(editor).arg(file_path).status() {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(CliError::EditorFailed(format!(
            "`{editor}` exited with status {status}"
        ))),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let mut parts = editor.split_whitespace();
            let Some(program) = parts.next() else {
                return Err(CliError::EditorFailed("empty EDITOR command".into()));
            };

            let status = Command::new(program).args(parts).arg(file_path).status()?;
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) => Err(CliError::Io(err)),
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

fn create_temp_document_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("docsync-{}-{now}.md", std::process::id()))
}
