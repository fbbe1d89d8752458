use docsync_core::DocumentUpdate;

use crate::commands::common::{
    capture_editor_input_with_initial, normalize_document_identifier, open_service,
    resolve_document,
};
use crate::config::CliConfig;
use crate::error::CliError;

pub async fn run_edit(
    id: &str,
    title: Option<String>,
    content: Option<String>,
    favorite: Option<bool>,
    config: &CliConfig,
) -> Result<(), CliError> {
    let query = normalize_document_identifier(id)?;
    let service = open_service(config)?;
    let document = resolve_document(&query, &service).await?;

    let mut update = DocumentUpdate::default();
    if let Some(title) = title {
        update = update.title(title);
    }
    if let Some(content) = content {
        update = update.content(content);
    }
    if let Some(favorite) = favorite {
        update = update.favorite(favorite);
    }

    if update.is_empty() {
        let Some(edited) = capture_editor_input_with_initial(&document.content)? else {
            return Err(CliError::EmptyEditedContent);
        };
        if edited == document.content {
            println!("{}", document.id);
            return Ok(());
        }
        update = update.content(edited);
    }

    let updated = service.update_with_sync(&document.id, update, None).await?;
    println!("{}", updated.id);
    Ok(())
}
