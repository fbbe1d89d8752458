use docsync_core::EntityKind;

use crate::commands::common::{normalize_document_identifier, open_service, resolve_document};
use crate::config::CliConfig;
use crate::error::CliError;

pub async fn run_delete(id: &str, config: &CliConfig) -> Result<(), CliError> {
    let query = normalize_document_identifier(id)?;
    let service = open_service(config)?;
    let document = resolve_document(&query, &service).await?;

    service
        .delete_with_sync(EntityKind::Document, &document.id, None)
        .await?;
    println!("{}", document.id);
    Ok(())
}
