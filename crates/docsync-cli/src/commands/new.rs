use docsync_core::{DocumentUpdate, EntityId};

use crate::commands::common::{normalize_text, open_service, read_piped_stdin};
use crate::config::CliConfig;
use crate::error::CliError;

pub async fn run_new(
    title_parts: &[String],
    content: Option<&str>,
    workspace: Option<&str>,
    config: &CliConfig,
) -> Result<(), CliError> {
    let title = normalize_text(&title_parts.join(" ")).ok_or(CliError::EmptyTitle)?;
    let content = match content {
        Some(content) => normalize_text(content),
        None => read_piped_stdin()?,
    };

    // Change signals take the account from the session.
    let service = open_service(config)?;
    let document = service
        .create_with_sync(&title, workspace.map(EntityId::from), None, None)
        .await?;

    if let Some(content) = content {
        service
            .update_with_sync(&document.id, DocumentUpdate::default().content(content), None)
            .await?;
    }

    println!("{}", document.id);
    Ok(())
}
