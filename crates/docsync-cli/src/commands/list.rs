use crate::commands::common::{
    document_to_list_item, format_document_lines, list_documents, open_service, DocumentListItem,
};
use crate::config::CliConfig;
use crate::error::CliError;

pub async fn run_list(
    limit: usize,
    dirty_only: bool,
    as_json: bool,
    config: &CliConfig,
) -> Result<(), CliError> {
    let service = open_service(config)?;
    let documents = list_documents(&service, limit, dirty_only).await?;

    if as_json {
        let json_items = documents
            .iter()
            .map(document_to_list_item)
            .collect::<Vec<DocumentListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else {
        for line in format_document_lines(&documents) {
            println!("{line}");
        }
    }

    Ok(())
}
