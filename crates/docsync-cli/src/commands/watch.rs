use std::sync::{Mutex, PoisonError};

use docsync_core::sync::SyncLevel;

use crate::commands::common::{open_service, sync_user};
use crate::config::CliConfig;
use crate::error::CliError;

/// Run the background scheduler until Ctrl-C, printing level changes
pub async fn run_watch(config: &CliConfig) -> Result<(), CliError> {
    let user = sync_user(config)?;
    let service = open_service(config)?;

    let last_level = Mutex::new(None::<SyncLevel>);
    let subscription = service.subscribe_to_status(move |status| {
        let mut last = last_level.lock().unwrap_or_else(PoisonError::into_inner);
        if *last != Some(status.level) {
            *last = Some(status.level);
            println!("{}: {}", status.level, status.message);
        }
    });

    service.start();
    service.force_sync_now(&user).await?;
    tracing::info!("Watching for changes, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    service.shutdown().await;
    subscription.unsubscribe();
    Ok(())
}
