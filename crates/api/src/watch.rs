use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use sereno_db::store::LiveStateStore;
use sereno_services::sync::StateBroadcaster;

const REOPEN_DELAY: Duration = Duration::from_secs(5);

/// Follows the persisted singleton document and adopts snapshots written by
/// other instances. The watcher never stops: a broken or unopenable change
/// stream is retried after a short delay, and in the meantime local captions
/// keep flowing.
pub fn spawn_remote_watch(
    store: LiveStateStore,
    broadcaster: Arc<StateBroadcaster>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match store.watch().await {
                Ok(mut stream) => {
                    debug!("Remote change stream open");
                    while let Some(event) = stream.next().await {
                        match event {
                            Ok(event) => {
                                let Some(doc) = event.full_document else {
                                    continue;
                                };
                                // Our own writes come back through the
                                // stream; re-adopting them would echo.
                                if doc.writer_id == broadcaster.writer_id() {
                                    continue;
                                }
                                broadcaster.adopt_remote(&doc);
                            }
                            Err(e) => {
                                warn!(%e, "Change stream error, reopening");
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(%e, "Failed to open change stream, retrying");
                }
            }
            tokio::time::sleep(REOPEN_DELAY).await;
        }
    })
}
