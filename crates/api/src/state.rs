use std::sync::Arc;

use sereno_services::auth::CredentialCheck;
use sereno_services::broadcast::BroadcastSession;
use sereno_services::sync::StateBroadcaster;

/// Shared handles every route sees.
#[derive(Clone)]
pub struct AppState {
    pub broadcaster: Arc<StateBroadcaster>,
    pub session: Arc<BroadcastSession>,
    pub credentials: Arc<dyn CredentialCheck>,
}
