pub mod error;
pub mod models;
pub mod store;

pub use error::DbError;
pub use models::{LiveStateDoc, SegmentDoc};
pub use store::LiveStateStore;

use mongodb::{Client, Database};
use tracing::info;

/// Connects to MongoDB and returns a handle to the named database.
pub async fn connect(uri: &str, database: &str) -> Result<Database, DbError> {
    let client = Client::with_uri_str(uri).await?;
    let db = client.database(database);
    info!(database, "MongoDB connected");
    Ok(db)
}
