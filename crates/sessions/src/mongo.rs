//! Document-store-backed sessions.
//!
//! Unlike the Redis backend, construction here is asynchronous and gates
//! worker startup: `connect` only returns once the client is built and the
//! deployment answered a ping. Callers sequence middleware registration
//! after this point.

use std::time::Duration;

use mongodb::bson::doc;
use mongodb::{Client, Collection};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::session::SessionData;
use crate::sid::SessionId;

#[derive(Debug, Serialize, Deserialize)]
struct SessionDoc {
    #[serde(rename = "_id")]
    id: String,
    payload: String,
    expires_at: mongodb::bson::DateTime,
}

pub struct MongoStore {
    sessions: Collection<SessionDoc>,
}

impl MongoStore {
    pub async fn connect(url: &str) -> Result<Self, SessionError> {
        let client = Client::with_uri_str(url).await?;
        let db = client
            .default_database()
            .unwrap_or_else(|| client.database("opsgate"));

        // Readiness gate: do not hand the store out before the deployment
        // is actually reachable.
        db.run_command(doc! { "ping": 1 }).await?;

        Ok(Self {
            sessions: db.collection("sessions"),
        })
    }

    pub async fn load(&self, id: &SessionId) -> Result<Option<SessionData>, SessionError> {
        let found = self
            .sessions
            .find_one(doc! { "_id": id.to_string() })
            .await?;

        match found {
            Some(doc) if doc.expires_at > mongodb::bson::DateTime::now() => {
                Ok(Some(serde_json::from_str(&doc.payload)?))
            }
            Some(doc) => {
                // Expired: drop it on the way out. An external TTL index is
                // the real cleanup; this just keeps reads consistent.
                let _ = self.sessions.delete_one(doc! { "_id": doc.id }).await;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    pub async fn save(
        &self,
        id: &SessionId,
        data: &SessionData,
        ttl: Duration,
    ) -> Result<(), SessionError> {
        let doc = SessionDoc {
            id: id.to_string(),
            payload: serde_json::to_string(data)?,
            expires_at: mongodb::bson::DateTime::from_millis(
                mongodb::bson::DateTime::now().timestamp_millis() + ttl.as_millis() as i64,
            ),
        };

        self.sessions
            .replace_one(doc! { "_id": id.to_string() }, &doc)
            .upsert(true)
            .await?;
        Ok(())
    }

    pub async fn destroy(&self, id: &SessionId) -> Result<(), SessionError> {
        self.sessions
            .delete_one(doc! { "_id": id.to_string() })
            .await?;
        Ok(())
    }
}
