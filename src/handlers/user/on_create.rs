use serde::Deserialize;
use serde_json::json;

use crate::backend::{Backend, BackendError, DocumentStore};
use crate::schema::{ErrorTree, Validate};
use crate::types::{Role, Timestamp, User};
use crate::wrapper::trigger::{event_handler, EventConfig, EventContext, EventFunction};

pub const USERS_COLLECTION: &str = "users";

/// Account record delivered by the auth provider when a user signs up.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default, rename = "photoURL")]
    pub photo_url: Option<String>,
}

impl Validate for UserRecord {
    fn validate(&self) -> Result<(), ErrorTree> {
        let mut errors = ErrorTree::new();
        if self.uid.is_empty() {
            errors.push(&["uid"], "uid must not be empty");
        }
        errors.into_result()
    }
}

/// Profile document stored for a new account. Missing profile fields are kept
/// as explicit nulls.
pub fn user_document(record: &UserRecord, created_at: Timestamp) -> User {
    User {
        uid: None,
        email: record.email.clone(),
        display_name: record.display_name.clone(),
        photo_url: record.photo_url.clone(),
        created_at: Some(created_at),
        role: Role::User,
        sql_id: None,
    }
}

pub async fn create_user_document(store: &dyn DocumentStore, record: &UserRecord) -> Result<(), BackendError> {
    let document = serde_json::to_value(user_document(record, Timestamp::now()))
        .map_err(|e| BackendError::Store(e.to_string()))?;
    store.set(USERS_COLLECTION, &record.uid, document).await
}

pub async fn on_user_create_handler(ctx: EventContext<UserRecord>) -> anyhow::Result<()> {
    let record = &ctx.payload;
    ctx.logger.info("User created", json!({ "userId": &record.uid, "email": &record.email }));

    let store = Backend::instance().documents();
    create_user_document(store.as_ref(), record).await?;

    ctx.logger.info("User document created", json!({ "userId": &record.uid }));
    Ok(())
}

pub fn on_user_create() -> EventFunction {
    event_handler(
        on_user_create_handler,
        EventConfig::new()
            .payload_type::<UserRecord>()
            .function_name("onUserCreate")
            .payload_label("userId", "uid"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryStore;

    #[test]
    fn absent_profile_fields_become_null() {
        let record: UserRecord = serde_json::from_value(json!({ "uid": "u1" })).unwrap();
        let doc = serde_json::to_value(user_document(&record, Timestamp { seconds: 10, nanoseconds: 5 })).unwrap();
        assert_eq!(
            doc,
            json!({
                "email": null,
                "displayName": null,
                "photoURL": null,
                "createdAt": { "seconds": 10, "nanoseconds": 5 },
                "role": "user",
            })
        );
    }

    #[tokio::test]
    async fn writes_the_profile_under_the_uid() {
        let store = MemoryStore::new();
        let record: UserRecord = serde_json::from_value(json!({
            "uid": "u42",
            "email": "ada@example.com",
            "displayName": "Ada",
            "photoURL": "https://example.com/ada.png"
        }))
        .unwrap();

        create_user_document(&store, &record).await.unwrap();

        let doc = store.get(USERS_COLLECTION, "u42").await.unwrap().unwrap();
        assert_eq!(doc["email"], "ada@example.com");
        assert_eq!(doc["photoURL"], "https://example.com/ada.png");
        assert_eq!(doc["role"], "user");
        assert!(doc["createdAt"]["seconds"].as_i64().unwrap() > 0);
    }

    #[test]
    fn empty_uid_is_rejected() {
        let record = UserRecord {
            uid: String::new(),
            email: None,
            display_name: None,
            photo_url: None,
        };
        assert!(record.validate().is_err());
    }
}
