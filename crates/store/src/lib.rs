//! Persistence for Cardwise: the card catalog and conversation history.
//!
//! Both backends implement `CardCatalog` and `ConversationStore` from
//! `cardwise-core`:
//! - **InMemory**: for tests and ephemeral sessions
//! - **SQLite**: durable single-file storage (default)

pub mod in_memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use cardwise_config::StoreConfig;
use cardwise_core::card::CardRecord;
use cardwise_core::error::StoreError;
use cardwise_core::store::{CardCatalog, ConversationStore};
use std::sync::Arc;

/// An opened backend, shareable as both catalog and conversation store.
#[derive(Clone)]
pub enum StoreBackend {
    InMemory(InMemoryStore),
    #[cfg(feature = "sqlite")]
    Sqlite(Arc<SqliteStore>),
}

impl StoreBackend {
    /// Open the backend named in `[store]`.
    pub async fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        match config.backend.as_str() {
            "in_memory" => Ok(Self::InMemory(InMemoryStore::new())),
            #[cfg(feature = "sqlite")]
            "sqlite" => {
                let path = config.resolved_path();
                if let Some(parent) = std::path::Path::new(&path).parent()
                    && !parent.as_os_str().is_empty()
                {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        StoreError::Storage(format!("cannot create {}: {e}", parent.display()))
                    })?;
                }
                Ok(Self::Sqlite(Arc::new(SqliteStore::new(&path).await?)))
            }
            other => Err(StoreError::Storage(format!("unsupported store backend '{other}'"))),
        }
    }

    pub fn catalog(&self) -> Arc<dyn CardCatalog> {
        match self {
            Self::InMemory(store) => Arc::new(store.clone()),
            #[cfg(feature = "sqlite")]
            Self::Sqlite(store) => store.clone(),
        }
    }

    pub fn conversations(&self) -> Arc<dyn ConversationStore> {
        match self {
            Self::InMemory(store) => Arc::new(store.clone()),
            #[cfg(feature = "sqlite")]
            Self::Sqlite(store) => store.clone(),
        }
    }

    /// Insert or update cards for a business. Returns the number written.
    pub async fn import_cards(
        &self,
        business_id: &str,
        records: Vec<CardRecord>,
    ) -> Result<usize, StoreError> {
        match self {
            Self::InMemory(store) => Ok(store.insert_cards(business_id, records).await),
            #[cfg(feature = "sqlite")]
            Self::Sqlite(store) => store.import_cards(business_id, records).await,
        }
    }
}

/// Parse a JSON card file: either an array of cards or `{"cards": [...]}`.
///
/// A record missing `id`, `type`, or `title` fails the file with its
/// position; wrong-shaped optional fields fall back to their defaults.
pub fn parse_card_file(content: &str) -> Result<Vec<CardRecord>, StoreError> {
    let parsed: serde_json::Value = serde_json::from_str(content)
        .map_err(|e| StoreError::InvalidCard(format!("card file: {e}")))?;

    let items = match parsed {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut obj) => match obj.remove("cards") {
            Some(serde_json::Value::Array(items)) => items,
            _ => {
                return Err(StoreError::InvalidCard(
                    "card file: expected a `cards` array".into(),
                ));
            }
        },
        _ => {
            return Err(StoreError::InvalidCard(
                "card file: expected an array of cards or an object with `cards`".into(),
            ));
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value::<CardRecord>(item)
                .map_err(|e| StoreError::InvalidCard(format!("card #{index}: {e}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardwise_core::message::NewConversation;

    #[test]
    fn parses_bare_array() {
        let cards = parse_card_file(
            r#"[{"id": "c1", "type": "FAQ", "title": "Opening hours", "orderIndex": 2}]"#,
        )
        .unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].order_index, 2);
        assert!(cards[0].metadata.is_none());
    }

    #[test]
    fn parses_wrapped_object() {
        let cards = parse_card_file(
            r#"{"cards": [{"id": "c1", "type": "BRAND_VOICE_CARD", "title": "Voice", "description": "Warm"}]}"#,
        )
        .unwrap();
        assert_eq!(cards[0].card_type.as_str(), "BRAND_VOICE_CARD");
    }

    #[test]
    fn wrong_shaped_optional_fields_do_not_reject_the_file() {
        let cards = parse_card_file(
            r#"[
                {"id": "c1", "type": "FAQ", "title": "Hours", "priority": "high"},
                {"id": "c2", "type": "FAQ", "title": "Returns", "description": null},
                {"id": "c3", "type": "FAQ", "title": "Shipping", "orderIndex": null}
            ]"#,
        )
        .unwrap();
        assert_eq!(cards.len(), 3);
        assert_eq!(cards[0].priority, None);
        assert_eq!(cards[1].description, "");
        assert_eq!(cards[2].order_index, 0);
    }

    #[test]
    fn missing_required_field_names_the_record() {
        let err = parse_card_file(
            r#"{"cards": [{"id": "c1", "type": "FAQ", "title": "Hours"}, {"id": "c2", "type": "FAQ"}]}"#,
        )
        .unwrap_err();
        match err {
            StoreError::InvalidCard(msg) => assert!(msg.starts_with("card #1:"), "{msg}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_object_without_cards() {
        assert!(matches!(
            parse_card_file(r#"{"items": []}"#),
            Err(StoreError::InvalidCard(_))
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            parse_card_file("not json"),
            Err(StoreError::InvalidCard(_))
        ));
    }

    #[tokio::test]
    async fn in_memory_backend_shares_state() {
        let config = StoreConfig {
            backend: "in_memory".into(),
            path: None,
        };
        let backend = StoreBackend::open(&config).await.unwrap();
        let records = parse_card_file(r#"[{"id": "c1", "type": "FAQ", "title": "Hours"}]"#).unwrap();
        backend.import_cards("biz", records).await.unwrap();

        assert_eq!(backend.catalog().cards("biz").await.unwrap().len(), 1);

        let conversations = backend.conversations();
        let state = conversations
            .create_conversation(NewConversation {
                id: None,
                business_id: "biz".into(),
                has_knowledge_base: false,
            })
            .await
            .unwrap();
        assert_eq!(backend.conversations().state(&state.id).await.unwrap().message_count, 0);
    }

    #[tokio::test]
    async fn sqlite_backend_opens_under_new_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("db.sqlite");
        let config = StoreConfig {
            backend: "sqlite".into(),
            path: Some(path.to_string_lossy().into_owned()),
        };
        let backend = StoreBackend::open(&config).await.unwrap();
        assert_eq!(backend.conversations().name(), "sqlite");
        assert!(path.exists());
    }

    #[tokio::test]
    async fn unknown_backend_rejected() {
        let config = StoreConfig {
            backend: "redis".into(),
            path: None,
        };
        assert!(StoreBackend::open(&config).await.is_err());
    }
}
