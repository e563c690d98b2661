//! `cardwise state`: Inspect a conversation.

use crate::runtime::Runtime;
use cardwise_core::message::ConversationId;

pub async fn run(conversation: &str, limit: usize) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::load().await?;
    let store = runtime.store.conversations();
    let id = ConversationId::from(conversation);

    let state = store.state(&id).await?;
    let messages = store.recent_messages(&id, limit).await?;

    let report = serde_json::json!({
        "state": state,
        "recentMessages": messages,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
