//! `cardwise chat`: Single-message or interactive conversation.

use crate::runtime::Runtime;
use cardwise_core::error::StoreError;
use cardwise_core::message::{ConversationId, NewConversation};
use cardwise_engine::{TurnOutcome, TurnProcessor};
use std::io::Write;
use tokio::io::{self, AsyncBufReadExt, BufReader};

pub struct ChatArgs {
    pub business: String,
    pub conversation: Option<String>,
    pub message: Option<String>,
    pub has_knowledge_base: bool,
}

pub async fn run(args: ChatArgs) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::load().await?;
    let processor = runtime.processor()?;
    let id = resolve_conversation(&runtime, &processor, &args).await?;

    if let Some(message) = args.message {
        eprint!("  Thinking...");
        let outcome = processor.process_turn(&id, &message).await;
        eprint!("\r              \r");
        print_outcome(&outcome?);
        return Ok(());
    }

    println!();
    println!("  Cardwise — Interactive Mode");
    println!();
    println!("  Business:      {}", args.business);
    println!("  Conversation:  {id}");
    println!("  Model:         {}", runtime.config.provider.model);
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(io::stdin()).lines();
    print!("  You > ");
    std::io::stdout().flush()?;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if matches!(line, "exit" | "quit" | "/exit" | "/quit" | ":q") {
            break;
        }
        if !line.is_empty() {
            eprint!("  ...");
            match processor.process_turn(&id, line).await {
                Ok(outcome) => {
                    eprint!("\r     \r");
                    println!();
                    print_outcome(&outcome);
                    println!();
                }
                Err(e) => {
                    eprint!("\r     \r");
                    eprintln!("  [Error] {e}");
                    println!();
                }
            }
        }
        print!("  You > ");
        std::io::stdout().flush()?;
    }

    println!();
    println!("  Conversation id: {id}");
    println!();
    Ok(())
}

/// Continue the named conversation, creating it if it does not exist.
async fn resolve_conversation(
    runtime: &Runtime,
    processor: &TurnProcessor,
    args: &ChatArgs,
) -> Result<ConversationId, Box<dyn std::error::Error>> {
    let requested = args.conversation.as_deref().map(ConversationId::from);
    if let Some(id) = &requested {
        match runtime.store.conversations().state(id).await {
            Ok(state) => {
                if state.business_id != args.business {
                    return Err(format!(
                        "conversation {id} belongs to business '{}'",
                        state.business_id
                    )
                    .into());
                }
                return Ok(state.id);
            }
            Err(StoreError::ConversationNotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }

    let state = processor
        .start_conversation(NewConversation {
            id: requested,
            business_id: args.business.clone(),
            has_knowledge_base: args.has_knowledge_base,
        })
        .await?;
    Ok(state.id)
}

fn print_outcome(outcome: &TurnOutcome) {
    for line in outcome.message.content.lines() {
        println!("  Assistant > {line}");
    }
    let cited: Vec<&str> = outcome.citations.iter().map(|c| c.card_id.as_str()).collect();
    println!();
    println!(
        "  [confidence {} | cited: {} | active: {}{}]",
        outcome.confidence,
        if cited.is_empty() { "-".to_string() } else { cited.join(", ") },
        if outcome.active_card_ids.is_empty() {
            "-".to_string()
        } else {
            outcome.active_card_ids.join(", ")
        },
        if outcome.compacted { " | summary updated" } else { "" },
    );
}
