//! `cardwise classify`: Show how a message would be routed to cards.

use crate::runtime::Runtime;
use cardwise_core::card::Tier;
use cardwise_engine::{LlmIntentClassifier, classify_intent, load_cards_by_relevance};

pub async fn run(
    message: &str,
    business: &str,
    keywords_only: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::load().await?;
    let catalog = runtime.store.catalog().cards(business).await?;
    if catalog.is_empty() {
        println!("No cards for business '{business}'. Import some with `cardwise import`.");
    }

    let classifier = if keywords_only || !runtime.config.classifier.enabled {
        None
    } else {
        Some(
            LlmIntentClassifier::new(runtime.provider()?, runtime.config.classifier_model())
                .with_temperature(runtime.config.classifier.temperature),
        )
    };

    let intent = classify_intent(
        message,
        &catalog,
        classifier.as_ref().map(|c| c as &dyn cardwise_core::IntentClassifier),
    )
    .await;
    let (loaded, _) = load_cards_by_relevance(&catalog, &intent);

    println!("Intent:     {} ({:?})", intent.category, intent.source);
    println!("Confidence: {}", intent.confidence);
    if !intent.reasoning.is_empty() {
        println!("Reasoning:  {}", intent.reasoning);
    }
    println!();
    for card in &loaded {
        let tier = match card.tier {
            Tier::Full => "full",
            Tier::Excerpt => "excerpt",
            Tier::TitleOnly => "title",
        };
        println!("  {:>3}  {:<8} {}  ({})", card.relevance, tier, card.title, card.card_id);
    }
    Ok(())
}
