//! The `house history` and `house patterns` commands.

use anyhow::Result;

use crate::app::HouseApp;
use crate::insights::{analyze, ConversationPatterns};

pub fn run_history(app: &HouseApp, resident_name: &str) -> Result<()> {
    let resident_name = resident_name.trim();
    let history = app.log().history_for(resident_name)?;
    if history.is_empty() {
        println!("No conversations found for {}.", resident_name);
        return Ok(());
    }

    println!("--- {} conversation(s) with {} ---", history.len(), resident_name);
    println!();
    for exchange in &history {
        println!("{} {} | {}", exchange.date, exchange.time, exchange.room);
        println!("  Q: {}", exchange.question);
        println!("  A: {}", exchange.response);
        if !exchange.unique_files.is_empty() {
            println!("  sources: {}", exchange.unique_files.join(", "));
        }
        println!();
    }
    Ok(())
}

pub fn run_patterns(app: &HouseApp, resident_name: &str) -> Result<()> {
    let resident_name = resident_name.trim();
    let history = app.log().history_for(resident_name)?;
    let patterns = analyze(&history);

    println!("Conversation patterns for {}", resident_name);
    println!("================================");
    println!();
    println!("  Conversations: {}", patterns.total);
    if patterns.total == 0 {
        return Ok(());
    }

    println!();
    println!("  Favourite rooms:");
    for (room, count) in ConversationPatterns::ranked(&patterns.favorite_rooms) {
        println!("    {:<14} {:>4}", room, count);
    }
    println!();
    println!("  Common topics:");
    if patterns.common_topics.is_empty() {
        println!("    (none)");
    }
    for (topic, count) in ConversationPatterns::ranked(&patterns.common_topics) {
        println!("    {:<14} {:>4}", topic, count);
    }
    println!();
    println!("  Time of day:");
    for (period, count) in ConversationPatterns::ranked(&patterns.conversation_times) {
        println!("    {:<14} {:>4}", period, count);
    }
    println!();
    Ok(())
}
