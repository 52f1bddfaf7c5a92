use chrono::Utc;
use clap::Args;

use crate::common::open_engine;

#[derive(Args)]
pub struct ConversationArgs {
    /// User the conversation belongs to
    pub user: String,
    /// Short excerpt of the conversation turn
    pub excerpt: String,
    /// Conversation identifier; generated when omitted
    #[arg(long)]
    pub conversation_id: Option<String>,
    /// Print the appended entry as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: ConversationArgs) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine()?;
    let entry = engine.record_conversation(
        &args.user,
        args.conversation_id,
        &args.excerpt,
        Utc::now(),
    )?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        println!("Conversation logged for {} (seq {})", entry.user_id, entry.seq);
    }
    Ok(())
}
