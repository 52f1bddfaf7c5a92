use clap::Args;

use crate::common::open_engine;

#[derive(Args)]
pub struct ActivityArgs {
    /// User whose feed to show; omit for the global feed
    pub user: Option<String>,
    /// Maximum number of entries
    #[arg(long, default_value = "20")]
    pub limit: usize,
    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: ActivityArgs) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine()?;
    let entries = match &args.user {
        Some(user) => engine.recent_activities(user, args.limit)?,
        None => engine.global_activities(args.limit)?,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    for entry in entries {
        println!(
            "{}  {:<12}  {}  {}",
            entry
                .timestamp
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            entry.kind().to_string(),
            entry.user_id,
            entry.description
        );
    }
    Ok(())
}
