use chrono::Utc;
use clap::Args;

use crate::common::{fmt_time, open_engine};

#[derive(Args)]
pub struct CheckinArgs {
    /// User to check in
    pub user: String,
    /// Print the resulting status as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: CheckinArgs) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine()?;
    let status = engine.record_check_in(&args.user, Utc::now())?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!(
            "Checked in: {} (next due {})",
            status.user_id,
            fmt_time(status.next_due)
        );
    }
    Ok(())
}
