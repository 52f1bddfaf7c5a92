use clap::Args;

use crate::common::{fmt_time, open_engine};
use pulsecheck_core::UserStatus;

#[derive(Args)]
pub struct StatusArgs {
    /// User to show; omit to list every known user
    pub user: Option<String>,
    /// Show the count of users at each alert tier instead
    #[arg(long)]
    pub summary: bool,
    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: StatusArgs) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine()?;

    if args.summary {
        let counts = engine.alert_summary()?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&counts)?);
        } else {
            println!(
                "none: {}  notice: {}  elevated: {}  severe: {}  critical: {}",
                counts.none, counts.notice, counts.elevated, counts.severe, counts.critical
            );
        }
        return Ok(());
    }

    match args.user {
        Some(user) => {
            let Some(status) = engine.get_status(&user)? else {
                return Err(format!("unknown user: {user}").into());
            };
            print_status(&status, args.json)
        }
        None => {
            let statuses = engine.all_statuses()?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&statuses)?);
                return Ok(());
            }
            for status in statuses {
                print_status(&status, false)?;
            }
            Ok(())
        }
    }
}

fn print_status(status: &UserStatus, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(status)?);
    } else {
        println!(
            "{}  level: {}  last check-in: {}  next due: {}",
            status.user_id,
            status.alert_level,
            fmt_time(status.last_check_in),
            fmt_time(status.next_due)
        );
    }
    Ok(())
}
