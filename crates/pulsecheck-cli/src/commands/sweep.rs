use chrono::Utc;
use clap::Args;
use std::sync::Arc;

use crate::common::open_engine;
use pulsecheck_core::SweepLoop;

#[derive(Args)]
pub struct SweepArgs {
    /// Run a single sweep and exit
    #[arg(long)]
    pub once: bool,
    /// Loop interval in seconds; defaults to the configured value
    #[arg(long)]
    pub interval_secs: Option<u64>,
    /// Print the sweep outcome as JSON (with --once)
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: SweepArgs) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine()?;

    if args.once {
        let outcome = engine.sweep_once(Utc::now())?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        } else {
            println!(
                "Sweep finished: {} due, {} transitions, {} failures",
                outcome.scanned, outcome.transitions, outcome.failures
            );
        }
        return Ok(());
    }

    let interval = args
        .interval_secs
        .unwrap_or(engine.config().sweep.interval_secs);
    let engine = Arc::new(engine);
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let (sweep, handle) =
            SweepLoop::new(Arc::clone(&engine), std::time::Duration::from_secs(interval));
        let task = tokio::spawn(sweep.run());

        tokio::signal::ctrl_c()
            .await
            .map_err(|e| format!("failed to listen for ctrl-c: {e}"))?;
        handle.shutdown();
        task.await.map_err(|e| format!("sweep loop panicked: {e}"))?;
        Ok::<(), Box<dyn std::error::Error>>(())
    })?;
    Ok(())
}
