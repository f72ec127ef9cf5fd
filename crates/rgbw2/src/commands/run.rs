//! `rgbw2 run`: keep channels in sync until interrupted.

use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use rgbw2_core::{Engine, StateChange};

use crate::cli::{GlobalOpts, RunArgs};
use crate::error::CliError;
use crate::output;

use super::util;

pub async fn handle(args: RunArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = util::load_devices_config(global)?;
    let state_path = args
        .state
        .unwrap_or_else(|| util::default_state_path(global));

    let engine = Engine::new(rgbw2_config::to_engine_config(&cfg));
    engine.configure(util::load_state(&state_path)?);

    let report = engine.start().await;
    info!(
        restored = report.restored.len(),
        added = report.added.len(),
        removed = report.removed.len(),
        skipped = ?report.skipped_devices,
        "engine started"
    );
    if engine.channels().is_empty() {
        warn!("no channel could be started, waiting for interrupt anyway");
    }

    let color = output::should_color(&global.color);
    let mut events = engine.events();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;
            result = &mut shutdown => {
                if let Err(e) = result {
                    warn!(error = %e, "failed to listen for interrupt");
                }
                info!("shutting down");
                break;
            }
            event = events.recv() => match event {
                Ok(change) => print_change(&change, global, color),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event stream lagged, notifications dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    engine.stop().await;
    let snapshots = engine.snapshots();
    util::save_state(&state_path, &snapshots)?;
    info!(
        channels = snapshots.len(),
        path = %state_path.display(),
        "state saved"
    );
    Ok(())
}

fn print_change(change: &StateChange, global: &GlobalOpts, color: bool) {
    match output::render_change(&global.output, change, color) {
        Ok(line) => output::print_output(&line, global.quiet),
        Err(e) => warn!(error = %e, "failed to render notification"),
    }
}
