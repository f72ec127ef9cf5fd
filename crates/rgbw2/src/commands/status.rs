//! `rgbw2 status`: query every configured channel once.

use serde::Serialize;
use tabled::Tabled;
use tracing::debug;

use rgbw2_core::{ChannelState, CoreError, Engine};

use crate::cli::{GlobalOpts, StatusArgs};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Debug, Serialize)]
struct ChannelStatus {
    device: String,
    channel: u8,
    name: String,
    #[serde(flatten)]
    state: ChannelState,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Ch")]
    channel: u8,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Power")]
    power: String,
    #[tabled(rename = "Brightness")]
    brightness: String,
    #[tabled(rename = "Error")]
    error: String,
}

fn status_row(s: &ChannelStatus) -> StatusRow {
    // Unreachable channels show no state, only the error.
    let (power, brightness) = if s.error.is_some() {
        ("-".into(), "-".into())
    } else {
        (
            output::power_label(s.state.is_on, false),
            format!("{}%", s.state.brightness),
        )
    };
    StatusRow {
        device: s.device.clone(),
        channel: s.channel,
        name: s.name.clone(),
        power,
        brightness,
        error: s.error.clone().unwrap_or_default(),
    }
}

pub async fn handle(args: StatusArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mut cfg = util::load_devices_config(global)?;
    if let Some(identifier) = args.device {
        let device = util::find_device(&cfg, &identifier)?.clone();
        cfg.devices = vec![device];
    }

    let statuses = Engine::oneshot(rgbw2_config::to_engine_config(&cfg), |engine| async move {
        let mut statuses = Vec::new();
        for controller in engine.channels() {
            let error = match controller.refresh().await {
                Ok(_) => None,
                Err(CoreError::ControllerStopped) => return Err(CoreError::ControllerStopped),
                Err(e) => {
                    debug!(channel = %controller.key(), error = %e, "status query failed");
                    Some(e.to_string())
                }
            };
            statuses.push(ChannelStatus {
                device: controller.key().device.clone(),
                channel: controller.key().channel,
                name: controller.name().to_owned(),
                state: controller.snapshot(),
                error,
            });
        }
        Ok(statuses)
    })
    .await?;

    let out = output::render_list(&global.output, &statuses, status_row)?;
    output::print_output(&out, global.quiet);
    Ok(())
}
