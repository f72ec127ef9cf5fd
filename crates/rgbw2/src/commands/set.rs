//! `rgbw2 set`: switch or dim one channel and print the confirmed state.

use serde::Serialize;

use rgbw2_config::Channel;
use rgbw2_core::{ChannelKey, ChannelState, Engine};

use crate::cli::{GlobalOpts, SetArgs};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Debug, Serialize)]
struct SetResult {
    device: String,
    channel: u8,
    #[serde(flatten)]
    state: ChannelState,
}

enum Action {
    Power(bool),
    Brightness(f64),
}

fn requested_action(args: &SetArgs) -> Result<Action, CliError> {
    match (args.on, args.off, args.brightness) {
        (true, _, _) => Ok(Action::Power(true)),
        (_, true, _) => Ok(Action::Power(false)),
        (_, _, Some(level)) if level.is_finite() => Ok(Action::Brightness(level)),
        (_, _, Some(level)) => Err(CliError::Validation {
            field: "brightness".into(),
            reason: format!("{level} is not a number"),
        }),
        // clap's `action` group requires one of the three
        (false, false, None) => Err(CliError::Validation {
            field: "action".into(),
            reason: "one of --on, --off or --brightness is required".into(),
        }),
    }
}

fn channel_index(channel: i64) -> Result<u8, CliError> {
    u8::try_from(channel)
        .ok()
        .filter(|index| *index <= 3)
        .ok_or_else(|| CliError::Validation {
            field: "channel".into(),
            reason: format!("{channel} is outside 0-3"),
        })
}

pub async fn handle(args: &SetArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let index = channel_index(args.channel)?;
    let action = requested_action(args)?;

    let mut cfg = util::load_devices_config(global)?;
    let mut device = util::find_device(&cfg, &args.device)?.clone();

    // Only the target channel gets a controller.
    let name = device
        .channels
        .iter()
        .find(|c| c.channel == args.channel)
        .and_then(|c| c.name.clone());
    device.channels = vec![Channel {
        channel: args.channel,
        name,
    }];
    let key = ChannelKey::new(device.key(), index);
    cfg.devices = vec![device];

    let state = Engine::oneshot(rgbw2_config::to_engine_config(&cfg), |engine| {
        let key = key.clone();
        async move {
            match action {
                Action::Power(on) => engine.set_on(&key, on).await,
                Action::Brightness(level) => engine.set_brightness(&key, level).await,
            }
        }
    })
    .await?;

    let result = SetResult {
        device: key.device,
        channel: key.channel,
        state,
    };
    let color = output::should_color(&global.color);
    let out = output::render_single(&global.output, &result, |r| {
        output::state_detail(&r.state, color)
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
