// rgbw2-api: Async Rust client for the Shelly RGBW2 white-channel HTTP API

pub mod error;
pub mod transport;
pub mod white;

pub use error::Error;
pub use transport::{BasicAuth, TransportConfig};
pub use white::{
    MAX_CHANNEL, Turn, WhiteChannelApi, WhiteClient, WhiteStatus, clamp_brightness,
    parse_white_status, transition_param,
};
