#![doc = include_str!("../README.md")]

mod bytes;
mod channel;
mod error;

pub mod definition;
pub mod descriptor;
pub mod dispatch;
pub mod format;
pub mod pipeline;
pub mod record;
pub mod subformat;

pub use channel::{Channel, ReadChannel, Status, WriteChannel};
pub use descriptor::{get_or_create_context, FormatDescriptor};
pub use dispatch::{
    dispatch_decode, dispatch_finish, dispatch_heartbeat, dispatch_read, dispatch_write,
    get_status, on_reset_input_channel, on_reset_output_channel, Handler,
};
pub use error::{Error, Result};
pub use format::FormatId;
pub use pipeline::{Pipeline, PipelineOptions, Summary};
pub use subformat::{Convention, Outcome, Unit};
