pub mod api;
pub mod duration;
pub mod models;

pub use duration::{PollDuration, UnknownDuration};
