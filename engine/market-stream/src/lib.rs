//! # Market Stream
//!
//! Long-lived subscription to the backend's market channel. The channel pushes
//! two kinds of tagged frames: price updates for many instruments at once, and
//! execution confirmations for the subscribed user. `StreamClient::subscribe`
//! turns that channel into a lazy, restartable sequence of `StreamEvent`s:
//! transport loss is recovered with exponential backoff and the consumer keeps
//! reading from the same `Subscription`.
//!
//! Frames carry no timestamps, so the client stamps each decoded frame with a
//! `LogicalTimestamp` from a counter that survives reconnects.

pub mod client;
pub mod config;
pub mod frames;


pub use client::{StreamClient, StreamEvent, Subscription};
pub use config::StreamConfig;
pub use frames::{decode_frame, InboundFrame};
