//! Scripted two-party chat playback.
//!
//! A [`MessageStore`](core::MessageStore) holds the script, the
//! [`TimelineEngine`](playback::TimelineEngine) reveals it message by message
//! with typing indicators and pacing, and a
//! [`PresentationGateway`](presentation::PresentationGateway) draws the result.

pub mod audio;
pub mod config;
pub mod core;
pub mod playback;
pub mod presentation;
pub mod preview;
pub mod simulator;

pub use simulator::Simulator;
