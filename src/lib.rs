//! Bubble Server Library
//!
//! Authoritative simulation for a real-time multiplayer bubble game: player
//! bubbles steer around a bounded map and eat smaller bubbles, NPC bubbles
//! are replenished as they get eaten, and the world is broadcast to every
//! client over WebTransport.

pub mod config;
pub mod game;
pub mod metrics;
pub mod net;
pub mod util;
