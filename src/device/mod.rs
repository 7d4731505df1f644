//! Device-side collaborators: the emulator's structured control RPC.
//!
//! The Linux desktop has no structured API — its screen goes through noVNC
//! directly and its input through a [`crate::command::CommandChannel`] — so
//! only the emulator gets a typed channel here.

pub mod emulator;
pub mod proto;

pub use emulator::{Dimensions, EmulatorChannel};
