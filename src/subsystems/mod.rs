//! Long-running subsystems of the bot.

pub mod comms;
pub mod runtime;
