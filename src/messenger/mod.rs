//! Messenger integration
//!
//! Transport seam, inbound classification, message templates and the bot
//! event loop. Nothing here decides deal semantics; that is the engine's job.

pub mod bot;
pub mod commands;
pub mod mock;
pub mod stdio;
pub mod templates;
pub mod traits;

pub use bot::{BotConfig, DealBot, RelayResult};
pub use commands::classify;
pub use mock::MockMessenger;
pub use stdio::StdioMessenger;
pub use traits::{Messenger, MessengerError, MessengerResult, RawPayload, Update};
