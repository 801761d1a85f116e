//! Slack side of the case bot.
//!
//! - **Block Kit** (`blocks`) - typed message builder
//! - **Messages** (`messages`) - update notices, action replies, sitrep report
//! - **Notifier** (`notifier`) - `ChatNotifier` seam and the Web API client behind it
//!
//! Slash-command routing is not handled here; callers invoke case actions directly.

pub mod blocks;
pub mod messages;
pub mod notifier;

pub use blocks::{Block, MessageBuilder, MessageTemplate, TextObject};
pub use notifier::{
    ChatNotifier, NotifierError, PostedMessage, RecordingNotifier, SlackWebNotifier,
};
