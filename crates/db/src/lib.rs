pub mod connection;
pub mod migrations;
pub mod registration;
pub mod repositories;

pub use connection::{connect_with_config, connect_with_settings, ping, DbPool};
pub use registration::{
    CaseDirectory, FirstInError, FirstInResolver, NotifyDecision, RegistrationGuard, SkipReason,
};
