pub mod case;
pub mod registration;
pub mod tracking;
pub mod updates;
