pub mod listing;
pub mod token;
pub mod user;
