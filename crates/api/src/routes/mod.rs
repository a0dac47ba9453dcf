pub mod auth;
pub mod broadcast;
pub mod live;
