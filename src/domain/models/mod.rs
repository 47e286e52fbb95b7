pub mod analytics;
pub mod auth;
pub mod communication;
pub mod document;
pub mod invitation;
pub mod task;
pub mod tenant;
pub mod user;
