pub mod analytics;
pub mod auth;
pub mod blob;
pub mod communication;
pub mod document;
pub mod health;
pub mod invitation;
pub mod member;
pub mod notification;
pub mod signup;
pub mod subscribe;
pub mod task;
pub mod tenant;
