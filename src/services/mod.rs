pub mod action_log;
pub mod auth;
pub mod category;
pub mod comment;
pub mod dashboard;
pub mod email;
pub mod follow;
pub mod post;
pub mod product;
pub mod review;
pub mod session;
pub mod sql;
pub mod upload;
pub mod user;
pub mod views;
