//! # Web API Request Handlers

pub mod clusters;
pub mod health;
