//! Shared types for Kindred: domain models, wire events, and HTTP DTOs.

pub mod api;
pub mod error;
pub mod events;
pub mod models;
