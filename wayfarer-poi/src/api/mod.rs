//! HTTP API for wayfarer-poi

pub mod health;
pub mod ops;
pub mod pois;
