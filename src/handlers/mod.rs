// Public: /health
// Protected (JWT): /api/catalog/*
pub mod catalog;
pub mod health;

pub use health::health;
