#![forbid(unsafe_code)]

//! Persistence for exam content, the result outbox and sign-in state.

pub mod repository;
pub mod sqlite;
