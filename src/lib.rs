//! Library crate for quiz-arena-back, exposing the quiz engine for the binary and integration tests.

pub mod config;
pub mod dao;
pub mod dto;
pub mod error;
pub mod player;
pub mod quiz;
pub mod room;
pub mod routes;
pub mod services;
pub mod state;
