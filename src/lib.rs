//! Shift scheduling engine for a land-based fish farm.
//!
//! Managers plan the week in natural language: a streaming chat loop lets
//! an LLM read and mutate the schedule through a fixed tool set, while
//! plain HTTP endpoints serve the week grid and workers' daily task lists.

pub mod auth;
pub mod catalog;
pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod resolve;
pub mod schedule;
pub mod server;
pub mod tools;
pub mod week;
