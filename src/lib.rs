//! Coursegate - LMS Authorization Gateway
//!
//! This library provides the core functionality for the coursegate service:
//! a stateless gateway that mediates course, assignment, and submission
//! operations between callers, an external document store, and an external
//! policy decision point. It exposes all modules for testing purposes.

pub mod errors;
pub mod gateway;
pub mod identity;
pub mod models;
pub mod pdp;
pub mod settings;
pub mod store;
pub mod testing;
pub mod web;
