//! Shared utilities and common types for the donation marketplace backend.
//!
//! This crate provides common functionality used across all other crates:
//! - JWT access token signing and verification
//! - Page/limit pagination types
//! - Reusable validation checks

pub mod jwt;
pub mod pagination;
pub mod validation;
