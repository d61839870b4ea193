//! `SessionKit` packages [`sessionkit_core`] for Swift and Kotlin.
//!
//! This crate only re-exports the core scaffolding so a single library can be
//! linked into the mobile apps. See `sessionkit-core` for the API.

sessionkit_core::uniffi_reexport_scaffolding!();

pub use sessionkit_core::*;
