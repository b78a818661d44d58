//! Digitizer domain: system selection, discovery, allocation, acquisition
//! and grid composition over the vendor acquisition library.
//!
//! All vendor FFI is behind `#[cfg(feature = "mil")]`; the simulated adapter
//! runs everywhere else.

pub mod acquisition;
pub mod api;
pub mod discovery;
pub mod error;
#[cfg(feature = "mil")]
pub mod ffi;
pub mod grid;
pub mod manager;
pub mod mock;
pub mod registry;
#[cfg(feature = "mil")]
pub mod sdk;
pub mod selector;
pub mod types;
