//! # ZRL Core
//!
//! Foundational types shared by the ZRL memory subsystem.
//!
//! ## Contents
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        zrl-core                             │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │   Error     │  │   Types     │  │   Collections       │  │
//! │  │  (Error,    │  │ (ByteSize,  │  │   (Lru)             │  │
//! │  │   Result)   │  │  align_up)  │  │                     │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything here is `no_std` + `alloc`. The `std` feature only adds the
//! `std::error::Error` impl.

#![no_std]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod error;
pub mod lru;
pub mod types;

pub use error::{Error, Result};
pub use lru::Lru;
pub use types::{align_up, is_power_of_two, ByteSize, DeviceSize};
