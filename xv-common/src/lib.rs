//! An internal crate containing the bit stream primitives shared by the codec
//! crates of the xv workspace.
//!
//! This crate is not meant for external consumption.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod bit;
