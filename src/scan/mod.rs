// src/scan/mod.rs

//! Discovery of ready files on remote storage.
//!
//! A [`Lister`] runs the configured listing command and parses its output
//! into file descriptors; a [`Scanner`] pairs data files with their
//! metadata sidecars, applies filename patterns and the optional prescale,
//! and hands ready files to the manager. One scanner loop runs per
//! configured (server, location) pair.

pub mod listing;
pub mod prescale;
pub mod scanner;

pub use listing::{Lister, Listing, ListingParser};
pub use prescale::Prescale;
pub use scanner::{run_scanner_loop, Scanner};
