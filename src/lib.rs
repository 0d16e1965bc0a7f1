//! The library code for `feels`, a journal publisher for shared Unix hosts.
//! Each user keeps a store of plain-text entries named by date, and the
//! crate turns the published ones into HTML. The work breaks down into a few
//! steps:
//!
//! 1. Listing the visible entries in a store ([`crate::store`]), which are
//!    every validly named entry ([`crate::filename`]) not suppressed by the
//!    user's publish ledger ([`crate::ledger`])
//! 2. Rendering those entries into a feed page and a permalink page each
//!    ([`crate::render`], with markdown handled by [`crate::markdown`])
//! 3. Mirroring them to gopher when the user asked for it
//!    ([`crate::gopher`])
//!
//! [`crate::session::Session`] drives these steps for the local user and
//! reruns them whenever the ledger or the entries change. Separately,
//! [`crate::neighbors`] scans every user's store to build the shared feed,
//! and [`crate::import`] restores entries from a backup archive.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod config;
pub mod filename;
pub mod gopher;
mod htmlrenderer;
pub mod import;
pub mod ledger;
pub mod markdown;
pub mod neighbors;
pub mod render;
pub mod session;
pub mod store;
