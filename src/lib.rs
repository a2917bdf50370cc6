#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::unused_async)]

//! pathxfer library: the transfer engine and the receiver's HTTP surface.
//!
//! - `xfer`: codec, chunking, wire grammar, store, reassembly, sender
//! - `routes`: axum router with the health probe and the protocol fallback
//! - `config`: configuration loading
//! - `state`: shared receiver state

pub mod config;
pub mod routes;
pub mod state;
pub mod util;
pub mod xfer;

// Re-export key types at crate root for convenience.
pub use config::Config;
pub use state::AppState;
pub use xfer::manager::TransferManager;
pub use xfer::sender::Sender;
