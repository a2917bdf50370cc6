//! pathxfer: chunked file transfer carried in HTTP request paths.
//!
//! Shared pieces (codec, hashing, chunking, wire grammar) are used by both
//! ends. The receiving side is [`manager::TransferManager`] on top of
//! [`store::TransferStore`]; the sending side is [`sender::Sender`] driving a
//! [`transport::Transport`]. Integration layers (axum routes, the CLI) adapt
//! these to their surroundings.

pub mod chunking;
pub mod codec;
pub mod error;
pub mod hasher;
pub mod history;
pub mod manager;
pub mod reassembly;
pub mod request;
pub mod sender;
pub mod store;
pub mod sweeper;
pub mod transport;
pub mod types;
