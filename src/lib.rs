//! Order-book depth recorder library.
//!
//! This crate provides the pipeline used by the `depth_recorder` capture
//! binary and the `player` tool:
//!
//! - `source`: one `next()` contract over websocket streaming, REST polling
//!   and journal replay, plus the session guard that releases the feed
//! - `book`: top-10 depth snapshot model and the payload parser
//! - `buffer`: time-indexed slots for one capture window
//! - `capture`: the capture loop state machine and its clocks
//! - `export`: fixed 40-column CSV output and a reader for it
//! - `record`: raw payload journal with length + CRC framing
//! - `config`: capture settings and output file naming
//!
//! Data flows source -> parser -> buffer (driven by the capture loop) ->
//! exporter.
pub mod book;
pub mod buffer;
pub mod capture;
pub mod config;
pub mod error;
pub mod export;
pub mod record;
pub mod source;
