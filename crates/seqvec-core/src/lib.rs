//! Library half of the `seqvec` CLI.
//!
//! - [`config`]: `configs/pipeline.toml` loading and CLI overrides
//! - [`client`]: [`HttpEmbedder`](client::HttpEmbedder), the HTTP embedding capability
//! - [`pipeline`]: one `run_*` function per subcommand
//! - [`scoring`]: epoch-level metrics over stored predictions

pub mod client;
pub mod config;
pub mod pipeline;
pub mod scoring;
