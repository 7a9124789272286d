//! # autodoc
//!
//! Generates a single-page HTML architecture document for a source
//! repository by running an LLM over its files in a map-reduce pipeline.
//!
//! The snapshot is partitioned into character-budgeted chunks, each chunk is
//! summarized by the model (map), and the summaries are turned into a fixed
//! set of document sections that are stitched together (reduce). Truncated
//! model output is repaired with bounded continuation calls, throttling is
//! retried with exponential backoff, and finished documents are cached by
//! commit hash so an unchanged repository never costs a model call.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────────┐   ┌────────────┐
//! │ Source host │──▶│ Loader +     │──▶│ Map fan-out   │──▶│ Sections / │
//! │ (Bitbucket) │   │ Partitioner  │   │ (per chunk)   │   │ Unify      │
//! └─────────────┘   └──────────────┘   └───────┬───────┘   └─────┬──────┘
//!                                              │                 │
//!                                      ┌───────▼───────┐   ┌─────▼──────┐
//!                                      │ Model Invoker │   │   Cache    │
//!                                      │ Bedrock/API   │   │ S3/fs/mem  │
//!                                      └───────────────┘   └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types and the HTTP request/response contract |
//! | [`loader`] | Snapshot loading from a directory tree |
//! | [`chunk`] | Order-preserving chunk partitioning |
//! | [`aws`] | AWS credentials and SigV4 signing |
//! | [`model`] | Model backends and the retrying invoker |
//! | [`completion`] | Truncation detection and continuation |
//! | [`fanout`] | Bounded concurrent fan-out |
//! | [`prompts`] | Prompt builders |
//! | [`render`] | HTML post-processing (diagrams, markdown residue) |
//! | [`merge`] | Section stitching and unify merge |
//! | [`cache`] | Content-addressed document cache |
//! | [`source`] | Source host client and archive extraction |
//! | [`pipeline`] | End-to-end orchestration |
//! | [`server`] | HTTP server |

pub mod aws;
pub mod cache;
pub mod chunk;
pub mod completion;
pub mod config;
pub mod error;
pub mod fanout;
pub mod loader;
pub mod merge;
pub mod model;
pub mod models;
pub mod pipeline;
pub mod prompts;
pub mod render;
pub mod server;
pub mod source;
