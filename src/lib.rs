//! # RAG Compliance
//!
//! Per-document semantic retrieval and specification compliance checking.
//!
//! Each ingested file gets its own vector index. Queries run against one
//! document (or a handful of them), and the compliance engine checks a list
//! of requirements against a document by retrieving the closest chunks for
//! each requirement and classifying the best similarity against a threshold.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Extractor │──▶│ Chunk+Embed  │──▶│ VectorIndex  │──▶ SQLite artifact
//! │ pdf/docx  │   │              │   │ per document │    + metadata JSON
//! └───────────┘   └──────────────┘   └──────┬───────┘
//!                                           │ registry
//!                                           ▼
//!                  ┌────────────┐     ┌────────────┐     ┌────────┐
//!                  │ Compliance │◀────│ RagService │────▶│ Report │
//!                  │   Engine   │     │  (query)   │     │        │
//!                  └────────────┘     └─────┬──────┘     └────────┘
//!                                           │
//!                                ┌──────────┴──────────┐
//!                                ▼                     ▼
//!                           ┌─────────┐          ┌───────────┐
//!                           │   CLI   │          │   HTTP    │
//!                           │ (ragc)  │          │  (tools)  │
//!                           └─────────┘          └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ragc ingest ./tender.pdf
//! ragc query tender "delivery deadline"
//! ragc compare tender --spec ./requirements.json
//! ragc report tender --spec ./requirements.json --format html > report.html
//! ragc serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`chunk`] | Text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | In-memory vector index |
//! | [`db`] | SQLite connection |
//! | [`migrate`] | Index artifact schema |
//! | [`store`] | Persisted index artifacts and metadata records |
//! | [`registry`] | Registry of loaded documents |
//! | [`extract`] | Text extraction from document files |
//! | [`service`] | Ingest, query, and lifecycle operations |
//! | [`specification`] | Requirement parsing |
//! | [`compliance`] | Compliance engine |
//! | [`report`] | Compliance report rendering |
//! | [`tools`] | Tool trait and built-in tools |
//! | [`server`] | HTTP tool server |

pub mod chunk;
pub mod compliance;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod migrate;
pub mod models;
pub mod registry;
pub mod report;
pub mod server;
pub mod service;
pub mod specification;
pub mod store;
pub mod tools;
