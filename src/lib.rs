//! # Lakehouse Adapter
//!
//! An LLM-powered adapter that turns messy documents into queryable tables.
//!
//! Upload a document (image, CSV, JSON, or plain text) and a Gemini model
//! infers a schema and extracts rows. Extracted data is validated, optionally
//! auto-fixed by the model, and persisted into an embedded SQLite lakehouse
//! with evolvable tables and a raw-JSON shadow column. Natural-language
//! questions are answered by model-generated SQL over the stored tables.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌──────────┐   ┌─────────┐
//! │ Document │──▶│ Extractor │──▶│ Validator│──▶│  SQLite  │
//! │ img/csv  │   │  (Gemini) │   │ +AutoFix │   │ lakehouse│
//! └──────────┘   └───────────┘   └──────────┘   └────┬────┘
//!                                                    │
//!                                  ┌─────────────────┤
//!                                  ▼                 ▼
//!                             ┌─────────┐      ┌──────────┐
//!                             │ Analyst │      │   CLI    │
//!                             │ NL→SQL  │      │  (lake)  │
//!                             └─────────┘      └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! lake init                        # create the session lakehouse
//! lake ingest receipt.png          # extract and load a document
//! lake tables                      # list tables with row counts
//! lake ask "total spend by month"  # natural-language query
//! lake serve                       # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`gemini`] | Gemini API client and response parsing |
//! | [`extract`] | Document analysis and schema inference |
//! | [`validate`] | Issue detection and model-driven auto-fix |
//! | [`store`] | SQLite lakehouse with schema evolution |
//! | [`session`] | Per-session lakehouse lifecycle |
//! | [`analyst`] | Natural-language question answering |
//! | [`export`] | CSV export |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |

pub mod analyst;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod extract;
pub mod gemini;
pub mod ingest;
pub mod manage;
pub mod models;
pub mod server;
pub mod session;
pub mod store;
pub mod validate;
