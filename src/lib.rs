//! # Catalog Harvest
//!
//! Multi-provider exercise catalog ingestion.
//!
//! Pulls exercises from several external catalogs (wger, ExerciseDB,
//! API Ninjas), reconciles them into one canonical record per real-world
//! exercise, enriches sparse records with media from YouTube and Giphy, and
//! upserts the result into SQLite.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌───────────┐   ┌────────┐   ┌──────────┐   ┌──────────┐
//! │  Providers  │──▶│ Normalize │──▶│ Merge  │──▶│  Enrich  │──▶│  SQLite  │
//! │ wger/EDB/N. │   │ signature │   │ by sig │   │ YT/Giphy │   │  upsert  │
//! └─────────────┘   └───────────┘   └────────┘   └──────────┘   └──────────┘
//!        │                                            │
//!        └──────────── HttpClient + LookupCache ──────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! harvest init                          # create the store
//! harvest sources                       # check API keys
//! harvest run --limit 200               # harvest
//! harvest run --enrich true             # harvest and attach media
//! harvest stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`fetch`] | HTTP JSON client with retries |
//! | [`cache`] | In-memory TTL lookup cache |
//! | [`pool`] | Bounded concurrent task runner |
//! | [`traits`] | Provider and media source traits, registries |
//! | [`provider_wger`] | wger adapter |
//! | [`provider_exercisedb`] | ExerciseDB adapter |
//! | [`provider_ninjas`] | API Ninjas adapter |
//! | [`media_youtube`] | YouTube media source |
//! | [`media_giphy`] | Giphy media source |
//! | [`normalize`] | Vocabulary mapping and signatures |
//! | [`merge`] | Candidate reconciliation |
//! | [`review`] | Near-duplicate detection |
//! | [`enrich`] | Media enrichment stage |
//! | [`store`] | Storage trait, SQLite and in-memory backends |
//! | [`upsert`] | Chunked transactional writes |
//! | [`ingest`] | Pipeline orchestration |
//! | [`sources`] | `harvest sources` listing |
//! | [`stats`] | `harvest stats` and `harvest duplicates` |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod cache;
pub mod config;
pub mod db;
pub mod enrich;
pub mod fetch;
pub mod ingest;
pub mod media_giphy;
pub mod media_youtube;
pub mod merge;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod pool;
pub mod provider_exercisedb;
pub mod provider_ninjas;
pub mod provider_wger;
pub mod review;
pub mod sources;
pub mod stats;
pub mod store;
pub mod traits;
pub mod upsert;
