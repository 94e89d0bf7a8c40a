//! GRC Context Store
//!
//! The data-sharing fabric between agents: scoped, sensitivity-tiered,
//! optionally encrypted entries in a keyed backing store, fronted by a
//! bounded local cache and guarded by an injected access policy.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       CONTEXT STORE                          │
//! │                                                              │
//! │   put ──▶ policy check ──▶ encrypt ──▶ KV + indexes + cache  │
//! │   get ──▶ access check ──▶ cache / KV ──▶ decrypt ──▶ entry  │
//! │                                                              │
//! │  ┌─────────────┐  ┌──────────────┐  ┌────────────────────┐  │
//! │  │ AccessMgr   │  │ ContextCache │  │ ShareBroker        │  │
//! │  │ (policy +   │  │ (recency-    │  │ (pending/approved  │  │
//! │  │  decisions) │  │  weighted    │  │  data shares)      │  │
//! │  │             │  │  LFU)        │  │                    │  │
//! │  └─────────────┘  └──────────────┘  └────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod access;
pub mod cache;
pub mod embedding;
pub mod entry;
pub mod kv;
pub mod share;
pub mod store;

pub use access::{AccessDecision, AccessManager, AccessPolicyTable, SensitivityPolicy};
pub use cache::ContextCache;
pub use embedding::Embedder;
pub use entry::{ContextEntry, ContextQuery};
pub use kv::{KvStore, MemoryKv};
pub use share::{DataShareRequest, ShareBroker, ShareOutcome, ShareStatus};
pub use store::{ContextMetrics, ContextStore};
