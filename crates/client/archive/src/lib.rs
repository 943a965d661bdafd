//! HTTP layer of the sync pipeline.
//!
//! - [HttpFetcher]: resilient GET with bounded exponential backoff, shared by every other client.
//! - [ArchiveClient]: finalized bundle listing, point lookup, pool lookup and payload retrieval.
//! - [RpcClient]: block-by-height retrieval from an archival RPC node.

mod archive;
mod error;
mod fetcher;
mod rpc;


pub use archive::{ArchiveClient, StorageProvider, BUNDLES_PAGE_LIMIT};
pub use error::FetchError;
pub use fetcher::{user_agent, FetchOptions, HttpFetcher, HttpFetcherBuilder};
pub use rpc::RpcClient;
