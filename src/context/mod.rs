//! Context module - supporting documents for violation explanations
//!
//! The `ContextRetriever` trait abstracts the search backend so different
//! backends can be swapped:
//! - `AzureSearchRetriever`: Azure Cognitive Search index over REST
//! - `LocalRetriever`: keyword search over a directory of text documents
//!
//! Query semantics (lexical or embedding) belong to the backend.

mod retriever;
pub mod azure_search;
pub mod local;

pub use azure_search::AzureSearchRetriever;
pub use local::LocalRetriever;
pub use retriever::{ContextRetriever, RetrievalError, SearchHit};
