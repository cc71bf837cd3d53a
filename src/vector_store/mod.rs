// Vector store client - consumer of the embedding providers
pub mod chromadb;

pub use chromadb::{ChromaClient, CollectionInfo, QueryResult};
