pub mod decoder;
pub mod normalizer;
pub mod pipeline;
pub mod resolver;
pub mod timestamps;

pub use pipeline::Indexer;
pub use resolver::MarketDiscovery;
