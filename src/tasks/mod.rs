mod cache_purge;

pub use cache_purge::CachePurgeTask;
