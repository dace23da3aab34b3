// Adapters implementing the application ports

pub mod in_memory_transform;
pub mod jsonl_feed_adapter;
pub mod liftover_adapter;
pub mod output_adapter;

pub use in_memory_transform::InMemoryTransformService;
pub use jsonl_feed_adapter::JsonlFeedAdapter;
pub use liftover_adapter::LiftOverAdapter;
pub use output_adapter::{FileOutputAdapter, OutputFormat};
