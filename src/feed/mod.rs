// src/feed/mod.rs
// Feed interception: session, filtering, middleware and the page consumer

pub mod engine;
pub mod item;
pub mod middleware;
pub mod reader;
pub mod session;
pub mod stats;

pub use engine::{FeedFilterEngine, SelectOutcome};
pub use item::{extract_author_id, FeedPage};
pub use middleware::{ResponseTransform, TransformChain, FEED_PATH};
pub use reader::{FeedReader, ReadSummary};
pub use session::{ActiveGroup, FilterSession};
pub use stats::{FilterStats, StatsTracker};
