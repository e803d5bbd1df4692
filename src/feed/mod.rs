mod sanitizer;

pub use sanitizer::{FeedItem, FeedSanitizer, SanitizedFeed};
