mod config;
mod date;
mod paths;
mod util;
mod progress;
mod concurrency;
mod pipeline;

mod record;
mod nesting;

mod search;
mod live;
mod export;

pub use crate::config::{CrawlOptions, Listing};
pub use crate::date::{format_unix, parse_unix, DayBound};
pub use crate::pipeline::RedditCrawl;
pub use crate::paths::{discover_pages, PageFile, PageKind};

// The nesting core and the records it runs over.
pub use crate::nesting::{resolve_depths, DepthMap, Nested, NestingError};
pub use crate::record::{
    classify_parent, comment_link, is_reply_to_comment, post_link, strip_kind, ParentLink,
    SearchComment, SearchPage, SearchPost, ThreadComment,
};

// API seams, so callers (and tests) can swap the network out.
pub use crate::search::{CacheReport, HttpSearchApi, RecheckReport, SearchApi};
pub use crate::live::{
    flatten_thread, load_thread, CrawlReport, HttpThreadApi, ThreadApi, ThreadSnapshot,
};

pub use crate::export::{
    ExportReport, PostSource, POSTS_HEADER, REFRESHED_POSTS_HEADER, SEARCH_COMMENTS_HEADER,
    THREAD_COMMENTS_HEADER,
};

// Expose tracing and thread pool setup to the binary.
pub use crate::util::{init_thread_pool, init_tracing_once};
