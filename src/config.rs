use crate::date::{parse_unix, DayBound};
use std::path::{Path, PathBuf};

/// Which search listing a cache run targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Listing {
    Posts,
    Comments,
}

impl Listing {
    /// Search endpoint path segment.
    pub fn endpoint(self) -> &'static str {
        match self {
            Listing::Posts => "submission",
            Listing::Comments => "comment",
        }
    }
    pub fn label(self) -> &'static str {
        match self {
            Listing::Posts => "posts",
            Listing::Comments => "comments",
        }
    }
}

/// User-facing options with sensible defaults and builder chaining.
#[derive(Clone, Debug)]
pub struct CrawlOptions {
    pub cache_root: PathBuf,
    pub output_dir: PathBuf,
    pub keyword: String,
    pub subreddit: String,             // normalized lowercase, no "r/"
    pub after: i64,                    // unix seconds, inclusive
    pub before: i64,                   // unix seconds, inclusive
    pub page_size: u32,
    pub search_base_url: String,
    pub live_base_url: String,
    pub user_agent: String,
    pub parallelism: Option<usize>,    // Some(N) to set rayon threads, None to use default
    pub post_concurrency: usize,       // posts crawled at once on the live API
    pub progress: bool,

    pub write_buffer_bytes: usize,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        // 2016-01-01T00:00:00Z .. 2018-12-31T23:59:59Z
        let after = 1_451_606_400;
        let before = 1_546_300_799;

        Self {
            cache_root: PathBuf::from("./cache"),
            output_dir: PathBuf::from("./results"),
            keyword: "dao".to_string(),
            subreddit: "ethereum".to_string(),
            after,
            before,
            page_size: 250,
            search_base_url: "https://api.pushshift.io".to_string(),
            live_base_url: "https://www.reddit.com".to_string(),
            user_agent: format!("rcrawl/{}", env!("CARGO_PKG_VERSION")),
            parallelism: None,
            post_concurrency: 1,
            progress: true,

            write_buffer_bytes: 256 * 1024,
        }
    }
}

impl CrawlOptions {
    pub fn with_cache_root(mut self, dir: impl AsRef<Path>) -> Self {
        self.cache_root = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_output_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.output_dir = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_keyword(mut self, kw: impl AsRef<str>) -> Self {
        self.keyword = kw.as_ref().trim().to_string();
        self
    }
    pub fn with_subreddit(mut self, sub: impl AsRef<str>) -> Self {
        let mut s = sub.as_ref().trim().to_lowercase();
        if let Some(rest) = s.strip_prefix("r/") {
            s = rest.to_string();
        }
        self.subreddit = s;
        self
    }
    pub fn with_window(mut self, after: i64, before: i64) -> Self {
        self.after = after;
        self.before = before;
        self
    }
    /// Same as `with_window`, from `YYYY-MM-DD[THH:MM:SS]` strings (UTC).
    /// A bare `before` day includes the whole day.
    pub fn with_window_str(self, after: &str, before: &str) -> Result<Self, String> {
        let a = parse_unix(after, DayBound::Start)?;
        let b = parse_unix(before, DayBound::End)?;
        if a > b {
            return Err(format!("window start {after} is after its end {before}"));
        }
        Ok(self.with_window(a, b))
    }
    pub fn with_page_size(mut self, n: u32) -> Self {
        self.page_size = n.max(1);
        self
    }
    pub fn with_search_base_url(mut self, url: impl Into<String>) -> Self {
        self.search_base_url = url.into().trim_end_matches('/').to_string();
        self
    }
    pub fn with_live_base_url(mut self, url: impl Into<String>) -> Self {
        self.live_base_url = url.into().trim_end_matches('/').to_string();
        self
    }
    pub fn with_user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = ua.into();
        self
    }
    pub fn with_parallelism(mut self, threads: usize) -> Self {
        self.parallelism = Some(threads);
        self
    }
    pub fn with_post_concurrency(mut self, n: usize) -> Self {
        self.post_concurrency = n.max(1);
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }
    pub fn with_io_write_buffer(mut self, bytes: usize) -> Self {
        self.write_buffer_bytes = bytes.max(8 * 1024);
        self
    }
}
