use crate::config::{CrawlOptions, Listing};
use crate::paths::{search_dir, thread_dir};
use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// Entry point: a cheap, cloneable builder over `CrawlOptions`. The cache,
/// crawl, recheck and export stages live in their own modules as further
/// `impl RedditCrawl` blocks.
#[derive(Clone, Default)]
pub struct RedditCrawl {
    pub(crate) opts: CrawlOptions,
}

impl RedditCrawl {
    pub fn new() -> Self {
        Self { opts: CrawlOptions::default() }
    }

    pub fn from_options(opts: CrawlOptions) -> Self {
        Self { opts }
    }

    pub fn options(&self) -> &CrawlOptions {
        &self.opts
    }

    // -------- Builder methods --------
    pub fn cache_root(mut self, dir: impl AsRef<Path>) -> Self {
        self.opts = self.opts.with_cache_root(dir);
        self
    }
    pub fn output_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.opts = self.opts.with_output_dir(dir);
        self
    }
    pub fn keyword(mut self, kw: impl AsRef<str>) -> Self {
        self.opts = self.opts.with_keyword(kw);
        self
    }
    pub fn subreddit(mut self, sub: impl AsRef<str>) -> Self {
        self.opts = self.opts.with_subreddit(sub);
        self
    }
    pub fn window(mut self, after: i64, before: i64) -> Self {
        self.opts = self.opts.with_window(after, before);
        self
    }
    pub fn page_size(mut self, n: u32) -> Self {
        self.opts = self.opts.with_page_size(n);
        self
    }
    pub fn search_base_url(mut self, url: impl Into<String>) -> Self {
        self.opts = self.opts.with_search_base_url(url);
        self
    }
    pub fn live_base_url(mut self, url: impl Into<String>) -> Self {
        self.opts = self.opts.with_live_base_url(url);
        self
    }
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.opts = self.opts.with_user_agent(ua);
        self
    }
    pub fn parallelism(mut self, threads: usize) -> Self {
        self.opts = self.opts.with_parallelism(threads);
        self
    }
    pub fn post_concurrency(mut self, n: usize) -> Self {
        self.opts = self.opts.with_post_concurrency(n);
        self
    }
    pub fn progress(mut self, yes: bool) -> Self {
        self.opts = self.opts.with_progress(yes);
        self
    }
    pub fn io_write_buffer(mut self, bytes: usize) -> Self {
        self.opts = self.opts.with_io_write_buffer(bytes);
        self
    }

    // -------- Cache layout --------
    pub fn posts_dir(&self) -> PathBuf {
        search_dir(&self.opts, Listing::Posts)
    }
    pub fn search_comments_dir(&self) -> PathBuf {
        search_dir(&self.opts, Listing::Comments)
    }
    pub fn threads_dir(&self) -> PathBuf {
        thread_dir(&self.opts)
    }

    pub(crate) fn ensure_output_dir(&self) -> Result<PathBuf> {
        let dir = self.opts.output_dir.clone();
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}
