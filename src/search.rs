//! Bulk historical search: page through a listing and cache every raw page,
//! plus the by-id lookup used to recheck deleted posts.

use crate::config::Listing;
use crate::paths::{discover_pages, search_dir, PageKind};
use crate::pipeline::RedditCrawl;
use crate::progress::{finish, maybe_count_progress};
use crate::record::{de_unix, SearchPage, SearchPost};
use crate::util::{init_tracing_once, write_file_atomic};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

/// Ids per lookup request are flushed once more than this many are pending.
const RECHECK_BATCH: usize = 20;

/// Read side of the search API. Returns raw response bodies so they can be
/// cached byte for byte.
pub trait SearchApi: Send + Sync {
    /// GET `/reddit/search/<endpoint>` with the given query parameters.
    fn get(&self, endpoint: &str, params: &[(&str, String)]) -> Result<String>;
}

/// `SearchApi` over HTTP.
pub struct HttpSearchApi {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl HttpSearchApi {
    pub fn new(base_url: impl Into<String>, user_agent: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(120))
            .build()
            .context("build search http client")?;
        Ok(Self { client, base_url: base_url.into().trim_end_matches('/').to_string() })
    }
}

impl SearchApi for HttpSearchApi {
    fn get(&self, endpoint: &str, params: &[(&str, String)]) -> Result<String> {
        let url = format!("{}/reddit/search/{}", self.base_url, endpoint);
        let resp = self
            .client
            .get(&url)
            .query(params)
            .send()
            .with_context(|| format!("GET {url}"))?;
        let status = resp.status();
        let body = resp.text().with_context(|| format!("read body of {url}"))?;
        if !status.is_success() {
            bail!("GET {url} returned {status}");
        }
        Ok(body)
    }
}

/// Only what pagination needs from each record.
#[derive(Deserialize)]
struct Stamp {
    #[serde(default, deserialize_with = "de_unix")]
    created_utc: i64,
}

/// Outcome of caching one listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheReport {
    pub listing: Listing,
    /// True when the cache directory already existed and nothing was fetched.
    pub skipped: bool,
    pub total_results: u64,
    pub pages_written: usize,
}

/// Outcome of a deleted-post recheck.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecheckReport {
    /// Posts whose cached text is `[deleted]`.
    pub deleted_seen: usize,
    /// `(id, selftext)` for posts the search API still has text for.
    pub recovered: Vec<(String, String)>,
}

impl RedditCrawl {
    /// Cache both posts and comments for the configured keyword.
    pub fn cache_search(&self, api: &dyn SearchApi) -> Result<Vec<CacheReport>> {
        Ok(vec![
            self.cache_listing(api, Listing::Posts)?,
            self.cache_listing(api, Listing::Comments)?,
        ])
    }

    /// Page through one listing, writing each raw page to
    /// `<cache_root>/pushshift/<listing>/<keyword>/<stem><N>.json`.
    ///
    /// Caching is by directory: if it already exists nothing is fetched. A
    /// run that fails midway leaves a partial directory behind, which has to
    /// be removed before retrying.
    pub fn cache_listing(&self, api: &dyn SearchApi, listing: Listing) -> Result<CacheReport> {
        init_tracing_once();
        let dir = search_dir(&self.opts, listing);
        if dir.exists() {
            tracing::info!(dir = %dir.display(), "{} already cached; skipping", listing.label());
            return Ok(CacheReport { listing, skipped: true, total_results: 0, pages_written: 0 });
        }
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;

        let size = self.opts.page_size.max(1);
        let mut params: Vec<(&str, String)> = vec![
            ("q", self.opts.keyword.clone()),
            ("after", self.opts.after.to_string()),
            ("before", self.opts.before.to_string()),
            ("subreddit", self.opts.subreddit.clone()),
            ("sort", "asc".to_string()),
            ("sort_type", "created_utc".to_string()),
            ("size", size.to_string()),
            ("metadata", "true".to_string()),
        ];

        let kind = PageKind::for_listing(listing);
        let body = api.get(listing.endpoint(), &params).with_context(|| {
            format!("fetch {} page 1 (remove {} to retry)", listing.label(), dir.display())
        })?;
        let first: SearchPage<Stamp> = serde_json::from_str(&body)
            .with_context(|| format!("parse {} page 1", listing.label()))?;
        let total_results = first
            .metadata
            .as_ref()
            .map(|m| m.total_results)
            .unwrap_or(first.data.len() as u64);
        let pages = total_results.div_ceil(u64::from(size)) as usize;
        write_file_atomic(&dir.join(kind.file_name(1)), body.as_bytes())?;
        let mut pages_written = 1usize;

        tracing::info!(
            listing = listing.label(),
            keyword = %self.opts.keyword,
            total_results,
            pages,
            "started caching"
        );

        let mut last_time = match first.data.last() {
            Some(s) => s.created_utc,
            None => {
                tracing::info!(listing = listing.label(), "no results");
                return Ok(CacheReport { listing, skipped: false, total_results, pages_written });
            }
        };

        let label = format!("Caching {}", listing.label());
        let pb = maybe_count_progress(self.opts.progress, pages as u64, &label);
        if let Some(pb) = &pb { pb.inc(1); }

        for page_no in 2..=pages {
            if let Some(p) = params.iter_mut().find(|(k, _)| *k == "after") {
                p.1 = (last_time + 1).to_string();
            }
            let body = api.get(listing.endpoint(), &params).with_context(|| {
                let dir = dir.display();
                format!("fetch {} page {page_no} (remove {dir} to retry)", listing.label())
            })?;
            let page: SearchPage<Stamp> = serde_json::from_str(&body)
                .with_context(|| format!("parse {} page {page_no}", listing.label()))?;
            let Some(last) = page.data.last() else {
                tracing::warn!(page_no, pages, "empty page before the expected end; stopping");
                break;
            };
            last_time = last.created_utc;
            write_file_atomic(&dir.join(kind.file_name(page_no)), body.as_bytes())?;
            pages_written += 1;
            tracing::debug!(page_no, pages, "page cached");
            if let Some(pb) = &pb { pb.inc(1); }
        }

        finish(pb, &label);
        tracing::info!(listing = listing.label(), pages_written, "finished caching");
        Ok(CacheReport { listing, skipped: false, total_results, pages_written })
    }

    /// Look up every cached post whose text reads `[deleted]` on the search
    /// API again, and report the ones it still has text for.
    ///
    /// Reads refreshed pages (`updated_post<N>.json`) when present, raw pages
    /// otherwise.
    pub fn recheck_deleted_posts(&self, api: &dyn SearchApi) -> Result<RecheckReport> {
        init_tracing_once();
        let dir = self.posts_dir();
        let mut pages = discover_pages(&dir, PageKind::UpdatedPost);
        if pages.is_empty() {
            pages = discover_pages(&dir, PageKind::SearchPost);
        }
        if pages.is_empty() {
            bail!("no cached post pages in {}", dir.display());
        }

        let mut report = RecheckReport::default();
        let pb = maybe_count_progress(self.opts.progress, pages.len() as u64, "Rechecking");

        for page in &pages {
            let raw = fs::read_to_string(&page.path)
                .with_context(|| format!("read {}", page.path.display()))?;
            let parsed: SearchPage<SearchPost> = serde_json::from_str(&raw)
                .with_context(|| format!("parse {}", page.path.display()))?;

            let mut ids: Vec<String> = Vec::new();
            for post in &parsed.data {
                if post.selftext.as_deref() != Some("[deleted]") {
                    continue;
                }
                ids.push(post.id.clone());
                report.deleted_seen += 1;
                if ids.len() > RECHECK_BATCH {
                    report.recovered.extend(lookup_recovered(api, &ids)?);
                    ids.clear();
                }
            }
            if !ids.is_empty() {
                report.recovered.extend(lookup_recovered(api, &ids)?);
            }
            if let Some(pb) = &pb { pb.inc(1); }
        }

        finish(pb, "Rechecking");
        tracing::info!(
            deleted = report.deleted_seen,
            recovered = report.recovered.len(),
            "recheck finished"
        );
        Ok(report)
    }
}

fn lookup_recovered(api: &dyn SearchApi, ids: &[String]) -> Result<Vec<(String, String)>> {
    let body = api.get(Listing::Posts.endpoint(), &[("ids", ids.join(","))])?;
    let page: SearchPage<SearchPost> = serde_json::from_str(&body).context("parse id lookup")?;
    Ok(page
        .data
        .into_iter()
        .filter_map(|p| match p.selftext {
            Some(text) if text != "[deleted]" => Some((p.id, text)),
            _ => None,
        })
        .collect())
}
