//! CSV export: flatten cached pages into `posts.csv` and comment tables.
//!
//! Pages are parsed (and comment batches resolved) in parallel; rows are
//! written afterwards in page order with a 1-based running index.

use crate::date::format_unix;
use crate::nesting::{resolve_depths, DepthMap};
use crate::paths::{discover_pages, PageFile, PageKind};
use crate::pipeline::RedditCrawl;
use crate::record::{
    comment_link, is_reply_to_comment, post_link, strip_kind, SearchComment, SearchPage, SearchPost,
    ThreadComment,
};
use crate::util::{create_with_backoff, init_tracing_once};
use anyhow::{anyhow, bail, Context, Result};
use rayon::prelude::*;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const POSTS_HEADER: [&str; 8] =
    ["num_post", "title", "author", "date", "contents", "comments", "votes", "link"];
pub const REFRESHED_POSTS_HEADER: [&str; 9] = [
    "num_post", "title", "author", "date", "contents", "comments", "votes", "link", "upvote_ratio",
];
pub const THREAD_COMMENTS_HEADER: [&str; 11] = [
    "num_comment", "author_id", "author_name", "comment_id", "date", "contents", "votes",
    "post_link", "comment_link", "reply_to", "nested_level",
];
pub const SEARCH_COMMENTS_HEADER: [&str; 8] =
    ["num_comment", "author", "date", "contents", "votes", "post_link", "comment_link", "reply_to"];

/// Which cached post pages to export.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PostSource {
    /// Raw search pages, `post<N>.json`.
    Search,
    /// Pages refreshed by the live crawl, `updated_post<N>.json`.
    Refreshed,
}

/// Outcome of one export.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportReport {
    pub path: PathBuf,
    pub pages: usize,
    pub rows: usize,
}

impl RedditCrawl {
    /// Write `<output_dir>/posts.csv`.
    pub fn export_posts(&self, source: PostSource) -> Result<ExportReport> {
        init_tracing_once();
        let kind = match source {
            PostSource::Search => PageKind::SearchPost,
            PostSource::Refreshed => PageKind::UpdatedPost,
        };
        let pages = require_pages(&self.posts_dir(), kind)?;
        let with_ratio = source == PostSource::Refreshed;

        let rows: Vec<Vec<Vec<String>>> = pages
            .par_iter()
            .map(|page| -> Result<Vec<Vec<String>>> {
                let parsed: SearchPage<SearchPost> = read_json(&page.path)?;
                Ok(parsed.data.iter().map(|p| post_row(p, with_ratio)).collect())
            })
            .collect::<Result<_>>()?;

        let header: &[&str] = if with_ratio { &REFRESHED_POSTS_HEADER } else { &POSTS_HEADER };
        self.write_table("posts.csv", header, pages.len(), rows)
    }

    /// Write `<output_dir>/comments.csv` from flattened live threads, with
    /// `reply_to` and `nested_level` (depth + 1) per comment.
    ///
    /// Fails if any post's comments do not form a tree rooted at the post.
    pub fn export_thread_comments(&self) -> Result<ExportReport> {
        init_tracing_once();
        let pages = require_pages(&self.threads_dir(), PageKind::ThreadComment)?;

        let rows: Vec<Vec<Vec<String>>> = pages
            .par_iter()
            .map(|page| -> Result<Vec<Vec<String>>> {
                let comments: Vec<ThreadComment> = read_json(&page.path)?;
                let depths = resolve_page_depths(&comments)
                    .with_context(|| format!("resolve nesting in {}", page.path.display()))?;
                comments
                    .iter()
                    .map(|c| -> Result<Vec<String>> {
                        let depth = depths
                            .get(&c.id)
                            .copied()
                            .ok_or_else(|| anyhow!("no depth resolved for comment {}", c.id))?;
                        Ok(thread_comment_row(c, depth))
                    })
                    .collect()
            })
            .collect::<Result<_>>()?;

        self.write_table("comments.csv", &THREAD_COMMENTS_HEADER, pages.len(), rows)
    }

    /// Write `<output_dir>/search_comments.csv` from raw search comment pages.
    /// Search pages hold matching comments only, not whole threads, so there
    /// is no nesting column.
    pub fn export_search_comments(&self) -> Result<ExportReport> {
        init_tracing_once();
        let pages = require_pages(&self.search_comments_dir(), PageKind::SearchComment)?;

        let rows: Vec<Vec<Vec<String>>> = pages
            .par_iter()
            .map(|page| -> Result<Vec<Vec<String>>> {
                let parsed: SearchPage<SearchComment> = read_json(&page.path)?;
                Ok(parsed.data.iter().map(search_comment_row).collect())
            })
            .collect::<Result<_>>()?;

        self.write_table("search_comments.csv", &SEARCH_COMMENTS_HEADER, pages.len(), rows)
    }

    fn write_table(
        &self,
        file_name: &str,
        header: &[&str],
        pages: usize,
        rows: Vec<Vec<Vec<String>>>,
    ) -> Result<ExportReport> {
        let out_dir = self.ensure_output_dir()?;
        let path = out_dir.join(file_name);
        let f = create_with_backoff(&path, 16, 50)
            .with_context(|| format!("create {}", path.display()))?;
        let buf = BufWriter::with_capacity(self.opts.write_buffer_bytes, f);
        let mut w = csv::Writer::from_writer(buf);
        w.write_record(header)?;

        let mut index = 0usize;
        for page_rows in rows {
            for mut row in page_rows {
                index += 1;
                row.insert(0, index.to_string());
                w.write_record(&row)?;
            }
        }
        let mut inner = w
            .into_inner()
            .map_err(|e| anyhow!("flush {}: {}", path.display(), e.error()))?;
        inner.flush()?;

        tracing::info!(path = %path.display(), rows = index, pages, "export finished");
        Ok(ExportReport { path, pages, rows: index })
    }
}

fn require_pages(dir: &Path, kind: PageKind) -> Result<Vec<PageFile>> {
    if !dir.exists() {
        bail!("cache directory {} not found", dir.display());
    }
    let pages = discover_pages(dir, kind);
    if pages.is_empty() {
        tracing::warn!(dir = %dir.display(), "no pages found; writing header only");
    }
    Ok(pages)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}

/// Resolve depths one post at a time; each post's comments form their own
/// batch, and batches are independent.
fn resolve_page_depths(comments: &[ThreadComment]) -> Result<DepthMap> {
    let mut by_post: ahash::AHashMap<&str, Vec<&ThreadComment>> = ahash::AHashMap::new();
    for c in comments {
        by_post.entry(c.link_id.as_str()).or_default().push(c);
    }
    let batches: Vec<(&str, Vec<&ThreadComment>)> = by_post.into_iter().collect();

    let resolved: Vec<DepthMap> = batches
        .par_iter()
        .map(|(post, batch)| {
            resolve_depths(batch).with_context(|| format!("post {post}"))
        })
        .collect::<Result<_>>()?;

    let mut out = DepthMap::with_capacity(comments.len());
    for m in resolved {
        out.extend(m);
    }
    Ok(out)
}

fn post_row(p: &SearchPost, with_ratio: bool) -> Vec<String> {
    let mut row = vec![
        p.title.clone(),
        p.author.clone(),
        format_unix(p.created_utc),
        p.contents().to_string(),
        p.num_comments.to_string(),
        p.score.to_string(),
        p.full_link.clone(),
    ];
    if with_ratio {
        row.push(p.upvote_ratio.map(|r| r.to_string()).unwrap_or_default());
    }
    row
}

fn reply_to(post_id: &str, parent_ref: &str, link_ref: &str) -> String {
    if is_reply_to_comment(parent_ref, link_ref) {
        comment_link(post_id, strip_kind(parent_ref))
    } else {
        String::new()
    }
}

fn thread_comment_row(c: &ThreadComment, depth: u32) -> Vec<String> {
    let post_id = strip_kind(&c.link_id);
    vec![
        c.author_id.clone(),
        c.author_name.clone(),
        c.id.clone(),
        format_unix(c.created_utc),
        c.body.clone(),
        c.score.to_string(),
        post_link(post_id),
        comment_link(post_id, &c.id),
        reply_to(post_id, &c.parent_id, &c.link_id),
        (depth + 1).to_string(),
    ]
}

fn search_comment_row(c: &SearchComment) -> Vec<String> {
    let post_id = strip_kind(&c.link_id);
    vec![
        c.author.clone(),
        format_unix(c.created_utc),
        c.body.clone(),
        c.score.to_string(),
        post_link(post_id),
        comment_link(post_id, &c.id),
        reply_to(post_id, &c.parent_id, &c.link_id),
    ]
}
