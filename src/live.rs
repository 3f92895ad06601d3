//! Live crawl: refresh every cached post from the live API and flatten its
//! comment tree into flat records.

use crate::concurrency::for_each_limited;
use crate::paths::{discover_pages, PageKind};
use crate::pipeline::RedditCrawl;
use crate::progress::{finish, maybe_count_progress};
use crate::record::{classify_parent, strip_kind, value_to_unix, ParentLink, ThreadComment};
use crate::util::{init_tracing_once, read_json, remove_file_if_exists, write_json_atomic};
use ahash::{AHashMap, AHashSet};
use anyhow::{anyhow, bail, Context, Result};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Ids per `morechildren` request; the endpoint rejects longer lists.
const MORE_CHILDREN_BATCH: usize = 100;

/// Source of live comment threads.
pub trait ThreadApi: Send + Sync {
    /// The raw two-listing thread document for one post id (no `t3_` prefix).
    fn thread(&self, post_id: &str) -> Result<Value>;

    /// The comments behind a "load more" entry, as the flat `things` list of
    /// the `morechildren` endpoint. Each entry carries its own `parent_id`.
    fn more_children(&self, post_id: &str, children: &[String]) -> Result<Vec<Value>>;

    /// The thread document rooted at one comment, used for "continue this
    /// thread" entries.
    fn comment_thread(&self, post_id: &str, comment_id: &str) -> Result<Value>;
}

/// `ThreadApi` over the public JSON endpoints.
pub struct HttpThreadApi {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl HttpThreadApi {
    pub fn new(base_url: impl Into<String>, user_agent: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(60))
            .build()
            .context("build live http client")?;
        Ok(Self { client, base_url: base_url.into().trim_end_matches('/').to_string() })
    }

    fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Value> {
        let resp = self
            .client
            .get(url)
            .query(query)
            .send()
            .with_context(|| format!("GET {url}"))?;
        let status = resp.status();
        if !status.is_success() {
            bail!("GET {url} returned {status}");
        }
        resp.json::<Value>().with_context(|| format!("decode {url}"))
    }
}

impl ThreadApi for HttpThreadApi {
    fn thread(&self, post_id: &str) -> Result<Value> {
        let url = format!("{}/comments/{}/.json", self.base_url, post_id);
        self.get_json(&url, &[("limit", "500"), ("raw_json", "1")])
    }

    fn more_children(&self, post_id: &str, children: &[String]) -> Result<Vec<Value>> {
        let url = format!("{}/api/morechildren.json", self.base_url);
        let link_id = format!("t3_{post_id}");
        let ids = children.join(",");
        let body = self.get_json(
            &url,
            &[
                ("api_type", "json"),
                ("link_id", link_id.as_str()),
                ("children", ids.as_str()),
                ("limit_children", "false"),
                ("raw_json", "1"),
            ],
        )?;
        if let Some(errors) = body.pointer("/json/errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                bail!("morechildren for {post_id} failed: {}", Value::Array(errors.clone()));
            }
        }
        Ok(body
            .pointer("/json/data/things")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    fn comment_thread(&self, post_id: &str, comment_id: &str) -> Result<Value> {
        let url = format!("{}/comments/{}/_/{}/.json", self.base_url, post_id, comment_id);
        self.get_json(&url, &[("limit", "500"), ("raw_json", "1")])
    }
}

/// A post's live state plus its flattened comments.
#[derive(Clone, Debug, Default)]
pub struct ThreadSnapshot {
    pub score: Option<i64>,
    pub upvote_ratio: Option<f64>,
    /// Breadth-first: top-level comments first, then each following level.
    pub comments: Vec<ThreadComment>,
    /// "load more" stubs left unexpanded.
    pub more_stubs: usize,
}

/// Flatten a thread document (`[post listing, comment listing]`) as it is,
/// counting "load more" entries without fetching them.
pub fn flatten_thread(doc: &Value) -> Result<ThreadSnapshot> {
    walk_thread(doc, |_| Ok(None))
}

/// Fetch a post's thread and flatten it completely: every "load more" and
/// "continue this thread" entry is replaced by the comments behind it.
pub fn load_thread(api: &dyn ThreadApi, post_id: &str) -> Result<ThreadSnapshot> {
    let doc = api.thread(post_id)?;
    let mut expanded = AHashSet::new();
    walk_thread(&doc, |stub| expand_more(api, post_id, stub, &mut expanded))
}

/// Breadth-first walk. `expand` gets each `more` entry and returns the
/// entries it hides, or `None` to leave it as an unexpanded stub.
fn walk_thread<F>(doc: &Value, mut expand: F) -> Result<ThreadSnapshot>
where
    F: FnMut(&Value) -> Result<Option<Vec<Value>>>,
{
    let listings = doc.as_array().ok_or_else(|| anyhow!("thread document is not an array"))?;
    if listings.len() < 2 {
        bail!("thread document has {} listings, expected 2", listings.len());
    }

    let post = listings[0].pointer("/data/children/0/data");
    let mut snap = ThreadSnapshot {
        score: post.and_then(|p| p.get("score")).and_then(Value::as_i64),
        upvote_ratio: post.and_then(|p| p.get("upvote_ratio")).and_then(Value::as_f64),
        ..Default::default()
    };

    let mut queue: VecDeque<Value> = listings[1]
        .pointer("/data/children")
        .and_then(Value::as_array)
        .map(|children| children.iter().cloned().collect())
        .unwrap_or_default();
    // Fetched entries whose parent is another fetched entry, keyed by that
    // parent's fullname; queued when the parent is reached.
    let mut held: AHashMap<String, Vec<Value>> = AHashMap::new();
    let mut seen: AHashSet<String> = AHashSet::new();

    loop {
        while let Some(mut child) = queue.pop_front() {
            match child.get("kind").and_then(Value::as_str) {
                Some("t1") => {
                    let Some(data) = child.get_mut("data") else { continue };
                    let comment = comment_from_data(data);
                    if !seen.insert(comment.id.clone()) {
                        continue;
                    }
                    // `replies` is "" when there are none.
                    if let Some(replies) = data
                        .pointer_mut("/replies/data/children")
                        .and_then(Value::as_array_mut)
                    {
                        queue.extend(replies.drain(..));
                    }
                    if let Some(later) = held.remove(&format!("t1_{}", comment.id)) {
                        queue.extend(later);
                    }
                    snap.comments.push(comment);
                }
                Some("more") => match expand(&child)? {
                    Some(things) => {
                        let parent = child
                            .pointer("/data/parent_id")
                            .and_then(Value::as_str)
                            .unwrap_or_default();
                        for thing in things {
                            let p = thing
                                .pointer("/data/parent_id")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string();
                            if p == parent {
                                queue.push_back(thing);
                            } else {
                                held.entry(p).or_default().push(thing);
                            }
                        }
                    }
                    None => snap.more_stubs += 1,
                },
                other => tracing::debug!(kind = ?other, "ignoring unexpected thread child"),
            }
        }
        if held.is_empty() {
            break;
        }
        // Parents that never showed up; keep their replies anyway.
        tracing::debug!(parents = held.len(), "fetched replies without a fetched parent");
        let mut rest: Vec<(String, Vec<Value>)> = held.drain().collect();
        rest.sort_by(|a, b| a.0.cmp(&b.0));
        queue.extend(rest.into_iter().flat_map(|(_, things)| things));
    }
    Ok(snap)
}

/// Fetch what one `more` entry hides. Entries already expanded once come
/// back as `None` so a misbehaving API cannot loop forever.
fn expand_more(
    api: &dyn ThreadApi,
    post_id: &str,
    stub: &Value,
    expanded: &mut AHashSet<String>,
) -> Result<Option<Vec<Value>>> {
    let parent = stub.pointer("/data/parent_id").and_then(Value::as_str).unwrap_or_default();
    let children: Vec<String> = stub
        .pointer("/data/children")
        .and_then(Value::as_array)
        .map(|ids| ids.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    if !expanded.insert(format!("{parent}/{}", children.join(","))) {
        return Ok(None);
    }

    if !children.is_empty() {
        let mut things = Vec::with_capacity(children.len());
        for batch in children.chunks(MORE_CHILDREN_BATCH) {
            things.extend(api.more_children(post_id, batch)?);
        }
        tracing::debug!(
            post = %post_id,
            asked = children.len(),
            got = things.len(),
            "expanded more"
        );
        return Ok(Some(things));
    }

    // "continue this thread": the rest hangs off the parent comment's own page.
    match classify_parent(parent) {
        ParentLink::Comment(comment_id) if !comment_id.is_empty() => {
            let doc = api.comment_thread(post_id, comment_id)?;
            Ok(Some(replies_in(&doc, comment_id)))
        }
        _ => Ok(Some(Vec::new())),
    }
}

/// Replies of `comment_id` inside a comment-rooted thread document.
fn replies_in(doc: &Value, comment_id: &str) -> Vec<Value> {
    doc.pointer("/1/data/children")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .find(|c| c.pointer("/data/id").and_then(Value::as_str) == Some(comment_id))
        .and_then(|c| c.pointer("/data/replies/data/children"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn str_field(data: &Value, key: &str) -> String {
    data.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

fn bool_field(data: &Value, key: &str) -> bool {
    data.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn comment_from_data(data: &Value) -> ThreadComment {
    let author_id = data
        .get("author_fullname")
        .and_then(Value::as_str)
        .map(|s| s.strip_prefix("t2_").unwrap_or(s).to_string())
        .unwrap_or_else(|| "[deleted]".to_string());
    let author_name = data
        .get("author")
        .and_then(Value::as_str)
        .unwrap_or("[deleted]")
        .to_string();
    // `edited` is `false` or the edit timestamp.
    let edited = match data.get("edited") {
        Some(Value::Bool(_)) | None => 0,
        Some(v) => value_to_unix(v).unwrap_or(0),
    };

    ThreadComment {
        author_id,
        author_name,
        body: str_field(data, "body"),
        body_html: str_field(data, "body_html"),
        created_utc: data.get("created_utc").and_then(value_to_unix).unwrap_or(0),
        distinguished: data.get("distinguished").and_then(Value::as_str).map(str::to_string),
        edited,
        id: str_field(data, "id"),
        is_submitter: bool_field(data, "is_submitter"),
        link_id: str_field(data, "link_id"),
        parent_id: str_field(data, "parent_id"),
        permalink: str_field(data, "permalink"),
        saved: bool_field(data, "saved"),
        score: data.get("score").and_then(Value::as_i64).unwrap_or(0),
        stickied: bool_field(data, "stickied"),
        subreddit_id: str_field(data, "subreddit_id"),
    }
}

/// Outcome of a live crawl.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CrawlReport {
    /// Pages crawled, or retried for posts that failed before.
    pub pages: usize,
    pub pages_skipped: usize,
    pub posts: usize,
    pub comments: usize,
    /// Post ids whose thread could not be fetched or parsed.
    pub failed: Vec<String>,
}

struct PageOutcome {
    posts: usize,
    comments: Vec<ThreadComment>,
    failed: Vec<String>,
}

impl RedditCrawl {
    /// For every cached post page `post<N>.json`, fetch each post's live
    /// thread, then write:
    ///   - `updated_post<N>.json` next to it, with `score`, `upvote_ratio`
    ///     and `num_comments` refreshed;
    ///   - `<cache_root>/praw/comments/<keyword>/post<N>_comment.json`, the
    ///     flattened comments of every post on the page;
    ///   - `post<N>_failed.json` beside it while any post of the page failed.
    ///
    /// Posts that fail are logged and left as cached. With `resume`, pages
    /// whose outputs already exist are skipped, except that posts listed in
    /// their failed file are fetched again.
    pub fn crawl_threads(&self, api: &dyn ThreadApi, resume: bool) -> Result<CrawlReport> {
        init_tracing_once();
        let posts_dir = self.posts_dir();
        let pages = discover_pages(&posts_dir, PageKind::SearchPost);
        if pages.is_empty() {
            bail!("no cached post pages in {}; run the search cache first", posts_dir.display());
        }
        let out_dir = self.threads_dir();
        fs::create_dir_all(&out_dir).with_context(|| format!("create {}", out_dir.display()))?;

        let mut report = CrawlReport::default();
        let pb = maybe_count_progress(self.opts.progress, pages.len() as u64, "Crawling threads");

        for page in &pages {
            let updated_path = posts_dir.join(PageKind::UpdatedPost.file_name(page.page_no));
            let comments_path = out_dir.join(PageKind::ThreadComment.file_name(page.page_no));
            let failed_path = out_dir.join(PageKind::FailedPosts.file_name(page.page_no));

            let (mut doc, mut comments, retry) =
                if resume && updated_path.exists() && comments_path.exists() {
                    let retry = read_failed_ids(&failed_path)?;
                    if retry.is_empty() {
                        report.pages_skipped += 1;
                        if let Some(pb) = &pb {
                            pb.inc(1);
                        }
                        continue;
                    }
                    tracing::info!(
                        page = page.page_no,
                        posts = retry.len(),
                        "retrying failed posts"
                    );
                    let doc: Value = read_json(&updated_path)?;
                    let comments: Vec<ThreadComment> = read_json(&comments_path)?;
                    (doc, comments, Some(retry))
                } else {
                    (read_json::<Value>(&page.path)?, Vec::new(), None)
                };

            let outcome = self.crawl_page(api, &mut doc, retry.as_ref(), &page.path)?;
            if let Some(retry) = &retry {
                // A run cut short after writing may have kept some of them.
                comments.retain(|c| !retry.contains(strip_kind(&c.link_id)));
            }
            report.posts += outcome.posts;
            report.comments += outcome.comments.len();
            comments.extend(outcome.comments);

            // The failed list goes first, so a crash never leaves a page that
            // looks complete.
            if !outcome.failed.is_empty() {
                write_json_atomic(&failed_path, &outcome.failed)?;
            }
            write_json_atomic(&updated_path, &doc)?;
            write_json_atomic(&comments_path, &comments)?;
            if outcome.failed.is_empty() {
                remove_file_if_exists(&failed_path)?;
            }
            report.failed.extend(outcome.failed);
            report.pages += 1;
            if let Some(pb) = &pb {
                pb.inc(1);
            }
        }

        finish(pb, "Crawling threads");
        tracing::info!(
            pages = report.pages,
            skipped = report.pages_skipped,
            posts = report.posts,
            comments = report.comments,
            failed = report.failed.len(),
            "thread crawl finished"
        );
        Ok(report)
    }

    /// Crawl the posts of one page document in place (all of them, or only
    /// those in `only`), refreshing each post that succeeds.
    fn crawl_page(
        &self,
        api: &dyn ThreadApi,
        doc: &mut Value,
        only: Option<&AHashSet<String>>,
        source: &Path,
    ) -> Result<PageOutcome> {
        let posts = doc
            .get_mut("data")
            .and_then(Value::as_array_mut)
            .ok_or_else(|| anyhow!("{} has no data array", source.display()))?;

        let ids: Vec<(usize, String)> = posts
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.get("id").and_then(Value::as_str).map(|id| (i, id.to_string())))
            .filter(|(_, id)| only.map_or(true, |set| set.contains(id)))
            .collect();

        let snapshots: Mutex<Vec<Option<ThreadSnapshot>>> = Mutex::new(vec![None; posts.len()]);
        let failed: Mutex<Vec<(usize, String)>> = Mutex::new(Vec::new());
        for_each_limited(&ids, self.opts.post_concurrency, |(i, id)| {
            match load_thread(api, id) {
                Ok(snap) => {
                    tracing::debug!(
                        post = %id,
                        comments = snap.comments.len(),
                        more = snap.more_stubs,
                        "thread crawled"
                    );
                    snapshots.lock()[*i] = Some(snap);
                }
                Err(e) => {
                    tracing::warn!(
                        post = %id,
                        error = %e,
                        "thread crawl failed; keeping cached post"
                    );
                    failed.lock().push((*i, id.clone()));
                }
            }
            Ok(())
        })?;

        let mut comments: Vec<ThreadComment> = Vec::new();
        for (post, snap) in posts.iter_mut().zip(snapshots.into_inner()) {
            let Some(snap) = snap else { continue };
            if let Some(obj) = post.as_object_mut() {
                if let Some(score) = snap.score {
                    obj.insert("score".into(), json!(score));
                }
                if let Some(ratio) = snap.upvote_ratio {
                    obj.insert("upvote_ratio".into(), json!(ratio));
                }
                obj.insert("num_comments".into(), json!(snap.comments.len()));
            }
            comments.extend(snap.comments);
        }

        let mut failed = failed.into_inner();
        failed.sort_by_key(|(i, _)| *i);
        Ok(PageOutcome {
            posts: ids.len(),
            comments,
            failed: failed.into_iter().map(|(_, id)| id).collect(),
        })
    }
}

/// Post ids recorded as failed for a page; none when the file is absent.
fn read_failed_ids(path: &Path) -> Result<AHashSet<String>> {
    if !path.exists() {
        return Ok(AHashSet::new());
    }
    let ids: Vec<String> = read_json(path)?;
    Ok(ids.into_iter().collect())
}
