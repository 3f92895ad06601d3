use anyhow::{anyhow, Result};
use rcrawl::{Nested, RedditCrawl, SearchApi, ThreadApi, ThreadComment};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Bare comment for nesting tests: an id and a raw parent reference.
#[derive(Clone, Debug)]
pub struct Rec {
    pub id: String,
    pub parent: String,
}

impl Nested for Rec {
    fn id(&self) -> &str { &self.id }
    fn parent_ref(&self) -> &str { &self.parent }
}

/// `rec("c2", "t1_c1")`, `rec("c1", "t3_p")`.
pub fn rec(id: &str, parent: &str) -> Rec {
    Rec { id: id.to_string(), parent: parent.to_string() }
}

/// Fresh temp directory (kept on disk for the test's lifetime).
pub fn temp_root() -> PathBuf {
    let dir = tempfile::tempdir().unwrap();
    dir.into_path()
}

/// Crawl builder rooted in `root` with progress bars off.
pub fn crawl_at(root: &Path) -> RedditCrawl {
    RedditCrawl::new()
        .cache_root(root.join("cache"))
        .output_dir(root.join("results"))
        .keyword("dao")
        .subreddit("ethereum")
        .progress(false)
}

/// A search response body: `{"data": [...], "metadata": {"total_results": N}}`.
pub fn search_body(data: Vec<Value>, total_results: u64) -> String {
    json!({ "data": data, "metadata": { "total_results": total_results } }).to_string()
}

pub fn stamped(id: &str, created_utc: i64) -> Value {
    json!({ "id": id, "created_utc": created_utc })
}

/// A search post record.
pub fn post(id: &str, title: &str, selftext: Option<&str>, is_self: bool) -> Value {
    let mut v = json!({
        "id": id,
        "title": title,
        "author": "alice",
        "created_utc": 1_136_073_600,
        "is_self": is_self,
        "url": format!("http://example.com/{id}"),
        "num_comments": 3,
        "score": 10,
        "full_link": format!("https://www.reddit.com/r/ethereum/comments/{id}/x/"),
    });
    if let Some(t) = selftext {
        v["selftext"] = json!(t);
    }
    v
}

/// Write a page file, creating parent directories.
pub fn write_page(dir: &Path, name: &str, body: &Value) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join(name), serde_json::to_vec_pretty(body).unwrap()).unwrap();
}

pub fn thread_comment(id: &str, parent_id: &str, link_id: &str) -> ThreadComment {
    ThreadComment {
        author_id: format!("u_{id}"),
        author_name: format!("user_{id}"),
        body: format!("body of {id}"),
        body_html: String::new(),
        created_utc: 1_466_000_000,
        distinguished: None,
        edited: 0,
        id: id.to_string(),
        is_submitter: false,
        link_id: link_id.to_string(),
        parent_id: parent_id.to_string(),
        permalink: String::new(),
        saved: false,
        score: 1,
        stickied: false,
        subreddit_id: "t5_eth".to_string(),
    }
}

/// Read a CSV file into (header, rows).
pub fn read_csv(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut r = csv::Reader::from_path(path).unwrap();
    let header = r.headers().unwrap().iter().map(str::to_string).collect();
    let rows = r
        .records()
        .map(|rec| rec.unwrap().iter().map(str::to_string).collect())
        .collect();
    (header, rows)
}

/// Search API double: replays canned bodies in order and records every call.
pub struct FakeSearch {
    responses: Mutex<VecDeque<String>>,
    pub calls: Mutex<Vec<(String, HashMap<String, String>)>>,
}

impl FakeSearch {
    pub fn new(responses: Vec<String>) -> Self {
        Self { responses: Mutex::new(responses.into()), calls: Mutex::new(Vec::new()) }
    }
    pub fn calls(&self) -> Vec<(String, HashMap<String, String>)> {
        self.calls.lock().unwrap().clone()
    }
}

impl SearchApi for FakeSearch {
    fn get(&self, endpoint: &str, params: &[(&str, String)]) -> Result<String> {
        let map = params.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        self.calls.lock().unwrap().push((endpoint.to_string(), map));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("no canned response left"))
    }
}

/// Live API double: thread documents by post id (unknown ids fail), hidden
/// comments by id for "load more" lookups, and comment-rooted threads by
/// comment id.
#[derive(Default)]
pub struct FakeThreads {
    pub threads: HashMap<String, Value>,
    pub hidden: HashMap<String, Value>,
    pub comment_threads: HashMap<String, Value>,
    more_calls: Mutex<Vec<Vec<String>>>,
}

impl FakeThreads {
    pub fn new(threads: HashMap<String, Value>) -> Self {
        Self { threads, ..Default::default() }
    }

    /// Serve `thing` (a `t1` or `more` entry) when its id is asked for.
    pub fn hide(mut self, id: &str, thing: Value) -> Self {
        self.hidden.insert(id.to_string(), thing);
        self
    }

    pub fn with_comment_thread(mut self, comment_id: &str, doc: Value) -> Self {
        self.comment_threads.insert(comment_id.to_string(), doc);
        self
    }

    pub fn more_calls(&self) -> Vec<Vec<String>> {
        self.more_calls.lock().unwrap().clone()
    }
}

impl ThreadApi for FakeThreads {
    fn thread(&self, post_id: &str) -> Result<Value> {
        self.threads
            .get(post_id)
            .cloned()
            .ok_or_else(|| anyhow!("404 for {post_id}"))
    }

    fn more_children(&self, _post_id: &str, children: &[String]) -> Result<Vec<Value>> {
        self.more_calls.lock().unwrap().push(children.to_vec());
        Ok(children.iter().filter_map(|id| self.hidden.get(id).cloned()).collect())
    }

    fn comment_thread(&self, _post_id: &str, comment_id: &str) -> Result<Value> {
        self.comment_threads
            .get(comment_id)
            .cloned()
            .ok_or_else(|| anyhow!("404 for comment {comment_id}"))
    }
}

/// A `t1` thread child with optional replies.
pub fn t1(id: &str, parent_id: &str, link_id: &str, replies: Vec<Value>) -> Value {
    let replies = if replies.is_empty() {
        json!("")
    } else {
        json!({ "kind": "Listing", "data": { "children": replies } })
    };
    json!({
        "kind": "t1",
        "data": {
            "id": id,
            "author": format!("user_{id}"),
            "author_fullname": format!("t2_u{id}"),
            "body": format!("body of {id}"),
            "body_html": format!("<p>body of {id}</p>"),
            "created_utc": 1_466_000_000.0,
            "distinguished": null,
            "edited": false,
            "is_submitter": false,
            "link_id": link_id,
            "parent_id": parent_id,
            "permalink": format!("/r/ethereum/comments/x/{id}/"),
            "saved": false,
            "score": 2,
            "stickied": false,
            "subreddit_id": "t5_eth",
            "replies": replies,
        }
    })
}

pub fn more_stub(parent_id: &str) -> Value {
    more_of(parent_id, &["zz1", "zz2"])
}

/// A "load more" entry hiding `children`; no children means "continue this
/// thread".
pub fn more_of(parent_id: &str, children: &[&str]) -> Value {
    json!({
        "kind": "more",
        "data": { "count": children.len(), "parent_id": parent_id, "children": children }
    })
}

/// The two-listing document the live API returns for a post.
pub fn thread_doc(post_id: &str, score: i64, upvote_ratio: f64, children: Vec<Value>) -> Value {
    json!([
        { "kind": "Listing", "data": { "children": [
            { "kind": "t3", "data": { "id": post_id, "score": score, "upvote_ratio": upvote_ratio } }
        ] } },
        { "kind": "Listing", "data": { "children": children } }
    ])
}
