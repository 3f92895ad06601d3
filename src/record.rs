//! Wire records for cached pages, plus the small classification helpers the
//! exporters rely on.

use crate::nesting::Nested;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Where a parent reference points.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParentLink<'a> {
    /// The owning post (`t3_...`).
    Root,
    /// Another comment, prefix stripped.
    Comment(&'a str),
}

/// Classify a raw `parent_id` such as `t3_abc` or `t1_xyz`.
/// The kind digit sits at index 1; `3` marks a post.
pub fn classify_parent(parent_ref: &str) -> ParentLink<'_> {
    if parent_ref.as_bytes().get(1) == Some(&b'3') {
        ParentLink::Root
    } else {
        ParentLink::Comment(strip_kind(parent_ref))
    }
}

/// Drop the `tN_` kind prefix from a fullname.
#[inline]
pub fn strip_kind(fullname: &str) -> &str {
    fullname.get(3..).unwrap_or("")
}

/// A comment replies to another comment when its raw parent reference differs
/// from its raw post reference.
#[inline]
pub fn is_reply_to_comment(parent_ref: &str, link_ref: &str) -> bool {
    parent_ref != link_ref
}

/// One post from a search page (raw or refreshed).
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SearchPost {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default, deserialize_with = "de_unix")]
    pub created_utc: i64,
    #[serde(default)]
    pub selftext: Option<String>,
    #[serde(default)]
    pub is_self: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub num_comments: u64,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub full_link: String,
    #[serde(default)]
    pub upvote_ratio: Option<f64>,
}

impl SearchPost {
    /// Main content of a post: text, a placeholder, or the link it points at.
    pub fn contents(&self) -> &str {
        match self.selftext.as_deref() {
            None => "[deleted]",
            Some(s) if !s.is_empty() => s,
            Some(_) if self.is_self => "[empty]",
            Some(_) => &self.url,
        }
    }
}

/// One comment from a search comment page.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SearchComment {
    pub id: String,
    #[serde(default)]
    pub author: String,
    #[serde(default, deserialize_with = "de_unix")]
    pub created_utc: i64,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub score: i64,
    pub link_id: String,
    pub parent_id: String,
}

/// Envelope of a search response page.
#[derive(Debug, Deserialize)]
pub struct SearchPage<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub metadata: Option<SearchMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct SearchMetadata {
    #[serde(default)]
    pub total_results: u64,
}

/// A comment flattened out of a live thread.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThreadComment {
    pub author_id: String,
    pub author_name: String,
    pub body: String,
    pub body_html: String,
    pub created_utc: i64,
    pub distinguished: Option<String>,
    pub edited: i64,
    pub id: String,
    pub is_submitter: bool,
    pub link_id: String,
    pub parent_id: String,
    pub permalink: String,
    pub saved: bool,
    pub score: i64,
    pub stickied: bool,
    pub subreddit_id: String,
}

impl Nested for ThreadComment {
    fn id(&self) -> &str { &self.id }
    fn parent_ref(&self) -> &str { &self.parent_id }
}

impl Nested for SearchComment {
    fn id(&self) -> &str { &self.id }
    fn parent_ref(&self) -> &str { &self.parent_id }
}

pub fn post_link(post_id: &str) -> String {
    format!("https://www.reddit.com/comments/{post_id}")
}

pub fn comment_link(post_id: &str, comment_id: &str) -> String {
    format!("https://www.reddit.com/comments/{post_id}/comment/{comment_id}")
}

/// Timestamps show up as ints or floats depending on the API and era.
pub(crate) fn de_unix<'de, D>(d: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(d)?;
    Ok(value_to_unix(&v).unwrap_or(0))
}

pub(crate) fn value_to_unix(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f as i64),
        _ => None,
    }
}
