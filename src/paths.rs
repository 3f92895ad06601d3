use crate::config::{CrawlOptions, Listing};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use walkdir::WalkDir;

/// Kind of cached page file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageKind {
    SearchPost,    // post<N>.json
    SearchComment, // comment<N>.json
    UpdatedPost,   // updated_post<N>.json
    ThreadComment, // post<N>_comment.json
    FailedPosts,   // post<N>_failed.json
}

impl PageKind {
    pub fn file_name(self, page_no: usize) -> String {
        match self {
            PageKind::SearchPost => format!("post{page_no}.json"),
            PageKind::SearchComment => format!("comment{page_no}.json"),
            PageKind::UpdatedPost => format!("updated_post{page_no}.json"),
            PageKind::ThreadComment => format!("post{page_no}_comment.json"),
            PageKind::FailedPosts => format!("post{page_no}_failed.json"),
        }
    }

    fn pattern(self) -> &'static Regex {
        static SEARCH_POST: OnceLock<Regex> = OnceLock::new();
        static SEARCH_COMMENT: OnceLock<Regex> = OnceLock::new();
        static UPDATED_POST: OnceLock<Regex> = OnceLock::new();
        static THREAD_COMMENT: OnceLock<Regex> = OnceLock::new();
        static FAILED_POSTS: OnceLock<Regex> = OnceLock::new();
        let (cell, re) = match self {
            PageKind::SearchPost => (&SEARCH_POST, r"^post(\d+)\.json$"),
            PageKind::SearchComment => (&SEARCH_COMMENT, r"^comment(\d+)\.json$"),
            PageKind::UpdatedPost => (&UPDATED_POST, r"^updated_post(\d+)\.json$"),
            PageKind::ThreadComment => (&THREAD_COMMENT, r"^post(\d+)_comment\.json$"),
            PageKind::FailedPosts => (&FAILED_POSTS, r"^post(\d+)_failed\.json$"),
        };
        cell.get_or_init(|| Regex::new(re).unwrap())
    }

    pub fn for_listing(listing: Listing) -> Self {
        match listing {
            Listing::Posts => PageKind::SearchPost,
            Listing::Comments => PageKind::SearchComment,
        }
    }
}

/// One cached page on disk.
#[derive(Clone, Debug)]
pub struct PageFile {
    pub kind: PageKind,
    pub page_no: usize,
    pub path: PathBuf,
}

/// Directory holding search pages for a listing and keyword.
pub fn search_dir(opts: &CrawlOptions, listing: Listing) -> PathBuf {
    opts.cache_root.join("pushshift").join(listing.label()).join(&opts.keyword)
}

/// Directory holding flattened live threads for a keyword.
pub fn thread_dir(opts: &CrawlOptions) -> PathBuf {
    opts.cache_root.join("praw").join("comments").join(&opts.keyword)
}

fn discover_page_map(dir: &Path, kind: PageKind) -> BTreeMap<usize, PathBuf> {
    let re = kind.pattern();
    let mut map = BTreeMap::new();
    if !dir.exists() {
        return map;
    }
    for ent in WalkDir::new(dir).min_depth(1).max_depth(1).into_iter().flatten() {
        if let Some(name) = ent.file_name().to_str() {
            if let Some(caps) = re.captures(name) {
                if let Ok(n) = caps[1].parse::<usize>() {
                    map.insert(n, ent.path().to_path_buf());
                }
            }
        }
    }
    map
}

/// Pages of `kind` in `dir`, as the contiguous run `1, 2, 3, ...`.
/// Anything after the first missing number is ignored (with a warning).
pub fn discover_pages(dir: &Path, kind: PageKind) -> Vec<PageFile> {
    let map = discover_page_map(dir, kind);
    let mut pages = Vec::with_capacity(map.len());
    let mut expect = 1usize;
    for (n, path) in &map {
        if *n == 0 {
            continue;
        }
        if *n != expect {
            tracing::warn!(
                dir = %dir.display(),
                missing = expect,
                ignored = map.len() - pages.len(),
                "page sequence has a gap; ignoring later pages"
            );
            break;
        }
        pages.push(PageFile { kind, page_no: *n, path: path.clone() });
        expect += 1;
    }
    pages
}
