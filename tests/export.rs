#[path = "common/mod.rs"]
mod common;

use common::*;
use rcrawl::{PostSource, POSTS_HEADER, REFRESHED_POSTS_HEADER, SEARCH_COMMENTS_HEADER};
use serde_json::json;

#[test]
fn posts_export_numbers_rows_across_pages() {
    let root = temp_root();
    let crawl = crawl_at(&root);
    let dir = crawl.posts_dir();
    write_page(&dir, "post1.json", &json!({ "data": [
        post("a", "First", Some("hello, world"), true),
        post("b", "Second", Some(""), true),
    ] }));
    write_page(&dir, "post2.json", &json!({ "data": [
        post("c", "Third", Some(""), false),
        post("d", "Fourth", None, true),
    ] }));
    // not part of the contiguous run
    write_page(&dir, "post4.json", &json!({ "data": [post("z", "Stray", Some("x"), true)] }));

    let out = crawl.export_posts(PostSource::Search).unwrap();
    assert_eq!(out.path, root.join("results").join("posts.csv"));
    assert_eq!(out.pages, 2);
    assert_eq!(out.rows, 4);

    let (header, rows) = read_csv(&out.path);
    assert_eq!(header, POSTS_HEADER.to_vec());
    let nums: Vec<&str> = rows.iter().map(|r| r[0].as_str()).collect();
    assert_eq!(nums, vec!["1", "2", "3", "4"]);

    let contents: Vec<&str> = rows.iter().map(|r| r[4].as_str()).collect();
    assert_eq!(contents, vec!["hello, world", "[empty]", "http://example.com/c", "[deleted]"]);

    let first = &rows[0];
    assert_eq!(first[1], "First");
    assert_eq!(first[2], "alice");
    assert_eq!(first[3], "2006-01-01 00:00:00");
    assert_eq!(first[5], "3");
    assert_eq!(first[6], "10");
    assert_eq!(first[7], "https://www.reddit.com/r/ethereum/comments/a/x/");
}

#[test]
fn refreshed_posts_export_adds_upvote_ratio() {
    let root = temp_root();
    let crawl = crawl_at(&root);
    let mut p = post("a", "First", Some("x"), true);
    p["upvote_ratio"] = json!(0.75);
    write_page(&crawl.posts_dir(), "updated_post1.json", &json!({ "data": [p] }));

    let out = crawl.export_posts(PostSource::Refreshed).unwrap();
    let (header, rows) = read_csv(&out.path);
    assert_eq!(header, REFRESHED_POSTS_HEADER.to_vec());
    assert_eq!(rows[0][8], "0.75");
}

#[test]
fn search_comments_export_marks_replies_by_reference() {
    let root = temp_root();
    let crawl = crawl_at(&root);
    write_page(&crawl.search_comments_dir(), "comment1.json", &json!({ "data": [
        { "id": "c1", "author": "bob", "created_utc": 1466000000, "body": "top", "score": 3,
          "link_id": "t3_p1", "parent_id": "t3_p1", "nest_level": 1 },
        { "id": "c2", "author": "eve", "created_utc": 1466000100, "body": "reply", "score": -1,
          "link_id": "t3_p1", "parent_id": "t1_c9" },
    ] }));

    let out = crawl.export_search_comments().unwrap();
    assert_eq!(out.path, root.join("results").join("search_comments.csv"));
    let (header, rows) = read_csv(&out.path);
    assert_eq!(header, SEARCH_COMMENTS_HEADER.to_vec());

    assert_eq!(rows[0][7], "");
    assert_eq!(rows[1][7], "https://www.reddit.com/comments/p1/comment/c9");
    assert_eq!(rows[1][4], "-1");
    assert_eq!(rows[1][6], "https://www.reddit.com/comments/p1/comment/c2");
}

/// One page holding comments of two posts, children listed before parents.
#[test]
fn thread_export_resolves_each_post_separately() {
    let root = temp_root();
    let crawl = crawl_at(&root);
    let comments = vec![
        thread_comment("y2", "t1_y1", "t3_py"),
        thread_comment("x3", "t1_x2", "t3_px"),
        thread_comment("x1", "t3_px", "t3_px"),
        thread_comment("y1", "t3_py", "t3_py"),
        thread_comment("x2", "t1_x1", "t3_px"),
    ];
    write_page(&crawl.threads_dir(), "post1_comment.json", &json!(comments));

    let out = crawl.export_thread_comments().unwrap();
    let (_, rows) = read_csv(&out.path);
    let got: Vec<(&str, &str)> = rows.iter().map(|r| (r[3].as_str(), r[10].as_str())).collect();
    assert_eq!(got, vec![("y2", "2"), ("x3", "3"), ("x1", "1"), ("y1", "1"), ("x2", "2")]);
}

#[test]
fn thread_export_fails_on_orphaned_comment() {
    let root = temp_root();
    let crawl = crawl_at(&root);
    let comments = vec![
        thread_comment("x1", "t3_px", "t3_px"),
        thread_comment("x2", "t1_gone", "t3_px"),
    ];
    write_page(&crawl.threads_dir(), "post1_comment.json", &json!(comments));

    let err = crawl.export_thread_comments().unwrap_err();
    let msg = format!("{err:#}");
    assert!(msg.contains("post1_comment.json"), "{msg}");
    assert!(msg.contains("not in the batch"), "{msg}");
}

#[test]
fn export_without_cache_directory_is_an_error() {
    let root = temp_root();
    let crawl = crawl_at(&root);
    assert!(crawl.export_posts(PostSource::Search).is_err());
    assert!(crawl.export_thread_comments().is_err());
    assert!(crawl.export_search_comments().is_err());
}
