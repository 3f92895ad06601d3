use anyhow::{anyhow, bail, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rcrawl::{
    init_thread_pool, init_tracing_once, CrawlOptions, HttpSearchApi, HttpThreadApi, Listing,
    PostSource, RedditCrawl,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "rcrawl",
    version,
    about = "Cache Reddit posts and comment threads matching a keyword, then export them to CSV",
    subcommand_required = true,
    arg_required_else_help = true
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Root of the raw page cache
    #[arg(long, global = true, env = "RCRAWL_CACHE_DIR", default_value = "./cache")]
    cache_dir: PathBuf,

    /// Directory CSV files are written to
    #[arg(long, global = true, default_value = "./results")]
    output_dir: PathBuf,

    /// Search keyword; also names the cache subdirectory
    #[arg(long, global = true, default_value = "dao")]
    keyword: String,

    #[arg(long, global = true, default_value = "ethereum")]
    subreddit: String,

    /// Window start, YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS (UTC)
    #[arg(long, global = true, default_value = "2016-01-01")]
    after: String,

    /// Window end, inclusive; a bare date covers the whole day
    #[arg(long, global = true, default_value = "2018-12-31")]
    before: String,

    #[arg(long, global = true, default_value_t = 250)]
    page_size: u32,

    #[arg(long, global = true, env = "RCRAWL_USER_AGENT")]
    user_agent: Option<String>,

    #[arg(long, global = true)]
    search_url: Option<String>,

    #[arg(long, global = true)]
    live_url: Option<String>,

    /// Worker threads for parsing and export (default: all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,

    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Page through the search API and cache raw pages
    Cache {
        #[arg(long, value_enum, default_value_t = CacheTarget::Both)]
        only: CacheTarget,
    },

    /// Refresh cached posts from the live API and flatten their comment threads
    Crawl {
        /// Skip pages that were already crawled, retrying only their failed posts
        #[arg(long)]
        resume: bool,

        /// Posts fetched at once
        #[arg(long, default_value_t = 1)]
        post_concurrency: usize,
    },

    /// Write CSV tables from the cache
    Export {
        #[arg(long, value_enum)]
        posts: Option<PostsFrom>,

        #[arg(long, value_enum)]
        comments: Option<CommentsFrom>,
    },

    /// Ask the search API again for posts cached as [deleted]
    Recheck,
}

#[derive(Clone, Copy, ValueEnum)]
enum CacheTarget {
    Posts,
    Comments,
    Both,
}

#[derive(Clone, Copy, ValueEnum)]
enum PostsFrom {
    /// Raw search pages
    Search,
    /// Pages refreshed by `crawl` (adds upvote_ratio)
    Refreshed,
}

#[derive(Clone, Copy, ValueEnum)]
enum CommentsFrom {
    /// Flattened live threads (adds nested_level)
    Thread,
    /// Raw search comment pages
    Search,
}

fn build(global: &GlobalArgs) -> Result<RedditCrawl> {
    let mut opts = CrawlOptions::default()
        .with_cache_root(&global.cache_dir)
        .with_output_dir(&global.output_dir)
        .with_keyword(&global.keyword)
        .with_subreddit(&global.subreddit)
        .with_page_size(global.page_size)
        .with_progress(!global.no_progress)
        .with_window_str(&global.after, &global.before)
        .map_err(|e| anyhow!(e))?;
    if let Some(ua) = &global.user_agent { opts = opts.with_user_agent(ua.clone()); }
    if let Some(url) = &global.search_url { opts = opts.with_search_base_url(url.clone()); }
    if let Some(url) = &global.live_url { opts = opts.with_live_base_url(url.clone()); }
    if let Some(n) = global.threads { opts = opts.with_parallelism(n); }
    Ok(RedditCrawl::from_options(opts))
}

fn main() -> Result<()> {
    init_tracing_once();
    let cli = Cli::parse();
    let crawl = build(&cli.global)?;
    init_thread_pool(crawl.options().parallelism);

    match cli.command {
        Commands::Cache { only } => {
            let opts = crawl.options();
            let api = HttpSearchApi::new(&opts.search_base_url, &opts.user_agent)?;
            let listings: &[Listing] = match only {
                CacheTarget::Posts => &[Listing::Posts],
                CacheTarget::Comments => &[Listing::Comments],
                CacheTarget::Both => &[Listing::Posts, Listing::Comments],
            };
            for &listing in listings {
                let r = crawl.cache_listing(&api, listing)?;
                if r.skipped {
                    println!("{}: already cached", listing.label());
                } else {
                    println!(
                        "{}: {} results in {} pages",
                        listing.label(),
                        r.total_results,
                        r.pages_written
                    );
                }
            }
        }
        Commands::Crawl { resume, post_concurrency } => {
            let crawl = crawl.post_concurrency(post_concurrency);
            let opts = crawl.options();
            let api = HttpThreadApi::new(&opts.live_base_url, &opts.user_agent)?;
            let r = crawl.crawl_threads(&api, resume)?;
            println!(
                "Crawled {} posts ({} comments) over {} pages; {} failed",
                r.posts, r.comments, r.pages, r.failed.len()
            );
        }
        Commands::Export { posts, comments } => {
            if posts.is_none() && comments.is_none() {
                bail!("nothing to export: pass --posts and/or --comments");
            }
            if let Some(from) = posts {
                let source = match from {
                    PostsFrom::Search => PostSource::Search,
                    PostsFrom::Refreshed => PostSource::Refreshed,
                };
                let r = crawl.export_posts(source)?;
                println!("Finished. Results stored in {}", r.path.display());
            }
            if let Some(from) = comments {
                let r = match from {
                    CommentsFrom::Thread => crawl.export_thread_comments()?,
                    CommentsFrom::Search => crawl.export_search_comments()?,
                };
                println!("Finished. Results stored in {}", r.path.display());
            }
        }
        Commands::Recheck => {
            let opts = crawl.options();
            let api = HttpSearchApi::new(&opts.search_base_url, &opts.user_agent)?;
            let r = crawl.recheck_deleted_posts(&api)?;
            for (id, text) in &r.recovered {
                println!("{id} {text}");
            }
            println!("{}", r.deleted_seen);
        }
    }

    Ok(())
}
