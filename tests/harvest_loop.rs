//! End-to-end tests of the harvest loop against a scripted surface.
//!
//! The fake surface answers the same selector families the real Chromium
//! surface would, reveals more posts on each scroll, and makes every wait a
//! no-op so the loop's timing logic runs instantly.

use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use sentinel_harvest::{
    ContentRecord, FeedSurface, HarvestConfig, ReadyState, RecordSink, SourceStrategy,
    run_on_surface,
};

const ARTICLE: &str = r#"div[role="article"]"#;
const COMMENT_TEXT: &str = r#"div[aria-label*="Comment"] div[dir="auto"]"#;

#[derive(Clone)]
struct FakePost {
    text: String,
    permalink: Option<String>,
    comments: Vec<String>,
}

impl FakePost {
    fn new(text: &str, permalink: Option<&str>) -> Self {
        Self {
            text: text.to_string(),
            permalink: permalink.map(str::to_string),
            comments: Vec::new(),
        }
    }

    fn with_comments(mut self, comments: &[&str]) -> Self {
        self.comments = comments.iter().map(|c| c.to_string()).collect();
        self
    }
}

struct FakeSurface {
    posts: Vec<FakePost>,
    anchors: Vec<(String, String)>,
    title: String,
    body: String,
    ready: ReadyState,
    revealed: Mutex<usize>,
    nav_calls: Mutex<usize>,
    scroll_calls: Mutex<usize>,
}

impl FakeSurface {
    fn new() -> Self {
        Self {
            posts: Vec::new(),
            anchors: Vec::new(),
            title: String::new(),
            body: String::new(),
            ready: ReadyState::Complete,
            revealed: Mutex::new(0),
            nav_calls: Mutex::new(0),
            scroll_calls: Mutex::new(0),
        }
    }

    fn with_posts(mut self, posts: Vec<FakePost>, initially_visible: usize) -> Self {
        self.posts = posts;
        self.revealed = Mutex::new(initially_visible);
        self
    }

    fn visible(&self) -> usize {
        (*self.revealed.lock().unwrap()).min(self.posts.len())
    }

    fn nav_calls(&self) -> usize {
        *self.nav_calls.lock().unwrap()
    }

    fn scroll_calls(&self) -> usize {
        *self.scroll_calls.lock().unwrap()
    }
}

#[async_trait]
impl FeedSurface for FakeSurface {
    async fn navigate(&self, _url: &str) -> Result<()> {
        *self.nav_calls.lock().unwrap() += 1;
        Ok(())
    }

    async fn ready_state(&self) -> Result<ReadyState> {
        Ok(self.ready)
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        // The broad permalink scan is the only grouped selector in use.
        if selector.contains(',') {
            return Ok(self.anchors.len());
        }
        if selector == ARTICLE {
            return Ok(self.visible());
        }
        Ok(0)
    }

    async fn inner_text(&self, selector: &str, index: usize) -> Result<Option<String>> {
        if selector.contains(',') {
            return Ok(self.anchors.get(index).map(|(_, text)| text.clone()));
        }
        if selector == ARTICLE && index < self.visible() {
            return Ok(Some(self.posts[index].text.clone()));
        }
        Ok(None)
    }

    async fn attribute(
        &self,
        selector: &str,
        index: usize,
        name: &str,
    ) -> Result<Option<String>> {
        if selector.contains(',') && name == "href" {
            return Ok(self.anchors.get(index).map(|(href, _)| href.clone()));
        }
        Ok(None)
    }

    async fn click(&self, _selector: &str, _index: usize) -> Result<()> {
        Ok(())
    }

    async fn count_within(
        &self,
        scope: &str,
        scope_index: usize,
        selector: &str,
    ) -> Result<usize> {
        if scope != ARTICLE || scope_index >= self.visible() {
            return Ok(0);
        }
        let post = &self.posts[scope_index];
        if selector.starts_with("a[href") && selector.contains("/posts/") {
            return Ok(usize::from(post.permalink.is_some()));
        }
        if selector == COMMENT_TEXT {
            return Ok(post.comments.len());
        }
        Ok(0)
    }

    async fn inner_text_within(
        &self,
        scope: &str,
        scope_index: usize,
        selector: &str,
        index: usize,
    ) -> Result<Option<String>> {
        if scope == ARTICLE && selector == COMMENT_TEXT && scope_index < self.visible() {
            return Ok(self.posts[scope_index].comments.get(index).cloned());
        }
        Ok(None)
    }

    async fn attribute_within(
        &self,
        scope: &str,
        scope_index: usize,
        _selector: &str,
        _index: usize,
        name: &str,
    ) -> Result<Option<String>> {
        if scope == ARTICLE && name == "href" && scope_index < self.visible() {
            return Ok(self.posts[scope_index].permalink.clone());
        }
        Ok(None)
    }

    async fn click_within(
        &self,
        _scope: &str,
        _scope_index: usize,
        _selector: &str,
        _index: usize,
    ) -> Result<()> {
        Ok(())
    }

    async fn scroll_by(&self, _pixels: i64) -> Result<()> {
        Ok(())
    }

    async fn scroll_to_bottom(&self) -> Result<()> {
        *self.scroll_calls.lock().unwrap() += 1;
        let mut revealed = self.revealed.lock().unwrap();
        if *revealed < self.posts.len() {
            *revealed += 1;
        }
        Ok(())
    }

    async fn document_height(&self) -> Result<i64> {
        Ok(self.visible() as i64 * 1000)
    }

    async fn page_title(&self) -> Result<String> {
        Ok(self.title.clone())
    }

    async fn body_text(&self) -> Result<String> {
        Ok(self.body.clone())
    }

    async fn wait(&self, _duration: Duration) {}
}

struct CollectingSink {
    seen: Mutex<Vec<ContentRecord>>,
}

impl CollectingSink {
    fn new() -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl RecordSink for CollectingSink {
    async fn deliver(&self, record: &ContentRecord) -> Result<()> {
        self.seen.lock().unwrap().push(record.clone());
        Ok(())
    }
}

fn config(target: &str, scroll_min: u32, scroll_max: u32) -> HarvestConfig {
    HarvestConfig::builder(target)
        .scroll_min(scroll_min)
        .scroll_max(scroll_max)
        .build()
        .unwrap()
}

fn long_post(n: u32) -> String {
    format!("Post number {n} with a body comfortably past the minimum length.")
}

#[tokio::test]
async fn loop_stops_once_feed_growth_stalls() {
    let posts = vec![
        FakePost::new(&long_post(1), Some("/posts/101")),
        FakePost::new(&long_post(2), Some("/posts/102")),
        FakePost::new(&long_post(3), Some("/posts/103")),
        FakePost::new(&long_post(4), Some("/posts/104")),
    ];
    let surface = FakeSurface::new().with_posts(posts, 1);
    let sink = CollectingSink::new();
    let config = config("https://feed.example/groups/99", 1, 2);

    let records = run_on_surface(&config, &surface, Some(&sink)).await;

    // Four distinct posts, each harvested once despite staying visible
    // across every cycle.
    assert_eq!(records.len(), 4);
    assert!(records
        .iter()
        .all(|r| r.source_strategy == SourceStrategy::ContainerPost));
    let urls: Vec<&str> = records.iter().map(|r| r.url.as_str()).collect();
    assert!(urls.contains(&"https://feed.example/posts/101"));
    assert!(urls.contains(&"https://feed.example/posts/104"));

    // Growth stopped after cycle 2; three stalled cycles later the loop quit,
    // well under the absolute cap of max_cycles (8 here).
    assert_eq!(surface.scroll_calls(), 6);

    // Every record also went through the sink as it was produced.
    let delivered = sink.seen.lock().unwrap();
    assert_eq!(delivered.len(), 4);
    assert!(urls.iter().all(|u| delivered.iter().any(|r| r.url == *u)));
}

#[tokio::test]
async fn cycle_cap_bounds_a_feed_that_never_stalls() {
    let posts: Vec<FakePost> = (1..=30)
        .map(|n| FakePost::new(&long_post(n), None))
        .collect();
    let surface = FakeSurface::new().with_posts(posts, 1);
    let config = config("https://feed.example/groups/7", 1, 1);

    let records = run_on_surface(&config, &surface, None).await;

    // min_cycles 1, scroll_max 1: absolute cap is 7 cycles. One post revealed
    // per scroll on top of the initial one.
    assert_eq!(surface.scroll_calls(), 7);
    assert_eq!(records.len(), 8);

    // No permalinks anywhere, so every identity is synthetic and distinct.
    let mut urls: Vec<&str> = records.iter().map(|r| r.url.as_str()).collect();
    urls.sort();
    urls.dedup();
    assert_eq!(urls.len(), 8);
    assert!(records.iter().all(|r| r.url.contains("#content-")));
}

#[tokio::test]
async fn page_fallback_carries_title_and_body_when_nothing_matches() {
    let mut surface = FakeSurface::new();
    surface.title = "Community Profile".to_string();
    surface.body = "Some   visible\npage body text here".to_string();
    let config = config("https://feed.example/profile", 1, 1);

    let records = run_on_surface(&config, &surface, None).await;

    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.source_strategy, SourceStrategy::PageFallback);
    assert_eq!(record.url, "https://feed.example/profile");
    assert!(record.raw_text.contains("Community Profile"));
    assert!(record.raw_text.contains("Some visible page body text here"));
    assert_eq!(record.comment_count, 0);
}

#[tokio::test]
async fn permalink_scan_rescues_a_run_with_no_containers() {
    let mut surface = FakeSurface::new();
    surface.anchors = vec![
        ("/posts/111?utm_source=x".to_string(), "Post one preview".to_string()),
        ("/posts/111".to_string(), "Post one again".to_string()),
        (
            "/posts/222?story_fbid=9&ref=feed".to_string(),
            "Post two preview".to_string(),
        ),
        ("/reel/555".to_string(), String::new()),
    ];
    let sink = CollectingSink::new();
    let config = config("https://feed.example/profile", 1, 1);

    let records = run_on_surface(&config, &surface, Some(&sink)).await;

    // The duplicate of /posts/111 collapses after normalization.
    assert_eq!(records.len(), 3);
    assert!(records
        .iter()
        .all(|r| r.source_strategy == SourceStrategy::PermalinkFallback));
    assert_eq!(records[0].url, "https://feed.example/posts/111");
    assert_eq!(records[0].raw_text, "Post one preview");
    assert_eq!(records[1].url, "https://feed.example/posts/222?story_fbid=9");
    // Anchors with no visible text get the placeholder body.
    assert_eq!(records[2].url, "https://feed.example/reel/555");
    assert!(records[2].raw_text.contains("Permalink discovered"));

    assert_eq!(sink.seen.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn navigation_degrades_through_all_three_tiers() {
    let mut surface = FakeSurface::new();
    surface.ready = ReadyState::Loading;
    let config = HarvestConfig::builder("https://feed.example/slow")
        .scroll_min(1)
        .scroll_max(1)
        .nav_timeout(Duration::from_millis(500))
        .build()
        .unwrap();

    let records = run_on_surface(&config, &surface, None).await;

    // One navigation per tier, then the run proceeds anyway.
    assert_eq!(surface.nav_calls(), 3);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].source_strategy, SourceStrategy::PageFallback);
    assert!(records[0].raw_text.contains("Fallback page-level record"));
}

#[tokio::test]
async fn comment_extraction_filters_noise_and_caps_volume() {
    let body = "The quick brown fox jumps over the lazy dog today";
    let post = FakePost::new(body, Some("/posts/301")).with_comments(&[
        "quick brown fox",     // substring of the post body
        body,                  // the post body itself
        "xy",                  // below minimum length
        "Great news everyone",
        "Great news everyone", // duplicate
        "ok!",
    ]);
    let surface = FakeSurface::new().with_posts(vec![post], 1);
    let config = config("https://feed.example/groups/5", 1, 1);

    let records = run_on_surface(&config, &surface, None).await;

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].comments, vec!["Great news everyone", "ok!"]);
    assert_eq!(records[0].comment_count, 2);

    // A flood of distinct comments is capped.
    let many: Vec<String> = (1..=15).map(|n| format!("comment number {n} text")).collect();
    let many_refs: Vec<&str> = many.iter().map(String::as_str).collect();
    let post = FakePost::new(body, Some("/posts/302")).with_comments(&many_refs);
    let surface = FakeSurface::new().with_posts(vec![post], 1);
    let config = self::config("https://feed.example/groups/5", 1, 1);

    let records = run_on_surface(&config, &surface, None).await;
    assert_eq!(records[0].comments.len(), 12);
}
