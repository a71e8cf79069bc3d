//! Selector tables and extraction bounds.
//!
//! The feed renders the same logical content under several different markup
//! shapes depending on context, so every lookup is an ordered list of
//! patterns rather than a single selector. New layouts are supported by
//! extending these tables, not by adding branches to the extraction code.

/// Structural signatures that mark a region as a post candidate. Ordered by
/// fidelity; each is harvested every cycle.
pub const CONTAINER_SIGNATURES: &[&str] = &[
    r#"div[role="article"]"#,
    r#"div[data-ad-preview="message"]"#,
    r#"div[data-pagelet*="FeedUnit"]"#,
];

/// Link patterns that identify a post permalink, scoped to one container.
/// The first hit that normalizes wins.
pub const PERMALINK_PATTERNS: &[&str] = &[
    r#"a[href*="/posts/"]"#,
    r#"a[href*="/permalink/"]"#,
    r#"a[href*="story_fbid="]"#,
    r#"a[href*="/reel/"]"#,
    r#"a[href*="/videos/"]"#,
    r#"a[href*="/photo/"]"#,
    r#"a[href*="/photos/"]"#,
    r#"a[href*="/groups/"]"#,
];

/// Broad page-level permalink scan used by the secondary strategy. A single
/// grouped selector so one lookup surfaces every candidate in DOM order.
pub const PERMALINK_SCAN_SELECTOR: &str = concat!(
    r#"a[href*="/posts/"],"#,
    r#"a[href*="/permalink/"],"#,
    r#"a[href*="story_fbid="],"#,
    r#"a[href*="/reel/"],"#,
    r#"a[href*="/videos/"]"#,
);

/// Controls that lazily render comment DOM, clicked (bounded) before comment
/// patterns are scanned.
pub const COMMENT_EXPAND_PATTERNS: &[&str] = &[
    r#"div[role="button"][aria-label*="Comment"]"#,
    r#"div[role="button"][aria-label*="Comments"]"#,
    r#"div[role="button"][aria-label*="View more comments"]"#,
    r#"div[role="button"][aria-label*="See more comments"]"#,
    r#"a[role="link"][aria-label*="Comment"]"#,
];

/// Comment text patterns, scanned in order within one container.
pub const COMMENT_TEXT_PATTERNS: &[&str] = &[
    r#"div[aria-label*="Comment"] div[dir="auto"]"#,
    r#"ul li div[dir="auto"]"#,
    r#"div[data-ad-comet-preview="message"] div[dir="auto"]"#,
    r#"div[role="article"] ul div[dir="auto"]"#,
];

/// Page-level controls that expose more feed or comment nodes between
/// harvest passes.
pub const PAGE_EXPAND_PATTERNS: &[&str] = &[
    r#"div[role="button"][aria-label*="See more"]"#,
    r#"div[role="button"][aria-label*="More posts"]"#,
    r#"div[role="button"][aria-label*="View more comments"]"#,
    r#"div[role="button"][aria-label*="See previous comments"]"#,
];

/// Selectors feeding the structural probe: container signatures plus the
/// high-signal permalink patterns.
pub const PROBE_SELECTORS: &[&str] = &[
    r#"div[role="article"]"#,
    r#"div[data-ad-preview="message"]"#,
    r#"div[data-pagelet*="FeedUnit"]"#,
    r#"a[href*="/posts/"]"#,
    r#"a[href*="/permalink/"]"#,
    r#"a[href*="story_fbid="]"#,
];

/// Query parameters that identify a content item; everything else is
/// volatile (tracking, pagination cursors) and dropped during normalization.
pub const IDENTITY_QUERY_KEYS: &[&str] = &["fbid", "id", "story_fbid"];

/// Candidate text shorter than this is a noise node, not a post body.
pub const MIN_POST_TEXT_LEN: usize = 20;

/// Comment fragments shorter than this are discarded.
pub const MIN_COMMENT_TEXT_LEN: usize = 3;

/// Comments retained per post.
pub const MAX_COMMENTS_PER_POST: usize = 12;

/// Expand-control clicks attempted per pattern within one container.
pub const MAX_EXPAND_CLICKS_PER_PATTERN: usize = 3;

/// Page-level expand-control clicks attempted per pattern per cycle.
pub const MAX_PAGE_EXPAND_CLICKS: usize = 8;

/// Upper bound on anchors examined by the broad permalink scan.
pub const MAX_PERMALINK_SCAN: usize = 250;

/// Page-fallback snippet length in characters.
pub const MAX_PAGE_SNIPPET_LEN: usize = 1200;
