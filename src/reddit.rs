//! Reddit content source over the public JSON listing endpoints
//!
//! Listings are read from `/r/{community}/{sort}.json`, comment trees from
//! `/comments/{id}.json`. "Load more" placeholders are expanded breadth-first
//! through `/api/morechildren.json`, bounded by the caller's expand limit.

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::SourceConfig;
use crate::error::{MentionError, Result};
use crate::models::{CommentRef, HighWaterMark, SortMode, SubmissionRef};
use crate::repository::ContentSource;
use crate::retry::{retry, RetryPolicy};
use crate::validation::epoch_to_utc;

const COMPONENT: &str = "reddit";

/// Largest page the listing endpoint returns
const MAX_PAGE_SIZE: usize = 100;

/// Largest id batch accepted by the morechildren endpoint
const MAX_MORE_CHILDREN: usize = 100;

/// Listing wrapper shared by all endpoints
#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Default, Deserialize)]
struct ListingData {
    #[serde(default)]
    after: Option<String>,
    #[serde(default)]
    children: Vec<Thing>,
}

/// Kind-tagged object; `data` is decoded once the kind is known
#[derive(Debug, Deserialize)]
struct Thing {
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct LinkData {
    #[serde(default)]
    id: String,
    #[serde(default)]
    author_fullname: Option<String>,
    #[serde(default)]
    created_utc: Option<f64>,
    #[serde(default)]
    score: Option<i64>,
    #[serde(default)]
    num_comments: Option<i64>,
    #[serde(default)]
    subreddit: Option<String>,
    #[serde(default)]
    stickied: bool,
}

#[derive(Debug, Deserialize)]
struct CommentData {
    #[serde(default)]
    id: String,
    #[serde(default)]
    author_fullname: Option<String>,
    #[serde(default)]
    created_utc: Option<f64>,
    #[serde(default)]
    score: Option<i64>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    link_id: Option<String>,
    /// Either an empty string or a nested listing
    #[serde(default)]
    replies: Value,
}

#[derive(Debug, Deserialize)]
struct MoreData {
    #[serde(default)]
    children: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MoreChildrenResponse {
    json: MoreChildrenJson,
}

#[derive(Debug, Deserialize)]
struct MoreChildrenJson {
    #[serde(default)]
    data: MoreChildrenData,
}

#[derive(Debug, Default, Deserialize)]
struct MoreChildrenData {
    #[serde(default)]
    things: Vec<Thing>,
}

/// HTTP client for one subreddit
pub struct RedditClient {
    client: reqwest::Client,
    base_url: String,
    community: String,
    access_token: Option<String>,
    retry: RetryPolicy,
}

impl RedditClient {
    /// Build a client from source settings
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| MentionError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            community: config.community.clone(),
            access_token: config.access_token.clone().filter(|t| !t.is_empty()),
            retry: config.retry_policy(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T> {
        let mut request = self.client.get(url).query(query);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| MentionError::from_http(COMPONENT, &e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MentionError::from_status(COMPONENT, status.as_u16(), body));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| MentionError::from_http(COMPONENT, &e))?;
        serde_json::from_str(&body).map_err(|e| MentionError::malformed("response", url, e.to_string()))
    }

    /// One listing page
    async fn listing_page(&self, sort: SortMode, page_size: usize, after: Option<&str>) -> Result<ListingData> {
        let url = format!("{}/r/{}/{}.json", self.base_url, self.community, sort.path());
        let mut query = vec![("limit", page_size.to_string()), ("raw_json", "1".to_string())];
        if let SortMode::Top(window) = sort {
            query.push(("t", window.as_str().to_string()));
        }
        if let Some(after) = after {
            query.push(("after", after.to_string()));
        }

        let listing: Listing = retry(&self.retry, "list_submissions", || self.get_json(&url, &query)).await?;
        Ok(listing.data)
    }

    async fn more_children(&self, submission_id: &str, ids: &[String]) -> Result<Vec<Thing>> {
        let url = format!("{}/api/morechildren.json", self.base_url);
        let query = [
            ("api_type", "json".to_string()),
            ("raw_json", "1".to_string()),
            ("link_id", format!("t3_{submission_id}")),
            ("children", ids.join(",")),
        ];

        let response: MoreChildrenResponse =
            retry(&self.retry, "more_children", || self.get_json(&url, &query)).await?;
        Ok(response.json.data.things)
    }
}

#[async_trait]
impl ContentSource for RedditClient {
    fn community(&self) -> &str {
        &self.community
    }

    async fn list_submissions(
        &self, sort: SortMode, cursor: Option<&HighWaterMark>, limit: usize,
    ) -> Result<Vec<SubmissionRef>> {
        let mut submissions = Vec::new();
        let mut after: Option<String> = None;
        let mut reached_mark = false;

        while submissions.len() < limit {
            let page_size = (limit - submissions.len()).min(MAX_PAGE_SIZE);
            let page = self.listing_page(sort, page_size, after.as_deref()).await?;
            let exhausted = page.after.is_none() || page.children.is_empty();

            for thing in page.children {
                let Some(submission) = submission_from_thing(thing) else {
                    continue;
                };
                if cursor.is_some_and(|mark| !is_newer(&submission, mark)) {
                    reached_mark = true;
                    break;
                }
                submissions.push(submission);
                if submissions.len() >= limit {
                    break;
                }
            }

            if reached_mark || exhausted {
                break;
            }
            after = page.after;
        }

        if let Some(mark) = cursor {
            if !reached_mark && submissions.len() >= limit {
                warn!(
                    community = %self.community,
                    limit,
                    mark = %mark,
                    "Listing limit reached before the high-water mark; older unseen submissions are not collected"
                );
            }
        }

        debug!(community = %self.community, sort = %sort, count = submissions.len(), "Listed submissions");
        Ok(submissions)
    }

    async fn fetch_comments(&self, submission_id: &str, expand_limit: usize) -> Result<Vec<CommentRef>> {
        let url = format!("{}/comments/{}.json", self.base_url, submission_id);
        let query = [("raw_json", "1".to_string())];
        let listings: Vec<Listing> = retry(&self.retry, "fetch_comments", || self.get_json(&url, &query)).await?;

        let mut comments = Vec::new();
        let mut pending = VecDeque::new();
        if let Some(tree) = listings.into_iter().nth(1) {
            flatten(tree.data.children, submission_id, &mut comments, &mut pending);
        }

        expand_more(submission_id, expand_limit, &mut comments, &mut pending, move |ids| async move {
            self.more_children(submission_id, &ids).await
        })
        .await;

        Ok(comments)
    }
}

/// Expand queued "more" placeholders breadth-first with at most
/// `expand_limit` calls to `fetch`. A failed fetch ends the expansion and
/// keeps what was collected. Returns the number of fetches made.
async fn expand_more<F, Fut>(
    submission_id: &str, expand_limit: usize, comments: &mut Vec<CommentRef>, pending: &mut VecDeque<String>,
    mut fetch: F,
) -> usize
where
    F: FnMut(Vec<String>) -> Fut,
    Fut: Future<Output = Result<Vec<Thing>>>,
{
    let mut expansions = 0;
    while !pending.is_empty() && expansions < expand_limit {
        let take = pending.len().min(MAX_MORE_CHILDREN);
        let ids: Vec<String> = pending.drain(..take).collect();
        expansions += 1;

        match fetch(ids).await {
            Ok(things) => flatten(things, submission_id, comments, pending),
            Err(e) => {
                warn!(submission_id, error = %e, "Comment expansion failed; keeping comments fetched so far");
                break;
            },
        }
    }

    if !pending.is_empty() {
        debug!(submission_id, remaining = pending.len(), "Unexpanded comment placeholders left");
    }
    expansions
}

/// Decode a listing child into a submission reference; other kinds are ignored.
fn submission_from_thing(thing: Thing) -> Option<SubmissionRef> {
    if thing.kind != "t3" {
        return None;
    }

    match serde_json::from_value::<LinkData>(thing.data) {
        Ok(link) => Some(SubmissionRef {
            id: link.id,
            created_utc: link.created_utc,
            score: link.score.unwrap_or(0),
            num_comments: link.num_comments.unwrap_or(0),
            author_id: link.author_fullname,
            source_name: link.subreddit,
            stickied: link.stickied,
        }),
        Err(e) => {
            warn!(error = %e, "Undecodable submission in listing");
            None
        },
    }
}

/// Strictly newer than `mark` in (creation time, id) order. Records without a
/// usable timestamp are passed through for the validator to reject.
fn is_newer(submission: &SubmissionRef, mark: &HighWaterMark) -> bool {
    match epoch_to_utc(submission.created_utc) {
        Some(created_at) => (created_at, submission.id.as_str()) > (mark.created_at, mark.submission_id.as_str()),
        None => true,
    }
}

/// Walk a comment forest depth-first, queueing "more" placeholder ids.
fn flatten(things: Vec<Thing>, submission_id: &str, out: &mut Vec<CommentRef>, pending: &mut VecDeque<String>) {
    for thing in things {
        match thing.kind.as_str() {
            "t1" => {
                let data = match serde_json::from_value::<CommentData>(thing.data) {
                    Ok(data) => data,
                    Err(e) => {
                        warn!(submission_id, error = %e, "Undecodable comment");
                        continue;
                    },
                };

                let replies = replies_of(&data.replies);
                out.push(CommentRef {
                    id: data.id,
                    created_utc: data.created_utc,
                    score: data.score.unwrap_or(0),
                    author_id: data.author_fullname,
                    submission_id: data
                        .link_id
                        .map(|link| link.trim_start_matches("t3_").to_string())
                        .or_else(|| Some(submission_id.to_string())),
                    body: data.body,
                });
                flatten(replies, submission_id, out, pending);
            },
            // An empty children list is a "continue this thread" link, which
            // the morechildren endpoint cannot expand.
            "more" => {
                if let Ok(more) = serde_json::from_value::<MoreData>(thing.data) {
                    pending.extend(more.children);
                }
            },
            _ => {},
        }
    }
}

fn replies_of(value: &Value) -> Vec<Thing> {
    if !value.is_object() {
        return Vec::new();
    }
    serde_json::from_value::<Listing>(value.clone())
        .map(|listing| listing.data.children)
        .unwrap_or_default()
}
