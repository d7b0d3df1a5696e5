use std::time::Duration;

use reqwest::{redirect, Client, ClientBuilder, Response};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::{FetchError, FetchFailure};

pub const USER_AGENT: &str = "gator";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RssFeed {
    pub title: String,
    pub link: String,
    pub description: String,
    pub items: Vec<RssItem>,
}

/// A single channel item. `pub_date` is the raw text of `<pubDate>`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RssItem {
    pub title: String,
    pub link: String,
    pub description: String,
    pub pub_date: String,
}

impl RssFeed {
    fn from_channel(channel: &rss::Channel) -> Self {
        Self {
            title: unescape(channel.title()),
            link: channel.link().to_owned(),
            description: unescape(channel.description()),
            items: channel.items().iter().map(RssItem::from_rss_item).collect(),
        }
    }
}

impl RssItem {
    fn from_rss_item(item: &rss::Item) -> Self {
        Self {
            title: unescape(item.title().unwrap_or_default()),
            link: item.link().unwrap_or_default().to_owned(),
            description: unescape(item.description().unwrap_or_default()),
            pub_date: item.pub_date().unwrap_or_default().to_owned(),
        }
    }
}

fn unescape(text: &str) -> String {
    html_escape::decode_html_entities(text).into_owned()
}

/// Deadline and cancellation signal for a fetch. The default context never
/// expires and cannot be canceled.
#[derive(Debug, Clone, Default)]
pub struct FetchContext {
    timeout: Option<Duration>,
    cancel: Option<watch::Receiver<bool>>,
}

/// Cancels every fetch running under the contexts it was created with.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl FetchContext {
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn cancellable(mut self) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        self.cancel = Some(rx);
        (self, CancelHandle { tx })
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Resolves once the context is canceled; pends forever otherwise.
    async fn canceled(&self) {
        if let Some(rx) = &self.cancel {
            let mut rx = rx.clone();
            if rx.wait_for(|canceled| *canceled).await.is_ok() {
                return;
            }
        }
        std::future::pending::<()>().await
    }
}

#[derive(Debug, Clone)]
pub struct FeedFetcher {
    client: Client,
    max_body_bytes: u64,
}

impl FeedFetcher {
    pub fn new(max_body_bytes: u64) -> Result<Self, reqwest::Error> {
        let client = ClientBuilder::new()
            .redirect(redirect::Policy::limited(5))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            max_body_bytes,
        })
    }

    /// Downloads and decodes the RSS document at `url`. Nothing is returned
    /// unless the whole body was read and parsed.
    pub async fn fetch(&self, url: &str, ctx: &FetchContext) -> Result<RssFeed, FetchError> {
        let work = async {
            match ctx.timeout() {
                Some(after) => match tokio::time::timeout(after, self.fetch_inner(url)).await {
                    Ok(result) => result,
                    Err(_) => Err(FetchError::Timeout {
                        url: url.to_owned(),
                        after,
                    }),
                },
                None => self.fetch_inner(url).await,
            }
        };

        tokio::select! {
            biased;
            _ = ctx.canceled() => {
                debug!(url, "fetch canceled");
                Err(FetchError::Canceled { url: url.to_owned() })
            }
            result = work => result,
        }
    }

    async fn fetch_inner(&self, url: &str) -> Result<RssFeed, FetchError> {
        let failed = |source: FetchFailure| FetchError::Failed {
            url: url.to_owned(),
            source,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(Response::error_for_status)
            .map_err(|e| failed(e.into()))?;
        let body = self.read_body(url, response).await?;
        let channel = rss::Channel::read_from(&body[..]).map_err(|e| failed(e.into()))?;
        let feed = RssFeed::from_channel(&channel);
        info!(url, items = feed.items.len(), "fetched feed");
        Ok(feed)
    }

    async fn read_body(&self, url: &str, mut response: Response) -> Result<Vec<u8>, FetchError> {
        let limit = self.max_body_bytes;
        let too_large = || FetchError::TooLarge {
            url: url.to_owned(),
            limit,
        };
        if response.content_length().is_some_and(|len| len > limit) {
            return Err(too_large());
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| FetchError::Failed {
            url: url.to_owned(),
            source: e.into(),
        })? {
            if (body.len() + chunk.len()) as u64 > limit {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }
        debug!(url, bytes = body.len(), "read feed body");
        Ok(body)
    }
}
