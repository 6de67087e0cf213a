//! The closed set of message-broker queues.
//!
//! Every producer and consumer names its channel through [`MessageBrokerQueue`]
//! rather than a string literal. The routing key is the wire identity; the
//! variant name is the code identity and can be renamed without touching the
//! wire. A queue that is not listed here cannot be referenced:
//!
//! ```compile_fail
//! use feedbus_queues::MessageBrokerQueue;
//!
//! let _ = MessageBrokerQueue::UrlFetchStarted.routing_key();
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BusError;

/// A message-broker queue, identified on the wire by its routing key.
///
/// Serializes as the routing key string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageBrokerQueue {
    /// A remote resource fetch finished with a content-bearing result.
    #[serde(rename = "url.fetch.completed")]
    UrlFetchCompleted,
    /// A batch of fetch requests submitted together.
    #[serde(rename = "url.fetch-batch")]
    UrlFetchBatch,
    /// A resource is failing to fetch but has not crossed the disable threshold.
    #[serde(rename = "url.failing")]
    UrlFailing,
    /// A resource failed often enough that its feeds get disabled.
    #[serde(rename = "url.failed.disable-feeds")]
    UrlFailedDisableFeeds,
    /// A resource was rejected (e.g. by policy) and its feeds get disabled.
    #[serde(rename = "url.rejected.disable-feeds")]
    UrlRejectedDisableFeeds,
    /// An article rejection severe enough to disable the delivering connection.
    #[serde(rename = "feed.rejected-article.disable-connection")]
    FeedRejectedArticleDisableConnection,
    /// Deliver articles to their destinations.
    #[serde(rename = "feed.deliver-articles")]
    FeedDeliverArticles,
    /// A feed was deleted.
    #[serde(rename = "feed.deleted")]
    FeedDeleted,
    /// A feed-level rejection that disables the feed itself.
    #[serde(rename = "feed.rejected.disable-feed")]
    FeedRejectedDisableFeed,
    /// Background job reconciling supporter role assignments.
    #[serde(rename = "sync-supporter-discord-roles")]
    SyncSupporterDiscordRoles,
}

impl MessageBrokerQueue {
    /// Every queue, in declaration order.
    pub const ALL: [MessageBrokerQueue; 10] = [
        Self::UrlFetchCompleted,
        Self::UrlFetchBatch,
        Self::UrlFailing,
        Self::UrlFailedDisableFeeds,
        Self::UrlRejectedDisableFeeds,
        Self::FeedRejectedArticleDisableConnection,
        Self::FeedDeliverArticles,
        Self::FeedDeleted,
        Self::FeedRejectedDisableFeed,
        Self::SyncSupporterDiscordRoles,
    ];

    /// The wire-level routing key for this queue.
    pub const fn routing_key(self) -> &'static str {
        match self {
            Self::UrlFetchCompleted => "url.fetch.completed",
            Self::UrlFetchBatch => "url.fetch-batch",
            Self::UrlFailing => "url.failing",
            Self::UrlFailedDisableFeeds => "url.failed.disable-feeds",
            Self::UrlRejectedDisableFeeds => "url.rejected.disable-feeds",
            Self::FeedRejectedArticleDisableConnection => {
                "feed.rejected-article.disable-connection"
            }
            Self::FeedDeliverArticles => "feed.deliver-articles",
            Self::FeedDeleted => "feed.deleted",
            Self::FeedRejectedDisableFeed => "feed.rejected.disable-feed",
            Self::SyncSupporterDiscordRoles => "sync-supporter-discord-roles",
        }
    }

    /// The symbolic name used in code, logs and snapshots.
    pub const fn name(self) -> &'static str {
        match self {
            Self::UrlFetchCompleted => "UrlFetchCompleted",
            Self::UrlFetchBatch => "UrlFetchBatch",
            Self::UrlFailing => "UrlFailing",
            Self::UrlFailedDisableFeeds => "UrlFailedDisableFeeds",
            Self::UrlRejectedDisableFeeds => "UrlRejectedDisableFeeds",
            Self::FeedRejectedArticleDisableConnection => "FeedRejectedArticleDisableConnection",
            Self::FeedDeliverArticles => "FeedDeliverArticles",
            Self::FeedDeleted => "FeedDeleted",
            Self::FeedRejectedDisableFeed => "FeedRejectedDisableFeed",
            Self::SyncSupporterDiscordRoles => "SyncSupporterDiscordRoles",
        }
    }

    /// The pipeline area this queue belongs to.
    pub fn domain(self) -> QueueDomain {
        QueueDomain::of_routing_key(self.routing_key())
    }

    /// Resolve a routing key received from outside the type system.
    pub fn from_routing_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|q| q.routing_key() == key)
    }

    /// Resolve a symbolic name (e.g. from a CLI argument).
    pub fn from_name(name: &str) -> Result<Self, BusError> {
        Self::ALL
            .into_iter()
            .find(|q| q.name() == name)
            .ok_or_else(|| BusError::UnknownQueueName(name.to_string()))
    }
}

impl fmt::Display for MessageBrokerQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.routing_key())
    }
}

impl FromStr for MessageBrokerQueue {
    type Err = BusError;

    /// Parse a routing key.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_routing_key(s).ok_or_else(|| BusError::UnknownRoutingKey(s.to_string()))
    }
}

/// Coarse grouping of queues by the part of the pipeline they serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueDomain {
    /// Fetching remote resources.
    Url,
    /// Feed and connection lifecycle, article delivery.
    Feed,
    /// Background jobs outside the fetch/deliver path.
    Job,
}

impl QueueDomain {
    /// Classify a routing key by its leading segment.
    pub fn of_routing_key(key: &str) -> Self {
        if key.starts_with("url.") {
            Self::Url
        } else if key.starts_with("feed.") {
            Self::Feed
        } else {
            Self::Job
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Url => "url",
            Self::Feed => "feed",
            Self::Job => "job",
        }
    }
}

impl fmt::Display for QueueDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for QueueDomain {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "url" => Ok(Self::Url),
            "feed" => Ok(Self::Feed),
            "job" => Ok(Self::Job),
            other => Err(BusError::Config(format!(
                "invalid queue domain '{other}', expected 'url', 'feed' or 'job'"
            ))),
        }
    }
}
