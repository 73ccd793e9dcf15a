use std::time::Duration;

use {
    redis::{AsyncCommands, aio::ConnectionManager},
    tracing::{debug, info, warn},
};

use confab_protocol::{channels, keys};

use crate::error::{Context, Error, Result};

/// Handle on the pub/sub fabric. Cheap to clone; all clones share one
/// multiplexed command connection.
#[derive(Clone)]
pub struct Broker {
    manager: ConnectionManager,
    url: String,
}

impl Broker {
    /// Connect with bounded retry: `attempts` tries, a fixed `delay` apart.
    ///
    /// Whether a total failure is fatal is the caller's decision (the
    /// `required` flag); the broker itself never retries past this point.
    pub async fn connect(url: &str, attempts: u32, delay: Duration) -> Result<Self> {
        let client = redis::Client::open(url).context("invalid broker url")?;
        let mut last_err: Option<Error> = None;
        for attempt in 1..=attempts.max(1) {
            match client.get_connection_manager().await {
                Ok(manager) => {
                    info!(attempt, "broker connected");
                    return Ok(Self {
                        manager,
                        url: url.to_string(),
                    });
                },
                Err(e) => {
                    warn!(attempt, error = %e, "broker connection failed");
                    last_err = Some(e.into());
                },
            }
            if attempt < attempts {
                tokio::time::sleep(delay).await;
            }
        }
        Err(last_err.unwrap_or_else(|| Error::message("broker connection failed")))
    }

    /// Publish one payload on a channel. Single attempt, no inline retry.
    pub async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        let receivers: i64 = conn.publish(channel, payload).await?;
        debug!(channel, receivers, "published");
        Ok(())
    }

    /// Bump the session refcount for `email`. Returns true when this was the
    /// identity's first live session anywhere (the online edge), in which
    /// case the identity is also added to the online set.
    pub async fn incr_online(&self, email: &str) -> Result<bool> {
        let mut conn = self.manager.clone();
        let count: i64 = conn.incr(keys::online_count(email), 1).await?;
        if count == 1 {
            let _: () = conn.sadd(keys::ONLINE_SET, email).await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Drop the session refcount for `email`. Returns true when the last
    /// session closed (the offline edge); the counter key and the set
    /// membership are removed together.
    pub async fn decr_online(&self, email: &str) -> Result<bool> {
        let mut conn = self.manager.clone();
        let count: i64 = conn.decr(keys::online_count(email), 1).await?;
        if count <= 0 {
            let _: () = conn.del(keys::online_count(email)).await?;
            let _: () = conn.srem(keys::ONLINE_SET, email).await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Point-in-time snapshot of every identity online across the fleet.
    pub async fn online_users(&self) -> Result<Vec<String>> {
        let mut conn = self.manager.clone();
        Ok(conn.smembers(keys::ONLINE_SET).await?)
    }

    /// Open a dedicated pub/sub connection subscribed to both hub channels.
    ///
    /// The returned connection is owned by the subscriber task; when its
    /// stream ends the task exits and the hub keeps running in local-only
    /// mode.
    pub async fn subscriber(&self) -> Result<redis::aio::PubSub> {
        let client = redis::Client::open(self.url.as_str())?;
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(channels::MESSAGES).await?;
        pubsub.subscribe(channels::PRESENCE).await?;
        Ok(pubsub)
    }
}
