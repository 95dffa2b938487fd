use std::num::NonZeroU8;

use redis::aio::MultiplexedConnection;

use crate::{prelude::*, util::redis::transaction_async};

/// Sliding-window request limit, counted in fixed-size Redis buckets.
///
/// Written as `{limit}/{buckets}x{minutes}min`, e.g. `5/3x1min` allows five
/// requests across the current and previous two one-minute buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitParams {
    pub bucket_mins: NonZeroU8,
    pub window_buckets: NonZeroU8,
    pub window_limit: u16,
}

impl FromStr for RateLimitParams {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (window_limit, window) = s.split_once('/').context("Missing / delimiter")?;
        let window_limit = window_limit
            .trim()
            .parse()
            .with_context(|| format!("Invalid window limit {window_limit}"))?;

        let (window_buckets, bucket_mins) = window
            .split_once('x')
            .context("Window format must be of the form '{N}x{M}min'")?;

        let window_buckets = window_buckets
            .trim()
            .parse()
            .with_context(|| format!("Invalid window bucket count {window_buckets}"))?;

        let bucket_mins = bucket_mins
            .trim_end()
            .strip_suffix("min")
            .context("Bucket duration must be of the form '{M}min'")?
            .trim()
            .parse()
            .with_context(|| format!("Invalid bucket duration {bucket_mins}"))?;

        Ok(Self {
            bucket_mins,
            window_buckets,
            window_limit,
        })
    }
}

impl fmt::Display for RateLimitParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}x{}min",
            self.window_limit, self.window_buckets, self.bucket_mins
        )
    }
}

impl RateLimitParams {
    fn bucket_secs(self) -> i64 { 60 * i64::from(self.bucket_mins.get()) }

    /// Bucket keys covering the window ending at `now_secs`, oldest first
    fn window_keys<K: fmt::Display + ?Sized>(self, key: &K, now_secs: i64) -> (i64, Vec<String>) {
        let curr_bucket = now_secs.div_euclid(self.bucket_secs());
        let first = curr_bucket.saturating_sub(i64::from(self.window_buckets.get() - 1));

        let keys = (first..=curr_bucket)
            .map(|i| format!("rate_limit:{key}:{}min:{i:x}", self.bucket_mins))
            .collect();

        (curr_bucket, keys)
    }

    /// Record a request for `key`, returning whether it is within the limit
    pub async fn check<K: fmt::Display + ?Sized>(
        self,
        key: &K,
        mut conn: MultiplexedConnection,
    ) -> Result<bool> {
        let bucket_secs = self.bucket_secs();
        let (curr_bucket, keys) = self.window_keys(key, jiff::Timestamp::now().as_second());
        let (curr_key, prev_keys) = keys
            .split_last()
            .context("Rate limit window is empty")?;

        let expire_at = curr_bucket
            .saturating_add(i64::from(self.window_buckets.get()))
            .saturating_mul(bucket_secs);

        let (count, prev): (u32, Vec<Option<u32>>) =
            transaction_async(&mut conn, &keys, async move |conn, pipe| {
                pipe.incr(curr_key, 1)
                    .expire_at(curr_key, expire_at)
                    .ignore();

                // MGET rejects an empty key list
                if prev_keys.is_empty() {
                    let res: Option<(u32,)> = pipe.query_async(conn).await?;
                    return Ok(res.map(|(count,)| (count, vec![])));
                }

                pipe.mget(prev_keys).query_async(conn).await
            })
            .await
            .context("Error running rate limit transaction")?;

        let total = count + prev.into_iter().flatten().sum::<u32>();
        trace!(%key, total, limit = self.window_limit, "Rate limit checked");

        Ok(total <= u32::from(self.window_limit))
    }
}

#[cfg(test)]
mod test {
    use super::RateLimitParams;

    #[test]
    fn test_parse() {
        let p: RateLimitParams = "5/3x1min".parse().unwrap();
        assert_eq!(p.window_limit, 5);
        assert_eq!(p.window_buckets.get(), 3);
        assert_eq!(p.bucket_mins.get(), 1);

        let p: RateLimitParams = " 20 / 4 x 15 min ".parse().unwrap();
        assert_eq!(p.window_limit, 20);
        assert_eq!(p.window_buckets.get(), 4);
        assert_eq!(p.bucket_mins.get(), 15);
    }

    #[test]
    fn test_parse_errors() {
        assert!("5".parse::<RateLimitParams>().is_err());
        assert!("5/3".parse::<RateLimitParams>().is_err());
        assert!("5/3x1".parse::<RateLimitParams>().is_err());
        assert!("5/0x1min".parse::<RateLimitParams>().is_err());
        assert!("5/3x0min".parse::<RateLimitParams>().is_err());
        assert!("x/3x1min".parse::<RateLimitParams>().is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        let p: RateLimitParams = "5/3x1min".parse().unwrap();
        assert_eq!(p.to_string(), "5/3x1min");
        assert_eq!(p.to_string().parse::<RateLimitParams>().unwrap(), p);
    }

    #[test]
    fn test_window_keys() {
        let p: RateLimitParams = "5/3x2min".parse().unwrap();
        // bucket 0x10 = 16, 120s buckets
        let (curr, keys) = p.window_keys("play:1", 16 * 120 + 5);

        assert_eq!(curr, 16);
        assert_eq!(keys, [
            "rate_limit:play:1:2min:e",
            "rate_limit:play:1:2min:f",
            "rate_limit:play:1:2min:10",
        ]);
    }

    #[test]
    fn test_window_keys_single_bucket() {
        let p: RateLimitParams = "1/1x1min".parse().unwrap();
        let (curr, keys) = p.window_keys("k", 59);

        assert_eq!(curr, 0);
        assert_eq!(keys, ["rate_limit:k:1min:0"]);
    }
}
