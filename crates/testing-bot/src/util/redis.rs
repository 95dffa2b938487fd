use redis::{aio::ConnectionLike, cmd, pipe, Pipeline, RedisResult, ToRedisArgs};

/// Optimistic `WATCH`/`MULTI` transaction over an async connection.
///
/// `func` is re-run until the atomic pipeline it builds commits, which is
/// signalled by returning `Some`.
pub async fn transaction_async<
    C: ConnectionLike,
    K: ToRedisArgs,
    T,
    F: AsyncFnMut(&mut C, &mut Pipeline) -> RedisResult<Option<T>>,
>(
    con: &mut C,
    keys: &[K],
    mut func: F,
) -> RedisResult<T> {
    loop {
        cmd("WATCH").arg(keys).exec_async(con).await?;

        let mut p = pipe();
        if let Some(response) = func(con, p.atomic()).await? {
            // a pipeline that never ran EXEC leaves the watch behind
            cmd("UNWATCH").exec_async(con).await?;
            return Ok(response);
        }
    }
}
