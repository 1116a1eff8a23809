//! Redis backend for the ranking cache.

use std::collections::HashMap;

use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};

use super::RankingBackend;
use crate::error::Result;

/// Thin wrapper around a shared [`redis::Client`]; a multiplexed connection
/// is checked out per operation, as the rest of the server does.
pub struct RedisRanking {
    client: Client,
}

impl RedisRanking {
    pub fn new(client: Client) -> Self {
        RedisRanking { client }
    }

    async fn conn(&self) -> Result<MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl RankingBackend for RedisRanking {
    async fn hash_incr(&self, key: &str, deltas: &[(&str, f64)]) -> Result<()> {
        let mut conn = self.conn().await?;
        // One pipelined MULTI/EXEC; HINCRBYFLOAT keeps integer fields exact
        // for the magnitudes involved here.
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (field, delta) in deltas {
            pipe.cmd("HINCRBYFLOAT").arg(key).arg(field).arg(delta).ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.conn().await?;
        Ok(conn.hgetall(key).await?)
    }

    async fn hash_set(&self, key: &str, fields: &[(&str, String)]) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.hset_multiple(key, fields).await?;
        Ok(())
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.zadd(key, member, score).await?;
        Ok(())
    }

    async fn zrevrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>> {
        let mut conn = self.conn().await?;
        Ok(conn.zrevrange_withscores(key, start, stop).await?)
    }

    async fn zcard(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn().await?;
        Ok(conn.zcard(key).await?)
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.zrem(key, member).await?;
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        Ok(conn.keys(pattern).await?)
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }
}
