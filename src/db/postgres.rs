//! Postgres-backed [`WarStore`].
//!
//! All multi-table writes run inside a single transaction per submission.
//! The duplicate-side race between concurrent uploads for the same war is
//! not locked away here; the unique constraints on `war_sides` are the
//! backstop and a violation surfaces as a conflict.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::models::{
    Company, HistoryEntry, Player, PlayerProfile, SideType, War, WarSide, WarSummary,
};
use super::{NewPerformance, NewPlayer, NewWar, WarStore};
use crate::error::{Error, Result};
use crate::ranking::{PlayerClassRef, RawPerformance};

const PLAYER_COLS: &str = "id, nickname, nick_key, world, created_at";
const WAR_COLS: &str = "id, territory, start_time, attacker_id, defender_id, winner, world, created_at";

pub struct PgStore {
    pool: PgPool,
}

// One command per entry. Prepared statements carry exactly one command, so
// the schema must never be bundled into a single query string. The DO block
// is one command; its inner semicolons live inside the dollar quoting.
const SCHEMA: &[&str] = &[
    r#"
    DO $$ BEGIN
        CREATE TYPE side_type AS ENUM ('attacker', 'defender');
    EXCEPTION WHEN duplicate_object THEN NULL;
    END $$
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS players (
        id          UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        nickname    TEXT NOT NULL,
        nick_key    TEXT NOT NULL UNIQUE,
        world       TEXT,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS player_profiles (
        player_id   UUID PRIMARY KEY REFERENCES players(id) ON DELETE CASCADE,
        views       INT NOT NULL DEFAULT 0,
        likes       INT NOT NULL DEFAULT 0,
        main_class  TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS companies (
        id       UUID PRIMARY KEY,
        name     TEXT NOT NULL,
        faction  TEXT NOT NULL,
        world    TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS wars (
        id           UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        territory    TEXT NOT NULL,
        start_time   TIMESTAMPTZ NOT NULL,
        attacker_id  UUID NOT NULL,
        defender_id  UUID NOT NULL,
        winner       side_type NOT NULL,
        world        TEXT,
        created_at   TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        UNIQUE (territory, start_time)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS war_sides (
        id          UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        war_id      UUID NOT NULL REFERENCES wars(id) ON DELETE CASCADE,
        company_id  UUID NOT NULL,
        side        side_type NOT NULL,
        UNIQUE (war_id, company_id),
        UNIQUE (war_id, side)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS player_performances (
        id           UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        war_side_id  UUID NOT NULL REFERENCES war_sides(id) ON DELETE CASCADE,
        player_id    UUID NOT NULL REFERENCES players(id),
        class        TEXT NOT NULL,
        kills        INT NOT NULL,
        deaths       INT NOT NULL,
        assists      INT NOT NULL,
        damage       BIGINT NOT NULL,
        healing      BIGINT NOT NULL,
        score        DOUBLE PRECISION NOT NULL,
        win          BOOLEAN NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_perf_player_class
        ON player_performances(player_id, class)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS player_class_counts (
        player_id    UUID NOT NULL REFERENCES players(id) ON DELETE CASCADE,
        class        TEXT NOT NULL,
        games_count  INT NOT NULL DEFAULT 0,
        PRIMARY KEY (player_id, class)
    )
    "#,
];

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    /// Create the schema. Idempotent; runs at startup.
    pub async fn migrate(&self) -> Result<()> {
        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Insert the side's performances and keep class counts and the profile
    /// main class in step, inside the caller's transaction.
    async fn insert_performances(
        tx: &mut Transaction<'_, Postgres>,
        side_id: Uuid,
        perfs: &[NewPerformance],
    ) -> Result<()> {
        for p in perfs {
            sqlx::query(
                r#"
                INSERT INTO player_performances
                    (war_side_id, player_id, class, kills, deaths, assists,
                     damage, healing, score, win)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(side_id)
            .bind(p.player_id)
            .bind(&p.class)
            .bind(p.kills as i32)
            .bind(p.deaths as i32)
            .bind(p.assists as i32)
            .bind(p.damage as i64)
            .bind(p.healing as i64)
            .bind(p.score)
            .bind(p.win)
            .execute(&mut **tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO player_class_counts (player_id, class, games_count)
                VALUES ($1, $2, 1)
                ON CONFLICT (player_id, class)
                DO UPDATE SET games_count = player_class_counts.games_count + 1
                "#,
            )
            .bind(p.player_id)
            .bind(&p.class)
            .execute(&mut **tx)
            .await?;
        }

        let mut players: Vec<Uuid> = perfs.iter().map(|p| p.player_id).collect();
        players.sort();
        players.dedup();
        for player_id in players {
            Self::recompute_main_class(tx, player_id).await?;
        }
        Ok(())
    }

    async fn recompute_main_class(
        tx: &mut Transaction<'_, Postgres>,
        player_id: Uuid,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE player_profiles
               SET main_class = (
                       SELECT class
                         FROM player_class_counts
                        WHERE player_id = $1
                        ORDER BY games_count DESC, class
                        LIMIT 1
                   )
             WHERE player_id = $1
            "#,
        )
        .bind(player_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl WarStore for PgStore {
    async fn all_players(&self) -> Result<Vec<Player>> {
        Ok(
            sqlx::query_as::<_, Player>(&format!("SELECT {PLAYER_COLS} FROM players"))
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn create_players(&self, players: Vec<NewPlayer>) -> Result<Vec<Player>> {
        let mut tx = self.pool.begin().await?;
        let keys: Vec<String> = players.iter().map(|p| p.nick_key.clone()).collect();

        for p in &players {
            sqlx::query(
                r#"
                INSERT INTO players (nickname, nick_key, world)
                VALUES ($1, $2, $3)
                ON CONFLICT (nick_key) DO NOTHING
                "#,
            )
            .bind(&p.nickname)
            .bind(&p.nick_key)
            .bind(&p.world)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO player_profiles (player_id)
            SELECT id FROM players WHERE nick_key = ANY($1)
            ON CONFLICT (player_id) DO NOTHING
            "#,
        )
        .bind(&keys)
        .execute(&mut *tx)
        .await?;

        let rows = sqlx::query_as::<_, Player>(&format!(
            "SELECT {PLAYER_COLS} FROM players WHERE nick_key = ANY($1)"
        ))
        .bind(&keys)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(rows)
    }

    async fn find_player_by_key(&self, key: &str) -> Result<Option<Player>> {
        Ok(sqlx::query_as::<_, Player>(&format!(
            "SELECT {PLAYER_COLS} FROM players WHERE nick_key = $1"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_player_by_id(&self, id: Uuid) -> Result<Option<Player>> {
        Ok(sqlx::query_as::<_, Player>(&format!(
            "SELECT {PLAYER_COLS} FROM players WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_players_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Player>> {
        Ok(sqlx::query_as::<_, Player>(&format!(
            "SELECT {PLAYER_COLS} FROM players WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn profile_of(&self, player_id: Uuid) -> Result<Option<PlayerProfile>> {
        Ok(sqlx::query_as::<_, PlayerProfile>(
            "SELECT player_id, views, likes, main_class FROM player_profiles WHERE player_id = $1",
        )
        .bind(player_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn create_company(&self, company: Company) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO companies (id, name, faction, world)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
               SET name = EXCLUDED.name,
                   faction = EXCLUDED.faction,
                   world = EXCLUDED.world
            "#,
        )
        .bind(company.id)
        .bind(&company.name)
        .bind(&company.faction)
        .bind(&company.world)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_war(&self, territory: &str, start_time: DateTime<Utc>) -> Result<Option<War>> {
        Ok(sqlx::query_as::<_, War>(&format!(
            "SELECT {WAR_COLS} FROM wars WHERE territory = $1 AND start_time = $2"
        ))
        .bind(territory)
        .bind(start_time)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_war_by_id(&self, id: Uuid) -> Result<Option<War>> {
        Ok(
            sqlx::query_as::<_, War>(&format!("SELECT {WAR_COLS} FROM wars WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn sides_of(&self, war_id: Uuid) -> Result<Vec<WarSide>> {
        Ok(sqlx::query_as::<_, WarSide>(
            "SELECT id, war_id, company_id, side FROM war_sides WHERE war_id = $1",
        )
        .bind(war_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn create_war(
        &self,
        war: NewWar,
        side: SideType,
        company_id: Uuid,
        perfs: Vec<NewPerformance>,
    ) -> Result<War> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, War>(&format!(
            r#"
            INSERT INTO wars (territory, start_time, attacker_id, defender_id, winner, world)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {WAR_COLS}
            "#
        ))
        .bind(&war.territory)
        .bind(war.start_time)
        .bind(war.attacker_id)
        .bind(war.defender_id)
        .bind(war.winner)
        .bind(&war.world)
        .fetch_one(&mut *tx)
        .await?;

        let side_id: Uuid = sqlx::query_scalar(
            "INSERT INTO war_sides (war_id, company_id, side) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(row.id)
        .bind(company_id)
        .bind(side)
        .fetch_one(&mut *tx)
        .await?;

        Self::insert_performances(&mut tx, side_id, &perfs).await?;
        tx.commit().await?;
        Ok(row)
    }

    async fn attach_side(
        &self,
        war_id: Uuid,
        side: SideType,
        company_id: Uuid,
        perfs: Vec<NewPerformance>,
    ) -> Result<War> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, War>(&format!("SELECT {WAR_COLS} FROM wars WHERE id = $1"))
            .bind(war_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| Error::NotFound(format!("war {war_id}")))?;

        let side_id: Uuid = sqlx::query_scalar(
            "INSERT INTO war_sides (war_id, company_id, side) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(war_id)
        .bind(company_id)
        .bind(side)
        .fetch_one(&mut *tx)
        .await?;

        Self::insert_performances(&mut tx, side_id, &perfs).await?;
        tx.commit().await?;
        Ok(row)
    }

    async fn rollback_war(&self, war_id: Uuid) -> Result<Vec<PlayerClassRef>> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM wars WHERE id = $1")
            .bind(war_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(Error::NotFound(format!("war {war_id}")));
        }

        let rolled: Vec<(Uuid, String, i64)> = sqlx::query_as(
            r#"
            SELECT pp.player_id, pp.class, COUNT(*)
              FROM player_performances pp
              JOIN war_sides ws ON ws.id = pp.war_side_id
             WHERE ws.war_id = $1
             GROUP BY pp.player_id, pp.class
            "#,
        )
        .bind(war_id)
        .fetch_all(&mut *tx)
        .await?;

        // Cascades through war_sides into player_performances.
        sqlx::query("DELETE FROM wars WHERE id = $1")
            .bind(war_id)
            .execute(&mut *tx)
            .await?;

        let mut players: Vec<Uuid> = rolled.iter().map(|(id, _, _)| *id).collect();
        players.sort();
        players.dedup();

        for player_id in players {
            let remaining: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM player_performances WHERE player_id = $1",
            )
            .bind(player_id)
            .fetch_one(&mut *tx)
            .await?;

            if remaining == 0 {
                // Last trace of this player; drop the identity row and let
                // profile and class counts cascade.
                sqlx::query("DELETE FROM players WHERE id = $1")
                    .bind(player_id)
                    .execute(&mut *tx)
                    .await?;
                continue;
            }

            for (pid, class, games) in rolled.iter().filter(|(pid, _, _)| *pid == player_id) {
                sqlx::query(
                    r#"
                    UPDATE player_class_counts
                       SET games_count = games_count - $3
                     WHERE player_id = $1 AND class = $2
                    "#,
                )
                .bind(pid)
                .bind(class)
                .bind(games)
                .execute(&mut *tx)
                .await?;
            }
            sqlx::query(
                "DELETE FROM player_class_counts WHERE player_id = $1 AND games_count <= 0",
            )
            .bind(player_id)
            .execute(&mut *tx)
            .await?;
            Self::recompute_main_class(&mut tx, player_id).await?;
        }

        tx.commit().await?;
        Ok(rolled
            .into_iter()
            .map(|(player_id, class, _)| PlayerClassRef { player_id, class })
            .collect())
    }

    async fn count_performances(&self) -> Result<i64> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM player_performances")
                .fetch_one(&self.pool)
                .await?,
        )
    }

    async fn all_performances(&self) -> Result<Vec<RawPerformance>> {
        let rows: Vec<(Uuid, String, Option<String>, f64, i32, i32, i32, bool)> = sqlx::query_as(
            r#"
            SELECT pp.player_id, pp.class, p.world, pp.score,
                   pp.kills, pp.deaths, pp.assists, pp.win
              FROM player_performances pp
              JOIN players p ON p.id = pp.player_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(player_id, class, world, score, kills, deaths, assists, win)| RawPerformance {
                    player_id,
                    class,
                    world,
                    score,
                    kills: kills as u32,
                    deaths: deaths as u32,
                    assists: assists as u32,
                    win,
                },
            )
            .collect())
    }

    async fn history_of_player_class(
        &self,
        player_id: Uuid,
        class: &str,
    ) -> Result<Vec<HistoryEntry>> {
        Ok(sqlx::query_as::<_, HistoryEntry>(
            r#"
            SELECT w.territory, w.start_time,
                   CASE WHEN ws.side = 'attacker' THEN COALESCE(d.name, w.defender_id::text)
                        ELSE COALESCE(a.name, w.attacker_id::text)
                   END AS opponent,
                   pp.class, pp.kills, pp.deaths, pp.assists,
                   pp.damage, pp.healing, pp.win
              FROM player_performances pp
              JOIN war_sides ws ON ws.id = pp.war_side_id
              JOIN wars w ON w.id = ws.war_id
              LEFT JOIN companies a ON a.id = w.attacker_id
              LEFT JOIN companies d ON d.id = w.defender_id
             WHERE pp.player_id = $1 AND pp.class = $2
             ORDER BY w.start_time DESC
            "#,
        )
        .bind(player_id)
        .bind(class)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn recent_wars(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<WarSummary>> {
        Ok(sqlx::query_as::<_, WarSummary>(
            r#"
            SELECT w.id, w.territory, w.start_time,
                   COALESCE(a.name, w.attacker_id::text) AS attacker,
                   COALESCE(a.faction, '') AS attacker_faction,
                   COALESCE(d.name, w.defender_id::text) AS defender,
                   COALESCE(d.faction, '') AS defender_faction,
                   w.winner
              FROM wars w
              LEFT JOIN companies a ON a.id = w.attacker_id
              LEFT JOIN companies d ON d.id = w.defender_id
             WHERE w.start_time >= $1
             ORDER BY w.start_time DESC
             LIMIT $2
            "#,
        )
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::SCHEMA;

    // Postgres rejects a prepared statement holding more than one command
    // ("cannot insert multiple commands into a prepared statement"), so
    // every schema entry must stay a single command.
    #[test]
    fn schema_statements_are_single_commands() {
        for stmt in SCHEMA {
            let mut outside = String::new();
            let mut in_dollar = false;
            let mut rest = *stmt;
            while let Some(pos) = rest.find("$$") {
                if !in_dollar {
                    outside.push_str(&rest[..pos]);
                }
                in_dollar = !in_dollar;
                rest = &rest[pos + 2..];
            }
            outside.push_str(rest);
            assert!(
                !outside.contains(';'),
                "statement bundles multiple commands: {stmt}"
            );
        }
    }

    #[test]
    fn schema_carries_the_race_backstop_constraints() {
        let all = SCHEMA.join("\n");
        assert!(all.contains("UNIQUE (territory, start_time)"));
        assert!(all.contains("UNIQUE (war_id, company_id)"));
        assert!(all.contains("UNIQUE (war_id, side)"));
    }
}
