//! PostgreSQL claim log.
//!
//! Appends run in one transaction that takes an exclusive lock on the claims
//! table (sequence assignment) and a row lock on the handle being bound, so
//! the read-then-append check for a handle is serialized.

use crate::model::{
    content_hash, match_hash, ClaimAppend, ClaimFilter, ClaimRecord, ConfirmationRecord,
    Disposition, FulfillmentRecord, HandleBinding, HandleState, LinkKind,
};
use crate::traits::ClaimLog;
use crate::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use endorser_types::{canonical_json, ClaimType, HandleId, SequenceId};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Acquire, Postgres, QueryBuilder, Row};

const CLAIM_COLUMNS: &str = "sequence_id, issuer, subject, claim_type, payload, issued_at, \
     recorded_at, handle_id, content_hash, disposition, reject_reason";

#[derive(Clone)]
pub struct PostgresClaimLog {
    pool: PgPool,
}

impl PostgresClaimLog {
    /// Connect to PostgreSQL and initialize required schema.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Backend(format!("failed to connect postgres: {e}")))?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: PgPool) -> StoreResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn init_schema(&self) -> StoreResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS endorser_claims (
                sequence_id BIGINT PRIMARY KEY,
                issuer TEXT NOT NULL,
                subject TEXT,
                claim_type TEXT NOT NULL,
                payload JSONB NOT NULL,
                canonical_text TEXT NOT NULL,
                issued_at TIMESTAMPTZ NOT NULL,
                recorded_at TIMESTAMPTZ NOT NULL,
                handle_id TEXT,
                content_hash TEXT NOT NULL,
                match_hash TEXT NOT NULL,
                disposition TEXT NOT NULL,
                reject_reason TEXT
            )
            "#,
            "CREATE INDEX IF NOT EXISTS endorser_claims_handle ON endorser_claims (handle_id)",
            "CREATE INDEX IF NOT EXISTS endorser_claims_hash ON endorser_claims (content_hash)",
            "CREATE INDEX IF NOT EXISTS endorser_claims_match_hash ON endorser_claims (match_hash)",
            r#"
            CREATE TABLE IF NOT EXISTS endorser_handles (
                handle_id TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                kind TEXT NOT NULL,
                first_sequence BIGINT NOT NULL,
                current_sequence BIGINT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS endorser_fulfillments (
                child_sequence BIGINT NOT NULL,
                child_handle TEXT,
                child_type TEXT NOT NULL,
                kind TEXT NOT NULL,
                parent_handle TEXT NOT NULL,
                parent_type TEXT,
                declared_last_claim BIGINT,
                resolved_current BIGINT
            )
            "#,
            "CREATE INDEX IF NOT EXISTS endorser_fulfillments_parent ON endorser_fulfillments (parent_handle)",
            "CREATE INDEX IF NOT EXISTS endorser_fulfillments_child ON endorser_fulfillments (child_sequence)",
            r#"
            CREATE TABLE IF NOT EXISTS endorser_confirmations (
                confirmation_sequence BIGINT NOT NULL,
                confirmer TEXT NOT NULL,
                target_sequence BIGINT NOT NULL,
                target_handle TEXT,
                counted BOOLEAN NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS endorser_confirmations_target ON endorser_confirmations (target_sequence)",
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }

    async fn fetch_claims(&self, sql: &str, bind: &str) -> StoreResult<Vec<ClaimRecord>> {
        let rows = sqlx::query(sql)
            .bind(bind)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(row_to_claim).collect()
    }
}

#[async_trait]
impl ClaimLog for PostgresClaimLog {
    async fn append(&self, claim: ClaimAppend) -> StoreResult<ClaimRecord> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let conn = tx.acquire().await.map_err(backend)?;

        sqlx::query("LOCK TABLE endorser_claims IN EXCLUSIVE MODE")
            .execute(&mut *conn)
            .await
            .map_err(backend)?;

        let last: Option<i64> = sqlx::query_scalar("SELECT MAX(sequence_id) FROM endorser_claims")
            .fetch_one(&mut *conn)
            .await
            .map_err(backend)?;
        let next = last.unwrap_or(0) + 1;
        let sequence_id = SequenceId::new(from_i64(next)?);
        let applied = claim.disposition.is_applied();
        let kind = claim.claim_type.handle_kind().to_string();

        let handle_id = if !applied {
            None
        } else {
            match &claim.binding {
                HandleBinding::Unbound => None,
                HandleBinding::Allocate { namespace, owner } => {
                    let handle = namespace.handle_for(sequence_id);
                    insert_handle(&mut *conn, &handle, owner, &kind, next).await?;
                    Some(handle)
                }
                HandleBinding::Fresh { handle, owner } => {
                    insert_handle(&mut *conn, handle, owner, &kind, next).await?;
                    Some(handle.clone())
                }
                HandleBinding::Supersede {
                    handle,
                    expected_current,
                } => {
                    let row = sqlx::query(
                        "SELECT current_sequence FROM endorser_handles WHERE handle_id = $1 FOR UPDATE",
                    )
                    .bind(handle.as_str())
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(backend)?
                    .ok_or_else(|| StoreError::NotFound(format!("handle {handle} not found")))?;
                    let current: i64 = row.try_get("current_sequence").map_err(backend)?;
                    let found = SequenceId::new(from_i64(current)?);
                    if found != *expected_current {
                        return Err(StoreError::StaleVersion {
                            handle: handle.clone(),
                            expected: *expected_current,
                            found,
                        });
                    }
                    sqlx::query(
                        "UPDATE endorser_handles SET current_sequence = $1 WHERE handle_id = $2",
                    )
                    .bind(next)
                    .bind(handle.as_str())
                    .execute(&mut *conn)
                    .await
                    .map_err(backend)?;
                    Some(handle.clone())
                }
            }
        };

        let (disposition, reject_reason) = match &claim.disposition {
            Disposition::Applied => ("applied", None),
            Disposition::Rejected { reason } => ("rejected", Some(reason.clone())),
        };
        let record = ClaimRecord {
            sequence_id,
            issuer: claim.issuer.clone(),
            subject: claim.subject.clone(),
            claim_type: claim.claim_type.clone(),
            payload: claim.payload.clone(),
            issued_at: claim.issued_at,
            recorded_at: Utc::now(),
            handle_id: handle_id.clone(),
            content_hash: content_hash(&claim.payload),
            disposition: claim.disposition.clone(),
        };

        sqlx::query(
            r#"
            INSERT INTO endorser_claims
                (sequence_id, issuer, subject, claim_type, payload, canonical_text, issued_at,
                 recorded_at, handle_id, content_hash, match_hash, disposition, reject_reason)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(next)
        .bind(&record.issuer)
        .bind(record.subject.as_deref())
        .bind(record.claim_type.tag())
        .bind(&record.payload)
        .bind(canonical_json(&record.payload).to_lowercase())
        .bind(record.issued_at)
        .bind(record.recorded_at)
        .bind(handle_id.as_ref().map(HandleId::as_str))
        .bind(&record.content_hash)
        .bind(match_hash(&record.payload))
        .bind(disposition)
        .bind(reject_reason)
        .execute(&mut *conn)
        .await
        .map_err(map_sqlx_conflict)?;

        if applied {
            for link in &claim.links {
                sqlx::query(
                    r#"
                    INSERT INTO endorser_fulfillments
                        (child_sequence, child_handle, child_type, kind, parent_handle,
                         parent_type, declared_last_claim, resolved_current)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    "#,
                )
                .bind(next)
                .bind(handle_id.as_ref().map(HandleId::as_str))
                .bind(record.claim_type.tag())
                .bind(link.kind.as_str())
                .bind(link.parent_handle.as_str())
                .bind(link.parent_type.as_deref())
                .bind(link.declared_last_claim.map(to_i64).transpose()?)
                .bind(link.resolved_current.map(to_i64).transpose()?)
                .execute(&mut *conn)
                .await
                .map_err(backend)?;
            }

            for confirmation in &claim.confirmations {
                let target = to_i64(confirmation.target_sequence)?;
                let already: bool = sqlx::query_scalar(
                    r#"
                    SELECT EXISTS (
                        SELECT 1 FROM endorser_confirmations
                         WHERE target_sequence = $1 AND confirmer = $2 AND counted
                    )
                    "#,
                )
                .bind(target)
                .bind(&record.issuer)
                .fetch_one(&mut *conn)
                .await
                .map_err(backend)?;

                sqlx::query(
                    r#"
                    INSERT INTO endorser_confirmations
                        (confirmation_sequence, confirmer, target_sequence, target_handle, counted)
                    VALUES ($1, $2, $3, $4, $5)
                    "#,
                )
                .bind(next)
                .bind(&record.issuer)
                .bind(target)
                .bind(confirmation.target_handle.as_ref().map(HandleId::as_str))
                .bind(confirmation.counted && !already)
                .execute(&mut *conn)
                .await
                .map_err(backend)?;
            }
        }

        tx.commit().await.map_err(backend)?;
        Ok(record)
    }

    async fn by_id(&self, id: SequenceId) -> StoreResult<Option<ClaimRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {CLAIM_COLUMNS} FROM endorser_claims WHERE sequence_id = $1"
        ))
        .bind(to_i64(id)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.as_ref().map(row_to_claim).transpose()
    }

    async fn by_handle(&self, handle: &HandleId) -> StoreResult<Vec<ClaimRecord>> {
        self.fetch_claims(
            &format!(
                "SELECT {CLAIM_COLUMNS} FROM endorser_claims WHERE handle_id = $1 ORDER BY sequence_id ASC"
            ),
            handle.as_str(),
        )
        .await
    }

    async fn latest_by_handle(&self, handle: &HandleId) -> StoreResult<Option<ClaimRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {CLAIM_COLUMNS} FROM endorser_claims c \
             JOIN endorser_handles h ON h.current_sequence = c.sequence_id \
             WHERE h.handle_id = $1"
        ))
        .bind(handle.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.as_ref().map(row_to_claim).transpose()
    }

    async fn handle_state(&self, handle: &HandleId) -> StoreResult<Option<HandleState>> {
        let row = sqlx::query(
            "SELECT handle_id, owner, kind, first_sequence, current_sequence FROM endorser_handles WHERE handle_id = $1",
        )
        .bind(handle.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(|row| {
            let handle_id: String = row.try_get("handle_id").map_err(backend)?;
            Ok(HandleState {
                handle_id: parse_handle(handle_id)?,
                owner: row.try_get("owner").map_err(backend)?,
                kind: row.try_get("kind").map_err(backend)?,
                first: SequenceId::new(from_i64(row.try_get("first_sequence").map_err(backend)?)?),
                current: SequenceId::new(from_i64(
                    row.try_get("current_sequence").map_err(backend)?,
                )?),
            })
        })
        .transpose()
    }

    async fn query(&self, filter: &ClaimFilter) -> StoreResult<Vec<ClaimRecord>> {
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
            "SELECT {CLAIM_COLUMNS} FROM endorser_claims c WHERE TRUE"
        ));
        if !filter.include_rejected {
            qb.push(" AND c.disposition = 'applied'");
        }
        if !filter.claim_types.is_empty() {
            let tags = filter
                .claim_types
                .iter()
                .map(|t| t.tag().to_string())
                .collect::<Vec<_>>();
            qb.push(" AND c.claim_type = ANY(").push_bind(tags).push(")");
        }
        if let Some(issuer) = &filter.issuer {
            qb.push(" AND c.issuer = ").push_bind(issuer.clone());
        }
        if let Some(subject) = &filter.subject {
            qb.push(" AND c.subject = ").push_bind(subject.clone());
        }
        if let Some(from) = filter.issued_from {
            qb.push(" AND c.issued_at >= ").push_bind(from);
        }
        if let Some(to) = filter.issued_to {
            qb.push(" AND c.issued_at <= ").push_bind(to);
        }
        if let Some(text) = &filter.text {
            qb.push(" AND strpos(c.canonical_text, ")
                .push_bind(text.to_lowercase())
                .push(") > 0");
        }
        if let Some(handle) = &filter.handle_id {
            qb.push(" AND c.handle_id = ")
                .push_bind(handle.as_str().to_string());
        }
        if let Some(before) = filter.before {
            qb.push(" AND c.sequence_id < ").push_bind(to_i64(before)?);
        }
        if let Some(after) = filter.after {
            qb.push(" AND c.sequence_id > ").push_bind(to_i64(after)?);
        }
        if filter.current_only {
            qb.push(
                " AND (c.handle_id IS NULL OR EXISTS (SELECT 1 FROM endorser_handles h \
                 WHERE h.handle_id = c.handle_id AND h.current_sequence = c.sequence_id))",
            );
        }
        qb.push(if filter.newest_first {
            " ORDER BY c.sequence_id DESC"
        } else {
            " ORDER BY c.sequence_id ASC"
        });
        if filter.window.limit > 0 {
            qb.push(" LIMIT ")
                .push_bind(window_i64(filter.window.limit)?);
        }
        if filter.window.offset > 0 {
            qb.push(" OFFSET ")
                .push_bind(window_i64(filter.window.offset)?);
        }

        let rows = qb.build().fetch_all(&self.pool).await.map_err(backend)?;
        rows.iter().map(row_to_claim).collect()
    }

    async fn range(
        &self,
        from: SequenceId,
        to: Option<SequenceId>,
    ) -> StoreResult<Vec<ClaimRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {CLAIM_COLUMNS} FROM endorser_claims \
             WHERE sequence_id >= $1 AND ($2::BIGINT IS NULL OR sequence_id <= $2) \
             ORDER BY sequence_id ASC"
        ))
        .bind(to_i64(from)?)
        .bind(to.map(to_i64).transpose()?)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(row_to_claim).collect()
    }

    async fn latest_sequence(&self) -> StoreResult<Option<SequenceId>> {
        let last: Option<i64> = sqlx::query_scalar("SELECT MAX(sequence_id) FROM endorser_claims")
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        last.map(|v| from_i64(v).map(SequenceId::new)).transpose()
    }

    async fn by_content_hash(&self, hash: &str) -> StoreResult<Vec<ClaimRecord>> {
        self.fetch_claims(
            &format!(
                "SELECT {CLAIM_COLUMNS} FROM endorser_claims \
                 WHERE content_hash = $1 AND disposition = 'applied' ORDER BY sequence_id ASC"
            ),
            hash,
        )
        .await
    }

    async fn by_match_hash(&self, hash: &str) -> StoreResult<Vec<ClaimRecord>> {
        self.fetch_claims(
            &format!(
                "SELECT {CLAIM_COLUMNS} FROM endorser_claims \
                 WHERE match_hash = $1 AND disposition = 'applied' ORDER BY sequence_id ASC"
            ),
            hash,
        )
        .await
    }

    async fn fulfillments_to(&self, parent: &HandleId) -> StoreResult<Vec<FulfillmentRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT f.* FROM endorser_fulfillments f
             WHERE f.parent_handle = $1
               AND (f.child_handle IS NULL OR EXISTS (
                    SELECT 1 FROM endorser_handles h
                     WHERE h.handle_id = f.child_handle AND h.current_sequence = f.child_sequence))
             ORDER BY f.child_sequence ASC
            "#,
        )
        .bind(parent.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(row_to_fulfillment).collect()
    }

    async fn fulfillments_of(&self, child: SequenceId) -> StoreResult<Vec<FulfillmentRecord>> {
        let rows = sqlx::query("SELECT * FROM endorser_fulfillments WHERE child_sequence = $1")
            .bind(to_i64(child)?)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(row_to_fulfillment).collect()
    }

    async fn confirmations_of(&self, target: SequenceId) -> StoreResult<Vec<ConfirmationRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM endorser_confirmations WHERE target_sequence = $1 ORDER BY confirmation_sequence ASC",
        )
        .bind(to_i64(target)?)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(row_to_confirmation).collect()
    }

    async fn confirmations_by(&self, confirmer: &str) -> StoreResult<Vec<ConfirmationRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM endorser_confirmations WHERE confirmer = $1 ORDER BY confirmation_sequence ASC",
        )
        .bind(confirmer)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(row_to_confirmation).collect()
    }
}

async fn insert_handle(
    conn: &mut sqlx::PgConnection,
    handle: &HandleId,
    owner: &str,
    kind: &str,
    sequence: i64,
) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO endorser_handles (handle_id, owner, kind, first_sequence, current_sequence)
        VALUES ($1, $2, $3, $4, $4)
        "#,
    )
    .bind(handle.as_str())
    .bind(owner)
    .bind(kind)
    .bind(sequence)
    .execute(conn)
    .await
    .map_err(map_sqlx_conflict)?;
    Ok(())
}

fn row_to_claim(row: &PgRow) -> StoreResult<ClaimRecord> {
    let sequence: i64 = row.try_get("sequence_id").map_err(backend)?;
    let claim_type: String = row.try_get("claim_type").map_err(backend)?;
    let handle_id: Option<String> = row.try_get("handle_id").map_err(backend)?;
    let disposition: String = row.try_get("disposition").map_err(backend)?;
    let disposition = match disposition.as_str() {
        "applied" => Disposition::Applied,
        "rejected" => Disposition::Rejected {
            reason: row
                .try_get::<Option<String>, _>("reject_reason")
                .map_err(backend)?
                .unwrap_or_default(),
        },
        other => {
            return Err(StoreError::Serialization(format!(
                "unknown disposition '{other}'"
            )))
        }
    };
    Ok(ClaimRecord {
        sequence_id: SequenceId::new(from_i64(sequence)?),
        issuer: row.try_get("issuer").map_err(backend)?,
        subject: row.try_get("subject").map_err(backend)?,
        claim_type: ClaimType::from_tag(&claim_type),
        payload: row.try_get("payload").map_err(backend)?,
        issued_at: row.try_get::<DateTime<Utc>, _>("issued_at").map_err(backend)?,
        recorded_at: row.try_get::<DateTime<Utc>, _>("recorded_at").map_err(backend)?,
        handle_id: handle_id.map(parse_handle).transpose()?,
        content_hash: row.try_get("content_hash").map_err(backend)?,
        disposition,
    })
}

fn row_to_fulfillment(row: &PgRow) -> StoreResult<FulfillmentRecord> {
    let kind: String = row.try_get("kind").map_err(backend)?;
    let child_type: String = row.try_get("child_type").map_err(backend)?;
    let child_handle: Option<String> = row.try_get("child_handle").map_err(backend)?;
    let parent_handle: String = row.try_get("parent_handle").map_err(backend)?;
    Ok(FulfillmentRecord {
        child_sequence: SequenceId::new(from_i64(row.try_get("child_sequence").map_err(backend)?)?),
        child_handle: child_handle.map(parse_handle).transpose()?,
        child_type: ClaimType::from_tag(&child_type),
        kind: LinkKind::parse(&kind)
            .ok_or_else(|| StoreError::Serialization(format!("unknown link kind '{kind}'")))?,
        parent_handle: parse_handle(parent_handle)?,
        parent_type: row.try_get("parent_type").map_err(backend)?,
        declared_last_claim: optional_sequence(row, "declared_last_claim")?,
        resolved_current: optional_sequence(row, "resolved_current")?,
    })
}

fn row_to_confirmation(row: &PgRow) -> StoreResult<ConfirmationRecord> {
    let target_handle: Option<String> = row.try_get("target_handle").map_err(backend)?;
    Ok(ConfirmationRecord {
        confirmation_sequence: SequenceId::new(from_i64(
            row.try_get("confirmation_sequence").map_err(backend)?,
        )?),
        confirmer: row.try_get("confirmer").map_err(backend)?,
        target_sequence: SequenceId::new(from_i64(row.try_get("target_sequence").map_err(backend)?)?),
        target_handle: target_handle.map(parse_handle).transpose()?,
        counted: row.try_get("counted").map_err(backend)?,
    })
}

fn optional_sequence(row: &PgRow, column: &str) -> StoreResult<Option<SequenceId>> {
    let value: Option<i64> = row.try_get(column).map_err(backend)?;
    value.map(|v| from_i64(v).map(SequenceId::new)).transpose()
}

fn parse_handle(text: String) -> StoreResult<HandleId> {
    HandleId::try_from(text).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn map_sqlx_conflict(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return StoreError::Conflict(db_err.message().to_string());
        }
    }
    StoreError::Backend(err.to_string())
}

fn to_i64(id: SequenceId) -> StoreResult<i64> {
    i64::try_from(id.value())
        .map_err(|_| StoreError::InvalidInput(format!("sequence id {id} out of range")))
}

fn from_i64(value: i64) -> StoreResult<u64> {
    u64::try_from(value)
        .map_err(|_| StoreError::Serialization(format!("negative sequence id {value}")))
}

fn window_i64(value: usize) -> StoreResult<i64> {
    i64::try_from(value)
        .map_err(|_| StoreError::InvalidInput("window value too large".to_string()))
}
