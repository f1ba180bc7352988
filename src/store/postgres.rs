//! PostgreSQL store
//!
//! Tables live in the `moderation` schema. The violation increment and its
//! mute escalation are a single upsert, so concurrent increments for one
//! user are serialized by the row lock rather than by the application.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use tracing::{debug, error, info};

use crate::error::{ModerationError, ModerationResult};
use crate::moderation::{DecisionKind, Fingerprint, Offender, ReviewCase, ReviewState, UserRef};
use crate::store::{Escalation, ModerationStore};

/// SQLSTATE codes worth retrying: serialization failure and deadlock
const RETRYABLE_CODES: [&str; 2] = ["40001", "40P01"];

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(connection_string: &str) -> ModerationResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(connection_string)
            .await
            .map_err(|e| ModerationError::Store(format!("Failed to connect to PostgreSQL: {}", e)))?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub async fn init_schema(&self) -> ModerationResult<()> {
        info!("Initializing moderation schema...");

        let statements = [
            ("schema", "CREATE SCHEMA IF NOT EXISTS moderation"),
            (
                "offenders table",
                r#"
                CREATE TABLE IF NOT EXISTS moderation.offenders (
                    chat_id BIGINT NOT NULL,
                    user_id BIGINT NOT NULL,
                    violation_count INTEGER NOT NULL DEFAULT 0,
                    muted_until TIMESTAMP WITH TIME ZONE,
                    last_offense_at TIMESTAMP WITH TIME ZONE,
                    updated_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
                    PRIMARY KEY (chat_id, user_id)
                )
                "#,
            ),
            (
                "review_cases table",
                r#"
                CREATE TABLE IF NOT EXISTS moderation.review_cases (
                    case_id VARCHAR(64) PRIMARY KEY,
                    fingerprint CHAR(64) NOT NULL,
                    chat_id BIGINT NOT NULL,
                    user_id BIGINT NOT NULL,
                    score DOUBLE PRECISION,
                    state VARCHAR(16) NOT NULL,
                    opened_at TIMESTAMP WITH TIME ZONE NOT NULL,
                    resolved_at TIMESTAMP WITH TIME ZONE,
                    resolved_by VARCHAR(255),
                    outcome VARCHAR(16)
                )
                "#,
            ),
            (
                "review_cases index",
                "CREATE INDEX IF NOT EXISTS idx_review_cases_state ON moderation.review_cases(state, opened_at)",
            ),
            (
                "whitelist table",
                r#"
                CREATE TABLE IF NOT EXISTS moderation.whitelist (
                    chat_id BIGINT NOT NULL,
                    user_id BIGINT NOT NULL,
                    added_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
                    PRIMARY KEY (chat_id, user_id)
                )
                "#,
            ),
        ];

        for (what, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| ModerationError::Store(format!("Failed to create {}: {}", what, e)))?;
        }

        info!("Moderation schema initialized");
        Ok(())
    }
}

fn store_error(context: &str, err: sqlx::Error) -> ModerationError {
    if let sqlx::Error::Database(db) = &err
        && db.code().is_some_and(|code| RETRYABLE_CODES.contains(&code.as_ref()))
    {
        debug!(error = %err, "{} hit a retryable conflict", context);
        return ModerationError::StoreContention(format!("{}: {}", context, err));
    }

    error!(error = %err, "{}", context);
    ModerationError::Store(format!("{}: {}", context, err))
}

fn offender_from_row(row: &PgRow) -> ModerationResult<Offender> {
    let count: i32 = row.get("violation_count");
    Ok(Offender {
        user: UserRef::new(row.get("chat_id"), row.get("user_id")),
        violation_count: u32::try_from(count)
            .map_err(|_| ModerationError::Store(format!("negative violation count {}", count)))?,
        muted_until: row.get("muted_until"),
        last_offense_at: row.get("last_offense_at"),
    })
}

fn case_from_row(row: &PgRow) -> ModerationResult<ReviewCase> {
    let fingerprint: String = row.get("fingerprint");
    let state: String = row.get("state");
    let outcome: Option<String> = row.get("outcome");

    Ok(ReviewCase {
        case_id: row.get("case_id"),
        fingerprint: Fingerprint::from_hex(&fingerprint)
            .map_err(|e| ModerationError::Store(format!("corrupt fingerprint: {}", e)))?,
        user: UserRef::new(row.get("chat_id"), row.get("user_id")),
        score: row.get("score"),
        state: state.parse()?,
        opened_at: row.get("opened_at"),
        resolved_at: row.get("resolved_at"),
        resolved_by: row.get("resolved_by"),
        outcome: outcome.map(|o| o.parse::<DecisionKind>()).transpose()?,
    })
}

const CASE_COLUMNS: &str = "case_id, fingerprint, chat_id, user_id, score, state, \
                            opened_at, resolved_at, resolved_by, outcome";

#[async_trait]
impl ModerationStore for PgStore {
    async fn get_offender(&self, user: UserRef) -> ModerationResult<Option<Offender>> {
        let row = sqlx::query(
            r#"
            SELECT chat_id, user_id, violation_count, muted_until, last_offense_at
            FROM moderation.offenders
            WHERE chat_id = $1 AND user_id = $2
            "#,
        )
        .bind(user.chat_id)
        .bind(user.user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("Failed to get offender", e))?;

        row.as_ref().map(offender_from_row).transpose()
    }

    async fn increment_violation(
        &self,
        user: UserRef,
        at: DateTime<Utc>,
        escalation: Escalation,
    ) -> ModerationResult<Offender> {
        // GREATEST ignores NULL, so an existing later mute is kept
        let row = sqlx::query(
            r#"
            INSERT INTO moderation.offenders (chat_id, user_id, violation_count, muted_until, last_offense_at, updated_at)
            VALUES ($1, $2, 1, CASE WHEN 1 >= $4 THEN $5 ELSE NULL END, $3, NOW())
            ON CONFLICT (chat_id, user_id) DO UPDATE SET
                violation_count = moderation.offenders.violation_count + 1,
                muted_until = CASE
                    WHEN moderation.offenders.violation_count + 1 >= $4
                        THEN GREATEST(moderation.offenders.muted_until, $5)
                    ELSE moderation.offenders.muted_until
                END,
                last_offense_at = EXCLUDED.last_offense_at,
                updated_at = NOW()
            RETURNING chat_id, user_id, violation_count, muted_until, last_offense_at
            "#,
        )
        .bind(user.chat_id)
        .bind(user.user_id)
        .bind(at)
        .bind(i32::try_from(escalation.limit).unwrap_or(i32::MAX))
        .bind(escalation.muted_until)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| store_error("Failed to increment violation", e))?;

        offender_from_row(&row)
    }

    async fn put_offender(&self, offender: &Offender) -> ModerationResult<()> {
        sqlx::query(
            r#"
            INSERT INTO moderation.offenders (chat_id, user_id, violation_count, muted_until, last_offense_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (chat_id, user_id) DO UPDATE SET
                violation_count = EXCLUDED.violation_count,
                muted_until = EXCLUDED.muted_until,
                last_offense_at = EXCLUDED.last_offense_at,
                updated_at = NOW()
            "#,
        )
        .bind(offender.user.chat_id)
        .bind(offender.user.user_id)
        .bind(i32::try_from(offender.violation_count).unwrap_or(i32::MAX))
        .bind(offender.muted_until)
        .bind(offender.last_offense_at)
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("Failed to save offender", e))?;

        Ok(())
    }

    async fn get_case(&self, case_id: &str) -> ModerationResult<Option<ReviewCase>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM moderation.review_cases WHERE case_id = $1",
            CASE_COLUMNS
        ))
        .bind(case_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("Failed to get review case", e))?;

        row.as_ref().map(case_from_row).transpose()
    }

    async fn put_case(&self, case: &ReviewCase) -> ModerationResult<()> {
        sqlx::query(
            r#"
            INSERT INTO moderation.review_cases
                (case_id, fingerprint, chat_id, user_id, score, state, opened_at, resolved_at, resolved_by, outcome)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (case_id) DO UPDATE SET
                state = EXCLUDED.state,
                resolved_at = EXCLUDED.resolved_at,
                resolved_by = EXCLUDED.resolved_by,
                outcome = EXCLUDED.outcome
            "#,
        )
        .bind(&case.case_id)
        .bind(case.fingerprint.to_hex())
        .bind(case.user.chat_id)
        .bind(case.user.user_id)
        .bind(case.score)
        .bind(case.state.as_str())
        .bind(case.opened_at)
        .bind(case.resolved_at)
        .bind(&case.resolved_by)
        .bind(case.outcome.map(|o| o.as_str()))
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("Failed to save review case", e))?;

        Ok(())
    }

    async fn list_cases(&self, state: Option<ReviewState>) -> ModerationResult<Vec<ReviewCase>> {
        let rows = match state {
            Some(state) => {
                sqlx::query(&format!(
                    "SELECT {} FROM moderation.review_cases WHERE state = $1 ORDER BY opened_at",
                    CASE_COLUMNS
                ))
                .bind(state.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM moderation.review_cases ORDER BY opened_at",
                    CASE_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| store_error("Failed to list review cases", e))?;

        rows.iter().map(case_from_row).collect()
    }

    async fn add_whitelist(&self, user: UserRef) -> ModerationResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO moderation.whitelist (chat_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (chat_id, user_id) DO NOTHING
            "#,
        )
        .bind(user.chat_id)
        .bind(user.user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("Failed to add whitelist entry", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_whitelist(&self, user: UserRef) -> ModerationResult<bool> {
        let result =
            sqlx::query("DELETE FROM moderation.whitelist WHERE chat_id = $1 AND user_id = $2")
                .bind(user.chat_id)
                .bind(user.user_id)
                .execute(&self.pool)
                .await
                .map_err(|e| store_error("Failed to remove whitelist entry", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn is_whitelisted(&self, user: UserRef) -> ModerationResult<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM moderation.whitelist WHERE chat_id = $1 AND user_id = $2) AS listed",
        )
        .bind(user.chat_id)
        .bind(user.user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| store_error("Failed to check whitelist", e))?;

        Ok(row.get("listed"))
    }
}
