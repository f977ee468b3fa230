use crate::traits::RecordStore;
use crate::types::{ArticleRecord, RecordQuery, Result, SymbolFilter, NONE_SYMBOL};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::cmp::Ordering;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// PostgreSQL-backed record store.
pub struct PgRecordStore {
    db: PgPool,
}

impl PgRecordStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let db = PgPool::connect(database_url).await?;
        Ok(Self { db })
    }

    pub async fn setup_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS article_records (
                id UUID PRIMARY KEY,
                link TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                published_at TIMESTAMPTZ NOT NULL,
                content TEXT NOT NULL DEFAULT '',
                symbol TEXT NOT NULL,
                sentiment DOUBLE PRECISION NOT NULL CHECK (sentiment >= -1 AND sentiment <= 1),
                reason TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_article_records_symbol_published ON article_records (symbol, published_at DESC)",
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_article_records_published ON article_records (published_at DESC)",
        )
        .execute(&self.db)
        .await?;

        info!("Record store schema is ready");
        Ok(())
    }

    fn record_from_row(row: &PgRow) -> Result<ArticleRecord> {
        Ok(ArticleRecord {
            id: row.try_get("id")?,
            link: row.try_get("link")?,
            title: row.try_get("title")?,
            published_at: row.try_get::<DateTime<Utc>, _>("published_at")?,
            content: row.try_get("content")?,
            symbol: row.try_get("symbol")?,
            sentiment: row.try_get("sentiment")?,
            reason: row.try_get("reason")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        })
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn insert(&self, record: &ArticleRecord) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO article_records (id, link, title, published_at, content, symbol, sentiment, reason, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (link) DO NOTHING
            "#,
        )
        .bind(record.id)
        .bind(&record.link)
        .bind(&record.title)
        .bind(record.published_at)
        .bind(&record.content)
        .bind(&record.symbol)
        .bind(record.sentiment)
        .bind(&record.reason)
        .bind(record.created_at)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn query(&self, query: &RecordQuery) -> Result<Vec<ArticleRecord>> {
        let (condition, symbol) = match &query.symbol {
            SymbolFilter::All => ("symbol <> $1", NONE_SYMBOL.to_string()),
            SymbolFilter::Symbol(symbol) => ("symbol = $1", symbol.clone()),
        };
        // LIMIT NULL is LIMIT ALL in PostgreSQL.
        let limit = (query.limit > 0).then_some(sql_count(query.limit));

        let sql = format!(
            "SELECT * FROM article_records WHERE {} ORDER BY published_at DESC, link ASC OFFSET $2 LIMIT $3",
            condition
        );
        let rows = sqlx::query(&sql)
            .bind(symbol)
            .bind(sql_count(query.skip))
            .bind(limit)
            .fetch_all(&self.db)
            .await?;

        debug!("Record query {:?} returned {} rows", query, rows.len());
        rows.iter().map(Self::record_from_row).collect()
    }

    async fn recent_links(&self, limit: usize) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT link FROM article_records ORDER BY published_at DESC LIMIT $1")
            .bind(sql_count(limit))
            .fetch_all(&self.db)
            .await?;

        let links = rows
            .iter()
            .map(|row| row.try_get::<String, _>("link"))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(links)
    }
}

/// Postgres counts are BIGINT; anything larger means "no bound".
fn sql_count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// In-process record store with the same contract as [`PgRecordStore`].
#[derive(Default)]
pub struct MemoryRecordStore {
    records: RwLock<Vec<ArticleRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<ArticleRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

fn newest_first(a: &ArticleRecord, b: &ArticleRecord) -> Ordering {
    b.published_at
        .cmp(&a.published_at)
        .then_with(|| a.link.cmp(&b.link))
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert(&self, record: &ArticleRecord) -> Result<bool> {
        let mut records = self.records.write().await;
        if records.iter().any(|existing| existing.link == record.link) {
            return Ok(false);
        }
        records.push(record.clone());
        Ok(true)
    }

    async fn query(&self, query: &RecordQuery) -> Result<Vec<ArticleRecord>> {
        let records = self.records.read().await;
        let mut matching: Vec<ArticleRecord> = records
            .iter()
            .filter(|record| query.symbol.matches(&record.symbol))
            .cloned()
            .collect();
        drop(records);

        matching.sort_by(newest_first);

        let limit = if query.limit == 0 { usize::MAX } else { query.limit };
        Ok(matching.into_iter().skip(query.skip).take(limit).collect())
    }

    async fn recent_links(&self, limit: usize) -> Result<Vec<String>> {
        let mut records: Vec<ArticleRecord> = self.records.read().await.clone();
        records.sort_by(newest_first);
        Ok(records.into_iter().take(limit).map(|record| record.link).collect())
    }
}
