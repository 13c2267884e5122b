//! # 動的本文のデータソース
//!
//! 動的本文の通知が持つ接続文字列とクエリで、表形式の結果を取得する。
//!
//! ## 設計方針
//!
//! - **接続は呼び出しごと**: 通知ごとに接続先が異なるため、`fetch` の中で接続し、
//!   結果を取得したら成功・失敗にかかわらず切断する
//! - **値はすべて文字列化**: HTML に埋め込むだけなので、列の型ごとに文字列へ変換する。
//!   対応していない型（NUMERIC など）はクエリ側で `::text` にキャストしてもらう
//! - **NULL は空文字列**

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use remindmail_domain::report::TabularResult;
use sqlx::{
    Column,
    Connection,
    PgConnection,
    Row,
    TypeInfo,
    ValueRef,
    postgres::PgRow,
};

use crate::error::InfraError;

/// 表形式データソーストレイト
#[async_trait]
pub trait TabularSource: Send + Sync {
    /// クエリを実行し、列名と文字列化した行を返す
    async fn fetch(&self, connection: &str, query: &str) -> Result<TabularResult, InfraError>;
}

/// PostgreSQL 実装の TabularSource
#[derive(Debug, Clone, Default)]
pub struct PostgresTabularSource;

impl PostgresTabularSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TabularSource for PostgresTabularSource {
    #[tracing::instrument(skip_all, level = "debug")]
    async fn fetch(&self, connection: &str, query: &str) -> Result<TabularResult, InfraError> {
        let mut conn = PgConnection::connect(connection).await?;

        let fetched = sqlx::query(query)
            .persistent(false)
            .fetch_all(&mut conn)
            .await;

        if let Err(e) = conn.close().await {
            tracing::debug!(error = %e, "データソースの切断に失敗しました");
        }

        let rows = fetched?;
        to_tabular(&rows)
    }
}

/// 取得した行を [`TabularResult`] に変換する
///
/// 行が 0 件の場合は列名も取得できないため、空の結果を返す。
fn to_tabular(rows: &[PgRow]) -> Result<TabularResult, InfraError> {
    let Some(first) = rows.first() else {
        return Ok(TabularResult::default());
    };

    let columns = first
        .columns()
        .iter()
        .map(|column| column.name().to_string())
        .collect::<Vec<_>>();

    let rows = rows
        .iter()
        .map(|row| {
            (0..columns.len())
                .map(|index| cell_to_string(row, index))
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(TabularResult::new(columns, rows))
}

/// 1 セルを型に応じて文字列化する
fn cell_to_string(row: &PgRow, index: usize) -> Result<String, sqlx::Error> {
    let type_name = {
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            return Ok(String::new());
        }
        raw.type_info().name().to_string()
    };

    let value = match type_name.as_str() {
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" => row.try_get::<String, _>(index)?,
        "BOOL" => row.try_get::<bool, _>(index)?.to_string(),
        "INT2" => row.try_get::<i16, _>(index)?.to_string(),
        "INT4" => row.try_get::<i32, _>(index)?.to_string(),
        "INT8" => row.try_get::<i64, _>(index)?.to_string(),
        "FLOAT4" => row.try_get::<f32, _>(index)?.to_string(),
        "FLOAT8" => row.try_get::<f64, _>(index)?.to_string(),
        "DATE" => row.try_get::<NaiveDate, _>(index)?.to_string(),
        "TIME" => row.try_get::<NaiveTime, _>(index)?.to_string(),
        "TIMESTAMP" => row.try_get::<NaiveDateTime, _>(index)?.to_string(),
        "TIMESTAMPTZ" => row.try_get::<DateTime<Utc>, _>(index)?.to_rfc3339(),
        other => {
            tracing::warn!(
                column_index = index,
                column_type = other,
                "文字列化できない型の列です。クエリで ::text にキャストしてください"
            );
            String::new()
        }
    };

    Ok(value)
}
