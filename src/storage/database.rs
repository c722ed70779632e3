use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;

use super::PositionStore;
use crate::core::{DatabaseConfig, Result, TrailingError};
use crate::trailing::{Instrument, Position, PositionStatus, User};

/// SQLite-backed position store. Decimals are kept as TEXT so no precision
/// is lost on the way through.
pub struct PositionDatabase {
    pool: SqlitePool,
}

impl PositionDatabase {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        Self::new(&config.url, config.max_connections).await
    }

    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let connection_string = if database_url.starts_with("sqlite:") {
            database_url.to_string()
        } else {
            if let Some(parent) = Path::new(database_url).parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    TrailingError::Configuration(format!(
                        "cannot create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
            format!("sqlite://{}?mode=rwc", database_url)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&connection_string)
            .await?;

        let db = Self { pool };
        db.initialize_schema().await?;

        Ok(db)
    }

    async fn initialize_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS instruments (
                id INTEGER PRIMARY KEY,
                symbol TEXT NOT NULL,
                tick_size TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                api_key TEXT,
                api_secret TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS positions (
                buy_order_id INTEGER PRIMARY KEY,
                sell_order_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                instrument_id INTEGER NOT NULL,
                quantity TEXT NOT NULL,
                sell_price TEXT NOT NULL,
                status INTEGER NOT NULL,
                needs_replacement INTEGER NOT NULL DEFAULT 0,
                updated_at DATETIME NOT NULL,
                FOREIGN KEY (instrument_id) REFERENCES instruments(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_positions_status
            ON positions(status)
            "#,
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("Position database schema initialized");

        Ok(())
    }

    pub async fn upsert_instrument(&self, instrument: &Instrument) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO instruments (id, symbol, tick_size)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                symbol = excluded.symbol,
                tick_size = excluded.tick_size
            "#,
        )
        .bind(instrument.id)
        .bind(&instrument.symbol)
        .bind(instrument.tick_size.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn upsert_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, api_key, api_secret)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                api_key = excluded.api_key,
                api_secret = excluded.api_secret
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.api_key)
        .bind(&user.api_secret)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl PositionStore for PositionDatabase {
    async fn fetch_pending_positions(&self) -> Result<Vec<Position>> {
        let rows = sqlx::query("SELECT * FROM positions WHERE status = ?")
            .bind(PositionStatus::AwaitingSale.code())
            .fetch_all(&self.pool)
            .await?;

        let positions = rows
            .iter()
            .map(position_from_row)
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?;

        Ok(positions)
    }

    async fn save_position(&self, position: &Position) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO positions (
                buy_order_id, sell_order_id, user_id, instrument_id,
                quantity, sell_price, status, needs_replacement, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(buy_order_id) DO UPDATE SET
                sell_order_id = excluded.sell_order_id,
                user_id = excluded.user_id,
                instrument_id = excluded.instrument_id,
                quantity = excluded.quantity,
                sell_price = excluded.sell_price,
                status = excluded.status,
                needs_replacement = excluded.needs_replacement,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(position.buy_order_id)
        .bind(position.sell_order_id)
        .bind(position.user_id)
        .bind(position.instrument_id)
        .bind(position.quantity.to_string())
        .bind(position.sell_price.to_string())
        .bind(position.status.code())
        .bind(position.needs_replacement)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_instrument(&self, instrument_id: i64) -> Result<Instrument> {
        let row = sqlx::query("SELECT * FROM instruments WHERE id = ?")
            .bind(instrument_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| {
                TrailingError::Configuration(format!("unknown instrument {}", instrument_id))
            })?;

        Ok(Instrument {
            id: row.try_get("id")?,
            symbol: row.try_get("symbol")?,
            tick_size: decimal_column(&row, "tick_size")?,
        })
    }

    async fn fetch_user(&self, user_id: i64) -> Result<User> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| TrailingError::Configuration(format!("unknown user {}", user_id)))?;

        Ok(User {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            api_key: row.try_get("api_key")?,
            api_secret: row.try_get("api_secret")?,
        })
    }
}

fn position_from_row(row: &SqliteRow) -> std::result::Result<Position, sqlx::Error> {
    let status_code: i64 = row.try_get("status")?;
    let status = PositionStatus::from_code(status_code).ok_or_else(|| sqlx::Error::ColumnDecode {
        index: "status".to_string(),
        source: format!("unknown position status {}", status_code).into(),
    })?;

    Ok(Position {
        buy_order_id: row.try_get("buy_order_id")?,
        sell_order_id: row.try_get("sell_order_id")?,
        user_id: row.try_get("user_id")?,
        instrument_id: row.try_get("instrument_id")?,
        quantity: decimal_column(row, "quantity")?,
        sell_price: decimal_column(row, "sell_price")?,
        status,
        needs_replacement: row.try_get("needs_replacement")?,
    })
}

fn decimal_column(row: &SqliteRow, column: &str) -> std::result::Result<Decimal, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}
