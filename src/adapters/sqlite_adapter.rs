//! SQLite panel adapter.
//!
//! Stores the panel in three tables (`companies`, `ratios`, `prices`) and
//! serves `PanelPort` queries through an r2d2 connection pool, so concurrent
//! candidate backtests can read without locking coordination.

use crate::domain::company::Company;
use crate::domain::error::QuantscreenError;
use crate::domain::panel::{Period, PriceObservation, RatioObservation};
use crate::ports::config_port::ConfigPort;
use crate::ports::panel_port::PanelPort;
use chrono::NaiveDate;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, QuantscreenError> {
        let db_path =
            config
                .get_string("panel", "path")
                .ok_or_else(|| QuantscreenError::ConfigMissing {
                    section: "panel".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("panel", "pool_size", 4) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e: r2d2::Error| QuantscreenError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, QuantscreenError> {
        // Each in-memory connection is its own database, so the pool must
        // hold exactly one.
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| QuantscreenError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    pub fn initialize_schema(&self) -> Result<(), QuantscreenError> {
        let conn = self.conn()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS companies (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                sector TEXT NOT NULL,
                listing_date TEXT NOT NULL,
                delisted_date TEXT
            );
            CREATE TABLE IF NOT EXISTS ratios (
                company_id TEXT NOT NULL,
                ratio TEXT NOT NULL,
                period INTEGER NOT NULL,
                value REAL NOT NULL,
                PRIMARY KEY (company_id, ratio, period)
            );
            CREATE TABLE IF NOT EXISTS prices (
                company_id TEXT NOT NULL,
                date TEXT NOT NULL,
                close REAL NOT NULL,
                dividend REAL NOT NULL DEFAULT 0,
                PRIMARY KEY (company_id, date)
            );
            CREATE INDEX IF NOT EXISTS idx_ratios_lookup ON ratios(company_id, ratio, period);
            CREATE INDEX IF NOT EXISTS idx_prices_lookup ON prices(company_id, date);",
        )
        .map_err(|e: rusqlite::Error| QuantscreenError::DatabaseQuery {
            reason: e.to_string(),
        })?;

        Ok(())
    }

    pub fn insert_companies(&self, companies: &[Company]) -> Result<(), QuantscreenError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e: rusqlite::Error| QuantscreenError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        for company in companies {
            tx.execute(
                "INSERT OR REPLACE INTO companies (id, name, sector, listing_date, delisted_date)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    company.id,
                    company.name,
                    company.sector,
                    company.listing_date.format(DATE_FORMAT).to_string(),
                    company
                        .delisted_date
                        .map(|d| d.format(DATE_FORMAT).to_string()),
                ],
            )
            .map_err(|e: rusqlite::Error| QuantscreenError::DatabaseQuery {
                reason: e.to_string(),
            })?;
        }

        tx.commit()
            .map_err(|e: rusqlite::Error| QuantscreenError::DatabaseQuery {
                reason: e.to_string(),
            })
    }

    pub fn insert_ratios(
        &self,
        rows: &[(&str, &str, Period, f64)],
    ) -> Result<(), QuantscreenError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e: rusqlite::Error| QuantscreenError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        for (company, ratio, period, value) in rows {
            tx.execute(
                "INSERT OR REPLACE INTO ratios (company_id, ratio, period, value)
                 VALUES (?1, ?2, ?3, ?4)",
                params![company, ratio, period.0, value],
            )
            .map_err(|e: rusqlite::Error| QuantscreenError::DatabaseQuery {
                reason: e.to_string(),
            })?;
        }

        tx.commit()
            .map_err(|e: rusqlite::Error| QuantscreenError::DatabaseQuery {
                reason: e.to_string(),
            })
    }

    pub fn insert_prices(
        &self,
        rows: &[(&str, NaiveDate, f64, f64)],
    ) -> Result<(), QuantscreenError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e: rusqlite::Error| QuantscreenError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        for (company, date, close, dividend) in rows {
            tx.execute(
                "INSERT OR REPLACE INTO prices (company_id, date, close, dividend)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    company,
                    date.format(DATE_FORMAT).to_string(),
                    close,
                    dividend
                ],
            )
            .map_err(|e: rusqlite::Error| QuantscreenError::DatabaseQuery {
                reason: e.to_string(),
            })?;
        }

        tx.commit()
            .map_err(|e: rusqlite::Error| QuantscreenError::DatabaseQuery {
                reason: e.to_string(),
            })
    }

    fn conn(
        &self,
    ) -> Result<r2d2::PooledConnection<SqliteConnectionManager>, QuantscreenError> {
        self.pool
            .get()
            .map_err(|e: r2d2::Error| QuantscreenError::Database {
                reason: e.to_string(),
            })
    }
}

fn parse_stored_date(value: &str) -> Result<NaiveDate, rusqlite::Error> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            value.len(),
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })
}

impl PanelPort for SqliteAdapter {
    fn ratio_history(
        &self,
        company: &str,
        ratio: &str,
        as_of: Period,
        window: u32,
    ) -> Result<Vec<RatioObservation>, QuantscreenError> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(
                "SELECT period, value FROM ratios
                 WHERE company_id = ?1 AND ratio = ?2 AND period <= ?3
                 ORDER BY period DESC LIMIT ?4",
            )
            .map_err(|e: rusqlite::Error| QuantscreenError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        let rows = stmt
            .query_map(params![company, ratio, as_of.0, window], |row| {
                Ok(RatioObservation {
                    period: Period(row.get(0)?),
                    value: row.get(1)?,
                })
            })
            .map_err(|e: rusqlite::Error| QuantscreenError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        let mut observations = rows
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e: rusqlite::Error| QuantscreenError::DatabaseQuery {
                reason: e.to_string(),
            })?;
        observations.reverse();
        Ok(observations)
    }

    fn price_series(
        &self,
        company: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceObservation>, QuantscreenError> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(
                "SELECT date, close, dividend FROM prices
                 WHERE company_id = ?1 AND date >= ?2 AND date <= ?3
                 ORDER BY date ASC",
            )
            .map_err(|e: rusqlite::Error| QuantscreenError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        let rows = stmt
            .query_map(
                params![
                    company,
                    start.format(DATE_FORMAT).to_string(),
                    end.format(DATE_FORMAT).to_string()
                ],
                |row| {
                    let date_str: String = row.get(0)?;
                    Ok(PriceObservation {
                        date: parse_stored_date(&date_str)?,
                        close: row.get(1)?,
                        dividend: row.get(2)?,
                    })
                },
            )
            .map_err(|e: rusqlite::Error| QuantscreenError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e: rusqlite::Error| QuantscreenError::DatabaseQuery {
                reason: e.to_string(),
            })
    }

    fn list_companies(&self, as_of: Period) -> Result<Vec<String>, QuantscreenError> {
        let conn = self.conn()?;

        // TEXT dates in %Y-%m-%d order lexicographically, so string
        // comparison matches date comparison.
        let mut stmt = conn
            .prepare(
                "SELECT id FROM companies
                 WHERE listing_date <= ?1
                   AND (delisted_date IS NULL OR delisted_date >= ?2)
                 ORDER BY id ASC",
            )
            .map_err(|e: rusqlite::Error| QuantscreenError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        let rows = stmt
            .query_map(
                params![
                    as_of.last_day().format(DATE_FORMAT).to_string(),
                    as_of.first_day().format(DATE_FORMAT).to_string()
                ],
                |row| row.get::<_, String>(0),
            )
            .map_err(|e: rusqlite::Error| QuantscreenError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e: rusqlite::Error| QuantscreenError::DatabaseQuery {
                reason: e.to_string(),
            })
    }

    fn get_company(&self, id: &str) -> Result<Option<Company>, QuantscreenError> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(
                "SELECT id, name, sector, listing_date, delisted_date
                 FROM companies WHERE id = ?1",
            )
            .map_err(|e: rusqlite::Error| QuantscreenError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        let mut rows = stmt
            .query_map(params![id], |row| {
                let listing: String = row.get(3)?;
                let delisted: Option<String> = row.get(4)?;
                Ok(Company {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    sector: row.get(2)?,
                    listing_date: parse_stored_date(&listing)?,
                    delisted_date: delisted
                        .map(|d| parse_stored_date(&d))
                        .transpose()?,
                })
            })
            .map_err(|e: rusqlite::Error| QuantscreenError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        match rows.next() {
            Some(Ok(company)) => Ok(Some(company)),
            Some(Err(e)) => Err(QuantscreenError::DatabaseQuery {
                reason: e.to_string(),
            }),
            None => Ok(None),
        }
    }
}
