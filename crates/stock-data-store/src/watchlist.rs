use chrono::Utc;
use scan_core::{ScanError, Symbol};
use sqlx::SqlitePool;

fn store_err(e: sqlx::Error) -> ScanError {
    ScanError::StoreError(e.to_string())
}

/// Fallback universe persisted for `OptionsDiscoveryConfig.fallback_to_watchlist`
/// (spec §4.1 step 2, SPEC_FULL.md Watchlist relation). Ordered lexicographically
/// on read so universe determination stays deterministic across restarts.
pub async fn get_watchlist(pool: &SqlitePool) -> Result<Vec<Symbol>, ScanError> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT symbol FROM watchlist ORDER BY symbol ASC")
            .fetch_all(pool)
            .await
            .map_err(store_err)?;

    rows.into_iter().map(|(s,)| Symbol::new(s)).collect()
}

/// Replace the entire watchlist with `symbols` in a single transaction.
pub async fn set_watchlist(pool: &SqlitePool, symbols: &[Symbol]) -> Result<(), ScanError> {
    let now = Utc::now();
    let mut tx = pool.begin().await.map_err(store_err)?;

    sqlx::query("DELETE FROM watchlist").execute(&mut *tx).await.map_err(store_err)?;
    for symbol in symbols {
        sqlx::query("INSERT INTO watchlist (symbol, added_at) VALUES (?, ?)")
            .bind(symbol.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
    }

    tx.commit().await.map_err(store_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        for statement in crate::schema::CREATE_TABLES {
            sqlx::query(statement).execute(&pool).await.unwrap();
        }
        pool
    }

    #[tokio::test]
    async fn set_then_get_round_trips_sorted() {
        let pool = memory_pool().await;
        let symbols = vec![
            Symbol::new("ZZZ").unwrap(),
            Symbol::new("AAA").unwrap(),
            Symbol::new("MMM").unwrap(),
        ];
        set_watchlist(&pool, &symbols).await.unwrap();

        let stored = get_watchlist(&pool).await.unwrap();
        assert_eq!(
            stored.iter().map(Symbol::as_str).collect::<Vec<_>>(),
            vec!["AAA", "MMM", "ZZZ"]
        );
    }

    #[tokio::test]
    async fn set_replaces_prior_contents() {
        let pool = memory_pool().await;
        set_watchlist(&pool, &[Symbol::new("AAA").unwrap()]).await.unwrap();
        set_watchlist(&pool, &[Symbol::new("BBB").unwrap()]).await.unwrap();

        let stored = get_watchlist(&pool).await.unwrap();
        assert_eq!(stored.iter().map(Symbol::as_str).collect::<Vec<_>>(), vec!["BBB"]);
    }
}
