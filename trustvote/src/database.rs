/*!
Wallet records kept by the login backend
*/

use std::path::Path;

use rusqlite::{Connection, Result as SqlResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use trustvote_chain::Address;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletRecord {
    /// Checksummed address
    pub address: String,
    /// Unix seconds
    pub created_at: i64,
}

pub struct WalletStore {
    conn: Connection,
}

impl WalletStore {
    pub fn open<P: AsRef<Path>>(path: P) -> SqlResult<Self> {
        let path = path.as_ref();
        let store = Self::with_connection(Connection::open(path)?)?;
        info!("Wallet store opened at {:?}, {} wallets known", path, store.count()?);
        Ok(store)
    }

    pub fn in_memory() -> SqlResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> SqlResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS wallets (
                address TEXT PRIMARY KEY,
                created_at INTEGER NOT NULL
            );
        "#,
        )?;
        Ok(Self { conn })
    }

    /// Records `address`; false if it was already known
    pub fn insert(&self, address: Address) -> SqlResult<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO wallets (address, created_at) VALUES (?1, ?2)",
            (address.to_string(), chrono::Utc::now().timestamp()),
        )?;
        debug!("Insert wallet {address}: {inserted} row(s)");
        Ok(inserted == 1)
    }

    pub fn remove(&self, address: Address) -> SqlResult<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM wallets WHERE address = ?1", [address.to_string()])?;
        Ok(removed == 1)
    }

    pub fn list(&self) -> SqlResult<Vec<WalletRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT address, created_at FROM wallets ORDER BY created_at, address")?;
        let rows = stmt.query_map([], |row| {
            Ok(WalletRecord {
                address: row.get(0)?,
                created_at: row.get(1)?,
            })
        })?;
        rows.collect()
    }

    pub fn count(&self) -> SqlResult<u64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM wallets", [], |row| row.get::<_, i64>(0))
            .map(|n| n as u64)
    }
}
