use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use tracing::{debug, warn};

use super::{SeenSet, SeenStore};
use crate::error::Result;

/// Seen-set in a `seen_ids` table. Rows are never deleted, so `save` only
/// inserts what is missing, inside one transaction.
pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = match connect(&path) {
            Ok(conn) => conn,
            Err(e) if path.exists() => {
                let aside = corrupt_path(&path);
                warn!(
                    "Seen store {:?} is unreadable ({}), moving it to {:?} and starting empty",
                    path, e, aside
                );
                std::fs::rename(&path, &aside)?;
                connect(&path)?
            }
            Err(e) => return Err(e),
        };
        Ok(Self { conn, path })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn,
            path: PathBuf::from(":memory:"),
        })
    }

    fn read_ids(&self) -> Result<SeenSet> {
        let mut stmt = self.conn.prepare("SELECT id FROM seen_ids")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<SeenSet, _>>()?;
        Ok(ids)
    }
}

fn connect(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    init_schema(&conn)?;
    Ok(conn)
}

/// `<path>.corrupt`, next to the original.
fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".corrupt");
    PathBuf::from(name)
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS seen_ids (
            id            TEXT PRIMARY KEY,
            first_seen_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;
    Ok(())
}

impl SeenStore for SqliteStore {
    fn load(&self) -> SeenSet {
        self.read_ids().unwrap_or_else(|e| {
            warn!("Cannot read seen ids from {:?} ({}), starting empty", self.path, e);
            SeenSet::new()
        })
    }

    fn save(&self, seen: &SeenSet) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let mut inserted = 0usize;
        {
            let mut stmt = tx.prepare("INSERT OR IGNORE INTO seen_ids (id) VALUES (?1)")?;
            for id in seen.iter() {
                inserted += stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        debug!("Inserted {} new ids into {:?}", inserted, self.path);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("sqlite {}", self.path.display())
    }
}
