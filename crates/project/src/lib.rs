use anyhow::Result;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use timeline::{ClipSnapshot, LayerSnapshot};

pub fn app_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| std::env::temp_dir());
    base.join("beatline")
}

/// Everything a saved timeline needs to come back intact: the clip and layer
/// sets together with their id high-watermarks, so ids allocated after a
/// load never collide with ids already on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineDoc {
    pub clips: ClipSnapshot,
    pub layers: LayerSnapshot,
    pub saved_at: i64,
}

impl TimelineDoc {
    pub fn new(clips: ClipSnapshot, layers: LayerSnapshot) -> Self {
        Self {
            clips,
            layers,
            saved_at: chrono::Utc::now().timestamp(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProjectInfo {
    pub id: String,
    pub name: String,
}

pub struct ProjectDb {
    conn: Connection,
    path: PathBuf,
}

impl ProjectDb {
    pub fn open_or_create(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(path)?;
        // Recommended PRAGMAs for local interactive app DB
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        apply_migrations(&conn)?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn create_project(&self, name: &str) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp();
        self.conn.execute(
            "INSERT INTO projects(id, name, created_at, updated_at) VALUES(?1, ?2, ?3, ?3)",
            params![id, name, now],
        )?;
        Ok(id)
    }

    pub fn ensure_project(&self, id: &str, name: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        self.conn.execute(
            "INSERT OR IGNORE INTO projects(id, name, created_at, updated_at) VALUES(?1, ?2, ?3, ?3)",
            params![id, name, now],
        )?;
        Ok(())
    }

    pub fn list_projects(&self) -> Result<Vec<ProjectInfo>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name FROM projects ORDER BY updated_at DESC, created_at DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ProjectInfo {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn save_timeline(&self, project_id: &str, doc: &TimelineDoc) -> Result<()> {
        let json = serde_json::to_string(doc)?;
        let now = chrono::Utc::now().timestamp();
        self.conn.execute(
            "INSERT INTO project_timeline(project_id, json, updated_at) VALUES(?1, ?2, ?3)
             ON CONFLICT(project_id) DO UPDATE SET json = excluded.json, updated_at = excluded.updated_at",
            params![project_id, json, now],
        )?;
        self.conn.execute(
            "UPDATE projects SET updated_at = ?2 WHERE id = ?1",
            params![project_id, now],
        )?;
        Ok(())
    }

    pub fn load_timeline(&self, project_id: &str) -> Result<Option<TimelineDoc>> {
        let mut stmt = self
            .conn
            .prepare("SELECT json FROM project_timeline WHERE project_id = ?1 LIMIT 1")?;
        let mut rows = stmt.query(params![project_id])?;
        if let Some(row) = rows.next()? {
            let raw: String = row.get(0)?;
            let doc = serde_json::from_str(&raw)?;
            Ok(Some(doc))
        } else {
            Ok(None)
        }
    }

    pub fn delete_project(&self, project_id: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM project_timeline WHERE project_id = ?1",
            params![project_id],
        )?;
        self.conn
            .execute("DELETE FROM projects WHERE id = ?1", params![project_id])?;
        Ok(())
    }
}

fn apply_migrations(conn: &Connection) -> Result<()> {
    // Simple migration tracking by name
    conn.execute_batch(include_str!("../migrations/V0001__init.sql"))?;
    conn.execute(
        "INSERT OR IGNORE INTO migrations(name, applied_at) VALUES(?1, strftime('%s','now'))",
        params!["V0001__init"],
    )?;
    conn.execute_batch(include_str!("../migrations/V0002__timeline.sql"))?;
    conn.execute(
        "INSERT OR IGNORE INTO migrations(name, applied_at) VALUES(?1, strftime('%s','now'))",
        params!["V0002__timeline"],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use timeline::{ClipKind, ClipPayload, ClipStore, LayerKind, LayerManager};

    fn temp_db(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("beatline-test-{tag}-{}.db", std::process::id()))
    }

    #[test]
    fn test_timeline_round_trip() {
        let path = temp_db("roundtrip");
        let _ = fs::remove_file(&path);
        let db = ProjectDb::open_or_create(&path).unwrap();
        let project = db.create_project("demo").unwrap();

        let layers = LayerManager::new();
        let video = layers.layers_of(LayerKind::VideoImage)[0].id;
        let mut store = ClipStore::default();
        store
            .add_clip(&layers, video, ClipKind::Video, 2.0, 1.0, ClipPayload::Empty)
            .unwrap();

        let doc = TimelineDoc::new(store.export(), layers.export());
        db.save_timeline(&project, &doc).unwrap();

        let loaded = db.load_timeline(&project).unwrap().unwrap();
        assert_eq!(loaded.clips.clips.len(), 1);
        assert_eq!(loaded.clips.next_id, doc.clips.next_id);
        assert_eq!(loaded.layers.layers.len(), 4);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_save_overwrites_previous_snapshot() {
        let path = temp_db("overwrite");
        let _ = fs::remove_file(&path);
        let db = ProjectDb::open_or_create(&path).unwrap();
        let project = db.create_project("demo").unwrap();

        let layers = LayerManager::new();
        let store = ClipStore::default();
        db.save_timeline(&project, &TimelineDoc::new(store.export(), layers.export()))
            .unwrap();

        let video = layers.layers_of(LayerKind::VideoImage)[0].id;
        let mut store = ClipStore::default();
        store
            .add_clip(&layers, video, ClipKind::Video, 0.0, 1.0, ClipPayload::Empty)
            .unwrap();
        db.save_timeline(&project, &TimelineDoc::new(store.export(), layers.export()))
            .unwrap();

        let loaded = db.load_timeline(&project).unwrap().unwrap();
        assert_eq!(loaded.clips.clips.len(), 1);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_missing_timeline_is_none() {
        let path = temp_db("missing");
        let _ = fs::remove_file(&path);
        let db = ProjectDb::open_or_create(&path).unwrap();
        let project = db.create_project("empty").unwrap();
        assert!(db.load_timeline(&project).unwrap().is_none());
        let _ = fs::remove_file(&path);
    }
}
