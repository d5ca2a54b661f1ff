//! SQLite catalog.
//!
//! One file, opened in WAL mode with a busy timeout, so several processes
//! (or several [`SqliteCatalog`]s in one process) can share it. The
//! connection sits behind a mutex; every method runs one statement.

use super::{
    Catalog, CatalogError, FormattedRecord, FormattedStatus, ImageId, ImageRecord, NewImage,
};
use crate::imaging::Crop;
use rusqlite::{Connection, OptionalExtension, Row, ffi, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS images (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    width           INTEGER NOT NULL,
    height          INTEGER NOT NULL,
    filesize        INTEGER,
    namespace       TEXT NOT NULL,
    path            TEXT NOT NULL,
    crop_left       INTEGER,
    crop_top        INTEGER,
    crop_width      INTEGER,
    crop_height     INTEGER,
    in_blob_store   INTEGER NOT NULL DEFAULT 1,
    UNIQUE (namespace, path)
);

CREATE TABLE IF NOT EXISTS formatted_images (
    source_id       INTEGER NOT NULL,
    format          TEXT NOT NULL,
    status          TEXT NOT NULL,
    target_id       INTEGER,
    PRIMARY KEY (source_id, format)
);

CREATE TABLE IF NOT EXISTS dir_counters (
    namespace       TEXT PRIMARY KEY,
    count           INTEGER NOT NULL
);
";

const IMAGE_COLUMNS: &str = "id, width, height, filesize, namespace, path, \
     crop_left, crop_top, crop_width, crop_height, in_blob_store";

impl From<rusqlite::Error> for CatalogError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(err, _)
                if matches!(
                    err.extended_code,
                    ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                ) =>
            {
                CatalogError::UniqueViolation
            }
            _ => CatalogError::Sqlite(e),
        }
    }
}

pub struct SqliteCatalog {
    conn: Mutex<Connection>,
}

impl SqliteCatalog {
    /// Open (creating if needed) the catalog file at `path`.
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(path = %path.display(), journal_mode = %mode, "opened catalog");
        Self::init(conn)
    }

    /// A private catalog that lives as long as the value.
    pub fn open_in_memory() -> Result<Self, CatalogError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, CatalogError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, CatalogError> {
        self.conn.lock().map_err(|_| CatalogError::Poisoned)
    }

    /// Run an UPDATE/DELETE on one image row, mapping "no row" to `NotFound`.
    fn update_image(
        &self,
        id: ImageId,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<(), CatalogError> {
        let changed = self.conn()?.execute(sql, params)?;
        if changed == 0 {
            return Err(CatalogError::NotFound(id));
        }
        Ok(())
    }
}

fn image_from_row(row: &Row<'_>) -> rusqlite::Result<ImageRecord> {
    let crop = match (
        row.get::<_, Option<u32>>(6)?,
        row.get::<_, Option<u32>>(7)?,
        row.get::<_, Option<u32>>(8)?,
        row.get::<_, Option<u32>>(9)?,
    ) {
        (Some(left), Some(top), Some(width), Some(height)) => {
            Some(Crop::new(left, top, width, height))
        }
        _ => None,
    };
    Ok(ImageRecord {
        id: row.get(0)?,
        width: row.get(1)?,
        height: row.get(2)?,
        filesize: row.get::<_, Option<i64>>(3)?.map(|n| n.max(0) as u64),
        namespace: row.get(4)?,
        path: row.get(5)?,
        crop,
        in_blob_store: row.get(10)?,
    })
}

fn formatted_from_row(row: &Row<'_>) -> rusqlite::Result<FormattedRecord> {
    let status: String = row.get(2)?;
    let status = status.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
    })?;
    Ok(FormattedRecord {
        source_id: row.get(0)?,
        format: row.get(1)?,
        status,
        target_id: row.get(3)?,
    })
}

fn crop_params(crop: Option<&Crop>) -> [Option<u32>; 4] {
    match crop {
        Some(c) => [Some(c.left), Some(c.top), Some(c.width), Some(c.height)],
        None => [None; 4],
    }
}

impl Catalog for SqliteCatalog {
    fn image(&self, id: ImageId) -> Result<Option<ImageRecord>, CatalogError> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                &format!("SELECT {IMAGE_COLUMNS} FROM images WHERE id = ?1"),
                [id],
                image_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn insert_image(&self, image: &NewImage) -> Result<ImageRecord, CatalogError> {
        let [left, top, width, height] = crop_params(image.crop.as_ref());
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO images (width, height, namespace, path, \
             crop_left, crop_top, crop_width, crop_height, in_blob_store) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1)",
            params![
                image.width,
                image.height,
                image.namespace,
                image.path,
                left,
                top,
                width,
                height
            ],
        )?;
        Ok(ImageRecord {
            id: conn.last_insert_rowid(),
            width: image.width,
            height: image.height,
            filesize: None,
            namespace: image.namespace.clone(),
            path: image.path.clone(),
            crop: image.crop,
            in_blob_store: true,
        })
    }

    fn update_image_path(&self, id: ImageId, path: &str) -> Result<(), CatalogError> {
        self.update_image(
            id,
            "UPDATE images SET path = ?2 WHERE id = ?1",
            params![id, path],
        )
    }

    fn update_image_dimensions(
        &self,
        id: ImageId,
        width: u32,
        height: u32,
    ) -> Result<(), CatalogError> {
        self.update_image(
            id,
            "UPDATE images SET width = ?2, height = ?3 WHERE id = ?1",
            params![id, width, height],
        )
    }

    fn set_image_filesize(&self, id: ImageId, filesize: u64) -> Result<(), CatalogError> {
        self.update_image(
            id,
            "UPDATE images SET filesize = ?2 WHERE id = ?1",
            params![id, filesize as i64],
        )
    }

    fn set_image_crop(&self, id: ImageId, crop: Option<&Crop>) -> Result<(), CatalogError> {
        let [left, top, width, height] = crop_params(crop);
        self.update_image(
            id,
            "UPDATE images SET crop_left = ?2, crop_top = ?3, crop_width = ?4, crop_height = ?5 \
             WHERE id = ?1",
            params![id, left, top, width, height],
        )
    }

    fn delete_image(&self, id: ImageId) -> Result<(), CatalogError> {
        self.update_image(id, "DELETE FROM images WHERE id = ?1", [id])
    }

    fn increment_dir_counter(&self, namespace: &str) -> Result<u64, CatalogError> {
        let count: i64 = self.conn()?.query_row(
            "INSERT INTO dir_counters (namespace, count) VALUES (?1, 1) \
             ON CONFLICT (namespace) DO UPDATE SET count = count + 1 \
             RETURNING count",
            [namespace],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    fn formatted(
        &self,
        source_id: ImageId,
        format: &str,
    ) -> Result<Option<FormattedRecord>, CatalogError> {
        let record = self
            .conn()?
            .query_row(
                "SELECT source_id, format, status, target_id FROM formatted_images \
                 WHERE source_id = ?1 AND format = ?2",
                params![source_id, format],
                formatted_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn formatted_for_source(
        &self,
        source_id: ImageId,
    ) -> Result<Vec<FormattedRecord>, CatalogError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT source_id, format, status, target_id FROM formatted_images \
             WHERE source_id = ?1 ORDER BY format",
        )?;
        let records = stmt
            .query_map([source_id], formatted_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn formatted_for_target(
        &self,
        target_id: ImageId,
    ) -> Result<Option<FormattedRecord>, CatalogError> {
        let record = self
            .conn()?
            .query_row(
                "SELECT source_id, format, status, target_id FROM formatted_images \
                 WHERE target_id = ?1",
                [target_id],
                formatted_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn claim_formatted(&self, source_id: ImageId, format: &str) -> Result<(), CatalogError> {
        self.conn()?.execute(
            "INSERT INTO formatted_images (source_id, format, status) VALUES (?1, ?2, ?3)",
            params![source_id, format, FormattedStatus::Processing.as_str()],
        )?;
        Ok(())
    }

    fn complete_formatted(
        &self,
        source_id: ImageId,
        format: &str,
        target_id: ImageId,
    ) -> Result<bool, CatalogError> {
        let changed = self.conn()?.execute(
            "UPDATE formatted_images SET status = ?3, target_id = ?4 \
             WHERE source_id = ?1 AND format = ?2 AND status = ?5",
            params![
                source_id,
                format,
                FormattedStatus::Default.as_str(),
                target_id,
                FormattedStatus::Processing.as_str()
            ],
        )?;
        Ok(changed == 1)
    }

    fn fail_formatted(&self, source_id: ImageId, format: &str) -> Result<bool, CatalogError> {
        let changed = self.conn()?.execute(
            "UPDATE formatted_images SET status = ?3 \
             WHERE source_id = ?1 AND format = ?2 AND status = ?4",
            params![
                source_id,
                format,
                FormattedStatus::Failed.as_str(),
                FormattedStatus::Processing.as_str()
            ],
        )?;
        Ok(changed == 1)
    }

    fn delete_formatted(&self, source_id: ImageId, format: &str) -> Result<(), CatalogError> {
        self.conn()?.execute(
            "DELETE FROM formatted_images WHERE source_id = ?1 AND format = ?2",
            params![source_id, format],
        )?;
        Ok(())
    }
}
