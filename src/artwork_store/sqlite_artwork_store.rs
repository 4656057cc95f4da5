use super::models::*;
use super::schema::GALLERY_VERSIONED_SCHEMAS;
use super::{ArtworkStore, CatalogError, CatalogResult, UploadJobStore};
use crate::sqlite_persistence::open_versioned;
use anyhow::Context;
use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::info;

const ARTWORK_COLUMNS: &str = "id, file_id, url, thumbnail_url, content_digest, perceptual_digest, \
     views, likes, bookmarks, tags, created_at, updated_at";

const UPLOAD_JOB_COLUMNS: &str = "id, content_digest, perceptual_digest, file_name, remote_file_id, \
     remote_job_id, status_url, status, error, attempts, created_at, last_checked_at";

/// Live records carrying every tag of the JSON array bound to ?1.
const LIVE_WITH_TAGS: &str = "deleted_at IS NULL AND NOT EXISTS (\
     SELECT 1 FROM json_each(?1) AS wanted \
     WHERE wanted.value NOT IN (SELECT value FROM json_each(artworks.tags)))";

pub struct SqliteArtworkStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteArtworkStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> anyhow::Result<Self> {
        let path = db_path.as_ref();
        info!("Opening gallery database at {:?}", path);
        let conn = Connection::open(path).context("Failed to open gallery database")?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> anyhow::Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> anyhow::Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        open_versioned(&mut conn, GALLERY_VERSIONED_SCHEMAS, "gallery")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn row_to_artwork(row: &rusqlite::Row) -> rusqlite::Result<Artwork> {
        let tags_json: String = row.get("tags")?;
        let tags: Vec<String> = serde_json::from_str(&tags_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e))
        })?;

        Ok(Artwork {
            id: row.get("id")?,
            file_id: row.get("file_id")?,
            url: row.get("url")?,
            thumbnail_url: row.get("thumbnail_url")?,
            content_digest: row.get("content_digest")?,
            perceptual_digest: digest_from_sql(row.get("perceptual_digest")?),
            views: row.get::<_, i64>("views")? as u64,
            likes: row.get::<_, i64>("likes")? as u64,
            bookmarks: row.get::<_, i64>("bookmarks")? as u64,
            tags,
            created_at: millis_to_datetime(row.get("created_at")?),
            updated_at: millis_to_datetime(row.get("updated_at")?),
        })
    }

    fn row_to_upload_job(row: &rusqlite::Row) -> rusqlite::Result<UploadJob> {
        let status_str: String = row.get("status")?;
        Ok(UploadJob {
            id: row.get("id")?,
            content_digest: row.get("content_digest")?,
            perceptual_digest: digest_from_sql(row.get("perceptual_digest")?),
            file_name: row.get("file_name")?,
            remote_file_id: row.get("remote_file_id")?,
            remote_job_id: row.get("remote_job_id")?,
            status_url: row.get("status_url")?,
            status: UploadJobStatus::parse(&status_str).unwrap_or(UploadJobStatus::Failed),
            error: row.get("error")?,
            attempts: row.get::<_, i64>("attempts")? as u32,
            created_at: millis_to_datetime(row.get("created_at")?),
            last_checked_at: row
                .get::<_, Option<i64>>("last_checked_at")?
                .map(millis_to_datetime),
        })
    }

    fn insert_artwork(conn: &Connection, artwork: &NewArtwork) -> CatalogResult<Artwork> {
        let tags_json = tags_to_json(&normalize_tags(artwork.tags.clone()))?;
        let inserted = conn.execute(
            "INSERT INTO artworks \
             (file_id, url, thumbnail_url, content_digest, perceptual_digest, tags, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                artwork.file_id,
                artwork.url,
                artwork.thumbnail_url,
                artwork.content_digest,
                digest_to_sql(artwork.perceptual_digest),
                tags_json,
                now_millis(),
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(CatalogError::DuplicateContent(
                    artwork.content_digest.clone(),
                ))
            }
            Err(e) => return Err(e.into()),
        }

        let id = conn.last_insert_rowid();
        Self::query_artwork(conn, id)?
            .ok_or_else(|| CatalogError::Corrupted(format!("artwork {} vanished after insert", id)))
    }

    fn query_artwork(conn: &Connection, id: i64) -> rusqlite::Result<Option<Artwork>> {
        conn.query_row(
            &format!(
                "SELECT {} FROM artworks WHERE id = ?1 AND deleted_at IS NULL",
                ARTWORK_COLUMNS
            ),
            params![id],
            Self::row_to_artwork,
        )
        .optional()
    }

    fn adjust_counter(
        &self,
        id: i64,
        counter: EngagementCounter,
        new_value_expr: &str,
    ) -> CatalogResult<Option<EngagementCounts>> {
        let sql = format!(
            "UPDATE artworks SET {col} = {expr} WHERE id = ?1 AND deleted_at IS NULL \
             RETURNING id, views, likes, bookmarks",
            col = counter.column(),
            expr = new_value_expr.replace("{col}", counter.column()),
        );
        let counts = self
            .conn()
            .query_row(&sql, params![id], |row| {
                Ok(EngagementCounts {
                    id: row.get(0)?,
                    views: row.get::<_, i64>(1)? as u64,
                    likes: row.get::<_, i64>(2)? as u64,
                    bookmarks: row.get::<_, i64>(3)? as u64,
                })
            })
            .optional()?;
        Ok(counts)
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

fn digest_to_sql(digest: Option<u64>) -> i64 {
    digest.unwrap_or(0) as i64
}

fn digest_from_sql(raw: i64) -> Option<u64> {
    match raw {
        0 => None,
        v => Some(v as u64),
    }
}

fn tags_to_json(tags: &[String]) -> CatalogResult<String> {
    serde_json::to_string(tags).map_err(|e| CatalogError::Corrupted(e.to_string()))
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

impl ArtworkStore for SqliteArtworkStore {
    fn create_artwork(&self, artwork: &NewArtwork) -> CatalogResult<Artwork> {
        Self::insert_artwork(&self.conn(), artwork)
    }

    fn get_artwork(&self, id: i64) -> CatalogResult<Option<Artwork>> {
        Ok(Self::query_artwork(&self.conn(), id)?)
    }

    fn find_by_content_digest(&self, digest: &str) -> CatalogResult<Option<Artwork>> {
        let artwork = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {} FROM artworks WHERE content_digest = ?1 AND deleted_at IS NULL",
                    ARTWORK_COLUMNS
                ),
                params![digest],
                Self::row_to_artwork,
            )
            .optional()?;
        Ok(artwork)
    }

    fn list_perceptual_digests(&self) -> CatalogResult<Vec<(i64, u64)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, perceptual_digest FROM artworks \
             WHERE deleted_at IS NULL AND perceptual_digest != 0 ORDER BY id",
        )?;
        let digests = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(digests)
    }

    fn list_artworks(&self, query: &ArtworkQuery) -> CatalogResult<ArtworkPage> {
        let wanted_tags = tags_to_json(&query.tags)?;
        let conn = self.conn();

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM artworks WHERE {}", LIVE_WITH_TAGS),
            params![wanted_tags],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM artworks WHERE {} ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3",
            ARTWORK_COLUMNS, LIVE_WITH_TAGS
        ))?;
        let items = stmt
            .query_map(
                params![wanted_tags, query.page_size as i64, query.offset() as i64],
                Self::row_to_artwork,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(ArtworkPage {
            items,
            total: total as usize,
            page: query.page,
            page_size: query.page_size,
        })
    }

    fn random_artworks(&self, limit: usize) -> CatalogResult<Vec<Artwork>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM artworks WHERE deleted_at IS NULL ORDER BY RANDOM() LIMIT ?1",
            ARTWORK_COLUMNS
        ))?;
        let items = stmt
            .query_map(params![limit as i64], Self::row_to_artwork)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    fn count_artworks(&self) -> CatalogResult<usize> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM artworks WHERE deleted_at IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn increment_counter(
        &self,
        id: i64,
        counter: EngagementCounter,
    ) -> CatalogResult<Option<EngagementCounts>> {
        self.adjust_counter(id, counter, "{col} + 1")
    }

    fn decrement_counter(
        &self,
        id: i64,
        counter: EngagementCounter,
    ) -> CatalogResult<Option<EngagementCounts>> {
        self.adjust_counter(id, counter, "MAX({col} - 1, 0)")
    }

    fn update_artwork(&self, id: i64, update: &ArtworkUpdate) -> CatalogResult<Option<Artwork>> {
        let tags_json = match &update.tags {
            Some(tags) => Some(tags_to_json(&normalize_tags(tags.clone()))?),
            None => None,
        };
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE artworks SET \
             url = COALESCE(?2, url), \
             thumbnail_url = COALESCE(?3, thumbnail_url), \
             tags = COALESCE(?4, tags), \
             updated_at = ?5 \
             WHERE id = ?1 AND deleted_at IS NULL",
            params![id, update.url, update.thumbnail_url, tags_json, now_millis()],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        Ok(Self::query_artwork(&conn, id)?)
    }

    fn soft_delete_artwork(&self, id: i64) -> CatalogResult<bool> {
        let changed = self.conn().execute(
            "UPDATE artworks SET deleted_at = ?2, updated_at = ?2 \
             WHERE id = ?1 AND deleted_at IS NULL",
            params![id, now_millis()],
        )?;
        Ok(changed > 0)
    }
}

impl UploadJobStore for SqliteArtworkStore {
    fn create_upload_job(&self, job: &NewUploadJob) -> CatalogResult<UploadJob> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO upload_jobs \
             (content_digest, perceptual_digest, file_name, remote_file_id, remote_job_id, \
              status_url, status, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                job.content_digest,
                digest_to_sql(job.perceptual_digest),
                job.file_name,
                job.remote_file_id,
                job.remote_job_id,
                job.status_url,
                UploadJobStatus::Pending.as_str(),
                now_millis(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        conn.query_row(
            &format!("SELECT {} FROM upload_jobs WHERE id = ?1", UPLOAD_JOB_COLUMNS),
            params![id],
            Self::row_to_upload_job,
        )
        .map_err(CatalogError::from)
    }

    fn get_upload_job(&self, id: i64) -> CatalogResult<Option<UploadJob>> {
        let job = self
            .conn()
            .query_row(
                &format!("SELECT {} FROM upload_jobs WHERE id = ?1", UPLOAD_JOB_COLUMNS),
                params![id],
                Self::row_to_upload_job,
            )
            .optional()?;
        Ok(job)
    }

    fn record_upload_job_check(
        &self,
        id: i64,
        status: UploadJobStatus,
        attempts: u32,
        error: Option<&str>,
    ) -> CatalogResult<()> {
        self.conn().execute(
            "UPDATE upload_jobs SET status = ?2, attempts = ?3, error = ?4, last_checked_at = ?5 \
             WHERE id = ?1",
            params![id, status.as_str(), attempts as i64, error, now_millis()],
        )?;
        Ok(())
    }

    fn complete_upload_job(&self, id: i64, artwork: &NewArtwork) -> CatalogResult<Artwork> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let created = Self::insert_artwork(&tx, artwork)?;
        tx.execute("DELETE FROM upload_jobs WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(created)
    }

    fn delete_upload_job(&self, id: i64) -> CatalogResult<()> {
        self.conn()
            .execute("DELETE FROM upload_jobs WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn list_stale_upload_jobs(&self, cutoff: DateTime<Utc>) -> CatalogResult<Vec<UploadJob>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM upload_jobs \
             WHERE status != 'failed' AND created_at < ?1 \
             ORDER BY created_at, id",
            UPLOAD_JOB_COLUMNS
        ))?;
        let jobs = stmt
            .query_map(params![cutoff.timestamp_millis()], Self::row_to_upload_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }
}
