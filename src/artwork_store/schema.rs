//! SQLite schema definitions for the gallery database.

use crate::sqlite_column;
use crate::sqlite_persistence::{Index, SqlType, Table, VersionedSchema};
use anyhow::Result;
use rusqlite::Connection;

// =============================================================================
// Version 1 - Artworks
// =============================================================================

/// Catalogued images. Timestamps are unix milliseconds, `deleted_at` marks soft deletion.
const ARTWORKS_TABLE_V1: Table = Table {
    name: "artworks",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("file_id", &SqlType::Text, non_null = true),
        sqlite_column!("url", &SqlType::Text, non_null = true),
        sqlite_column!(
            "thumbnail_url",
            &SqlType::Text,
            non_null = true,
            default_value = Some("''")
        ),
        sqlite_column!("content_digest", &SqlType::Text, non_null = true),
        // 0 means no perceptual digest was computed
        sqlite_column!(
            "perceptual_digest",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("views", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("likes", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!(
            "bookmarks",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("tags", &SqlType::Text, non_null = true, default_value = Some("'[]'")),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
        sqlite_column!("updated_at", &SqlType::Integer, non_null = true),
        sqlite_column!("deleted_at", &SqlType::Integer),
    ],
    indices: &[
        Index {
            name: "idx_artworks_content_digest_live",
            columns: &["content_digest"],
            unique: true,
            predicate: Some("deleted_at IS NULL"),
        },
        Index {
            name: "idx_artworks_perceptual_digest",
            columns: &["perceptual_digest"],
            unique: false,
            predicate: None,
        },
        Index {
            name: "idx_artworks_created_at",
            columns: &["created_at DESC"],
            unique: false,
            predicate: None,
        },
    ],
};

// =============================================================================
// Version 2 - Durable upload jobs
// =============================================================================

/// Delegated uploads awaiting remote processing. Rows are removed once the artwork exists.
const UPLOAD_JOBS_TABLE_V2: Table = Table {
    name: "upload_jobs",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("content_digest", &SqlType::Text, non_null = true),
        sqlite_column!(
            "perceptual_digest",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("file_name", &SqlType::Text, non_null = true),
        sqlite_column!("remote_file_id", &SqlType::Text, non_null = true),
        sqlite_column!("remote_job_id", &SqlType::Text, non_null = true),
        sqlite_column!("status_url", &SqlType::Text, non_null = true),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("error", &SqlType::Text),
        sqlite_column!(
            "attempts",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
        sqlite_column!("last_checked_at", &SqlType::Integer),
    ],
    indices: &[Index {
        name: "idx_upload_jobs_status_created",
        columns: &["status", "created_at"],
        unique: false,
        predicate: None,
    }],
};

fn migrate_v1_to_v2(conn: &Connection) -> Result<()> {
    UPLOAD_JOBS_TABLE_V2.create(conn)
}

pub const GALLERY_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 1,
        tables: &[ARTWORKS_TABLE_V1],
        migration: None,
    },
    VersionedSchema {
        version: 2,
        tables: &[ARTWORKS_TABLE_V1, UPLOAD_JOBS_TABLE_V2],
        migration: Some(migrate_v1_to_v2),
    },
];
