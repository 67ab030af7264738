//! SQLite schema definitions for the calendar database.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP,
};

// =============================================================================
// Version 1 - Users and events
// =============================================================================

const USERS_TABLE_V1: Table = Table {
    name: "users",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("email", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("password_hash", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created_at",
            &SqlType::Text,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!(
            "updated_at",
            &SqlType::Text,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[],
};

const EVENT_OWNER_FK: ForeignKey = ForeignKey {
    foreign_table: "users",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

const EVENTS_TABLE_V1: Table = Table {
    name: "events",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!(
            "user_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&EVENT_OWNER_FK)
        ),
        // ISO-8601 day, compared lexicographically by the archive sweep
        sqlite_column!("event_date", &SqlType::Text, non_null = true),
        sqlite_column!("description", &SqlType::Text, non_null = true),
        sqlite_column!("remind_at", &SqlType::Text),
        sqlite_column!(
            "reminder_sent",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "created_at",
            &SqlType::Text,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!(
            "updated_at",
            &SqlType::Text,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[
        ("idx_events_user_date", "user_id, event_date"),
        ("idx_events_event_date", "event_date"),
    ],
};

// =============================================================================
// Version 2 - Events archive
// =============================================================================

const EVENTS_ARCHIVE_TABLE_V2: Table = Table {
    name: "events_archive",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("user_id", &SqlType::Text, non_null = true),
        sqlite_column!("event_date", &SqlType::Text, non_null = true),
        sqlite_column!("description", &SqlType::Text, non_null = true),
        sqlite_column!("archived_at", &SqlType::Text, non_null = true),
        sqlite_column!("original_created_at", &SqlType::Text, non_null = true),
        sqlite_column!("original_updated_at", &SqlType::Text, non_null = true),
    ],
    indices: &[("idx_events_archive_user", "user_id")],
};

fn migrate_v1_to_v2(conn: &rusqlite::Connection) -> anyhow::Result<()> {
    EVENTS_ARCHIVE_TABLE_V2.create(conn)
}

pub const CALENDAR_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 1,
        tables: &[USERS_TABLE_V1, EVENTS_TABLE_V1],
        migration: None,
    },
    VersionedSchema {
        version: 2,
        tables: &[USERS_TABLE_V1, EVENTS_TABLE_V1, EVENTS_ARCHIVE_TABLE_V2],
        migration: Some(migrate_v1_to_v2),
    },
];
