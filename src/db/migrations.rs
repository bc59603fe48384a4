use anyhow::Context;
use rusqlite::Connection;

/// Schema migrations, applied in order and recorded in `_migrations`.
/// Embedded so the binary carries its own schema.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "001_tenants",
        "CREATE TABLE IF NOT EXISTS tenants (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            assistant_name TEXT,
            ai_instructions TEXT,
            business_info TEXT,
            retain_context INTEGER NOT NULL DEFAULT 1
        );",
    ),
    (
        "002_bookings",
        "CREATE TABLE IF NOT EXISTS bookings (
            id TEXT PRIMARY KEY,
            tenant_id INTEGER NOT NULL,
            participant TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            starts_at TEXT NOT NULL,
            ends_at TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'scheduled',
            reminder_sent INTEGER NOT NULL DEFAULT 0,
            created_by TEXT NOT NULL DEFAULT 'assistant',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_bookings_tenant_window
            ON bookings (tenant_id, status, starts_at);",
    ),
    (
        "003_conversation_turns",
        "CREATE TABLE IF NOT EXISTS conversation_turns (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tenant_id INTEGER NOT NULL,
            participant TEXT NOT NULL,
            user_message TEXT NOT NULL,
            assistant_reply TEXT NOT NULL,
            engine TEXT NOT NULL,
            success INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_turns_tenant_participant
            ON conversation_turns (tenant_id, participant, created_at);",
    ),
];

pub fn run_migrations(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .context("failed to create migrations table")?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .context("failed to check migration status")?;

        if already_applied {
            continue;
        }

        conn.execute_batch(sql)
            .with_context(|| format!("failed to apply migration: {name}"))?;

        conn.execute("INSERT INTO _migrations (name) VALUES (?1)", [name])
            .with_context(|| format!("failed to record migration: {name}"))?;

        tracing::info!("applied migration: {name}");
    }

    Ok(())
}
