use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection};

use crate::models::{Booking, BookingStatus, ConversationTurn, Tenant};

const DT_FMT: &str = "%Y-%m-%d %H:%M:%S";

fn fmt_dt(dt: &NaiveDateTime) -> String {
    dt.format(DT_FMT).to_string()
}

fn parse_dt(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, DT_FMT).unwrap_or_else(|_| Utc::now().naive_utc())
}

// ── Tenants ──

pub fn get_tenant(conn: &Connection, id: i64) -> anyhow::Result<Option<Tenant>> {
    let result = conn.query_row(
        "SELECT id, name, assistant_name, ai_instructions, business_info, retain_context
         FROM tenants WHERE id = ?1",
        params![id],
        |row| {
            Ok(Tenant {
                id: row.get(0)?,
                name: row.get(1)?,
                assistant_name: row.get(2)?,
                ai_instructions: row.get(3)?,
                business_info: row.get(4)?,
                retain_context: row.get::<_, i64>(5)? != 0,
            })
        },
    );

    match result {
        Ok(tenant) => Ok(Some(tenant)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn upsert_tenant(conn: &Connection, tenant: &Tenant) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO tenants (id, name, assistant_name, ai_instructions, business_info, retain_context)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           assistant_name = excluded.assistant_name,
           ai_instructions = excluded.ai_instructions,
           business_info = excluded.business_info,
           retain_context = excluded.retain_context",
        params![
            tenant.id,
            tenant.name,
            tenant.assistant_name,
            tenant.ai_instructions,
            tenant.business_info,
            tenant.retain_context as i64,
        ],
    )?;
    Ok(())
}

// ── Bookings ──

pub fn create_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO bookings (id, tenant_id, participant, title, description, starts_at, ends_at,
                               status, reminder_sent, created_by, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            booking.id,
            booking.tenant_id,
            booking.participant,
            booking.title,
            booking.description,
            fmt_dt(&booking.starts_at),
            fmt_dt(&booking.ends_at),
            booking.status.as_str(),
            booking.reminder_sent as i64,
            booking.created_by,
            fmt_dt(&booking.created_at),
            fmt_dt(&booking.updated_at),
        ],
    )?;
    Ok(())
}

/// Active bookings whose interval intersects `[start, end)`. Strict
/// overlap: existing.starts_at < end AND existing.ends_at > start.
pub fn find_overlapping(
    conn: &Connection,
    tenant_id: i64,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(
        "SELECT id, tenant_id, participant, title, description, starts_at, ends_at,
                status, reminder_sent, created_by, created_at, updated_at
         FROM bookings
         WHERE tenant_id = ?1 AND status = 'scheduled'
           AND starts_at < ?2 AND ends_at > ?3
         ORDER BY starts_at ASC",
    )?;

    let rows = stmt.query_map(params![tenant_id, fmt_dt(end), fmt_dt(start)], |row| {
        Ok(booking_from_row(row))
    })?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn list_bookings_by_tenant(
    conn: &Connection,
    tenant_id: i64,
    status_filter: Option<&str>,
    limit: i64,
) -> anyhow::Result<Vec<Booking>> {
    let (sql, params_vec): (String, Vec<Box<dyn rusqlite::types::ToSql>>) = match status_filter {
        Some(status) => (
            "SELECT id, tenant_id, participant, title, description, starts_at, ends_at,
                    status, reminder_sent, created_by, created_at, updated_at
             FROM bookings WHERE tenant_id = ?1 AND status = ?2
             ORDER BY starts_at DESC LIMIT ?3"
                .to_string(),
            vec![
                Box::new(tenant_id) as Box<dyn rusqlite::types::ToSql>,
                Box::new(status.to_string()),
                Box::new(limit),
            ],
        ),
        None => (
            "SELECT id, tenant_id, participant, title, description, starts_at, ends_at,
                    status, reminder_sent, created_by, created_at, updated_at
             FROM bookings WHERE tenant_id = ?1
             ORDER BY starts_at DESC LIMIT ?2"
                .to_string(),
            vec![
                Box::new(tenant_id) as Box<dyn rusqlite::types::ToSql>,
                Box::new(limit),
            ],
        ),
    };

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| Ok(booking_from_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn get_booking_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        "SELECT id, tenant_id, participant, title, description, starts_at, ends_at,
                status, reminder_sent, created_by, created_at, updated_at
         FROM bookings WHERE id = ?1",
        params![id],
        |row| Ok(booking_from_row(row)),
    );

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn update_booking_status(
    conn: &Connection,
    id: &str,
    status: &BookingStatus,
) -> anyhow::Result<bool> {
    let now = fmt_dt(&Utc::now().naive_utc());
    let count = conn.execute(
        "UPDATE bookings SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), now, id],
    )?;
    Ok(count > 0)
}

pub fn delete_booking(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM bookings WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

fn booking_from_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let starts_at_str: String = row.get(5)?;
    let ends_at_str: String = row.get(6)?;
    let status_str: String = row.get(7)?;
    let created_at_str: String = row.get(10)?;
    let updated_at_str: String = row.get(11)?;

    Ok(Booking {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        participant: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        starts_at: parse_dt(&starts_at_str),
        ends_at: parse_dt(&ends_at_str),
        status: BookingStatus::parse(&status_str),
        reminder_sent: row.get::<_, i64>(8)? != 0,
        created_by: row.get(9)?,
        created_at: parse_dt(&created_at_str),
        updated_at: parse_dt(&updated_at_str),
    })
}

// ── Conversation turns ──

pub fn append_turn(conn: &Connection, turn: &ConversationTurn) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO conversation_turns (tenant_id, participant, user_message, assistant_reply,
                                         engine, success, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            turn.tenant_id,
            turn.participant,
            turn.user_message,
            turn.assistant_reply,
            turn.engine,
            turn.success as i64,
            fmt_dt(&turn.created_at),
        ],
    )?;
    Ok(())
}

/// Full turn history for one (tenant, participant), oldest first.
pub fn list_turns_ordered(
    conn: &Connection,
    tenant_id: i64,
    participant: &str,
) -> anyhow::Result<Vec<ConversationTurn>> {
    let mut stmt = conn.prepare(
        "SELECT id, tenant_id, participant, user_message, assistant_reply, engine, success, created_at
         FROM conversation_turns
         WHERE tenant_id = ?1 AND participant = ?2
         ORDER BY created_at ASC, id ASC",
    )?;

    let rows = stmt.query_map(params![tenant_id, participant], |row| {
        let created_at_str: String = row.get(7)?;
        Ok(ConversationTurn {
            id: row.get(0)?,
            tenant_id: row.get(1)?,
            participant: row.get(2)?,
            user_message: row.get(3)?,
            assistant_reply: row.get(4)?,
            engine: row.get(5)?,
            success: row.get::<_, i64>(6)? != 0,
            created_at: parse_dt(&created_at_str),
        })
    })?;

    let mut turns = vec![];
    for row in rows {
        turns.push(row?);
    }
    Ok(turns)
}
