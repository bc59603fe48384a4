//! Booking dialogue state machine.
//!
//! One step = one inbound message against one session. Steps are pure
//! except for the confirm transition, which creates the booking row.
//! The caller holds the database lock across a whole step, so the
//! conflict re-check and the insert cannot interleave with another
//! participant's create.

use chrono::{Duration, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;

use crate::db::queries;
use crate::models::{Booking, BookingStatus, BOOKING_DURATION_MIN};
use crate::services::category;
use crate::services::datetime::extract_datetime;
use crate::services::scheduling;
use crate::services::session::{Session, SessionState};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineErrorKind {
    ParseFailure,
    PastDateTime,
    Conflict,
    Provider,
    Persistence,
}

#[derive(Debug)]
pub enum StepStatus {
    /// Session continues; persist it back to the store.
    InProgress(Session),
    /// Terminal: booking created, session is gone.
    Booked(Booking),
    /// Terminal: participant backed out, session is gone.
    Cancelled,
}

#[derive(Debug)]
pub struct StepOutcome {
    pub reply: String,
    pub status: StepStatus,
    pub error: Option<EngineErrorKind>,
}

impl StepOutcome {
    fn advance(reply: String, session: Session) -> Self {
        Self {
            reply,
            status: StepStatus::InProgress(session),
            error: None,
        }
    }

    fn stay(reply: String, session: Session, error: EngineErrorKind) -> Self {
        Self {
            reply,
            status: StepStatus::InProgress(session),
            error: Some(error),
        }
    }
}

static CANCEL_PHRASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(cancel|stop|quit|forget it|never ?mind|no thanks|leave it)\b")
        .expect("cancel phrase regex")
});

static AFFIRMATIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(yes|yep|yeah|ok|okay|sure|confirm(ed)?|correct|right|exactly|perfect|sounds good)\b|✅|👍")
        .expect("affirmative regex")
});

static CORRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(no|nope|wrong|change|fix|different|another time|not that)\b|❌")
        .expect("corrective regex")
});

static ANY_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(any (time|day|slot)|first available|next available|earliest|as soon as possible|asap|whenever)\b",
    )
    .expect("any-time regex")
});

pub fn is_cancellation(normalized: &str) -> bool {
    CANCEL_PHRASE.is_match(normalized)
}

/// Opens a session for a first scheduling-intent message. An inline
/// future date/time skips straight to confirmation, but only after the
/// conflict check passes; the reference flow skipped that check on this
/// path and could double-book.
pub fn open_session(
    conn: &Connection,
    tenant_id: i64,
    raw: &str,
    normalized: &str,
    now: NaiveDateTime,
) -> anyhow::Result<StepOutcome> {
    let category = category::extract_category(normalized).map(str::to_string);
    let title = category
        .clone()
        .unwrap_or_else(|| category::extract_title(normalized));

    // A generic title means nothing usable was inferred; ask for the
    // type first instead of booking a meaningless "Service".
    if category.is_none() && title == category::GENERIC_TITLE {
        let session = Session {
            state: SessionState::NeedType,
            category: None,
            title,
            starts_at: None,
            description: raw.to_string(),
            opened_with: raw.to_string(),
        };
        return Ok(StepOutcome::advance(
            "What kind of appointment would you like? For example: \"technical visit\", \
             \"meeting\" or \"consultation\"."
                .to_string(),
            session,
        ));
    }

    let session = Session {
        state: SessionState::NeedDateTime,
        category,
        title,
        starts_at: None,
        description: raw.to_string(),
        opened_with: raw.to_string(),
    };

    let inline = extract_datetime(normalized, now).filter(|dt| *dt > now);
    match inline {
        Some(starts_at) => propose_or_reject(conn, tenant_id, session, starts_at, now),
        None if ANY_TIME.is_match(normalized) => {
            propose_next_free(conn, tenant_id, session, now)
        }
        None => {
            let reply = ask_for_datetime(&session.title);
            Ok(StepOutcome::advance(reply, session))
        }
    }
}

/// Advances an open session with one message.
pub fn step(
    conn: &Connection,
    tenant_id: i64,
    participant: &str,
    mut session: Session,
    normalized: &str,
    now: NaiveDateTime,
) -> anyhow::Result<StepOutcome> {
    // A cancellation phrase wins from any non-terminal state.
    if is_cancellation(normalized) {
        return Ok(StepOutcome {
            reply: "No problem, I've cancelled the booking request. Let me know if I can help \
                    with anything else."
                .to_string(),
            status: StepStatus::Cancelled,
            error: None,
        });
    }

    match session.state {
        SessionState::NeedType => {
            match category::extract_category(normalized) {
                Some(cat) => {
                    session.category = Some(cat.to_string());
                    session.title = cat.to_string();
                    // A date/time in the same message skips a turn.
                    match extract_datetime(normalized, now).filter(|dt| *dt > now) {
                        Some(starts_at) => propose_or_reject(conn, tenant_id, session, starts_at, now),
                        None => {
                            session.state = SessionState::NeedDateTime;
                            let reply = ask_for_datetime(&session.title);
                            Ok(StepOutcome::advance(reply, session))
                        }
                    }
                }
                None => Ok(StepOutcome::stay(
                    "What kind of appointment would you like? For example: \"technical visit\", \
                     \"meeting\" or \"consultation\"."
                        .to_string(),
                    session,
                    EngineErrorKind::ParseFailure,
                )),
            }
        }

        SessionState::NeedDateTime => match extract_datetime(normalized, now) {
            None if ANY_TIME.is_match(normalized) => {
                propose_next_free(conn, tenant_id, session, now)
            }
            None => Ok(StepOutcome::stay(
                "Please send the date and time in a format like: 05/09 at 15h.".to_string(),
                session,
                EngineErrorKind::ParseFailure,
            )),
            Some(starts_at) if starts_at <= now => Ok(StepOutcome::stay(
                "That date/time has already passed. Please pick a time in the future."
                    .to_string(),
                session,
                EngineErrorKind::PastDateTime,
            )),
            Some(starts_at) => propose_or_reject(conn, tenant_id, session, starts_at, now),
        },

        SessionState::Confirming => {
            if AFFIRMATIVE.is_match(normalized) {
                confirm(conn, tenant_id, participant, session)
            } else if CORRECTIVE.is_match(normalized) {
                session.starts_at = None;
                session.state = SessionState::NeedDateTime;
                let reply = format!(
                    "No problem! {}",
                    ask_for_datetime(&session.title)
                );
                Ok(StepOutcome::advance(reply, session))
            } else {
                Ok(StepOutcome::stay(
                    "Should I confirm this booking? You can reply: yes, ok, correct — or say \
                     \"change\" to pick another time."
                        .to_string(),
                    session,
                    EngineErrorKind::ParseFailure,
                ))
            }
        }
    }
}

/// "Any available time" request: offer the first open slot instead of
/// asking for a date/time.
fn propose_next_free(
    conn: &Connection,
    tenant_id: i64,
    mut session: Session,
    now: NaiveDateTime,
) -> anyhow::Result<StepOutcome> {
    match scheduling::find_next_free_slot(conn, tenant_id, &now, &now)? {
        Some(slot) => propose_or_reject(conn, tenant_id, session, slot, now),
        None => {
            session.state = SessionState::NeedDateTime;
            Ok(StepOutcome::stay(
                "I couldn't find a free slot over the coming days. Could you suggest a \
                 specific date and time?"
                    .to_string(),
                session,
                EngineErrorKind::Conflict,
            ))
        }
    }
}

/// Conflict-checks a candidate start and either moves to confirmation
/// or stays in `NeedDateTime` with a conflict reply (suggesting the
/// next free slot when there is one inside the search window).
fn propose_or_reject(
    conn: &Connection,
    tenant_id: i64,
    mut session: Session,
    starts_at: NaiveDateTime,
    now: NaiveDateTime,
) -> anyhow::Result<StepOutcome> {
    let ends_at = starts_at + Duration::minutes(BOOKING_DURATION_MIN);

    if scheduling::has_conflict(conn, tenant_id, &starts_at, &ends_at)? {
        session.starts_at = None;
        session.state = SessionState::NeedDateTime;
        let mut reply =
            "That time slot is already taken. Could you pick a different time?".to_string();
        if let Some(slot) = scheduling::find_next_free_slot(conn, tenant_id, &starts_at, &now)? {
            reply.push_str(&format!(
                " The next free slot is {} — does that work?",
                fmt_slot(&slot)
            ));
        }
        return Ok(StepOutcome::stay(reply, session, EngineErrorKind::Conflict));
    }

    session.starts_at = Some(starts_at);
    session.state = SessionState::Confirming;
    let reply = format!(
        "Here is your booking: {} — {}. Confirm?",
        session.title,
        fmt_slot(&starts_at)
    );
    Ok(StepOutcome::advance(reply, session))
}

fn confirm(
    conn: &Connection,
    tenant_id: i64,
    participant: &str,
    mut session: Session,
) -> anyhow::Result<StepOutcome> {
    let starts_at = match session.starts_at {
        Some(dt) => dt,
        // Datetime lost (should not happen); collect it again.
        None => {
            session.state = SessionState::NeedDateTime;
            let reply = ask_for_datetime(&session.title);
            return Ok(StepOutcome::stay(
                reply,
                session,
                EngineErrorKind::ParseFailure,
            ));
        }
    };
    let ends_at = starts_at + Duration::minutes(BOOKING_DURATION_MIN);

    // The slot may have been taken since it was proposed; the re-check
    // runs under the same connection lock as the insert below.
    if scheduling::has_conflict(conn, tenant_id, &starts_at, &ends_at)? {
        session.starts_at = None;
        session.state = SessionState::NeedDateTime;
        return Ok(StepOutcome::stay(
            "Sorry — that slot was just taken. Could you pick a different time?".to_string(),
            session,
            EngineErrorKind::Conflict,
        ));
    }

    let created_at = Utc::now().naive_utc();
    let booking = Booking {
        id: uuid::Uuid::new_v4().to_string(),
        tenant_id,
        participant: participant.to_string(),
        title: session.title.clone(),
        description: if session.description.is_empty() {
            "Booked via chat".to_string()
        } else {
            format!("Booked via chat: {}", session.description)
        },
        starts_at,
        ends_at,
        status: BookingStatus::Scheduled,
        reminder_sent: false,
        created_by: "assistant".to_string(),
        created_at,
        updated_at: created_at,
    };

    if let Err(e) = queries::create_booking(conn, &booking) {
        tracing::error!(error = %e, tenant_id, "failed to persist booking");
        // Keep the session so the user can retry without re-entering
        // the type and date/time.
        return Ok(StepOutcome::stay(
            "Sorry, I couldn't save your booking just now. Please say \"yes\" again in a \
             moment to retry."
                .to_string(),
            session,
            EngineErrorKind::Persistence,
        ));
    }

    Ok(StepOutcome {
        reply: format!(
            "You're all set ✅ {} on {}. I'll send a reminder 30 minutes before.",
            booking.title,
            fmt_slot(&starts_at)
        ),
        status: StepStatus::Booked(booking),
        error: None,
    })
}

fn ask_for_datetime(title: &str) -> String {
    format!("What day and time work for you for the {title}? (For example: 05/09 at 15h)")
}

fn fmt_slot(dt: &NaiveDateTime) -> String {
    dt.format("%d/%m at %H:%M").to_string()
}
