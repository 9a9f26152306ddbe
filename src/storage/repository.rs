use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, params_from_iter, Connection};

use crate::date_util::{date_key, parse_timestamp};
use crate::model::{
    Account, Approval, Project, Review, ReviewMessage, ReviewStatus, ReviewTimeline,
    ReviewerVote, Score,
};

/// Label whose votes count as reviews.
pub const CODE_REVIEW: &str = "Code-Review";

const STATUS_MERGED: &str = "M";
const STATUS_ABANDONED: &str = "A";
const STATUS_DRAFT: &str = "d";

/// WHERE fragment selecting changes in `status`, with its bound values.
/// Open covers every change that is neither merged nor abandoned.
fn status_filter(status: ReviewStatus) -> (&'static str, Vec<&'static str>) {
    match status {
        ReviewStatus::Open => ("c.status NOT IN (?, ?)", vec![STATUS_MERGED, STATUS_ABANDONED]),
        ReviewStatus::Merged => ("c.status = ?", vec![STATUS_MERGED]),
        ReviewStatus::Abandoned => ("c.status = ?", vec![STATUS_ABANDONED]),
        ReviewStatus::Draft => ("c.status = ?", vec![STATUS_DRAFT]),
    }
}

/// Parse a stored timestamp, logging rows that carry garbage.
fn stored_time(value: &str, what: &str, row_id: impl std::fmt::Display) -> Option<DateTime<Utc>> {
    let parsed = parse_timestamp(value);
    if parsed.is_none() {
        log::warn!("Skipping {what} {row_id}: unparseable timestamp {value:?}");
    }
    parsed
}

// ── Projects ───────────────────────────────────────────────────────

pub fn count_projects(conn: &Connection) -> Result<u64, rusqlite::Error> {
    conn.query_row(
        "SELECT COUNT(DISTINCT dest_project_name) FROM changes",
        [],
        |row| row.get::<_, i64>(0),
    )
    .map(|n| n as u64)
}

pub fn list_projects(conn: &Connection) -> Result<Vec<Project>, rusqlite::Error> {
    let mut stmt =
        conn.prepare("SELECT DISTINCT dest_project_name FROM changes ORDER BY dest_project_name")?;
    let rows = stmt.query_map([], |row| Ok(Project { name: row.get(0)? }))?;
    rows.collect()
}

// ── Changes ────────────────────────────────────────────────────────

pub fn count_changes(conn: &Connection, status: ReviewStatus) -> Result<u64, rusqlite::Error> {
    let (clause, values) = status_filter(status);
    let sql = format!("SELECT COUNT(*) FROM changes c WHERE {clause}");
    conn.query_row(&sql, params_from_iter(values), |row| row.get::<_, i64>(0))
        .map(|n| n as u64)
}

pub fn list_changes(conn: &Connection, status: ReviewStatus) -> Result<Vec<Review>, rusqlite::Error> {
    let (clause, values) = status_filter(status);
    let sql = format!(
        "SELECT c.change_id, c.dest_project_name, c.owner_account_id,
                COALESCE(a.full_name, ''), c.status, c.created_on, c.last_updated_on
         FROM changes c
         LEFT JOIN accounts a ON a.account_id = c.owner_account_id
         WHERE {clause}
         ORDER BY c.created_on, c.change_id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values), |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, String>(6)?,
        ))
    })?;

    let mut reviews = Vec::new();
    for row in rows {
        let (change_id, project, owner_id, owner_name, code, created, updated) = row?;
        let (Some(created), Some(updated)) = (
            stored_time(&created, "change", change_id),
            stored_time(&updated, "change", change_id),
        ) else {
            continue;
        };
        reviews.push(Review {
            id: change_id.to_string(),
            project,
            owner: Account { id: Some(owner_id), name: owner_name },
            status: ReviewStatus::from_db_code(&code),
            created,
            updated,
        });
    }
    log::debug!("Loaded {} {} changes", reviews.len(), status.as_query());
    Ok(reviews)
}

// ── Approvals ──────────────────────────────────────────────────────

/// Code-Review votes granted on or after `since`, excluding votes by the
/// change owner.
pub fn list_code_review_approvals(
    conn: &Connection,
    since: NaiveDate,
) -> Result<Vec<Approval>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT COALESCE(a.full_name, ''), c.dest_project_name, psa.value, psa.change_id
         FROM patch_set_approvals psa
         JOIN changes c ON c.change_id = psa.change_id
         LEFT JOIN accounts a ON a.account_id = psa.account_id
         WHERE psa.category_id = ?1
           AND date(psa.granted) >= ?2
           AND psa.account_id <> c.owner_account_id
         ORDER BY psa.granted, psa.change_id",
    )?;
    let rows = stmt.query_map(params![CODE_REVIEW, date_key(since)], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, i64>(3)?,
        ))
    })?;

    let mut approvals = Vec::new();
    for row in rows {
        let (reviewer, project, value, change_id) = row?;
        match Score::try_from(value) {
            Ok(score) => approvals.push(Approval { reviewer, project, score }),
            Err(v) => log::warn!("Skipping vote {v} by {reviewer} on change {change_id}"),
        }
    }
    log::debug!("Loaded {} approvals since {since}", approvals.len());
    Ok(approvals)
}

/// Latest Code-Review vote of each reviewer of one change. `review` is
/// either the numeric change id or the change key.
pub fn list_change_reviewers(
    conn: &Connection,
    review: &str,
) -> Result<Vec<ReviewerVote>, rusqlite::Error> {
    // SQLite fills bare columns from the row holding MAX(granted).
    let mut stmt = conn.prepare(
        "SELECT psa.account_id, COALESCE(a.full_name, ''), psa.value, MAX(psa.granted)
         FROM patch_set_approvals psa
         JOIN changes c ON c.change_id = psa.change_id
         LEFT JOIN accounts a ON a.account_id = psa.account_id
         WHERE psa.category_id = ?1
           AND (c.change_key = ?2 OR CAST(c.change_id AS TEXT) = ?2)
         GROUP BY psa.account_id
         ORDER BY psa.account_id",
    )?;
    let rows = stmt.query_map(params![CODE_REVIEW, review], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
        ))
    })?;

    let mut votes = Vec::new();
    for row in rows {
        let (id, name, value) = row?;
        votes.push(ReviewerVote {
            account: Account { id: Some(id), name },
            score: Score::try_from(value).ok(),
        });
    }
    Ok(votes)
}

// ── Timelines ──────────────────────────────────────────────────────

/// Changes created on or after `since`, each with its first patch set and
/// all of its messages in written order.
pub fn list_timelines(
    conn: &Connection,
    since: NaiveDate,
) -> Result<Vec<ReviewTimeline>, rusqlite::Error> {
    let since = date_key(since);

    let mut stmt = conn.prepare(
        "SELECT c.change_id, c.dest_project_name, c.status,
                ps.uploader_account_id, ps.created_on, c.last_updated_on
         FROM changes c
         JOIN patch_sets ps ON ps.change_id = c.change_id
         WHERE ps.patch_set_id = (
                 SELECT MIN(patch_set_id) FROM patch_sets WHERE change_id = c.change_id)
           AND date(c.created_on) >= ?1
         ORDER BY c.change_id",
    )?;
    let rows = stmt.query_map(params![since], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, i64>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
        ))
    })?;

    let mut timelines = Vec::new();
    let mut index: HashMap<i64, usize> = HashMap::new();
    for row in rows {
        let (change_id, project, code, uploader_id, created, updated) = row?;
        let (Some(created), Some(updated)) = (
            stored_time(&created, "change", change_id),
            stored_time(&updated, "change", change_id),
        ) else {
            continue;
        };
        index.insert(change_id, timelines.len());
        timelines.push(ReviewTimeline {
            review_id: change_id.to_string(),
            project,
            status: ReviewStatus::from_db_code(&code),
            uploader_id,
            created,
            updated,
            messages: Vec::new(),
        });
    }

    let mut stmt = conn.prepare(
        "SELECT m.change_id, m.author_id, m.written_on
         FROM change_messages m
         JOIN changes c ON c.change_id = m.change_id
         WHERE date(c.created_on) >= ?1
         ORDER BY m.change_id, m.written_on",
    )?;
    let rows = stmt.query_map(params![since], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, Option<i64>>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;
    for row in rows {
        let (change_id, author_id, written) = row?;
        let Some(&slot) = index.get(&change_id) else {
            continue;
        };
        if let Some(written) = stored_time(&written, "message on change", change_id) {
            timelines[slot].messages.push(ReviewMessage { author_id, written });
        }
    }

    log::debug!("Loaded {} review timelines since {since}", timelines.len());
    Ok(timelines)
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Warehouse rows written the way the external loader writes them.

    use super::*;

    fn status_code(status: ReviewStatus) -> &'static str {
        match status {
            ReviewStatus::Open => "n",
            ReviewStatus::Merged => STATUS_MERGED,
            ReviewStatus::Abandoned => STATUS_ABANDONED,
            ReviewStatus::Draft => STATUS_DRAFT,
        }
    }

    fn format_timestamp(dt: &DateTime<Utc>) -> String {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    }

    fn upsert_account(conn: &Connection, id: i64, full_name: &str) -> Result<(), rusqlite::Error> {
        conn.execute(
            "INSERT INTO accounts (account_id, full_name) VALUES (?1, ?2)
             ON CONFLICT(account_id) DO UPDATE SET full_name = excluded.full_name",
            params![id, full_name],
        )?;
        Ok(())
    }

    /// Row of the `changes` table.
    #[derive(Debug, Clone)]
    struct ChangeRow<'a> {
        change_id: i64,
        change_key: &'a str,
        owner_account_id: i64,
        project: &'a str,
        status: ReviewStatus,
        created_on: DateTime<Utc>,
        last_updated_on: DateTime<Utc>,
    }

    fn upsert_change(conn: &Connection, change: &ChangeRow<'_>) -> Result<(), rusqlite::Error> {
        conn.execute(
            "INSERT INTO changes (
                change_id, change_key, owner_account_id, dest_project_name,
                status, created_on, last_updated_on
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(change_id) DO UPDATE SET
                change_key=excluded.change_key, owner_account_id=excluded.owner_account_id,
                dest_project_name=excluded.dest_project_name, status=excluded.status,
                created_on=excluded.created_on, last_updated_on=excluded.last_updated_on",
            params![
                change.change_id,
                change.change_key,
                change.owner_account_id,
                change.project,
                status_code(change.status),
                format_timestamp(&change.created_on),
                format_timestamp(&change.last_updated_on),
            ],
        )?;
        Ok(())
    }

    fn upsert_patch_set(
        conn: &Connection,
        change_id: i64,
        patch_set_id: i64,
        uploader_account_id: i64,
        created_on: &DateTime<Utc>,
    ) -> Result<(), rusqlite::Error> {
        conn.execute(
            "INSERT OR REPLACE INTO patch_sets
                (change_id, patch_set_id, uploader_account_id, created_on)
             VALUES (?1, ?2, ?3, ?4)",
            params![change_id, patch_set_id, uploader_account_id, format_timestamp(created_on)],
        )?;
        Ok(())
    }

    fn upsert_approval(
        conn: &Connection,
        change_id: i64,
        patch_set_id: i64,
        account_id: i64,
        value: i64,
        granted: &DateTime<Utc>,
    ) -> Result<(), rusqlite::Error> {
        conn.execute(
            "INSERT OR REPLACE INTO patch_set_approvals
                (change_id, patch_set_id, account_id, category_id, value, granted)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                change_id,
                patch_set_id,
                account_id,
                CODE_REVIEW,
                value,
                format_timestamp(granted)
            ],
        )?;
        Ok(())
    }

    fn insert_message(
        conn: &Connection,
        change_id: i64,
        uuid: &str,
        author_id: Option<i64>,
        written_on: &DateTime<Utc>,
    ) -> Result<(), rusqlite::Error> {
        conn.execute(
            "INSERT OR REPLACE INTO change_messages (change_id, uuid, author_id, written_on)
             VALUES (?1, ?2, ?3, ?4)",
            params![change_id, uuid, author_id, format_timestamp(written_on)],
        )?;
        Ok(())
    }

    pub fn ts(s: &str) -> DateTime<Utc> {
        parse_timestamp(s).unwrap()
    }

    /// Small warehouse used by the repository and SQL source tests.
    ///
    /// Accounts: 1 Ann, 2 Bob, 3 Cid, 99 CI Bot.
    /// - 10 `core`, Ann, merged, 2024-01-01 09:00 -> 2024-01-02 10:00
    /// - 11 `core`, Bob, new, 2024-01-03 09:00
    /// - 12 `web`, Ann, draft, 2024-01-04 09:00
    /// - 13 `web`, Cid, abandoned, 2023-12-01 09:00
    pub fn load(conn: &Connection) -> Result<(), rusqlite::Error> {
        for (id, name) in [(1, "Ann"), (2, "Bob"), (3, "Cid"), (99, "CI Bot")] {
            upsert_account(conn, id, name)?;
        }

        let changes = [
            (10, "I10", 1, "core", ReviewStatus::Merged, "2024-01-01 09:00:00", "2024-01-02 10:00:00"),
            (11, "I11", 2, "core", ReviewStatus::Open, "2024-01-03 09:00:00", "2024-01-03 12:00:00"),
            (12, "I12", 1, "web", ReviewStatus::Draft, "2024-01-04 09:00:00", "2024-01-04 09:00:00"),
            (13, "I13", 3, "web", ReviewStatus::Abandoned, "2023-12-01 09:00:00", "2023-12-02 09:00:00"),
        ];
        for (change_id, key, owner, project, status, created, updated) in changes {
            upsert_change(
                conn,
                &ChangeRow {
                    change_id,
                    change_key: key,
                    owner_account_id: owner,
                    project,
                    status,
                    created_on: ts(created),
                    last_updated_on: ts(updated),
                },
            )?;
            upsert_patch_set(conn, change_id, 1, owner, &ts(created))?;
        }
        upsert_patch_set(conn, 10, 2, 1, &ts("2024-01-01 15:00:00"))?;

        // Bob +2 then +1 on change 10, Cid -1 on 11, Ann's self-vote on 10.
        upsert_approval(conn, 10, 1, 2, 2, &ts("2024-01-01 11:00:00"))?;
        upsert_approval(conn, 10, 2, 2, 1, &ts("2024-01-02 09:00:00"))?;
        upsert_approval(conn, 10, 2, 1, 2, &ts("2024-01-02 09:30:00"))?;
        upsert_approval(conn, 11, 1, 3, -1, &ts("2024-01-03 10:00:00"))?;
        upsert_approval(conn, 13, 1, 2, 0, &ts("2023-12-01 10:00:00"))?;

        insert_message(conn, 10, "m1", Some(99), &ts("2024-01-01 09:01:00"))?;
        insert_message(conn, 10, "m2", Some(2), &ts("2024-01-01 11:00:00"))?;
        insert_message(conn, 10, "m3", None, &ts("2024-01-02 10:00:00"))?;
        insert_message(conn, 11, "m4", Some(2), &ts("2024-01-03 09:10:00"))?;
        insert_message(conn, 11, "m5", Some(3), &ts("2024-01-03 10:00:00"))?;
        Ok(())
    }
}
