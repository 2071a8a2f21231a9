use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};

use crate::db::models::Show;
use crate::db::{Database, DbError, Result};
use crate::loader::ShowUrl;
use crate::urls::npr_show_url;

/// Which passes to run and whether to write.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub backfill: bool,
    pub generate: bool,
    pub dry_run: bool,
}

/// What happened to a single CSV row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Updated,
    /// The show already had this URL.
    Unchanged,
    /// No show has this date.
    NotMatched,
    /// Statement failed; the row was skipped.
    Failed(String),
}

#[derive(Debug, Default)]
pub struct UpdateReport {
    pub updated: usize,
    pub unchanged: usize,
    pub not_matched: Vec<NaiveDate>,
    pub failed: usize,
}

#[derive(Debug, Default)]
pub struct BackfillReport {
    pub filled: usize,
    pub failed: usize,
    /// Shows still without a URL: no related show had one.
    pub unresolved: Vec<Show>,
}

#[derive(Debug, Default)]
pub struct GenerateReport {
    pub generated: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub direct: UpdateReport,
    pub backfill: Option<BackfillReport>,
    pub generate: Option<GenerateReport>,
}

/// Run the direct update, then backfill and generated URLs when enabled.
///
/// Rows are applied one statement at a time with no surrounding transaction,
/// so a failure part way leaves earlier rows written. A dry run does the same
/// writes inside a transaction that is always rolled back, so it reports
/// exactly what a real run would.
pub fn run(db: &Database, rows: &[ShowUrl], opts: RunOptions) -> Result<RunSummary> {
    if !opts.dry_run {
        return run_passes(db, rows, opts);
    }

    let tx = db.conn.unchecked_transaction()?;
    let summary = run_passes(db, rows, opts)?;
    tx.rollback()?;
    log::debug!("Dry run rolled back");
    Ok(summary)
}

fn run_passes(db: &Database, rows: &[ShowUrl], opts: RunOptions) -> Result<RunSummary> {
    let mut summary = RunSummary {
        direct: apply_urls(db, rows)?,
        ..Default::default()
    };

    let remaining = if opts.backfill {
        let report = backfill(db)?;
        let unresolved = report.unresolved.clone();
        summary.backfill = Some(report);
        Some(unresolved)
    } else {
        None
    };

    if opts.generate {
        let shows = match remaining {
            Some(shows) => shows,
            None => db.shows_missing_url()?,
        };
        summary.generate = Some(generate_urls(db, &shows)?);
    }

    Ok(summary)
}

/// Write each CSV URL to the show with the matching date.
pub fn apply_urls(db: &Database, rows: &[ShowUrl]) -> Result<UpdateReport> {
    let mut report = UpdateReport::default();
    if rows.is_empty() {
        log::info!("No show URLs to apply");
        return Ok(report);
    }

    let pb = ProgressBar::new(rows.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );

    for row in rows {
        pb.set_message(row.date.to_string());
        match apply_row(db, row)? {
            RowOutcome::Updated => report.updated += 1,
            RowOutcome::Unchanged => report.unchanged += 1,
            RowOutcome::NotMatched => report.not_matched.push(row.date),
            RowOutcome::Failed(_) => report.failed += 1,
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    Ok(report)
}

/// Apply one row. Only a fatal database error is returned as `Err`.
pub fn apply_row(db: &Database, row: &ShowUrl) -> Result<RowOutcome> {
    let show = match db.show_by_date(row.date) {
        Ok(Some(show)) => show,
        Ok(None) => {
            log::warn!("Show date {} (line {}) not found, skipping", row.date, row.line);
            return Ok(RowOutcome::NotMatched);
        }
        Err(e) => return row_failure(e, row.date),
    };

    if show.url.as_deref() == Some(row.url.as_str()) {
        log::debug!("{}: URL already set", row.date);
        return Ok(RowOutcome::Unchanged);
    }

    if let Err(e) = db.set_show_url(show.id, &row.url) {
        return row_failure(e, row.date);
    }
    log::info!("{} => {}", row.date, row.url);
    Ok(RowOutcome::Updated)
}

/// Fill empty URLs from related shows (the original broadcast or other
/// rebroadcasts of it). Shows with no related URL are left as they are.
pub fn backfill(db: &Database) -> Result<BackfillReport> {
    let shows = db.shows_missing_url()?;
    let mut report = BackfillReport::default();

    if shows.is_empty() {
        log::info!("No show URLs to backfill");
        return Ok(report);
    }
    log::info!("{} shows missing a URL", shows.len());

    for show in shows {
        let related = match db.related_show_with_url(&show) {
            Ok(r) => r,
            Err(e) => {
                row_failure(e, show.date)?;
                report.failed += 1;
                continue;
            }
        };

        let Some(related) = related else {
            log::info!("{}: no related show with a URL", show.date);
            report.unresolved.push(show);
            continue;
        };

        match db.fill_show_url(show.id, &related.url) {
            Ok(0) => {
                log::debug!("{}: URL set meanwhile, leaving it", show.date);
                continue;
            }
            Ok(_) => {}
            Err(e) => {
                row_failure(e, show.date)?;
                report.failed += 1;
                continue;
            }
        }
        log::info!("{} => {} (from {})", show.date, related.url, related.date);
        report.filled += 1;
    }

    Ok(report)
}

/// Give each show a generated NPR.org URL if it still has none.
pub fn generate_urls(db: &Database, shows: &[Show]) -> Result<GenerateReport> {
    let mut report = GenerateReport::default();

    for show in shows.iter().filter(|s| s.is_missing_url()) {
        let url = npr_show_url(show.date);
        match db.fill_show_url(show.id, &url) {
            Ok(0) => continue,
            Ok(_) => {}
            Err(e) => {
                row_failure(e, show.date)?;
                report.failed += 1;
                continue;
            }
        }
        log::info!("{} => {} (generated)", show.date, url);
        report.generated += 1;
    }

    Ok(report)
}

/// Log a per-row failure and carry on, unless the connection itself is gone.
fn row_failure(e: DbError, date: NaiveDate) -> Result<RowOutcome> {
    if e.is_fatal() {
        return Err(e);
    }
    log::warn!("Failed to update show {date}: {e}");
    Ok(RowOutcome::Failed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use rusqlite::params;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn insert(db: &Database, d: &str, url: Option<&str>, repeat_of: Option<i64>) -> i64 {
        db.conn
            .execute(
                "INSERT INTO ww_shows (showdate, showurl, repeatshowid) VALUES (?1, ?2, ?3)",
                params![d, url, repeat_of],
            )
            .unwrap();
        db.conn.last_insert_rowid()
    }

    fn url_of(db: &Database, d: &str) -> Option<String> {
        db.show_by_date(date(d)).unwrap().unwrap().url
    }

    fn row(d: &str, url: &str) -> ShowUrl {
        ShowUrl { date: date(d), url: url.to_string(), line: 2 }
    }

    #[test]
    fn test_direct_update_sets_url() {
        let db = test_db();
        insert(&db, "2020-01-04", None, None);

        let report = apply_urls(&db, &[row("2020-01-04", "https://example.com/ep1")]).unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(url_of(&db, "2020-01-04").as_deref(), Some("https://example.com/ep1"));
    }

    #[test]
    fn test_unmatched_date_does_not_abort() {
        let db = test_db();
        insert(&db, "2020-01-11", None, None);

        let rows = [
            row("2020-01-04", "https://example.com/missing"),
            row("2020-01-11", "https://example.com/ep2"),
        ];
        let report = apply_urls(&db, &rows).unwrap();
        assert_eq!(report.not_matched, vec![date("2020-01-04")]);
        assert_eq!(report.updated, 1);
        assert_eq!(url_of(&db, "2020-01-11").as_deref(), Some("https://example.com/ep2"));
    }

    #[test]
    fn test_direct_update_is_idempotent() {
        let db = test_db();
        insert(&db, "2020-01-04", None, None);
        insert(&db, "2020-01-11", Some("https://example.com/old"), None);
        let rows = [
            row("2020-01-04", "https://example.com/ep1"),
            row("2020-01-11", "https://example.com/ep2"),
        ];

        apply_urls(&db, &rows).unwrap();
        let first = (url_of(&db, "2020-01-04"), url_of(&db, "2020-01-11"));

        let second = apply_urls(&db, &rows).unwrap();
        assert_eq!(second.updated, 0);
        assert_eq!(second.unchanged, 2);
        assert_eq!(first, (url_of(&db, "2020-01-04"), url_of(&db, "2020-01-11")));
    }

    #[test]
    fn test_last_duplicate_wins() {
        let db = test_db();
        insert(&db, "2020-01-04", None, None);
        let rows = [
            row("2020-01-04", "https://example.com/a"),
            row("2020-01-04", "https://example.com/b"),
        ];
        apply_urls(&db, &rows).unwrap();
        assert_eq!(url_of(&db, "2020-01-04").as_deref(), Some("https://example.com/b"));
    }

    #[test]
    fn test_backfill_copies_from_original() {
        let db = test_db();
        let original = insert(&db, "2020-01-04", Some("https://example.com/ep1"), None);
        insert(&db, "2020-07-04", None, Some(original));
        insert(&db, "2020-08-01", None, None);

        let report = backfill(&db).unwrap();
        assert_eq!(report.filled, 1);
        assert_eq!(report.unresolved.len(), 1);
        assert_eq!(report.unresolved[0].date, date("2020-08-01"));

        assert_eq!(url_of(&db, "2020-07-04").as_deref(), Some("https://example.com/ep1"));
        assert_eq!(url_of(&db, "2020-08-01"), None);
    }

    #[test]
    fn test_backfill_keeps_direct_update() {
        let db = test_db();
        let original = insert(&db, "2020-01-04", Some("https://example.com/ep1"), None);
        insert(&db, "2020-07-04", None, Some(original));

        let opts = RunOptions { backfill: true, ..Default::default() };
        let summary = run(&db, &[row("2020-07-04", "https://example.com/repeat")], opts).unwrap();

        assert_eq!(summary.direct.updated, 1);
        assert_eq!(summary.backfill.unwrap().filled, 0);
        assert_eq!(url_of(&db, "2020-07-04").as_deref(), Some("https://example.com/repeat"));
    }

    #[test]
    fn test_direct_url_feeds_backfill() {
        let db = test_db();
        let original = insert(&db, "2020-01-04", None, None);
        insert(&db, "2020-07-04", None, Some(original));

        let opts = RunOptions { backfill: true, ..Default::default() };
        let summary = run(&db, &[row("2020-01-04", "https://example.com/ep1")], opts).unwrap();

        assert_eq!(summary.backfill.unwrap().filled, 1);
        assert_eq!(url_of(&db, "2020-07-04").as_deref(), Some("https://example.com/ep1"));
    }

    #[test]
    fn test_without_backfill_nothing_else_changes() {
        let db = test_db();
        let original = insert(&db, "2020-01-04", Some("https://example.com/ep1"), None);
        insert(&db, "2020-07-04", None, Some(original));

        let summary = run(&db, &[], RunOptions::default()).unwrap();
        assert!(summary.backfill.is_none());
        assert!(summary.generate.is_none());
        assert_eq!(url_of(&db, "2020-07-04"), None);
    }

    #[test]
    fn test_generate_fills_unresolved_only() {
        let db = test_db();
        let original = insert(&db, "2020-01-04", Some("https://example.com/ep1"), None);
        insert(&db, "2020-07-04", None, Some(original));
        insert(&db, "2005-12-31", None, None);

        let opts = RunOptions { backfill: true, generate: true, dry_run: false };
        let summary = run(&db, &[], opts).unwrap();

        assert_eq!(summary.backfill.unwrap().filled, 1);
        assert_eq!(summary.generate.unwrap().generated, 1);
        assert_eq!(url_of(&db, "2020-07-04").as_deref(), Some("https://example.com/ep1"));
        assert_eq!(
            url_of(&db, "2005-12-31").as_deref(),
            Some("https://legacy.npr.org/programs/waitwait/archrndwn/2005/dec/051231.waitwait.html")
        );
        assert_eq!(url_of(&db, "2020-01-04").as_deref(), Some("https://example.com/ep1"));
    }

    #[test]
    fn test_generate_without_backfill() {
        let db = test_db();
        insert(&db, "2020-01-04", None, None);

        let opts = RunOptions { generate: true, ..Default::default() };
        let summary = run(&db, &[], opts).unwrap();

        assert_eq!(summary.generate.unwrap().generated, 1);
        assert_eq!(
            url_of(&db, "2020-01-04").as_deref(),
            Some("https://www.npr.org/programs/wait-wait-dont-tell-me/archive?date=01-04-2020")
        );
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let db = test_db();
        let original = insert(&db, "2020-01-04", Some("https://example.com/ep1"), None);
        insert(&db, "2020-07-04", None, Some(original));
        insert(&db, "2020-08-01", None, None);

        let opts = RunOptions { backfill: true, generate: true, dry_run: true };
        let summary = run(&db, &[row("2020-08-01", "https://example.com/ep3")], opts).unwrap();

        assert_eq!(summary.direct.updated, 1);
        assert_eq!(summary.backfill.unwrap().filled, 1);
        assert_eq!(url_of(&db, "2020-07-04"), None);
        assert_eq!(url_of(&db, "2020-08-01"), None);
    }

    #[test]
    fn test_missing_repeat_column_leaves_rows_unresolved() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE ww_shows (
                showid INTEGER PRIMARY KEY, showdate TEXT NOT NULL UNIQUE, showurl TEXT
            );
            INSERT INTO ww_shows (showdate, showurl) VALUES ('2020-01-04', 'https://example.com/ep1');
            INSERT INTO ww_shows (showdate, showurl) VALUES ('2020-07-04', NULL);",
        )
        .unwrap();
        let db = Database::from_connection(conn).unwrap();

        let report = backfill(&db).unwrap();
        assert_eq!(report.filled, 0);
        assert_eq!(report.unresolved.len(), 1);
    }

    #[test]
    fn test_non_fatal_statement_error_is_counted() {
        let db = test_db();
        insert(&db, "2020-01-04", None, None);
        db.conn
            .execute_batch(
                "CREATE TRIGGER reject_bad_url BEFORE UPDATE OF showurl ON ww_shows
                 WHEN NEW.showurl NOT LIKE 'https://%'
                 BEGIN SELECT RAISE(ABORT, 'url must be https'); END;",
            )
            .unwrap();

        let rows = [row("2020-01-04", "ftp://example.com/ep1")];
        let report = apply_urls(&db, &rows).unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(url_of(&db, "2020-01-04"), None);
    }

    fn counts(summary: &RunSummary) -> (usize, usize, Option<usize>, Option<usize>) {
        (
            summary.direct.updated,
            summary.direct.unchanged,
            summary.backfill.as_ref().map(|b| b.filled),
            summary.generate.as_ref().map(|g| g.generated),
        )
    }

    fn original_and_repeat() -> Database {
        let db = test_db();
        let original = insert(&db, "2020-01-04", Some("https://example.com/ep1"), None);
        insert(&db, "2020-07-04", None, Some(original));
        db
    }

    #[test]
    fn test_dry_run_counts_match_real_run() {
        let rows = [row("2020-07-04", "https://example.com/repeat")];
        let passes = [
            RunOptions { backfill: true, ..Default::default() },
            RunOptions { generate: true, ..Default::default() },
            RunOptions { backfill: true, generate: true, dry_run: false },
        ];

        for opts in passes {
            let dry_db = original_and_repeat();
            let dry = run(&dry_db, &rows, RunOptions { dry_run: true, ..opts }).unwrap();

            let real_db = original_and_repeat();
            let real = run(&real_db, &rows, opts).unwrap();

            assert_eq!(counts(&dry), counts(&real), "{opts:?}");
            assert_eq!(url_of(&dry_db, "2020-07-04"), None);
            assert_eq!(
                url_of(&real_db, "2020-07-04").as_deref(),
                Some("https://example.com/repeat")
            );
        }
    }

    #[test]
    fn test_backfill_skips_show_with_bad_date() {
        let db = test_db();
        let original = insert(&db, "2020-01-04", Some("https://example.com/ep1"), None);
        insert(&db, "2020-07-04", None, Some(original));
        insert(&db, "July 4th", None, Some(original));

        let report = backfill(&db).unwrap();
        assert_eq!(report.filled, 1);
        assert_eq!(url_of(&db, "2020-07-04").as_deref(), Some("https://example.com/ep1"));
    }

    #[test]
    fn test_read_only_database_aborts_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shows.db");
        {
            let conn = rusqlite::Connection::open(&path).unwrap();
            conn.execute_batch(crate::db::TEST_SCHEMA).unwrap();
            conn.execute("INSERT INTO ww_shows (showdate) VALUES ('2020-01-04')", [])
                .unwrap();
        }

        let conn = rusqlite::Connection::open_with_flags(
            &path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        )
        .unwrap();
        let db = Database::from_connection(conn).unwrap();

        let rows = [
            row("2020-01-04", "https://example.com/ep1"),
            row("2020-01-11", "https://example.com/ep2"),
        ];
        let err = apply_urls(&db, &rows).unwrap_err();
        assert!(err.is_fatal());

        let err = run(&db, &rows, RunOptions { backfill: true, ..Default::default() }).unwrap_err();
        assert!(err.is_fatal());
    }
}
