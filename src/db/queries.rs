use super::models::{RelatedShow, Show};
use super::{Database, Result};
use crate::loader::DATE_FORMAT;
use chrono::NaiveDate;
use rusqlite::{OptionalExtension, params};

impl Database {
    /// Column expression for the repeat reference; NULL when the table lacks it.
    fn repeat_column(&self) -> &'static str {
        if self.has_repeats() { "repeatshowid" } else { "NULL" }
    }

    /// Look up a show by its broadcast date.
    pub fn show_by_date(&self, date: NaiveDate) -> Result<Option<Show>> {
        let sql = format!(
            "SELECT showid, showdate, showurl, {} FROM ww_shows WHERE showdate = ?1",
            self.repeat_column()
        );
        let show = self
            .conn
            .query_row(&sql, params![date], |row| {
                Ok(Show {
                    id: row.get(0)?,
                    date: row.get(1)?,
                    url: row.get(2)?,
                    repeat_of: row.get(3)?,
                })
            })
            .optional()?;
        Ok(show)
    }

    /// Set a show's URL unconditionally. Returns the number of rows touched.
    pub fn set_show_url(&self, show_id: i64, url: &str) -> Result<usize> {
        let n = self.conn.execute(
            "UPDATE ww_shows SET showurl = ?1 WHERE showid = ?2",
            params![url, show_id],
        )?;
        Ok(n)
    }

    /// Set a show's URL only if it doesn't have one yet. Returns 0 when the
    /// show already carries a URL.
    pub fn fill_show_url(&self, show_id: i64, url: &str) -> Result<usize> {
        let n = self.conn.execute(
            "UPDATE ww_shows SET showurl = ?1
             WHERE showid = ?2 AND (showurl IS NULL OR TRIM(showurl) = '')",
            params![url, show_id],
        )?;
        Ok(n)
    }

    /// All shows with a NULL or blank URL, oldest first.
    ///
    /// A row whose date can't be parsed is logged and left out rather than
    /// failing the whole query.
    pub fn shows_missing_url(&self) -> Result<Vec<Show>> {
        let sql = format!(
            "SELECT showid, CAST(showdate AS TEXT), showurl, {} FROM ww_shows
             WHERE showurl IS NULL OR TRIM(showurl) = ''
             ORDER BY showdate ASC",
            self.repeat_column()
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let shows = rows
            .into_iter()
            .filter_map(|(id, raw_date, url, repeat_of)| {
                let raw_date = raw_date.unwrap_or_default();
                match NaiveDate::parse_from_str(raw_date.trim(), DATE_FORMAT) {
                    Ok(date) => Some(Show { id, date, url, repeat_of }),
                    Err(_) => {
                        log::warn!("Show {id} has unparsable date {raw_date:?}, skipping");
                        None
                    }
                }
            })
            .collect();

        Ok(shows)
    }

    /// Find a show that is the same episode as `show` and already has a URL.
    ///
    /// Preference: the original `show` repeats, then other repeats of that
    /// original, then repeats of `show` itself. Ties go to the earliest date.
    pub fn related_show_with_url(&self, show: &Show) -> Result<Option<RelatedShow>> {
        if !self.has_repeats() {
            return Ok(None);
        }

        let related = self
            .conn
            .query_row(
                "SELECT showid, showdate, showurl FROM ww_shows
                 WHERE showid <> ?1
                   AND showurl IS NOT NULL AND TRIM(showurl) <> ''
                   AND (showid = ?2 OR repeatshowid = ?2 OR repeatshowid = ?1)
                 ORDER BY CASE
                     WHEN showid = ?2 THEN 0
                     WHEN repeatshowid = ?2 THEN 1
                     ELSE 2
                 END, showdate ASC
                 LIMIT 1",
                params![show.id, show.repeat_of],
                |row| {
                    Ok(RelatedShow {
                        id: row.get(0)?,
                        date: row.get(1)?,
                        url: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(related)
    }
}
