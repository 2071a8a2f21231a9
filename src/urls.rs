use chrono::NaiveDate;

const URL_PREFIX: &str = "https://www.npr.org/programs/wait-wait-dont-tell-me/archive?date=";
const LEGACY_URL_PREFIX: &str = "https://legacy.npr.org/programs/waitwait/archrndwn";
const LEGACY_URL_SUFFIX: &str = ".waitwait.html";

/// First show date served by the current NPR.org archive pages.
fn current_archive_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2006, 1, 7).expect("valid date")
}

/// Build the NPR.org show page URL for a show date.
///
/// Shows from 2006-01-07 onward live in the current archive; older ones only
/// exist on the legacy site, keyed by year, month and a `YYMMDD` stem.
pub fn npr_show_url(date: NaiveDate) -> String {
    if date >= current_archive_start() {
        format!("{URL_PREFIX}{}", date.format("%m-%d-%Y"))
    } else {
        let month = date.format("%b").to_string().to_lowercase();
        format!(
            "{LEGACY_URL_PREFIX}/{}/{month}/{}{LEGACY_URL_SUFFIX}",
            date.format("%Y"),
            date.format("%y%m%d"),
        )
    }
}
