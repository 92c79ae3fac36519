use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, TimeZone, Utc};

/// Named relative creation-date windows. Resolved against the server's
/// local calendar day at request time; bounds are half-open [from, to)
/// and emitted as UTC RFC 3339 so they compare lexicographically with
/// stored timestamps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DateWindow {
    Today,
    Yesterday,
    Last7Days,
    Last30Days,
    ThisMonth,
    LastMonth,
}

impl std::str::FromStr for DateWindow {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "today" => Ok(Self::Today),
            "yesterday" => Ok(Self::Yesterday),
            "last7days" => Ok(Self::Last7Days),
            "last30days" => Ok(Self::Last30Days),
            "thismonth" => Ok(Self::ThisMonth),
            "lastmonth" => Ok(Self::LastMonth),
            other => Err(format!("unknown date window: {other}")),
        }
    }
}

impl DateWindow {
    pub fn resolve(&self, now: DateTime<Local>) -> (String, String) {
        let today = now.date_naive();
        let tomorrow = today + Duration::days(1);

        let (from, to) = match self {
            Self::Today => (today, tomorrow),
            Self::Yesterday => (today - Duration::days(1), today),
            Self::Last7Days => (today - Duration::days(6), tomorrow),
            Self::Last30Days => (today - Duration::days(29), tomorrow),
            Self::ThisMonth => (first_of_month(today), first_of_next_month(today)),
            Self::LastMonth => {
                let this_first = first_of_month(today);
                (first_of_month(this_first - Duration::days(1)), this_first)
            }
        };
        (day_start_utc(from), day_start_utc(to))
    }
}

/// Named last-activity windows, plus the no-activity sentinel handled by
/// the filter itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivityWindow {
    Today,
    Last3Days,
    LastWeek,
    LastMonth,
}

impl std::str::FromStr for ActivityWindow {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "today" => Ok(Self::Today),
            "last3days" => Ok(Self::Last3Days),
            "lastweek" => Ok(Self::LastWeek),
            "lastmonth" => Ok(Self::LastMonth),
            other => Err(format!("unknown activity window: {other}")),
        }
    }
}

impl ActivityWindow {
    pub fn resolve(&self, now: DateTime<Local>) -> (String, String) {
        let today = now.date_naive();
        let tomorrow = today + Duration::days(1);

        let from = match self {
            Self::Today => today,
            Self::Last3Days => today - Duration::days(2),
            Self::LastWeek => today - Duration::days(6),
            Self::LastMonth => today - Duration::days(29),
        };
        (day_start_utc(from), day_start_utc(tomorrow))
    }
}

fn first_of_month(d: NaiveDate) -> NaiveDate {
    d.with_day(1).unwrap_or(d)
}

fn first_of_next_month(d: NaiveDate) -> NaiveDate {
    let (y, m) = if d.month() == 12 {
        (d.year() + 1, 1)
    } else {
        (d.year(), d.month() + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1).unwrap_or(d)
}

fn day_start_utc(d: NaiveDate) -> String {
    let midnight = d.and_hms_opt(0, 0, 0).unwrap_or_default();
    match Local.from_local_datetime(&midnight) {
        chrono::LocalResult::Single(dt) | chrono::LocalResult::Ambiguous(dt, _) => {
            dt.with_timezone(&Utc).to_rfc3339()
        }
        // DST gap: fall back to interpreting the instant as UTC
        chrono::LocalResult::None => Utc.from_utc_datetime(&midnight).to_rfc3339(),
    }
}
