// Calendar-day bucketing for daily reports
use chrono::{
    DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeDelta, TimeZone,
    Utc,
};

/// Time zone that decides which calendar day a sample belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportTimeZone {
    /// The host's local zone, DST included.
    #[default]
    Local,
    Fixed(FixedOffset),
}

impl ReportTimeZone {
    pub fn utc() -> Self {
        ReportTimeZone::Fixed(Utc.fix())
    }

    /// Fixed zone `minutes` east of UTC; out-of-range offsets fall back to `Local`.
    pub fn from_offset_minutes(minutes: i32) -> Self {
        minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .map(ReportTimeZone::Fixed)
            .unwrap_or(ReportTimeZone::Local)
    }

    pub fn date_of(&self, instant: &DateTime<Utc>) -> NaiveDate {
        match self {
            ReportTimeZone::Local => instant.with_timezone(&Local).date_naive(),
            ReportTimeZone::Fixed(offset) => instant.with_timezone(offset).date_naive(),
        }
    }

    /// First midnight strictly after `instant` in this zone.
    pub fn next_midnight_after(&self, instant: &DateTime<Utc>) -> DateTime<Utc> {
        let fallback = *instant + TimeDelta::hours(24);
        let Some(next_day) = self.date_of(instant).succ_opt() else {
            return fallback;
        };
        let midnight = NaiveDateTime::new(next_day, NaiveTime::MIN);

        // A DST jump can skip local midnight entirely; retry an hour later.
        self.resolve_local(midnight)
            .or_else(|| self.resolve_local(midnight + TimeDelta::hours(1)))
            .unwrap_or(fallback)
    }

    fn resolve_local(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        match self {
            ReportTimeZone::Local => Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|t| t.with_timezone(&Utc)),
            ReportTimeZone::Fixed(offset) => offset
                .from_local_datetime(&naive)
                .earliest()
                .map(|t| t.with_timezone(&Utc)),
        }
    }
}
