// Daily aggregator - streams every sample into per-day totals and writes reports
use crate::application::key_value_store::StoreError;
use crate::application::report_store::ReportStore;
use crate::domain::calendar::ReportTimeZone;
use crate::domain::report::{DailyReport, DayAccumulator};
use crate::domain::telemetry::TelemetrySample;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Open per-day accumulators, one for each day that has seen a sample and
/// has not been finalized yet.
#[derive(Debug, Default)]
pub struct DailyLog {
    days: BTreeMap<NaiveDate, DayAccumulator>,
}

impl DailyLog {
    pub fn observe(&mut self, date: NaiveDate, sample: &TelemetrySample) {
        self.days.entry(date).or_default().observe(sample);
    }

    /// Replace the running state of `date`.
    pub fn resume(&mut self, date: NaiveDate, day: DayAccumulator) {
        self.days.insert(date, day);
    }

    pub fn report_for(&self, date: NaiveDate) -> Option<DailyReport> {
        self.days.get(&date).and_then(DayAccumulator::report)
    }

    /// Remove and return every day strictly before `date`, oldest first.
    pub fn drain_before(&mut self, date: NaiveDate) -> Vec<(NaiveDate, DailyReport)> {
        let open = self.days.split_off(&date);
        let closed = std::mem::replace(&mut self.days, open);
        closed
            .into_iter()
            .filter_map(|(day, acc)| acc.report().map(|r| (day, r)))
            .collect()
    }

    pub fn open_days(&self) -> usize {
        self.days.len()
    }
}

pub struct DailyAggregator {
    store: Arc<ReportStore>,
    zone: ReportTimeZone,
    log: DailyLog,
    /// Days before this one are finalized and never written again.
    first_open_day: NaiveDate,
}

impl DailyAggregator {
    pub fn new(store: Arc<ReportStore>, zone: ReportTimeZone) -> Self {
        Self {
            store,
            zone,
            log: DailyLog::default(),
            first_open_day: NaiveDate::MIN,
        }
    }

    /// Close every day before `now` and continue today from its stored report.
    pub async fn resume(&mut self, now: &DateTime<Utc>) {
        let today = self.zone.date_of(now);
        self.first_open_day = self.first_open_day.max(today);

        if let Some(stored) = self.store.get(today).await {
            tracing::info!(
                date = %today,
                samples = stored.sample_count,
                "Resuming daily report"
            );
            self.log.resume(today, DayAccumulator::from_report(&stored));
        }
    }

    /// Fold `sample` into its day. Samples dated on a finalized day are dropped.
    pub fn observe(&mut self, sample: &TelemetrySample) {
        let date = self.zone.date_of(&sample.timestamp);
        if date < self.first_open_day {
            tracing::warn!(
                %date,
                timestamp = %sample.timestamp,
                "Sample belongs to a finalized day, not aggregated"
            );
            return;
        }
        self.log.observe(date, sample);
    }

    pub fn date_of(&self, instant: &DateTime<Utc>) -> NaiveDate {
        self.zone.date_of(instant)
    }

    pub fn next_midnight_after(&self, instant: &DateTime<Utc>) -> DateTime<Utc> {
        self.zone.next_midnight_after(instant)
    }

    /// Write the report for `date` from everything observed so far.
    ///
    /// A day without samples writes nothing and yields `None`.
    pub async fn run_for(&self, date: NaiveDate) -> Result<Option<DailyReport>, StoreError> {
        let Some(report) = self.log.report_for(date) else {
            tracing::debug!(%date, "No samples for report date");
            return Ok(None);
        };
        self.store.put(date, report.clone()).await?;
        tracing::info!(
            %date,
            samples = report.sample_count,
            critical = report.critical_alerts_count,
            "Daily report written"
        );
        Ok(Some(report))
    }

    /// Finalize every day that ended before `now`. Returns the dates written.
    ///
    /// Days are dropped from the log even if persisting fails; the store keeps
    /// them in memory for the rest of the session.
    pub async fn roll_over(&mut self, now: &DateTime<Utc>) -> Result<Vec<NaiveDate>, StoreError> {
        let today = self.zone.date_of(now);
        self.first_open_day = self.first_open_day.max(today);
        let mut written = Vec::new();
        let mut first_error = None;

        for (date, report) in self.log.drain_before(today) {
            match self.store.put(date, report).await {
                Ok(()) => {
                    tracing::info!(%date, "Finalized daily report");
                    written.push(date);
                }
                Err(e) => {
                    tracing::error!(%date, error = %e, "Failed to persist daily report");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }
}
