// Report store - daily reports keyed by date, persisted as one key-value entry
use crate::application::key_value_store::{KeyValueStore, StoreError};
use crate::domain::report::DailyReport;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub const REPORTS_KEY: &str = "dailyReports";

pub type ReportMap = BTreeMap<NaiveDate, DailyReport>;

pub struct ReportStore {
    backend: Arc<dyn KeyValueStore>,
    reports: RwLock<ReportMap>,
}

impl ReportStore {
    /// Load every persisted report from `backend`.
    pub async fn open(backend: Arc<dyn KeyValueStore>) -> Result<Self, StoreError> {
        let reports = match backend.read(REPORTS_KEY).await? {
            Some(json) => serde_json::from_str(&json).map_err(|source| StoreError::Deserialize {
                key: REPORTS_KEY.to_string(),
                source,
            })?,
            None => ReportMap::new(),
        };
        tracing::info!(reports = reports.len(), "Loaded daily reports");
        Ok(Self {
            backend,
            reports: RwLock::new(reports),
        })
    }

    /// Start from nothing; the next `put` overwrites whatever `backend` holds.
    pub fn empty(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            backend,
            reports: RwLock::new(ReportMap::new()),
        }
    }

    pub async fn get(&self, date: NaiveDate) -> Option<DailyReport> {
        self.reports.read().await.get(&date).cloned()
    }

    /// Reports for every populated day in `start..=end`.
    pub async fn get_range(&self, start: NaiveDate, end: NaiveDate) -> ReportMap {
        if start > end {
            return ReportMap::new();
        }
        self.reports
            .read()
            .await
            .range(start..=end)
            .map(|(date, report)| (*date, report.clone()))
            .collect()
    }

    pub async fn all(&self) -> ReportMap {
        self.reports.read().await.clone()
    }

    pub async fn latest_date(&self) -> Option<NaiveDate> {
        self.reports.read().await.keys().next_back().copied()
    }

    /// Insert or replace the report for `date`, then persist the whole collection.
    ///
    /// The in-memory copy is updated even when persisting fails.
    pub async fn put(&self, date: NaiveDate, report: DailyReport) -> Result<(), StoreError> {
        let mut reports = self.reports.write().await;
        reports.insert(date, report);

        let json = serde_json::to_string(&*reports).map_err(|source| StoreError::Serialize {
            key: REPORTS_KEY.to_string(),
            source,
        })?;
        self.backend.write(REPORTS_KEY, &json).await?;
        tracing::debug!(%date, reports = reports.len(), "Persisted daily reports");
        Ok(())
    }
}
