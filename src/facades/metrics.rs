use super::tenant_scope;
use crate::backend::Backend;
use crate::errors::{AppError, AppResult};
use crate::models::{ChartPoint, FinancialMetric, KpiSnapshot, MetricSeries, RecordMetricPayload};
use crate::session::SessionContext;
use chrono::{Datelike, NaiveDate};

const MONTH_LABELS: [&str; 12] = [
    "ene", "feb", "mar", "abr", "may", "jun", "jul", "ago", "sept", "oct", "nov", "dic",
];

pub struct MetricsFacade {
    backend: Backend,
    session: SessionContext,
}

impl MetricsFacade {
    pub fn new(backend: Backend, session: SessionContext) -> Self {
        Self { backend, session }
    }

    /// Appends a monthly row. Repeated months are kept side by side.
    pub fn record(&self, client_id: &str, payload: RecordMetricPayload) -> AppResult<FinancialMetric> {
        let (_, scope) = tenant_scope(&self.backend, &self.session, client_id)?;
        for (field, value) in [
            ("revenue", payload.revenue),
            ("marginPercent", payload.margin_percent),
            ("ebitda", payload.ebitda),
            ("cashFlow", payload.cash_flow),
        ] {
            if !value.is_finite() {
                return Err(AppError::Validation(format!("{} must be a finite number", field)));
            }
        }
        let payload = RecordMetricPayload {
            month: first_of_month(payload.month),
            ..payload
        };
        self.backend.db().insert_metric(&scope, client_id, &payload)
    }

    pub fn list(&self, client_id: &str) -> AppResult<Vec<FinancialMetric>> {
        let (_, scope) = tenant_scope(&self.backend, &self.session, client_id)?;
        self.backend.db().list_metrics(&scope, client_id)
    }

    pub fn series(&self, client_id: &str) -> AppResult<MetricSeries> {
        Ok(build_series(&self.list(client_id)?))
    }
}

/// Maps rows, already ordered by month, to chart points. The last row is the
/// current KPI snapshot.
pub fn build_series(rows: &[FinancialMetric]) -> MetricSeries {
    let point = |row: &FinancialMetric, value: f64| ChartPoint {
        label: month_label(row.month).to_string(),
        month: row.month,
        value,
    };
    MetricSeries {
        margin: rows.iter().map(|row| point(row, row.margin_percent)).collect(),
        cash_flow: rows.iter().map(|row| point(row, row.cash_flow)).collect(),
        current: rows.last().map(|row| KpiSnapshot {
            margin_percent: row.margin_percent,
            ebitda: row.ebitda,
            cash_flow: row.cash_flow,
        }),
    }
}

pub fn month_label(month: NaiveDate) -> &'static str {
    MONTH_LABELS[month.month0() as usize]
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}
