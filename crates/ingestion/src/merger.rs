//! Panel merge: aligns normalized monthly series into one dated panel.

use chrono::NaiveDate;
use mfpanel_core::{
    add_months, months_between, validate, Column, Error, Month, MonthlySeries, Panel, PanelConfig,
    Result,
};
use std::collections::BTreeMap;
use tracing::info;

/// Merges monthly series under inner-join semantics.
///
/// The window starts at the latest of the anchor and every series' first
/// month, and ends at the earliest last month, so every row holds real data
/// for every column.
#[derive(Debug, Clone)]
pub struct PanelMerger {
    anchor: Month,
    column_order: Vec<String>,
    target: String,
}

impl PanelMerger {
    /// Create a merger from panel configuration.
    pub fn new(config: &PanelConfig) -> Self {
        Self {
            anchor: config.anchor_month(),
            column_order: config.column_order.clone(),
            target: config.target.clone(),
        }
    }

    /// Resolve output column order: configured order (or name order when
    /// none is configured) with the target moved last.
    fn resolve_order(&self, series: &BTreeMap<String, MonthlySeries>) -> Result<Vec<String>> {
        let mut order: Vec<String> = if self.column_order.is_empty() {
            series.keys().cloned().collect()
        } else {
            for name in series.keys() {
                if !self.column_order.contains(name) {
                    return Err(Error::schema(format!(
                        "series '{}' is not listed in the column order",
                        name
                    )));
                }
            }
            self.column_order.clone()
        };

        let available: Vec<&str> = series.keys().map(String::as_str).collect();
        validate::check_schema(&available, &order)?;
        validate::check_schema(&available, &[self.target.as_str()])?;

        order.retain(|c| c != &self.target);
        order.push(self.target.clone());
        Ok(order)
    }

    /// Merge `series` into a validated panel.
    ///
    /// `as_of` is the latest permissible month; later rows fail validation.
    pub fn merge(&self, series: &BTreeMap<String, MonthlySeries>, as_of: NaiveDate) -> Result<Panel> {
        if series.is_empty() {
            return Err(Error::insufficient_data("no series to merge"));
        }
        let order = self.resolve_order(series)?;

        // Binding constraint: the shortest history.
        let (binding, latest_first) = series
            .iter()
            .map(|(name, s)| (name.as_str(), s.first_month()))
            .max_by_key(|(_, first)| *first)
            .ok_or_else(|| Error::insufficient_data("no series to merge"))?;
        let start = latest_first.max(self.anchor);

        let end = series
            .values()
            .map(MonthlySeries::last_month)
            .min()
            .ok_or_else(|| Error::insufficient_data("no series to merge"))?;

        if start > end {
            return Err(Error::insufficient_data(format!(
                "no common months: window starts {} but ends {}",
                start, end
            )));
        }

        info!(
            start = %start,
            end = %end,
            binding_series = binding,
            anchor = %self.anchor,
            "merge window"
        );

        let span = months_between(start, end);
        let months: Vec<Month> = (0..=span)
            .map(|offset| {
                add_months(start, offset).ok_or_else(|| Error::invariant("month out of calendar range"))
            })
            .collect::<Result<_>>()?;

        let mut columns = Vec::with_capacity(order.len());
        for name in &order {
            let s = series
                .get(name)
                .ok_or_else(|| Error::schema(format!("missing series '{}'", name)))?;
            let values = months
                .iter()
                .map(|m| s.get(*m).map(Some).ok_or_else(|| Error::merge_gap(name, *m)))
                .collect::<Result<Vec<_>>>()?;
            columns.push(Column::new(name.clone(), values));
        }

        let panel = Panel::new(months, columns, Some(self.target.clone()))?;
        validate::validate_panel(&panel, as_of)?;

        info!(rows = panel.len(), columns = panel.columns().len(), "merged panel");
        Ok(panel)
    }
}
