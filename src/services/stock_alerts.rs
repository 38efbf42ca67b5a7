use std::sync::Arc;

use chrono::{Datelike, Duration, Utc};
use futures::future::try_join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::config::StockConfig;
use crate::errors::ServiceError;
use crate::models::{
    AlertSeverity, AlertType, OracleCallCategory, Product, StockAlert,
};
use crate::oracle::OracleGateway;
use crate::store::DocumentStore;

static FIRST_INTEGER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+").expect("valid integer regex"));

/// Per-severity counts over one scan, for dashboards.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AlertSummary {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub total: usize,
}

/// Classifies stock risk per product and forecasts depletion.
///
/// Checks run in a fixed order per product (critical, then low, then
/// seasonal), first match wins, at most one alert per product per scan.
/// Sales figures are read from the store first; the oracle is consulted
/// only when there is no local history, and never while holding any store
/// state.
pub struct StockIntelligenceService {
    store: Arc<dyn DocumentStore>,
    oracle: Option<Arc<OracleGateway>>,
    oracle_model: String,
    config: StockConfig,
}

impl StockIntelligenceService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        oracle: Option<Arc<OracleGateway>>,
        oracle_model: impl Into<String>,
        config: StockConfig,
    ) -> Self {
        Self {
            store,
            oracle,
            oracle_model: oracle_model.into(),
            config,
        }
    }

    /// Scans every tracked product. Alerts come back sorted by severity,
    /// descending, ties keeping scan order.
    #[instrument(skip(self))]
    pub async fn scan(&self) -> Result<Vec<StockAlert>, ServiceError> {
        let products = self.store.list_products().await?;
        let evaluations = try_join_all(products.iter().map(|p| self.evaluate(p))).await?;
        let mut alerts: Vec<StockAlert> = evaluations.into_iter().flatten().collect();
        alerts.sort_by(|a, b| b.severity.cmp(&a.severity));
        Ok(alerts)
    }

    /// Alerts restricted to the given products; unknown ids are skipped.
    #[instrument(skip(self, product_ids))]
    pub async fn alerts_for_products(
        &self,
        product_ids: &[Uuid],
    ) -> Result<Vec<StockAlert>, ServiceError> {
        let mut products = Vec::new();
        for &product_id in product_ids {
            if let Some(product) = self.store.get_product(product_id).await? {
                products.push(product);
            }
        }
        let evaluations = try_join_all(products.iter().map(|p| self.evaluate(p))).await?;
        let mut alerts: Vec<StockAlert> = evaluations.into_iter().flatten().collect();
        alerts.sort_by(|a, b| b.severity.cmp(&a.severity));
        Ok(alerts)
    }

    #[instrument(skip(self))]
    pub async fn alert_summary(&self) -> Result<AlertSummary, ServiceError> {
        let alerts = self.scan().await?;
        let mut summary = AlertSummary {
            total: alerts.len(),
            ..Default::default()
        };
        for alert in &alerts {
            match alert.severity {
                AlertSeverity::Critical => summary.critical += 1,
                AlertSeverity::High => summary.high += 1,
                AlertSeverity::Medium => summary.medium += 1,
                AlertSeverity::Low => summary.low += 1,
            }
        }
        Ok(summary)
    }

    async fn evaluate(&self, product: &Product) -> Result<Option<StockAlert>, ServiceError> {
        let monthly_sold = self.monthly_sold(product.id).await?;
        let velocity = monthly_sold as f64 / self.config.velocity_window_days as f64;
        let stock = product.stock_quantity;

        // Check 1: at or under the critical level, alert regardless of
        // sales history.
        if stock <= product.critical_stock_level {
            let depletion = self.depletion_estimate(product, velocity).await;
            let reorder = self.recommended_quantity(monthly_sold);
            let (alert_type, severity, message) = if stock <= 0 {
                (
                    AlertType::OutOfStock,
                    AlertSeverity::Critical,
                    format!("'{}' is out of stock", product.name),
                )
            } else {
                (
                    AlertType::Critical,
                    AlertSeverity::High,
                    format!(
                        "'{}' is critically low: {} units on hand (critical level {})",
                        product.name, stock, product.critical_stock_level
                    ),
                )
            };
            return Ok(Some(StockAlert {
                product_id: product.id,
                product_name: product.name.clone(),
                current_stock: stock,
                critical_level: product.critical_stock_level,
                alert_type,
                severity,
                message,
                recommended_action: format!("Reorder {} units immediately", reorder),
                estimated_depletion_days: depletion,
                recommended_order_quantity: reorder,
            }));
        }

        // Check 2: inside twice the critical level and depleting soon.
        if stock <= product.critical_stock_level * 2 {
            let depletion = self.depletion_estimate(product, velocity).await;
            if depletion <= self.config.depletion_warning_days {
                let reorder = self.recommended_quantity(monthly_sold);
                return Ok(Some(StockAlert {
                    product_id: product.id,
                    product_name: product.name.clone(),
                    current_stock: stock,
                    critical_level: product.critical_stock_level,
                    alert_type: AlertType::Low,
                    severity: AlertSeverity::Medium,
                    message: format!(
                        "'{}' is projected to deplete in roughly {} days",
                        product.name, depletion
                    ),
                    recommended_action: format!("Plan a reorder of {} units", reorder),
                    estimated_depletion_days: depletion,
                    recommended_order_quantity: reorder,
                }));
            }
        }

        // Check 3: in-season category under the flat seasonal threshold.
        if let Some(category) = &product.category {
            let month = Utc::now().month();
            let in_season = self
                .config
                .seasonal_rules
                .iter()
                .any(|rule| rule.category.eq_ignore_ascii_case(category) && rule.contains_month(month));
            if in_season && stock < self.config.seasonal_stock_threshold {
                let depletion = self.depletion_estimate(product, velocity).await;
                let reorder = self.recommended_quantity(monthly_sold);
                return Ok(Some(StockAlert {
                    product_id: product.id,
                    product_name: product.name.clone(),
                    current_stock: stock,
                    critical_level: product.critical_stock_level,
                    alert_type: AlertType::Seasonal,
                    severity: AlertSeverity::Medium,
                    message: format!(
                        "'{}' is below the seasonal threshold while '{}' demand is in season",
                        product.name, category
                    ),
                    recommended_action: format!("Build seasonal stock: order {} units", reorder),
                    estimated_depletion_days: depletion,
                    recommended_order_quantity: reorder,
                }));
            }
        }

        Ok(None)
    }

    async fn monthly_sold(&self, product_id: Uuid) -> Result<i64, ServiceError> {
        let now = Utc::now();
        let from = now - Duration::days(self.config.velocity_window_days);
        Ok(self
            .store
            .quantity_sold_between(product_id, from, now)
            .await?)
    }

    /// Projected days until the stock reaches zero at the observed velocity.
    /// With no sales history the oracle is consulted; if that fails or its
    /// reply carries no number, a flat heuristic takes over.
    pub async fn depletion_estimate(&self, product: &Product, velocity: f64) -> i64 {
        if velocity > 0.0 {
            return (product.stock_quantity as f64 / velocity).floor() as i64;
        }

        if let Some(oracle) = &self.oracle {
            let prompt = format!(
                "Estimate how many days until the stock of product '{}' (category: {}) runs out. \
                 Current stock: {} units, no recorded sales in the last {} days. \
                 Reply with a single integer number of days.",
                product.name,
                product.category.as_deref().unwrap_or("uncategorized"),
                product.stock_quantity,
                self.config.velocity_window_days,
            );
            let reply = oracle
                .ask(
                    &prompt,
                    &self.oracle_model,
                    OracleCallCategory::StockPrediction,
                    Some(product.id),
                )
                .await;
            if let Some(days) = first_integer(&reply) {
                return days;
            }
            debug!(product_id = %product.id, %reply, "no usable estimate in oracle reply");
        }

        self.heuristic_depletion(product.stock_quantity)
    }

    fn heuristic_depletion(&self, stock: i32) -> i64 {
        if stock <= 0 {
            90
        } else {
            (stock as i64 * 2).min(90)
        }
    }

    /// One and a half months of observed demand, clamped to sane bounds.
    pub fn recommended_quantity(&self, monthly_sold: i64) -> i64 {
        let recommended = (monthly_sold as f64 * 1.5).round() as i64;
        recommended.clamp(self.config.reorder_min, self.config.reorder_max)
    }
}

fn first_integer(text: &str) -> Option<i64> {
    FIRST_INTEGER
        .find(text)
        .and_then(|m| m.as_str().parse::<i64>().ok())
}
