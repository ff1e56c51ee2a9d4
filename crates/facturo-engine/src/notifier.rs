//! # Notification Sinks
//!
//! Adapters for [`NotificationSink`]. Delivery (push, WebSocket, WhatsApp)
//! lives outside this crate; [`TracingNotifier`] logs them.

use async_trait::async_trait;
use tracing::warn;

use crate::error::EngineResult;
use crate::ports::{NotificationSink, StockAlert};

/// Logs alerts through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl NotificationSink for TracingNotifier {
    async fn notify_low_stock(&self, alert: &StockAlert) -> EngineResult<()> {
        warn!(
            merchant_id = %alert.merchant_id,
            product_id = %alert.product_id,
            code = %alert.code,
            stock = alert.current_stock,
            min_stock = ?alert.min_stock,
            "Low stock"
        );
        Ok(())
    }

    async fn notify_stock_out(&self, alert: &StockAlert) -> EngineResult<()> {
        warn!(
            merchant_id = %alert.merchant_id,
            product_id = %alert.product_id,
            code = %alert.code,
            "Stock out"
        );
        Ok(())
    }
}

#[cfg(test)]
pub(crate) use recording::RecordingNotifier;

#[cfg(test)]
mod recording {
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use facturo_core::kardex::ThresholdAlert;

    use crate::error::{EngineError, EngineResult};
    use crate::ports::{NotificationSink, StockAlert};

    /// Keeps every alert in memory.
    #[derive(Debug, Default)]
    pub struct RecordingNotifier {
        alerts: Mutex<Vec<(ThresholdAlert, StockAlert)>>,
        failing: bool,
    }

    impl RecordingNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        /// A sink that records and then reports a delivery failure.
        pub fn failing() -> Self {
            RecordingNotifier {
                alerts: Mutex::new(Vec::new()),
                failing: true,
            }
        }

        /// Alerts received so far, oldest first.
        pub async fn alerts(&self) -> Vec<(ThresholdAlert, StockAlert)> {
            self.alerts.lock().await.clone()
        }

        async fn record(&self, kind: ThresholdAlert, alert: &StockAlert) -> EngineResult<()> {
            self.alerts.lock().await.push((kind, alert.clone()));
            if self.failing {
                return Err(EngineError::Notification(format!(
                    "delivery failed for {}",
                    alert.code
                )));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl NotificationSink for RecordingNotifier {
        async fn notify_low_stock(&self, alert: &StockAlert) -> EngineResult<()> {
            self.record(ThresholdAlert::LowStock, alert).await
        }

        async fn notify_stock_out(&self, alert: &StockAlert) -> EngineResult<()> {
            self.record(ThresholdAlert::StockOut, alert).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facturo_core::kardex::ThresholdAlert;

    fn alert() -> StockAlert {
        StockAlert {
            merchant_id: "m".into(),
            product_id: "p".into(),
            code: "ARROZ".into(),
            name: "Arroz".into(),
            current_stock: 0,
            min_stock: Some(5),
        }
    }

    #[tokio::test]
    async fn test_recording_notifier() {
        let sink = RecordingNotifier::new();
        sink.notify_stock_out(&alert()).await.unwrap();
        sink.notify_low_stock(&alert()).await.unwrap();

        let alerts = sink.alerts().await;
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].0, ThresholdAlert::StockOut);
        assert_eq!(alerts[1].0, ThresholdAlert::LowStock);
    }

    #[tokio::test]
    async fn test_failing_notifier_still_records() {
        let sink = RecordingNotifier::failing();
        assert!(sink.notify_low_stock(&alert()).await.is_err());
        assert_eq!(sink.alerts().await.len(), 1);
        assert!(TracingNotifier.notify_low_stock(&alert()).await.is_ok());
    }
}
