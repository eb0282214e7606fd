//! Scripted payment widget.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use triply_core::payment::{PaymentIntent, PaymentWidget, WidgetOutcome};

/// [`PaymentWidget`] that replays scripted outcomes
///
/// Outcomes are returned in the order they were queued. Once the script runs
/// out the widget succeeds with the intent ID embedded in the client secret.
#[derive(Debug, Default)]
pub struct ScriptedPaymentWidget {
    script: Mutex<VecDeque<WidgetOutcome>>,
    calls: AtomicUsize,
}

impl ScriptedPaymentWidget {
    /// Widget that always succeeds
    #[must_use]
    pub fn succeeding() -> Self {
        Self::default()
    }

    /// Widget that replays `outcomes` first
    #[must_use]
    pub fn scripted(outcomes: impl IntoIterator<Item = WidgetOutcome>) -> Self {
        Self {
            script: Mutex::new(outcomes.into_iter().collect()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Widget whose next collection succeeds with `payment_intent_id`
    #[must_use]
    pub fn succeeding_with(payment_intent_id: impl Into<String>) -> Self {
        Self::scripted([WidgetOutcome::Succeeded {
            payment_intent_id: payment_intent_id.into(),
        }])
    }

    /// Widget whose next collection is abandoned
    #[must_use]
    pub fn abandoning() -> Self {
        Self::scripted([WidgetOutcome::Abandoned])
    }

    /// Widget whose next collection is declined
    #[must_use]
    pub fn declining(reason: impl Into<String>) -> Self {
        Self::scripted([WidgetOutcome::Failed {
            reason: reason.into(),
        }])
    }

    /// Number of times the widget was shown
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PaymentWidget for ScriptedPaymentWidget {
    fn collect<'a>(
        &'a self,
        intent: &'a PaymentIntent,
    ) -> Pin<Box<dyn Future<Output = WidgetOutcome> + Send + 'a>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let outcome = scripted.unwrap_or_else(|| WidgetOutcome::Succeeded {
            payment_intent_id: intent.intent_id().to_string(),
        });
        tracing::debug!(?intent, ?outcome, "Payment widget closed");
        Box::pin(async move { outcome })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use triply_core::types::BookingId;

    #[tokio::test]
    async fn test_script_then_default_success() {
        let widget = ScriptedPaymentWidget::abandoning();
        let intent = PaymentIntent::new(BookingId::new(7), "pi_7_secret_x");

        assert_eq!(widget.collect(&intent).await, WidgetOutcome::Abandoned);
        assert_eq!(
            widget.collect(&intent).await,
            WidgetOutcome::Succeeded {
                payment_intent_id: "pi_7".to_string()
            }
        );
        assert_eq!(widget.calls(), 2);
    }
}
