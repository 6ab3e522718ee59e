use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use kehai_core::fetcher::QuoteFetcher;
use kehai_core::{DataType, KehaiError, Quote};

/// Instruction for how a fetch should behave for a given symbol.
#[derive(Clone)]
pub enum FetchBehavior {
    /// Return the provided quote immediately.
    Return(Quote),
    /// Fail immediately with the provided error.
    Fail(KehaiError),
    /// Fail with the error the first `times` calls, then return the quote.
    FailTimes {
        /// Error returned while the budget lasts.
        err: KehaiError,
        /// Remaining failures before success.
        times: u32,
        /// Quote returned once the failures are spent.
        then: Box<Quote>,
    },
    /// Sleep for the duration, then return the quote (simulate a slow upstream).
    Delay(std::time::Duration, Box<Quote>),
    /// Hang indefinitely (simulate a stalled upstream).
    Hang,
}

#[derive(Default)]
struct InternalState {
    rules: HashMap<String, FetchBehavior>,
    call_log: Vec<String>,
}

/// Controller handle used by tests to drive a [`DynamicMockFetcher`] from the
/// outside while it is registered with the orchestrator.
pub struct MockFetcherController {
    state: Arc<Mutex<InternalState>>,
}

impl MockFetcherController {
    /// Set the behavior for fetches of a specific symbol.
    pub async fn set_behavior(&self, symbol: &str, behavior: FetchBehavior) {
        let mut guard = self.state.lock().await;
        guard.rules.insert(symbol.to_string(), behavior);
    }

    /// Symbols fetched so far, in call order.
    pub async fn call_log(&self) -> Vec<String> {
        self.state.lock().await.call_log.clone()
    }

    /// Number of fetch calls observed for one symbol.
    pub async fn calls_for(&self, symbol: &str) -> usize {
        self.state
            .lock()
            .await
            .call_log
            .iter()
            .filter(|s| s.as_str() == symbol)
            .count()
    }

    /// Clear all configured behaviors and the call log.
    pub async fn clear(&self) {
        let mut guard = self.state.lock().await;
        guard.rules.clear();
        guard.call_log.clear();
    }
}

/// A fetcher that defers all behavior to an external controller.
pub struct DynamicMockFetcher {
    id: &'static str,
    data_type: DataType,
    priority: u32,
    state: Arc<Mutex<InternalState>>,
}

impl DynamicMockFetcher {
    /// Create a dynamic fetcher and its controller.
    #[must_use]
    pub fn new(
        id: &'static str,
        data_type: DataType,
        priority: u32,
    ) -> (Arc<Self>, MockFetcherController) {
        let state = Arc::new(Mutex::new(InternalState::default()));
        let fetcher = Arc::new(Self {
            id,
            data_type,
            priority,
            state: Arc::clone(&state),
        });
        (fetcher, MockFetcherController { state })
    }
}

#[async_trait]
impl QuoteFetcher for DynamicMockFetcher {
    fn id(&self) -> &'static str {
        self.id
    }

    fn data_type(&self) -> DataType {
        self.data_type
    }

    fn default_priority(&self) -> u32 {
        self.priority
    }

    async fn fetch(&self, symbol: &str) -> Result<Quote, KehaiError> {
        let behavior = {
            let mut guard = self.state.lock().await;
            guard.call_log.push(symbol.to_string());
            match guard.rules.get_mut(symbol) {
                Some(FetchBehavior::FailTimes { err, times, then }) => {
                    if *times == 0 {
                        Some(FetchBehavior::Return((**then).clone()))
                    } else {
                        *times -= 1;
                        Some(FetchBehavior::Fail(err.clone()))
                    }
                }
                other => other.cloned(),
            }
        };

        match behavior {
            Some(FetchBehavior::Return(q)) => Ok(q),
            Some(FetchBehavior::Fail(e)) => Err(e),
            Some(FetchBehavior::FailTimes { .. }) => unreachable!("rewritten above"),
            Some(FetchBehavior::Delay(d, q)) => {
                tokio::time::sleep(d).await;
                Ok(*q)
            }
            Some(FetchBehavior::Hang) => {
                std::future::pending::<()>().await;
                unreachable!("pending future never resolves")
            }
            None => Ok(crate::quote_fixture(symbol, self.data_type, self.id)),
        }
    }
}
