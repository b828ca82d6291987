use crate::browser::Browser;
use crate::request::{ReplyError, Request};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Expectations supplied by a browser implementation to run the shared contract suite.
#[derive(Debug, Clone)]
pub struct BrowserContractExpectations {
    /// A message the browser accepts and answers.
    pub accepted_message: Vec<u8>,
    /// Expected response for `accepted_message`, if deterministic.
    pub expected_response: Option<Vec<u8>>,
    /// A message the browser must reject, if it rejects anything.
    pub rejected_message: Option<Vec<u8>>,
    /// Upper bound for an accepted request to complete.
    pub deadline: Duration,
    /// How long to watch a rejected request for a stray completion.
    pub settle: Duration,
}

impl Default for BrowserContractExpectations {
    fn default() -> Self {
        Self {
            accepted_message: Vec::new(),
            expected_response: None,
            rejected_message: None,
            deadline: Duration::from_secs(5),
            settle: Duration::from_millis(50),
        }
    }
}

/// Errors surfaced by the browser contract test harness.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BrowserContractError {
    #[error("browser name is empty")]
    EmptyName,
    #[error("browser rejected the accepted message")]
    Rejected,
    #[error("browser did not complete within {0:?}")]
    Timeout(Duration),
    #[error("browser dropped the request without completing it")]
    Abandoned,
    #[error("unexpected response: expected {expected:?}, got {actual:?}")]
    WrongResponse { expected: Vec<u8>, actual: Vec<u8> },
    #[error("browser accepted the message it should reject")]
    RejectionIgnored,
    #[error("browser completed a request it rejected")]
    CompletedAfterRejection,
}

/// Run the shared browser contract suite against a browser implementation.
///
/// Browsers should call this from their crate-level tests.
pub async fn run_browser_contract<B: Browser + ?Sized>(
    browser: &B,
    expectations: &BrowserContractExpectations,
) -> Result<(), BrowserContractError> {
    if browser.name().trim().is_empty() {
        return Err(BrowserContractError::EmptyName);
    }

    verify_accepted(browser, expectations).await?;
    if let Some(message) = &expectations.rejected_message {
        verify_rejected(browser, message.clone(), expectations.settle).await?;
    }
    Ok(())
}

async fn verify_accepted<B: Browser + ?Sized>(
    browser: &B,
    expectations: &BrowserContractExpectations,
) -> Result<(), BrowserContractError> {
    let (request, reply) = Request::with_reply(expectations.accepted_message.clone());
    if !browser.handle_request(Arc::clone(&request)) {
        request.discard();
        return Err(BrowserContractError::Rejected);
    }
    drop(request);

    let response = reply.recv_timeout(expectations.deadline).await?;
    match &expectations.expected_response {
        Some(expected) if &response != expected => Err(BrowserContractError::WrongResponse {
            expected: expected.clone(),
            actual: response,
        }),
        _ => Ok(()),
    }
}

async fn verify_rejected<B: Browser + ?Sized>(
    browser: &B,
    message: Vec<u8>,
    settle: Duration,
) -> Result<(), BrowserContractError> {
    let request = Request::create(message, |_| {});
    request.discard();
    if browser.handle_request(Arc::clone(&request)) {
        return Err(BrowserContractError::RejectionIgnored);
    }
    tokio::time::sleep(settle).await;
    if request.is_completed() {
        return Err(BrowserContractError::CompletedAfterRejection);
    }
    Ok(())
}

impl From<ReplyError> for BrowserContractError {
    fn from(err: ReplyError) -> Self {
        match err {
            ReplyError::Timeout { after } => Self::Timeout(after),
            ReplyError::Abandoned => Self::Abandoned,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::BrowserInfo;
    use std::sync::Mutex;

    struct ThreadedEcho {
        info: BrowserInfo,
    }

    impl Browser for ThreadedEcho {
        fn info(&self) -> &BrowserInfo {
            &self.info
        }

        fn handle_request(&self, request: Arc<Request>) -> bool {
            if request.message() == b"reject" {
                return false;
            }
            std::thread::spawn(move || {
                let _ = request.complete(request.message().to_vec());
            });
            true
        }
    }

    struct Silent {
        info: BrowserInfo,
        held: Mutex<Vec<Arc<Request>>>,
    }

    impl Browser for Silent {
        fn info(&self) -> &BrowserInfo {
            &self.info
        }

        fn handle_request(&self, request: Arc<Request>) -> bool {
            request.discard();
            self.held.lock().unwrap().push(request);
            true
        }
    }

    struct LateRejecter {
        info: BrowserInfo,
    }

    impl Browser for LateRejecter {
        fn info(&self) -> &BrowserInfo {
            &self.info
        }

        fn handle_request(&self, request: Arc<Request>) -> bool {
            let accept = request.message() != b"reject";
            std::thread::spawn(move || {
                let _ = request.complete("anyway");
            });
            accept
        }
    }

    #[tokio::test]
    async fn threaded_echo_passes_contract() {
        let browser = ThreadedEcho {
            info: BrowserInfo::new("Echo", "answers with the request"),
        };
        let expectations = BrowserContractExpectations {
            accepted_message: b"hello".to_vec(),
            expected_response: Some(b"hello".to_vec()),
            rejected_message: Some(b"reject".to_vec()),
            ..Default::default()
        };
        run_browser_contract(&browser, &expectations).await.unwrap();
    }

    #[tokio::test]
    async fn silent_browser_times_out() {
        let browser = Silent {
            info: BrowserInfo::new("Silent", ""),
            held: Mutex::new(Vec::new()),
        };
        let expectations = BrowserContractExpectations {
            accepted_message: b"hello".to_vec(),
            deadline: Duration::from_millis(20),
            ..Default::default()
        };
        assert_eq!(
            run_browser_contract(&browser, &expectations).await,
            Err(BrowserContractError::Timeout(Duration::from_millis(20)))
        );
    }

    #[tokio::test]
    async fn completing_a_rejected_request_fails_contract() {
        let browser = LateRejecter {
            info: BrowserInfo::new("Late", ""),
        };
        let expectations = BrowserContractExpectations {
            accepted_message: b"hello".to_vec(),
            rejected_message: Some(b"reject".to_vec()),
            settle: Duration::from_millis(500),
            ..Default::default()
        };
        assert_eq!(
            run_browser_contract(&browser, &expectations).await,
            Err(BrowserContractError::CompletedAfterRejection)
        );
    }

    #[tokio::test]
    async fn wrong_response_is_reported() {
        let browser = LateRejecter {
            info: BrowserInfo::new("Late", ""),
        };
        let expectations = BrowserContractExpectations {
            accepted_message: b"hello".to_vec(),
            expected_response: Some(b"hello".to_vec()),
            ..Default::default()
        };
        assert_eq!(
            run_browser_contract(&browser, &expectations).await,
            Err(BrowserContractError::WrongResponse {
                expected: b"hello".to_vec(),
                actual: b"anyway".to_vec(),
            })
        );
    }

    #[tokio::test]
    async fn unnamed_browser_fails_contract() {
        let browser = ThreadedEcho {
            info: BrowserInfo::default(),
        };
        assert_eq!(
            run_browser_contract(&browser, &BrowserContractExpectations::default()).await,
            Err(BrowserContractError::EmptyName)
        );
    }
}
