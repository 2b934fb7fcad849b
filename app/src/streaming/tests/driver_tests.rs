//! Unit tests for StreamDriver
//!
//! Covers both interaction shapes, every failure step, close-failure
//! precedence and cancellation. Each test checks the typed outcome and the
//! calls the mock transport actually saw.

use crate::streaming::{
    AttemptError, AttemptOutcome, DriverConfig, Exchange, StreamDriver, StreamMode,
};
use crate::testing::{MockScript, MockStreamer};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Test fixture holding the mock remote and driver settings
pub struct DriverTestFixture {
    pub client: MockStreamer,
    pub config: DriverConfig,
    pub cancel: CancellationToken,
}

impl DriverTestFixture {
    pub fn new(script: MockScript) -> Self {
        Self {
            client: MockStreamer::with_scripts(vec![script]),
            config: DriverConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn driver(&self) -> StreamDriver<'_, MockStreamer> {
        StreamDriver::new(&self.client, self.config, self.cancel.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bidirectional_echo_completes_all_round_trips() {
        // Arrange
        let fixture = DriverTestFixture::new(MockScript::echo());

        // Act
        let report = fixture.driver().run_bidirectional().await;

        // Assert
        assert_eq!(report.mode, StreamMode::Bidirectional);
        assert_eq!(report.outcome, AttemptOutcome::Completed { exchanged: 10 });
        assert!(report.close_error.is_none());
        let expected: Vec<Exchange> = (0..10).map(|j| Exchange::round_trip(j, j)).collect();
        assert_eq!(report.exchanges, expected);

        let streams = fixture.client.streams();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].sent, (0..10).collect::<Vec<i64>>());
        assert_eq!(streams[0].received.len(), 10);
        assert_eq!(streams[0].close_calls, 1);
    }

    #[tokio::test]
    async fn test_bidirectional_send_failure_stops_exchange() {
        let fixture = DriverTestFixture::new(MockScript::failing_send_at(3));

        let report = fixture.driver().run_bidirectional().await;

        match &report.outcome {
            AttemptOutcome::SendFailed { exchanged, error } => {
                assert_eq!(*exchanged, 3);
                assert!(matches!(error, AttemptError::Send { index: 3, .. }));
            }
            other => panic!("expected send failure, got {other}"),
        }
        assert_eq!(report.exchanges.len(), 3);

        let stream = &fixture.client.streams()[0];
        assert_eq!(stream.send_calls, 4);
        assert_eq!(stream.recv_calls, 3);
        assert_eq!(stream.close_calls, 1);
    }

    #[tokio::test]
    async fn test_bidirectional_recv_failure_stops_exchange() {
        let fixture = DriverTestFixture::new(MockScript::failing_recv_at(3));

        let report = fixture.driver().run_bidirectional().await;

        match &report.outcome {
            AttemptOutcome::RecvFailed { exchanged, error } => {
                assert_eq!(*exchanged, 3);
                assert!(matches!(error, AttemptError::Recv { index: 3, .. }));
                assert_eq!(error.step(), "recv");
            }
            other => panic!("expected recv failure, got {other}"),
        }

        // the fourth request was accepted even though its response never came
        assert_eq!(report.requests_sent, 4);
        assert_eq!(report.exchanges.len(), 3);

        let stream = &fixture.client.streams()[0];
        assert_eq!(stream.send_calls, 4);
        assert_eq!(stream.sent.len(), 4);
        assert_eq!(stream.recv_calls, 4);
        assert_eq!(stream.close_calls, 1);
    }

    #[tokio::test]
    async fn test_bidirectional_early_end_of_stream_is_a_recv_failure() {
        let fixture = DriverTestFixture::new(MockScript::ending_at(5));

        let report = fixture.driver().run_bidirectional().await;

        assert_eq!(
            report.outcome,
            AttemptOutcome::RecvFailed {
                exchanged: 5,
                error: AttemptError::EndOfStream { index: 5 },
            }
        );
        assert_eq!(fixture.client.streams()[0].close_calls, 1);
    }

    #[tokio::test]
    async fn test_open_failure_reports_send_failed_without_stream() {
        let fixture = DriverTestFixture::new(MockScript::failing_open());

        let bidi = fixture.driver().run_bidirectional().await;
        let server = fixture.driver().run_server_stream(10).await;

        for report in [bidi, server] {
            match &report.outcome {
                AttemptOutcome::SendFailed { exchanged, error } => {
                    assert_eq!(*exchanged, 0);
                    assert!(matches!(error, AttemptError::StreamOpen { .. }));
                    assert_eq!(error.step(), "open");
                }
                other => panic!("expected open failure, got {other}"),
            }
        }
        assert_eq!(fixture.client.open_calls(), 2);
        assert!(fixture.client.streams().is_empty());
    }

    #[tokio::test]
    async fn test_close_failure_is_reported_when_nothing_else_failed() {
        let fixture = DriverTestFixture::new(MockScript::echo().with_close_failure());

        let report = fixture.driver().run_bidirectional().await;

        match &report.outcome {
            AttemptOutcome::CloseFailed { exchanged, error } => {
                assert_eq!(*exchanged, 10);
                assert!(matches!(error, AttemptError::Close { .. }));
            }
            other => panic!("expected close failure, got {other}"),
        }
        assert!(report.close_error.is_none());
    }

    #[tokio::test]
    async fn test_close_failure_never_outranks_earlier_failure() {
        let fixture =
            DriverTestFixture::new(MockScript::failing_send_at(2).with_close_failure());

        let report = fixture.driver().run_bidirectional().await;

        assert!(matches!(
            report.outcome,
            AttemptOutcome::SendFailed { exchanged: 2, .. }
        ));
        assert!(matches!(report.close_error, Some(AttemptError::Close { .. })));
        assert_eq!(fixture.client.streams()[0].close_calls, 1);
    }

    #[tokio::test]
    async fn test_server_stream_receives_requested_count() {
        let fixture = DriverTestFixture::new(MockScript::echo());

        let report = fixture.driver().run_server_stream(10).await;

        assert_eq!(report.mode, StreamMode::ServerStream);
        assert_eq!(report.outcome, AttemptOutcome::Completed { exchanged: 10 });
        assert_eq!(report.requests_sent, 1);
        let expected: Vec<Exchange> = (0..10).map(Exchange::pushed).collect();
        assert_eq!(report.exchanges, expected);

        let stream = &fixture.client.streams()[0];
        assert_eq!(stream.requested, Some(10));
        assert_eq!(stream.recv_calls, 10);
        assert_eq!(stream.close_calls, 1);
    }

    #[tokio::test]
    async fn test_server_stream_clean_early_end_completes() {
        let fixture = DriverTestFixture::new(MockScript::ending_at(4));

        let report = fixture.driver().run_server_stream(10).await;

        assert_eq!(report.outcome, AttemptOutcome::Completed { exchanged: 4 });
        assert!(report.primary_error().is_none());
        assert_eq!(fixture.client.streams()[0].close_calls, 1);
    }

    #[tokio::test]
    async fn test_server_stream_recv_failure() {
        let fixture = DriverTestFixture::new(MockScript::failing_recv_at(2));

        let report = fixture.driver().run_server_stream(10).await;

        assert!(matches!(
            report.outcome,
            AttemptOutcome::RecvFailed {
                exchanged: 2,
                error: AttemptError::Recv { index: 2, .. },
            }
        ));
        let stream = &fixture.client.streams()[0];
        assert_eq!(stream.recv_calls, 3);
        assert_eq!(stream.close_calls, 1);
    }

    #[tokio::test]
    async fn test_server_stream_count_bounds_the_receive_loop() {
        let fixture = DriverTestFixture::new(MockScript::echo());

        let report = fixture.driver().run_server_stream(3).await;

        assert_eq!(report.outcome, AttemptOutcome::Completed { exchanged: 3 });
        // the end-of-stream after the third message is never read
        assert_eq!(fixture.client.streams()[0].recv_calls, 3);
    }

    #[tokio::test]
    async fn test_run_dispatches_on_mode() {
        let mut fixture = DriverTestFixture::new(MockScript::echo());
        fixture.config = DriverConfig {
            exchange_len: 4,
            server_stream_count: 6,
        };

        let bidi = fixture.driver().run(StreamMode::Bidirectional).await;
        let server = fixture.driver().run(StreamMode::ServerStream).await;

        assert_eq!(bidi.outcome, AttemptOutcome::Completed { exchanged: 4 });
        assert_eq!(server.outcome, AttemptOutcome::Completed { exchanged: 6 });
        assert_eq!(fixture.client.streams()[1].requested, Some(6));
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_blocked_recv_and_closes() {
        let fixture = DriverTestFixture::new(MockScript::stalling_recv_at(2));
        let cancel = fixture.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let report = fixture.driver().run_bidirectional().await;

        assert_eq!(report.outcome, AttemptOutcome::Cancelled { exchanged: 2 });
        assert_eq!(fixture.client.streams()[0].close_calls, 1);
    }

    #[tokio::test]
    async fn test_cancelled_token_skips_open() {
        let fixture = DriverTestFixture::new(MockScript::echo());
        fixture.cancel.cancel();

        let report = fixture.driver().run_server_stream(10).await;

        assert_eq!(report.outcome, AttemptOutcome::Cancelled { exchanged: 0 });
        assert_eq!(fixture.client.open_calls(), 0);
    }
}
