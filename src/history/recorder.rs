//! Bus subscription that feeds relayed lines into a history provider.
//!
//! Bus dispatch is synchronous, so the subscriber only converts the event
//! and `try_send`s it into a bounded queue; a writer task owns the actual
//! provider calls. A full queue drops the line rather than stalling relay.

use std::sync::Arc;

use chrono::Utc;
use slircb_proto::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{HistoryProvider, RecordedLine};
use crate::bus::{Direction, Event, EventBus, EventName};

const RECORD_QUEUE: usize = 1024;

/// Register the history subscriber and spawn its writer task.
///
/// Must be wired after any intercepting subscribers (the control surface):
/// halted lines are never relayed, so they are not recorded either.
pub fn wire_recorder(bus: &mut EventBus, provider: Arc<dyn HistoryProvider>) {
    let (tx, mut rx) = mpsc::channel::<RecordedLine>(RECORD_QUEUE);

    tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            if let Err(e) = provider.record(&line).await {
                warn!(error = %e, "Failed to record history line");
            }
        }
    });

    bus.register(EventName::IrcRaw, move |event| {
        let Event::IrcRaw(ev) = event else { return };
        if ev.halted {
            return;
        }

        // Only conversation lines carry a buffer worth replaying.
        let target = match &ev.message.command {
            Command::PRIVMSG(target, _) | Command::NOTICE(target, _) => target,
            _ => return,
        };

        let line = RecordedLine {
            user: ev.origin.user().to_string(),
            network: ev.origin.network().to_string(),
            buffer: target.clone(),
            from_client: ev.direction == Direction::FromClient,
            line: ev.message.to_string().trim_end().to_string(),
            at: Utc::now(),
        };

        if tx.try_send(line).is_err() {
            debug!("History queue full, dropping line");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{NetworkOrigin, Origin, RawLine};
    use crate::history::HistoryError;
    use chrono::{DateTime, Utc};
    use slircb_proto::Message;
    use std::sync::Mutex;
    use tokio::time::{sleep, Duration};

    struct CapturingProvider {
        lines: Mutex<Vec<RecordedLine>>,
    }

    #[async_trait::async_trait]
    impl HistoryProvider for CapturingProvider {
        async fn record(&self, line: &RecordedLine) -> Result<(), HistoryError> {
            self.lines.lock().unwrap().push(line.clone());
            Ok(())
        }

        async fn fetch_since(
            &self,
            _user: &str,
            _network: &str,
            _buffer: &str,
            _since: DateTime<Utc>,
            _limit: usize,
        ) -> Result<Vec<RecordedLine>, HistoryError> {
            Ok(Vec::new())
        }

        async fn fetch_before(
            &self,
            _user: &str,
            _network: &str,
            _buffer: &str,
            _before: DateTime<Utc>,
            _limit: usize,
        ) -> Result<Vec<RecordedLine>, HistoryError> {
            Ok(Vec::new())
        }
    }

    fn server_event(msg: Message) -> Event {
        Event::IrcRaw(RawLine::new(
            Direction::FromServer,
            Origin::Network(NetworkOrigin {
                user: "daniel".to_string(),
                network: "exampleNet".to_string(),
            }),
            msg,
        ))
    }

    #[tokio::test]
    async fn records_privmsg_lines() {
        let provider = Arc::new(CapturingProvider {
            lines: Mutex::new(Vec::new()),
        });
        let mut bus = EventBus::new();
        wire_recorder(&mut bus, Arc::clone(&provider) as Arc<dyn HistoryProvider>);

        let mut event = server_event(Message::privmsg("#chan", "hello"));
        bus.publish(EventName::IrcRaw, &mut event);

        // Give the writer task a beat to drain the queue.
        sleep(Duration::from_millis(50)).await;

        let lines = provider.lines.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].buffer, "#chan");
        assert_eq!(lines[0].network, "exampleNet");
        assert!(!lines[0].from_client);
        assert_eq!(lines[0].line, "PRIVMSG #chan :hello");
    }

    #[tokio::test]
    async fn skips_halted_and_non_conversation_lines() {
        let provider = Arc::new(CapturingProvider {
            lines: Mutex::new(Vec::new()),
        });
        let mut bus = EventBus::new();
        wire_recorder(&mut bus, Arc::clone(&provider) as Arc<dyn HistoryProvider>);

        // Halted conversation line: never relayed, never recorded.
        let mut halted = server_event(Message::privmsg("#chan", "secret"));
        if let Event::IrcRaw(ev) = &mut halted {
            ev.halt();
        }
        bus.publish(EventName::IrcRaw, &mut halted);

        // Keepalive noise is not conversation.
        let mut ping = server_event(Message::pong("token"));
        bus.publish(EventName::IrcRaw, &mut ping);

        sleep(Duration::from_millis(50)).await;
        assert!(provider.lines.lock().unwrap().is_empty());
    }
}
