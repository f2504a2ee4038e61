//! 이벤트 버스 경계
//!
//! ```text
//! ┌────────────────┐  BusRecord   ┌──────────────┐  Delivery  ┌─────────────┐
//! │ EventPublisher │ ───────────► │ mpsc channel │ ─────────► │ BusConsumer │ ──► ConsoleSink
//! └────────────────┘              └──────────────┘            └─────────────┘
//! ```
//!
//! 발행 측은 [`EventPublisher`] trait만 알고, 처리 task 사이의 통신은
//! 모두 이 경계를 통과합니다. 소비 측에서 디코딩에 실패한 레코드는
//! [`PoisonMessage`]로 보고되며 소비 루프를 멈추지 않습니다.

use std::future::Future;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use bomgate_core::event::{Event, unix_timestamp_str};
use bomgate_core::metrics as m;

use crate::error::IngestError;
use crate::event::{BusRecord, EventPayload, IngestEvent};

/// 이벤트 발행 trait
///
/// 구현체는 레코드가 버스에 수락되었을 때만 `Ok`를 반환해야 합니다.
/// 재시도와 타임아웃은 [`EventDispatcher`](crate::dispatch::EventDispatcher)가 담당합니다.
pub trait EventPublisher: Send + Sync + 'static {
    /// 레코드 하나를 발행합니다.
    fn publish(&self, record: &BusRecord) -> impl Future<Output = Result<(), IngestError>> + Send;
}

/// tokio mpsc 채널 기반 프로세스 내 버스
#[derive(Clone)]
pub struct ChannelPublisher {
    tx: mpsc::Sender<BusRecord>,
}

impl ChannelPublisher {
    /// 버스를 생성하고 소비 측 수신자를 함께 반환합니다.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<BusRecord>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl EventPublisher for ChannelPublisher {
    async fn publish(&self, record: &BusRecord) -> Result<(), IngestError> {
        self.tx
            .send(record.clone())
            .await
            .map_err(|_| IngestError::Publish {
                topic: record.topic.clone(),
                reason: "bus channel closed".to_owned(),
            })
    }
}

/// 디코딩할 수 없는 레코드
#[derive(Debug, Clone, PartialEq)]
pub struct PoisonMessage {
    pub topic: String,
    pub key: String,
    pub reason: String,
    pub value: Bytes,
}

/// 소비 측 전달 단위
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// 정상 디코딩된 이벤트
    Event(IngestEvent),
    /// 디코딩 실패
    Poison(PoisonMessage),
}

/// 버스 레코드 소비자
pub struct BusConsumer {
    rx: mpsc::Receiver<BusRecord>,
}

impl BusConsumer {
    /// 수신자로 소비자를 생성합니다.
    pub fn new(rx: mpsc::Receiver<BusRecord>) -> Self {
        Self { rx }
    }

    /// 다음 레코드를 디코딩합니다. 버스가 닫히면 `None`.
    pub async fn next(&mut self) -> Option<Delivery> {
        let record = self.rx.recv().await?;
        Some(Self::decode(record))
    }

    /// 레코드 하나를 디코딩합니다. 실패는 poison message로 변환됩니다.
    pub fn decode(record: BusRecord) -> Delivery {
        match IngestEvent::from_record(&record) {
            Ok(event) => Delivery::Event(event),
            Err(e) => {
                metrics::counter!(
                    m::DISPATCH_POISON_MESSAGES_TOTAL,
                    m::LABEL_TOPIC => record.topic.clone()
                )
                .increment(1);
                warn!(topic = %record.topic, key = %record.key, error = %e, "poison message");
                Delivery::Poison(PoisonMessage {
                    topic: record.topic,
                    key: record.key,
                    reason: e.to_string(),
                    value: record.value,
                })
            }
        }
    }
}

/// 콘솔 알림 수준
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Informational,
    Error,
}

/// 사람이 읽는 알림 한 건
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub content: String,
}

/// 소비 루프 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub events: u64,
    pub poison: u64,
}

/// 이벤트를 tracing 로그로 남기는 알림 sink
pub struct ConsoleSink;

impl ConsoleSink {
    /// 이벤트를 알림으로 변환합니다.
    pub fn notification(event: &IngestEvent) -> Notification {
        let (level, title, content) = match &event.payload {
            EventPayload::ProjectCreated(p) => (
                NotificationLevel::Informational,
                "Project Created".to_owned(),
                format!("project {} was created by a BOM upload", p.project),
            ),
            EventPayload::BomConsumed(p) => (
                NotificationLevel::Informational,
                "Bill of Materials Consumed".to_owned(),
                format!(
                    "{} document with {} component(s) accepted for project {}",
                    p.bom_format, p.component_count, p.project
                ),
            ),
            EventPayload::RepoMetaAnalysis(c) => (
                NotificationLevel::Informational,
                "Repository Metadata Analysis".to_owned(),
                format!("{} requested for component {}", c.name, c.component),
            ),
            EventPayload::VulnAnalysis(c) => (
                NotificationLevel::Informational,
                "Vulnerability Analysis".to_owned(),
                format!("{} requested for component {}", c.name, c.component),
            ),
            EventPayload::BomProcessed(p) => (
                NotificationLevel::Informational,
                "Bill of Materials Processed".to_owned(),
                format!(
                    "project {}: {} component(s), {} edge(s) ({} created, {} updated, {} removed)",
                    p.project, p.components, p.edges, p.created, p.updated, p.removed
                ),
            ),
            EventPayload::BomProcessingFailed(p) => (
                NotificationLevel::Error,
                "Bill of Materials Processing Failed".to_owned(),
                format!("project {}: {}: {}", p.project, p.kind, p.reason),
            ),
        };
        Notification {
            level,
            title,
            content,
        }
    }

    /// 전달 단위 하나를 로그로 남깁니다.
    pub fn emit(delivery: &Delivery) {
        match delivery {
            Delivery::Event(event) => {
                let n = Self::notification(event);
                let timestamp = unix_timestamp_str(event.metadata().timestamp);
                match n.level {
                    NotificationLevel::Informational => info!(
                        timestamp = %timestamp,
                        topic = event.event_type(),
                        key = %event.payload.key(),
                        trace_id = %event.metadata().trace_id,
                        title = %n.title,
                        "{}",
                        n.content
                    ),
                    NotificationLevel::Error => error!(
                        timestamp = %timestamp,
                        topic = event.event_type(),
                        key = %event.payload.key(),
                        trace_id = %event.metadata().trace_id,
                        title = %n.title,
                        "{}",
                        n.content
                    ),
                }
            }
            Delivery::Poison(p) => error!(
                topic = %p.topic,
                key = %p.key,
                bytes = p.value.len(),
                reason = %p.reason,
                "undecodable record on the bus"
            ),
        }
    }

    /// 버스가 닫힐 때까지 소비합니다.
    pub async fn run(mut consumer: BusConsumer) -> SinkStats {
        let mut stats = SinkStats::default();
        while let Some(delivery) = consumer.next().await {
            match &delivery {
                Delivery::Event(_) => stats.events += 1,
                Delivery::Poison(_) => stats.poison += 1,
            }
            Self::emit(&delivery);
        }
        stats
    }
}

/// 테스트용 Mock 발행자
///
/// 발행된 레코드를 기록하고, 지정한 토픽에서 정해진 횟수만큼 실패합니다.
#[cfg(test)]
#[derive(Default)]
pub struct MockPublisher {
    pub published: tokio::sync::Mutex<Vec<BusRecord>>,
    /// 실패시킬 토픽 (`None`이면 모든 토픽)
    pub fail_topic: Option<crate::event::Topic>,
    /// 남은 실패 횟수
    pub failures_left: std::sync::atomic::AtomicU32,
    /// 발행 전 지연
    pub delay: Option<std::time::Duration>,
}

#[cfg(test)]
impl MockPublisher {
    /// 항상 성공하는 mock 발행자를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 지정 토픽에서 `times`번 실패하도록 설정합니다.
    pub fn failing_on(mut self, topic: Option<crate::event::Topic>, times: u32) -> Self {
        self.fail_topic = topic;
        self.failures_left = std::sync::atomic::AtomicU32::new(times);
        self
    }

    /// 발행마다 지연을 추가합니다.
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// 발행된 토픽 이름 목록
    pub async fn topics(&self) -> Vec<String> {
        self.published
            .lock()
            .await
            .iter()
            .map(|r| r.topic.clone())
            .collect()
    }
}

#[cfg(test)]
impl EventPublisher for MockPublisher {
    async fn publish(&self, record: &BusRecord) -> Result<(), IngestError> {
        use std::sync::atomic::Ordering;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let targeted = self
            .fail_topic
            .is_none_or(|t| t.as_str() == record.topic);
        if targeted
            && self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(IngestError::Publish {
                topic: record.topic.clone(),
                reason: "mock broker unavailable".to_owned(),
            });
        }
        self.published.lock().await.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::event::{BomProcessingFailed, ProjectCreated, Topic};
    use uuid::Uuid;

    fn record(payload: EventPayload) -> BusRecord {
        IngestEvent::new(payload, "trace").to_record().unwrap()
    }

    #[tokio::test]
    async fn channel_publisher_delivers_in_order() {
        let (publisher, rx) = ChannelPublisher::new(8);
        let project = Uuid::new_v4();
        publisher
            .publish(&record(EventPayload::ProjectCreated(ProjectCreated {
                project,
            })))
            .await
            .unwrap();
        publisher
            .publish(&record(EventPayload::BomProcessingFailed(
                BomProcessingFailed {
                    project,
                    kind: FailureKind::Parse,
                    reason: "eof".to_owned(),
                },
            )))
            .await
            .unwrap();
        drop(publisher);

        let mut consumer = BusConsumer::new(rx);
        let first = consumer.next().await.unwrap();
        let second = consumer.next().await.unwrap();
        assert!(consumer.next().await.is_none());

        match (first, second) {
            (Delivery::Event(a), Delivery::Event(b)) => {
                assert_eq!(a.payload.topic(), Topic::ProjectCreated);
                assert_eq!(b.payload.topic(), Topic::BomProcessingFailed);
            }
            other => panic!("unexpected deliveries: {other:?}"),
        }
    }

    #[tokio::test]
    async fn publish_to_closed_bus_fails() {
        let (publisher, rx) = ChannelPublisher::new(1);
        drop(rx);
        let err = publisher
            .publish(&record(EventPayload::ProjectCreated(ProjectCreated {
                project: Uuid::new_v4(),
            })))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Publish { .. }));
    }

    #[test]
    fn undecodable_record_becomes_poison() {
        let mut bad = record(EventPayload::ProjectCreated(ProjectCreated {
            project: Uuid::new_v4(),
        }));
        bad.value = Bytes::from_static(b"[1,2,3]");
        match BusConsumer::decode(bad) {
            Delivery::Poison(p) => {
                assert_eq!(p.topic, "PROJECT_CREATED");
                assert!(p.reason.contains("array"));
            }
            Delivery::Event(e) => panic!("decoded garbage into {e:?}"),
        }
    }

    #[tokio::test]
    async fn sink_counts_events_and_poison() {
        let (publisher, rx) = ChannelPublisher::new(8);
        let good = record(EventPayload::ProjectCreated(ProjectCreated {
            project: Uuid::new_v4(),
        }));
        let mut bad = good.clone();
        bad.value = Bytes::from_static(b"not json");
        publisher.publish(&good).await.unwrap();
        publisher.publish(&bad).await.unwrap();
        publisher.publish(&good).await.unwrap();
        drop(publisher);

        let stats = ConsoleSink::run(BusConsumer::new(rx)).await;
        assert_eq!(stats, SinkStats { events: 2, poison: 1 });
    }

    #[test]
    fn failed_event_notification_is_error_level() {
        let event = IngestEvent::new(
            EventPayload::BomProcessingFailed(BomProcessingFailed {
                project: Uuid::new_v4(),
                kind: FailureKind::Persistence,
                reason: "constraint violation".to_owned(),
            }),
            "t",
        );
        let n = ConsoleSink::notification(&event);
        assert_eq!(n.level, NotificationLevel::Error);
        assert!(n.content.contains("persistence"));
    }

    #[tokio::test]
    async fn mock_publisher_fails_requested_times() {
        let publisher = MockPublisher::new().failing_on(Some(Topic::ProjectCreated), 1);
        let r = record(EventPayload::ProjectCreated(ProjectCreated {
            project: Uuid::new_v4(),
        }));
        assert!(publisher.publish(&r).await.is_err());
        assert!(publisher.publish(&r).await.is_ok());
        assert_eq!(publisher.topics().await, vec!["PROJECT_CREATED"]);
    }
}
