//! 수집 이벤트 -- 토픽, 페이로드, 버스 레코드
//!
//! 페이로드는 토픽당 하나의 변형을 가진 닫힌 열거형 [`EventPayload`]이며
//! 인코딩/디코딩/키 계산 모두 전수 매칭으로 처리됩니다.
//!
//! # 버스 레코드
//!
//! | 토픽 | 키 | 페이로드 |
//! |------|----|----------|
//! | `PROJECT_CREATED` | 프로젝트 | [`ProjectCreated`] |
//! | `BOM_CONSUMED` | 프로젝트 | [`BomConsumed`] |
//! | `REPO_META_ANALYSIS_COMPONENT` | 컴포넌트 | [`ComponentAnalysis`] |
//! | `VULN_ANALYSIS_COMPONENT` | 컴포넌트 | [`ComponentAnalysis`] |
//! | `BOM_PROCESSED` | 프로젝트 | [`BomProcessed`] |
//! | `BOM_PROCESSING_FAILED` | 프로젝트 | [`BomProcessingFailed`] |

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bomgate_core::event::{
    EVENT_TYPE_BOM_CONSUMED, EVENT_TYPE_BOM_PROCESSED, EVENT_TYPE_BOM_PROCESSING_FAILED,
    EVENT_TYPE_PROJECT_CREATED, EVENT_TYPE_REPO_META_ANALYSIS, EVENT_TYPE_VULN_ANALYSIS, Event,
    EventMetadata, MODULE_BOM_INGEST,
};

use crate::codec;
use crate::error::{FailureKind, IngestError};
use crate::model::Component;

/// 이벤트 버스 토픽
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    ProjectCreated,
    BomConsumed,
    RepoMetaAnalysis,
    VulnAnalysis,
    BomProcessed,
    BomProcessingFailed,
}

impl Topic {
    /// 모든 토픽 (발행 순서)
    pub const ALL: [Topic; 6] = [
        Topic::ProjectCreated,
        Topic::BomConsumed,
        Topic::RepoMetaAnalysis,
        Topic::VulnAnalysis,
        Topic::BomProcessed,
        Topic::BomProcessingFailed,
    ];

    /// 안정적인 토픽 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProjectCreated => EVENT_TYPE_PROJECT_CREATED,
            Self::BomConsumed => EVENT_TYPE_BOM_CONSUMED,
            Self::RepoMetaAnalysis => EVENT_TYPE_REPO_META_ANALYSIS,
            Self::VulnAnalysis => EVENT_TYPE_VULN_ANALYSIS,
            Self::BomProcessed => EVENT_TYPE_BOM_PROCESSED,
            Self::BomProcessingFailed => EVENT_TYPE_BOM_PROCESSING_FAILED,
        }
    }

    /// 토픽 이름에서 파싱합니다.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    /// 업로드 시퀀스를 끝내는 토픽인지 확인합니다.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::BomProcessed | Self::BomProcessingFailed)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `PROJECT_CREATED` 페이로드
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectCreated {
    pub project: Uuid,
}

/// `BOM_CONSUMED` 페이로드
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BomConsumed {
    pub project: Uuid,
    /// 예: "CycloneDX 1.5"
    pub bom_format: String,
    /// 문서의 컴포넌트 노드 수 (중복 포함)
    pub component_count: usize,
}

/// 컴포넌트 분석 요청 페이로드 (저장소 메타데이터, 취약점 공통)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentAnalysis {
    pub project: Uuid,
    pub component: Uuid,
    pub group: Option<String>,
    pub name: String,
    pub version: Option<String>,
    pub purl: Option<String>,
    pub cpe: Option<String>,
    pub swid_tag_id: Option<String>,
}

impl From<&Component> for ComponentAnalysis {
    fn from(c: &Component) -> Self {
        Self {
            project: c.project,
            component: c.uuid,
            group: c.attributes.group.clone(),
            name: c.attributes.name.clone(),
            version: c.attributes.version.clone(),
            purl: c.attributes.purl.clone(),
            cpe: c.attributes.cpe.clone(),
            swid_tag_id: c.attributes.swid_tag_id.clone(),
        }
    }
}

/// `BOM_PROCESSED` 페이로드
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BomProcessed {
    pub project: Uuid,
    pub bom_format: String,
    pub components: usize,
    pub edges: usize,
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
}

/// `BOM_PROCESSING_FAILED` 페이로드
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BomProcessingFailed {
    pub project: Uuid,
    pub kind: FailureKind,
    pub reason: String,
}

/// 토픽별 페이로드 (닫힌 집합)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    ProjectCreated(ProjectCreated),
    BomConsumed(BomConsumed),
    RepoMetaAnalysis(ComponentAnalysis),
    VulnAnalysis(ComponentAnalysis),
    BomProcessed(BomProcessed),
    BomProcessingFailed(BomProcessingFailed),
}

impl EventPayload {
    /// 페이로드가 발행될 토픽
    pub fn topic(&self) -> Topic {
        match self {
            Self::ProjectCreated(_) => Topic::ProjectCreated,
            Self::BomConsumed(_) => Topic::BomConsumed,
            Self::RepoMetaAnalysis(_) => Topic::RepoMetaAnalysis,
            Self::VulnAnalysis(_) => Topic::VulnAnalysis,
            Self::BomProcessed(_) => Topic::BomProcessed,
            Self::BomProcessingFailed(_) => Topic::BomProcessingFailed,
        }
    }

    /// 파티션 키 -- 분석 이벤트는 컴포넌트, 나머지는 프로젝트
    pub fn key(&self) -> Uuid {
        match self {
            Self::ProjectCreated(p) => p.project,
            Self::BomConsumed(p) => p.project,
            Self::RepoMetaAnalysis(p) | Self::VulnAnalysis(p) => p.component,
            Self::BomProcessed(p) => p.project,
            Self::BomProcessingFailed(p) => p.project,
        }
    }

    /// 이벤트가 속한 프로젝트
    pub fn project(&self) -> Uuid {
        match self {
            Self::ProjectCreated(p) => p.project,
            Self::BomConsumed(p) => p.project,
            Self::RepoMetaAnalysis(p) | Self::VulnAnalysis(p) => p.project,
            Self::BomProcessed(p) => p.project,
            Self::BomProcessingFailed(p) => p.project,
        }
    }

    /// 페이로드를 바이트로 인코딩합니다.
    pub fn encode(&self) -> Result<Bytes, IngestError> {
        match self {
            Self::ProjectCreated(p) => codec::encode(Some(p)),
            Self::BomConsumed(p) => codec::encode(Some(p)),
            Self::RepoMetaAnalysis(p) | Self::VulnAnalysis(p) => codec::encode(Some(p)),
            Self::BomProcessed(p) => codec::encode(Some(p)),
            Self::BomProcessingFailed(p) => codec::encode(Some(p)),
        }
    }

    /// 토픽에 맞는 페이로드 타입으로 디코딩합니다.
    pub fn decode(topic: Topic, bytes: &[u8]) -> Result<Self, IngestError> {
        Ok(match topic {
            Topic::ProjectCreated => Self::ProjectCreated(codec::decode(bytes)?),
            Topic::BomConsumed => Self::BomConsumed(codec::decode(bytes)?),
            Topic::RepoMetaAnalysis => Self::RepoMetaAnalysis(codec::decode(bytes)?),
            Topic::VulnAnalysis => Self::VulnAnalysis(codec::decode(bytes)?),
            Topic::BomProcessed => Self::BomProcessed(codec::decode(bytes)?),
            Topic::BomProcessingFailed => Self::BomProcessingFailed(codec::decode(bytes)?),
        })
    }
}

/// 버스로 전달되는 인코딩된 레코드 `(topic, key, value)`
#[derive(Debug, Clone, PartialEq)]
pub struct BusRecord {
    pub id: String,
    pub topic: String,
    pub key: String,
    pub value: Bytes,
    pub metadata: EventMetadata,
}

/// 수집 모듈이 생성하는 이벤트
#[derive(Debug, Clone, PartialEq)]
pub struct IngestEvent {
    pub id: String,
    pub metadata: EventMetadata,
    pub payload: EventPayload,
}

impl IngestEvent {
    /// 업로드의 trace_id로 이벤트를 생성합니다.
    pub fn new(payload: EventPayload, trace_id: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            metadata: EventMetadata::new(MODULE_BOM_INGEST, trace_id),
            payload,
        }
    }

    /// 버스 레코드로 인코딩합니다.
    pub fn to_record(&self) -> Result<BusRecord, IngestError> {
        Ok(BusRecord {
            id: self.id.clone(),
            topic: self.payload.topic().as_str().to_owned(),
            key: self.payload.key().to_string(),
            value: self.payload.encode()?,
            metadata: self.metadata.clone(),
        })
    }

    /// 버스 레코드를 디코딩합니다.
    ///
    /// 알 수 없는 토픽, 스키마 불일치, 키 불일치는 모두 직렬화 에러입니다.
    pub fn from_record(record: &BusRecord) -> Result<Self, IngestError> {
        let topic = Topic::from_name(&record.topic).ok_or_else(|| {
            IngestError::Serialization(format!("unknown topic '{}'", record.topic))
        })?;
        let payload = EventPayload::decode(topic, &record.value)?;
        if payload.key().to_string() != record.key {
            return Err(IngestError::Serialization(format!(
                "record key '{}' does not match payload",
                record.key
            )));
        }
        Ok(Self {
            id: record.id.clone(),
            metadata: record.metadata.clone(),
            payload,
        })
    }
}

impl Event for IngestEvent {
    fn event_id(&self) -> &str {
        &self.id
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn event_type(&self) -> &str {
        self.payload.topic().as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ComponentAttributes;

    fn analysis() -> ComponentAnalysis {
        let component = Component {
            uuid: Uuid::new_v4(),
            project: Uuid::new_v4(),
            attributes: ComponentAttributes {
                group: Some("com.example".to_owned()),
                version: Some("1.0.0".to_owned()),
                purl: Some("pkg:maven/com.example/xmlutil@1.0.0".to_owned()),
                ..ComponentAttributes::named("xmlutil")
            },
        };
        ComponentAnalysis::from(&component)
    }

    fn all_payloads() -> Vec<EventPayload> {
        let project = Uuid::new_v4();
        vec![
            EventPayload::ProjectCreated(ProjectCreated { project }),
            EventPayload::BomConsumed(BomConsumed {
                project,
                bom_format: "CycloneDX 1.5".to_owned(),
                component_count: 3,
            }),
            EventPayload::RepoMetaAnalysis(analysis()),
            EventPayload::VulnAnalysis(analysis()),
            EventPayload::BomProcessed(BomProcessed {
                project,
                bom_format: "CycloneDX 1.5".to_owned(),
                components: 1,
                edges: 0,
                created: 1,
                updated: 0,
                removed: 0,
            }),
            EventPayload::BomProcessingFailed(BomProcessingFailed {
                project,
                kind: FailureKind::Parse,
                reason: "unexpected end of input".to_owned(),
            }),
        ]
    }

    #[test]
    fn topic_names_are_stable() {
        let names: Vec<_> = Topic::ALL.iter().map(Topic::as_str).collect();
        assert_eq!(
            names,
            vec![
                "PROJECT_CREATED",
                "BOM_CONSUMED",
                "REPO_META_ANALYSIS_COMPONENT",
                "VULN_ANALYSIS_COMPONENT",
                "BOM_PROCESSED",
                "BOM_PROCESSING_FAILED",
            ]
        );
        for topic in Topic::ALL {
            assert_eq!(Topic::from_name(topic.as_str()), Some(topic));
        }
        assert_eq!(Topic::from_name("BOM_UPLOADED"), None);
    }

    #[test]
    fn only_processed_and_failed_are_terminal() {
        let terminal: Vec<_> = Topic::ALL.into_iter().filter(Topic::is_terminal).collect();
        assert_eq!(terminal, vec![Topic::BomProcessed, Topic::BomProcessingFailed]);
    }

    #[test]
    fn every_payload_survives_the_bus() {
        for payload in all_payloads() {
            let event = IngestEvent::new(payload, "trace-1");
            let record = event.to_record().unwrap();
            assert_eq!(record.topic, event.event_type());
            let back = IngestEvent::from_record(&record).unwrap();
            assert_eq!(back, event);
        }
    }

    #[test]
    fn analysis_events_are_keyed_by_component() {
        let a = analysis();
        let payload = EventPayload::VulnAnalysis(a.clone());
        assert_eq!(payload.key(), a.component);
        assert_eq!(payload.project(), a.project);
    }

    #[test]
    fn payload_decoded_under_wrong_topic_fails() {
        let payload = EventPayload::ProjectCreated(ProjectCreated {
            project: Uuid::new_v4(),
        });
        let bytes = payload.encode().unwrap();
        let err = EventPayload::decode(Topic::VulnAnalysis, &bytes).unwrap_err();
        assert!(matches!(err, IngestError::Serialization(_)));
    }

    #[test]
    fn richer_payload_decoded_as_project_created_fails() {
        // 필드가 더 많은 페이로드도 다른 토픽으로 해석되면 안 됨
        for payload in all_payloads() {
            if payload.topic() == Topic::ProjectCreated {
                continue;
            }
            let bytes = payload.encode().unwrap();
            let err = EventPayload::decode(Topic::ProjectCreated, &bytes).unwrap_err();
            assert!(matches!(err, IngestError::Serialization(_)), "{}", payload.topic());
        }
    }

    #[test]
    fn payload_with_extra_field_is_rejected() {
        let json = format!(
            r#"{{"project":"{}","bom_format":"CycloneDX 1.5","component_count":1,"extra":true}}"#,
            Uuid::new_v4()
        );
        assert!(EventPayload::decode(Topic::BomConsumed, json.as_bytes()).is_err());
    }

    #[test]
    fn record_relabelled_to_another_project_topic_is_rejected() {
        let processed = all_payloads().remove(4);
        let mut record = IngestEvent::new(processed, "t").to_record().unwrap();
        record.topic = Topic::ProjectCreated.as_str().to_owned();
        assert!(IngestEvent::from_record(&record).is_err());
    }

    #[test]
    fn record_with_unknown_topic_is_rejected() {
        let mut record = IngestEvent::new(all_payloads().remove(0), "t")
            .to_record()
            .unwrap();
        record.topic = "NEW_VULNERABILITY".to_owned();
        let err = IngestEvent::from_record(&record).unwrap_err();
        assert!(err.to_string().contains("NEW_VULNERABILITY"));
    }

    #[test]
    fn record_with_mismatched_key_is_rejected() {
        let mut record = IngestEvent::new(all_payloads().remove(0), "t")
            .to_record()
            .unwrap();
        record.key = Uuid::new_v4().to_string();
        assert!(IngestEvent::from_record(&record).is_err());
    }
}
