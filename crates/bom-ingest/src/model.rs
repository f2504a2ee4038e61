//! 도메인 타입 -- 프로젝트, 컴포넌트, 의존성 간선, 파싱된 BOM 문서
//!
//! 컴포넌트 식별은 [`ComponentIdentity`]로 통일됩니다.
//!
//! 1. 패키지 좌표 (purl, 없으면 cpe, 없으면 swid tag id)
//! 2. 좌표가 없으면 `(group, name, version)` 튜플
//!
//! purl은 식별에 사용할 때 qualifier(`?...`)와 subpath(`#...`)를 제거한
//! 정규형으로 비교합니다. 저장되는 purl 원문은 그대로 유지합니다.

use std::collections::BTreeSet;
use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 프로젝트 분류 (문서 최상위 컴포넌트 type에서 유도)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classifier {
    Application,
    Framework,
    Library,
    Container,
    Platform,
    OperatingSystem,
    Device,
    DeviceDriver,
    Firmware,
    File,
    MachineLearningModel,
    Data,
}

impl Classifier {
    /// CycloneDX component type 문자열에서 분류를 파싱합니다 (대소문자 구분 없음).
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "application" => Some(Self::Application),
            "framework" => Some(Self::Framework),
            "library" => Some(Self::Library),
            "container" => Some(Self::Container),
            "platform" => Some(Self::Platform),
            "operating-system" => Some(Self::OperatingSystem),
            "device" => Some(Self::Device),
            "device-driver" => Some(Self::DeviceDriver),
            "firmware" => Some(Self::Firmware),
            "file" => Some(Self::File),
            "machine-learning-model" => Some(Self::MachineLearningModel),
            "data" => Some(Self::Data),
            _ => None,
        }
    }
}

impl fmt::Display for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Application => "APPLICATION",
            Self::Framework => "FRAMEWORK",
            Self::Library => "LIBRARY",
            Self::Container => "CONTAINER",
            Self::Platform => "PLATFORM",
            Self::OperatingSystem => "OPERATING_SYSTEM",
            Self::Device => "DEVICE",
            Self::DeviceDriver => "DEVICE_DRIVER",
            Self::Firmware => "FIRMWARE",
            Self::File => "FILE",
            Self::MachineLearningModel => "MACHINE_LEARNING_MODEL",
            Self::Data => "DATA",
        };
        f.write_str(s)
    }
}

/// BOM 문서 형식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BomFormat {
    /// CycloneDX JSON
    #[serde(rename = "cyclonedx-json")]
    CycloneDxJson,
    /// CycloneDX XML
    #[serde(rename = "cyclonedx-xml")]
    CycloneDxXml,
    /// SPDX JSON
    #[serde(rename = "spdx-json")]
    SpdxJson,
}

impl BomFormat {
    /// 설정 파일 및 이벤트에서 사용하는 형식 이름을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CycloneDxJson => "cyclonedx-json",
            Self::CycloneDxXml => "cyclonedx-xml",
            Self::SpdxJson => "spdx-json",
        }
    }

    /// 형식 이름에서 파싱합니다 (대소문자 구분 없음).
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "cyclonedx-json" | "cyclonedx" | "cdx-json" => Some(Self::CycloneDxJson),
            "cyclonedx-xml" | "cdx-xml" => Some(Self::CycloneDxXml),
            "spdx-json" | "spdx" => Some(Self::SpdxJson),
            _ => None,
        }
    }

    /// 업로드 요청에 선언된 content type에서 형식을 결정합니다.
    ///
    /// `; version=1.5` 같은 매개변수는 무시합니다. 형식 이름 자체도 허용합니다.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        match mime.as_str() {
            "application/vnd.cyclonedx+json" | "application/json" => Some(Self::CycloneDxJson),
            "application/vnd.cyclonedx+xml" | "application/xml" | "text/xml" => {
                Some(Self::CycloneDxXml)
            }
            "application/spdx+json" => Some(Self::SpdxJson),
            other => Self::from_str_loose(other),
        }
    }
}

impl fmt::Display for BomFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 외부 참조 (VCS, 웹사이트, 이슈 트래커 등)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalReference {
    /// 참조 종류 (예: "vcs", "website")
    pub ref_type: String,
    /// 참조 URL
    pub url: String,
    /// 설명
    pub comment: Option<String>,
}

/// 프로젝트 -- 저장소가 소유하며 이벤트에서는 UUID로만 참조됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// 프로젝트 식별자
    pub uuid: Uuid,
    /// 분류
    pub classifier: Option<Classifier>,
    /// 마지막 BOM 수집 시각
    pub last_bom_import: Option<SystemTime>,
    /// 마지막 BOM 수집 형식 (예: "CycloneDX 1.5")
    pub last_bom_import_format: Option<String>,
    /// 외부 참조 (문서 순서 유지)
    pub external_references: Vec<ExternalReference>,
    /// 프로젝트가 직접 의존하는 컴포넌트
    pub direct_dependencies: Vec<Uuid>,
}

impl Project {
    /// 속성이 비어 있는 새 프로젝트를 생성합니다.
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            classifier: None,
            last_bom_import: None,
            last_bom_import_format: None,
            external_references: Vec::new(),
            direct_dependencies: Vec::new(),
        }
    }
}

/// 컴포넌트의 변경 가능한 속성 묶음
///
/// 파싱된 노드와 저장된 컴포넌트가 같은 구조를 공유하므로
/// 식별 규칙과 병합 규칙이 한 곳에 모입니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentAttributes {
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub group: Option<String>,
    pub name: String,
    pub version: Option<String>,
    pub description: Option<String>,
    pub license_url: Option<String>,
    pub purl: Option<String>,
    pub cpe: Option<String>,
    pub swid_tag_id: Option<String>,
}

impl ComponentAttributes {
    /// 이름만 가진 속성을 생성합니다.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// 해석된 패키지 좌표를 반환합니다 (purl > cpe > swid).
    pub fn coordinate(&self) -> Option<String> {
        if let Some(purl) = non_empty(&self.purl) {
            return Some(canonical_purl(purl));
        }
        if let Some(cpe) = non_empty(&self.cpe) {
            return Some(cpe.to_owned());
        }
        non_empty(&self.swid_tag_id).map(|tag| format!("swid:{tag}"))
    }

    /// 프로젝트 내 식별자를 반환합니다.
    pub fn identity(&self) -> ComponentIdentity {
        match self.coordinate() {
            Some(coordinate) => ComponentIdentity::Coordinate(coordinate),
            None => self.tuple_identity(),
        }
    }

    /// `(group, name, version)` 튜플 식별자를 반환합니다.
    pub fn tuple_identity(&self) -> ComponentIdentity {
        ComponentIdentity::Tuple {
            group: self.group.clone().unwrap_or_default(),
            name: self.name.clone(),
            version: self.version.clone().unwrap_or_default(),
        }
    }

    /// 버전을 제외한 패키지 식별자를 반환합니다.
    ///
    /// purl이 있으면 `type/namespace/name`, 없으면 `group/name`입니다.
    pub fn package_key(&self) -> String {
        if let Some(purl) = non_empty(&self.purl) {
            let canonical = canonical_purl(purl);
            let versionless = match canonical.rfind('@') {
                // npm scope의 '@'(`pkg:npm/%40scope` 또는 `/@scope`)는 마지막 '/' 앞에 있음
                Some(at) if canonical[at..].find('/').is_none() => &canonical[..at],
                _ => canonical.as_str(),
            };
            return format!("purl:{versionless}");
        }
        format!(
            "gn:{}/{}",
            self.group.as_deref().unwrap_or_default(),
            self.name
        )
    }
}

/// 컴포넌트 식별자
///
/// 정렬 순서가 이벤트 발행 순서("좌표 정렬")를 결정합니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ComponentIdentity {
    /// 정규화된 패키지 좌표
    Coordinate(String),
    /// 좌표가 없는 컴포넌트의 튜플
    Tuple {
        group: String,
        name: String,
        version: String,
    },
}

impl fmt::Display for ComponentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Coordinate(c) => f.write_str(c),
            Self::Tuple {
                group,
                name,
                version,
            } => {
                if group.is_empty() {
                    write!(f, "{name}@{version}")
                } else {
                    write!(f, "{group}:{name}@{version}")
                }
            }
        }
    }
}

/// 저장된 컴포넌트
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    /// 내부 식별자 (갱신 시 유지)
    pub uuid: Uuid,
    /// 소속 프로젝트
    pub project: Uuid,
    /// 속성
    pub attributes: ComponentAttributes,
}

impl Component {
    /// 프로젝트 내 식별자를 반환합니다.
    pub fn identity(&self) -> ComponentIdentity {
        self.attributes.identity()
    }
}

/// 프로젝트 그래프 내 방향 간선 (from이 to에 의존)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub from: Uuid,
    pub to: Uuid,
}

/// 커밋된 프로젝트 그래프
///
/// 컴포넌트는 식별자 순으로 정렬되어 있습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectGraph {
    pub project: Project,
    pub components: Vec<Component>,
    pub edges: BTreeSet<DependencyEdge>,
}

impl ProjectGraph {
    /// 컴포넌트가 없는 그래프를 생성합니다.
    pub fn empty(project: Project) -> Self {
        Self {
            project,
            components: Vec::new(),
            edges: BTreeSet::new(),
        }
    }

    /// UUID로 컴포넌트를 찾습니다.
    pub fn component(&self, uuid: Uuid) -> Option<&Component> {
        self.components.iter().find(|c| c.uuid == uuid)
    }

    /// 컴포넌트 수를 반환합니다.
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// 컴포넌트를 식별자 순으로 정렬합니다.
    pub fn sort_components(&mut self) {
        self.components.sort_by_cached_key(Component::identity);
    }
}

/// 파싱된 컴포넌트 노드 (중첩 트리)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedComponent {
    /// 문서 내 참조 키
    pub bom_ref: Option<String>,
    /// 컴포넌트 type에서 유도한 분류
    pub classifier: Option<Classifier>,
    /// 속성
    pub attributes: ComponentAttributes,
    /// 하위 컴포넌트
    pub children: Vec<ParsedComponent>,
}

impl ParsedComponent {
    /// 속성으로 리프 노드를 생성합니다.
    pub fn new(bom_ref: Option<&str>, attributes: ComponentAttributes) -> Self {
        Self {
            bom_ref: bom_ref.map(str::to_owned),
            classifier: None,
            attributes,
            children: Vec::new(),
        }
    }
}

/// 문서의 의존성 목록 항목
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDependency {
    pub bom_ref: String,
    pub depends_on: Vec<String>,
}

/// 파싱 경계가 반환하는 정규화된 BOM 문서
///
/// 처리 중에만 존재하며 저장되지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDocument {
    pub format: BomFormat,
    pub spec_version: Option<String>,
    /// 문서가 기술하는 대상 (metadata.component)
    pub root: Option<ParsedComponent>,
    /// 컴포넌트 forest (문서 순서)
    pub components: Vec<ParsedComponent>,
    pub dependencies: Vec<ParsedDependency>,
    pub external_references: Vec<ExternalReference>,
}

impl ParsedDocument {
    /// 빈 문서를 생성합니다.
    pub fn empty(format: BomFormat) -> Self {
        Self {
            format,
            spec_version: None,
            root: None,
            components: Vec::new(),
            dependencies: Vec::new(),
            external_references: Vec::new(),
        }
    }

    /// 중첩 트리를 문서 순서(전위 순회)로 평탄화합니다.
    pub fn flatten(&self) -> Vec<&ParsedComponent> {
        let mut out = Vec::new();
        let mut stack: Vec<&ParsedComponent> = self.components.iter().rev().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(node.children.iter().rev());
        }
        out
    }

    /// 문서 최상위 컴포넌트의 분류 힌트
    pub fn classifier(&self) -> Option<Classifier> {
        self.root.as_ref().and_then(|r| r.classifier)
    }

    /// `lastBomImportFormat`에 기록할 문자열 (예: "CycloneDX 1.5")
    pub fn import_format_label(&self) -> String {
        let name = match self.format {
            BomFormat::CycloneDxJson | BomFormat::CycloneDxXml => "CycloneDX",
            BomFormat::SpdxJson => "SPDX",
        };
        match &self.spec_version {
            Some(v) => format!("{name} {v}"),
            None => name.to_owned(),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// 식별용 정규 purl을 반환합니다.
///
/// subpath와 qualifier를 제거하고 `pkg:type` 부분만 소문자로 바꿉니다.
pub fn canonical_purl(purl: &str) -> String {
    let trimmed = purl.trim();
    let without_subpath = trimmed.split('#').next().unwrap_or_default();
    let without_qualifiers = without_subpath.split('?').next().unwrap_or_default();

    match without_qualifiers.split_once('/') {
        Some((scheme_type, rest)) => format!("{}/{}", scheme_type.to_lowercase(), rest),
        None => without_qualifiers.to_lowercase(),
    }
}
