//! 컴포넌트 조정기 -- 새 문서 그래프와 커밋된 그래프의 차이 계산
//!
//! 입력은 커밋된 그래프 스냅샷(값으로 전달), 파싱된 문서, 수집 시각이며
//! 출력은 불변의 [`ReconciliationResult`]입니다. 전역 상태는 없습니다.
//!
//! # 매칭 단계
//!
//! ```text
//! 문서 노드 (중복 식별자는 하나로 병합)
//!    │
//!    ├─ 1. 좌표 일치 (purl/cpe/swid)
//!    ├─ 2. (group, name, version) 튜플 일치   -- 한쪽이라도 좌표가 없을 때만
//!    └─ 3. 버전 없는 패키지 키 일치           -- 양쪽 모두 후보가 하나일 때만
//!
//! 매칭됨 → update (UUID 유지)   매칭 안 됨 → create   남은 기존 컴포넌트 → remove
//! ```
//!
//! 간선은 문서의 의존성 목록에서 매번 새로 만듭니다.
//! 문서 대상(metadata.component)에서 나가는 간선은 프로젝트의 직접 의존성이 됩니다.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::IngestError;
use crate::model::{
    Classifier, Component, ComponentAttributes, ComponentIdentity, DependencyEdge,
    ExternalReference, ParsedDocument, Project, ProjectGraph,
};

/// 재관측된 컴포넌트의 속성 병합 정책
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// 들어온 값으로 무조건 덮어씁니다 (비어 있는 값 포함).
    #[default]
    Overwrite,
    /// 들어온 값이 비어 있으면 기존 값을 유지합니다.
    NonNull,
}

impl MergePolicy {
    /// 문자열에서 정책을 파싱합니다 (대소문자 구분 없음).
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "overwrite" => Some(Self::Overwrite),
            "non_null" | "nonnull" => Some(Self::NonNull),
            _ => None,
        }
    }

    /// 기존 속성에 들어온 속성을 병합합니다.
    pub fn merge(
        &self,
        existing: &ComponentAttributes,
        incoming: &ComponentAttributes,
    ) -> ComponentAttributes {
        match self {
            Self::Overwrite => incoming.clone(),
            Self::NonNull => {
                let pick = |new: &Option<String>, old: &Option<String>| {
                    new.clone().or_else(|| old.clone())
                };
                ComponentAttributes {
                    author: pick(&incoming.author, &existing.author),
                    publisher: pick(&incoming.publisher, &existing.publisher),
                    group: pick(&incoming.group, &existing.group),
                    name: incoming.name.clone(),
                    version: pick(&incoming.version, &existing.version),
                    description: pick(&incoming.description, &existing.description),
                    license_url: pick(&incoming.license_url, &existing.license_url),
                    purl: pick(&incoming.purl, &existing.purl),
                    cpe: pick(&incoming.cpe, &existing.cpe),
                    swid_tag_id: pick(&incoming.swid_tag_id, &existing.swid_tag_id),
                }
            }
        }
    }
}

/// 재관측으로 갱신되는 컴포넌트
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentUpdate {
    pub before: Component,
    pub after: Component,
}

impl ComponentUpdate {
    /// 해석된 좌표가 바뀌었는지 확인합니다 (저장소 메타데이터 재분석 대상).
    pub fn coordinate_changed(&self) -> bool {
        self.before.attributes.coordinate() != self.after.attributes.coordinate()
    }
}

/// 프로젝트 메타데이터 변경분
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectMetadataDelta {
    /// `None`이면 기존 분류 유지
    pub classifier: Option<Classifier>,
    pub last_bom_import: SystemTime,
    pub last_bom_import_format: String,
    /// 문서의 외부 참조로 전체 교체
    pub external_references: Vec<ExternalReference>,
    pub direct_dependencies: Vec<Uuid>,
}

impl ProjectMetadataDelta {
    /// 프로젝트에 변경분을 적용합니다.
    pub fn apply_to(&self, project: &mut Project) {
        if let Some(classifier) = self.classifier {
            project.classifier = Some(classifier);
        }
        project.last_bom_import = Some(self.last_bom_import);
        project.last_bom_import_format = Some(self.last_bom_import_format.clone());
        project.external_references = self.external_references.clone();
        project.direct_dependencies = self.direct_dependencies.clone();
    }
}

/// 조정 결과 -- 트랜잭션 매니저의 입력
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationResult {
    pub project: Uuid,
    pub created: Vec<Component>,
    pub updated: Vec<ComponentUpdate>,
    pub removed: Vec<Component>,
    pub edges: BTreeSet<DependencyEdge>,
    pub metadata: ProjectMetadataDelta,
}

impl ReconciliationResult {
    /// 커밋 후 그래프에 남을 컴포넌트를 식별자 순으로 반환합니다.
    pub fn final_components(&self) -> Vec<&Component> {
        let mut all: Vec<&Component> = self
            .created
            .iter()
            .chain(self.updated.iter().map(|u| &u.after))
            .collect();
        all.sort_by_cached_key(|c| c.identity());
        all
    }

    /// 저장소 메타데이터 분석 대상 (생성 또는 좌표 변경)을 식별자 순으로 반환합니다.
    pub fn repo_meta_targets(&self) -> Vec<&Component> {
        let mut targets: Vec<&Component> = self
            .created
            .iter()
            .chain(
                self.updated
                    .iter()
                    .filter(|u| u.coordinate_changed())
                    .map(|u| &u.after),
            )
            .collect();
        targets.sort_by_cached_key(|c| c.identity());
        targets
    }
}

/// 문서 내에서 식별자로 병합된 노드
struct IncomingNode {
    attributes: ComponentAttributes,
}

/// 컴포넌트 조정기
#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler {
    policy: MergePolicy,
}

impl Reconciler {
    /// 병합 정책으로 조정기를 생성합니다.
    pub fn new(policy: MergePolicy) -> Self {
        Self { policy }
    }

    /// 설정된 병합 정책을 반환합니다.
    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    /// 커밋된 그래프와 문서의 차이를 계산합니다.
    ///
    /// 빈 문서는 기존 컴포넌트를 모두 제거합니다 (전체 교체 의미론).
    pub fn reconcile(
        &self,
        project: Uuid,
        snapshot: Option<ProjectGraph>,
        document: &ParsedDocument,
        ingested_at: SystemTime,
    ) -> Result<ReconciliationResult, IngestError> {
        let (incoming, ref_index) = self.collect_incoming(document)?;

        let existing: Vec<Component> = snapshot.map(|g| g.components).unwrap_or_default();
        let matches = match_existing(&incoming, &existing);

        // create / update
        let mut taken = vec![false; existing.len()];
        let mut uuids = Vec::with_capacity(incoming.len());
        let mut created = Vec::new();
        let mut updated = Vec::new();

        for (node, matched) in incoming.iter().zip(&matches) {
            match matched {
                Some(e) => {
                    taken[*e] = true;
                    let before = existing[*e].clone();
                    let after = Component {
                        uuid: before.uuid,
                        project,
                        attributes: self.policy.merge(&before.attributes, &node.attributes),
                    };
                    uuids.push(before.uuid);
                    updated.push(ComponentUpdate { before, after });
                }
                None => {
                    let component = Component {
                        uuid: Uuid::new_v4(),
                        project,
                        attributes: node.attributes.clone(),
                    };
                    uuids.push(component.uuid);
                    created.push(component);
                }
            }
        }

        let removed: Vec<Component> = existing
            .into_iter()
            .zip(taken)
            .filter_map(|(c, t)| (!t).then_some(c))
            .collect();

        check_unique_identities(&created, &updated)?;

        let root_ref = document.root.as_ref().and_then(|r| r.bom_ref.as_deref());
        let (edges, direct_dependencies) =
            build_edges(document, root_ref, &ref_index, &uuids)?;

        debug!(
            project = %project,
            created = created.len(),
            updated = updated.len(),
            removed = removed.len(),
            edges = edges.len(),
            "reconciliation computed"
        );

        Ok(ReconciliationResult {
            project,
            created,
            updated,
            removed,
            edges,
            metadata: ProjectMetadataDelta {
                classifier: document.classifier(),
                last_bom_import: ingested_at,
                last_bom_import_format: document.import_format_label(),
                external_references: document.external_references.clone(),
                direct_dependencies,
            },
        })
    }

    /// 문서 노드를 평탄화하고 같은 식별자의 노드를 병합합니다.
    ///
    /// 첫 번째 노드가 식별자를 유지하고 이후 노드의 속성은 병합 정책으로 합쳐집니다.
    fn collect_incoming(
        &self,
        document: &ParsedDocument,
    ) -> Result<(Vec<IncomingNode>, HashMap<String, usize>), IngestError> {
        let mut incoming: Vec<IncomingNode> = Vec::new();
        let mut by_identity: HashMap<ComponentIdentity, usize> = HashMap::new();
        let mut ref_index: HashMap<String, usize> = HashMap::new();
        let mut unnamed = Vec::new();
        let mut conflicting_refs = BTreeSet::new();

        for node in document.flatten() {
            if node.attributes.name.trim().is_empty() {
                unnamed.push(
                    node.bom_ref
                        .clone()
                        .unwrap_or_else(|| "<unnamed>".to_owned()),
                );
                continue;
            }

            let identity = node.attributes.identity();
            let idx = match by_identity.get(&identity) {
                Some(&i) => {
                    debug!(identity = %identity, "duplicate component in document, merging");
                    incoming[i].attributes =
                        self.policy.merge(&incoming[i].attributes, &node.attributes);
                    i
                }
                None => {
                    incoming.push(IncomingNode {
                        attributes: node.attributes.clone(),
                    });
                    by_identity.insert(identity, incoming.len() - 1);
                    incoming.len() - 1
                }
            };

            if let Some(bom_ref) = &node.bom_ref {
                if let Some(prev) = ref_index.insert(bom_ref.clone(), idx) {
                    if prev != idx {
                        conflicting_refs.insert(bom_ref.clone());
                    }
                }
            }
        }

        if !unnamed.is_empty() {
            return Err(IngestError::Reconciliation {
                reason: "component without a name".to_owned(),
                identities: unnamed,
            });
        }

        if !conflicting_refs.is_empty() {
            return Err(IngestError::Reconciliation {
                reason: "bom-ref shared by different components".to_owned(),
                identities: conflicting_refs.into_iter().collect(),
            });
        }

        Ok((incoming, ref_index))
    }
}

/// 문서 노드별로 매칭된 기존 컴포넌트 인덱스를 계산합니다.
fn match_existing(incoming: &[IncomingNode], existing: &[Component]) -> Vec<Option<usize>> {
    let mut matches: Vec<Option<usize>> = vec![None; incoming.len()];
    let mut taken = vec![false; existing.len()];

    // 1. 좌표
    let mut coordinate_index: HashMap<String, usize> = HashMap::new();
    for (i, c) in existing.iter().enumerate() {
        if let Some(coordinate) = c.attributes.coordinate() {
            coordinate_index.entry(coordinate).or_insert(i);
        }
    }
    for (n, node) in incoming.iter().enumerate() {
        if let Some(coordinate) = node.attributes.coordinate() {
            if let Some(&e) = coordinate_index.get(&coordinate) {
                if !taken[e] {
                    taken[e] = true;
                    matches[n] = Some(e);
                }
            }
        }
    }

    // 2. 튜플 -- 양쪽 모두 좌표가 있고 서로 다르면 다른 패키지로 봄
    let mut tuple_index: HashMap<ComponentIdentity, Vec<usize>> = HashMap::new();
    for (i, c) in existing.iter().enumerate() {
        tuple_index
            .entry(c.attributes.tuple_identity())
            .or_default()
            .push(i);
    }
    for (n, node) in incoming.iter().enumerate() {
        if matches[n].is_some() {
            continue;
        }
        let Some(candidates) = tuple_index.get(&node.attributes.tuple_identity()) else {
            continue;
        };
        let incoming_has_coordinate = node.attributes.coordinate().is_some();
        let found = candidates.iter().copied().find(|&e| {
            !taken[e] && !(incoming_has_coordinate && existing[e].attributes.coordinate().is_some())
        });
        if let Some(e) = found {
            taken[e] = true;
            matches[n] = Some(e);
        }
    }

    // 3. 버전 없는 패키지 키 -- 양쪽 후보가 정확히 하나일 때만
    let mut existing_by_package: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, c) in existing.iter().enumerate() {
        if !taken[i] {
            existing_by_package
                .entry(c.attributes.package_key())
                .or_default()
                .push(i);
        }
    }
    let mut incoming_by_package: HashMap<String, Vec<usize>> = HashMap::new();
    for (n, node) in incoming.iter().enumerate() {
        if matches[n].is_none() {
            incoming_by_package
                .entry(node.attributes.package_key())
                .or_default()
                .push(n);
        }
    }
    for (key, nodes) in &incoming_by_package {
        if let ([n], Some([e])) = (
            nodes.as_slice(),
            existing_by_package.get(key).map(Vec::as_slice),
        ) {
            matches[*n] = Some(*e);
        }
    }

    matches
}

/// 커밋 후 그래프에서 식별자가 유일한지 검증합니다.
///
/// `non_null` 정책에서는 기존 좌표가 남아 식별자가 겹칠 수 있습니다.
fn check_unique_identities(
    created: &[Component],
    updated: &[ComponentUpdate],
) -> Result<(), IngestError> {
    let mut seen = HashSet::new();
    let mut collisions = BTreeSet::new();
    for component in created.iter().chain(updated.iter().map(|u| &u.after)) {
        let identity = component.identity();
        if !seen.insert(identity.clone()) {
            collisions.insert(identity.to_string());
        }
    }
    if collisions.is_empty() {
        Ok(())
    } else {
        Err(IngestError::Reconciliation {
            reason: "component identity collision after merge".to_owned(),
            identities: collisions.into_iter().collect(),
        })
    }
}

/// 문서의 의존성 목록으로 간선과 프로젝트 직접 의존성을 만듭니다.
fn build_edges(
    document: &ParsedDocument,
    root_ref: Option<&str>,
    ref_index: &HashMap<String, usize>,
    uuids: &[Uuid],
) -> Result<(BTreeSet<DependencyEdge>, Vec<Uuid>), IngestError> {
    let mut edges = BTreeSet::new();
    let mut direct = Vec::new();
    let mut unknown = BTreeSet::new();

    let mut resolve = |bom_ref: &str| -> Option<Uuid> {
        match ref_index.get(bom_ref) {
            Some(&idx) => Some(uuids[idx]),
            None => {
                unknown.insert(bom_ref.to_owned());
                None
            }
        }
    };

    for dependency in &document.dependencies {
        if Some(dependency.bom_ref.as_str()) == root_ref {
            for target in &dependency.depends_on {
                if let Some(to) = resolve(target) {
                    if !direct.contains(&to) {
                        direct.push(to);
                    }
                }
            }
            continue;
        }

        let from = resolve(&dependency.bom_ref);
        for target in &dependency.depends_on {
            if Some(target.as_str()) == root_ref {
                debug!(from = %dependency.bom_ref, "dependency on the document root ignored");
                continue;
            }
            let to = resolve(target);
            if let (Some(from), Some(to)) = (from, to) {
                if from == to {
                    debug!(bom_ref = %dependency.bom_ref, "self-loop dropped");
                    continue;
                }
                edges.insert(DependencyEdge { from, to });
            }
        }
    }

    if !unknown.is_empty() {
        return Err(IngestError::Reconciliation {
            reason: "dependency references unknown bom-ref".to_owned(),
            identities: unknown.into_iter().collect(),
        });
    }

    Ok((edges, direct))
}
