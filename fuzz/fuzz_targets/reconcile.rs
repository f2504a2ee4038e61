#![no_main]

use std::time::SystemTime;

use bomgate_ingest::{
    BomParser, CycloneDxJsonParser, MergePolicy, Project, ProjectGraph, Reconciler,
};
use libfuzzer_sys::fuzz_target;
use uuid::Uuid;

// 파싱에 성공한 문서를 두 번 적용해 두 번째 결과가 변경 없음인지 확인
fuzz_target!(|data: &[u8]| {
    let Ok(document) = CycloneDxJsonParser.parse(data) else {
        return;
    };

    let project = Uuid::nil();
    let reconciler = Reconciler::new(MergePolicy::Overwrite);
    let Ok(first) = reconciler.reconcile(project, None, &document, SystemTime::now()) else {
        return;
    };

    let mut graph = ProjectGraph::empty(Project::new(project));
    first.metadata.apply_to(&mut graph.project);
    graph.components = first.final_components().into_iter().cloned().collect();

    let second = reconciler
        .reconcile(project, Some(graph), &document, SystemTime::now())
        .expect("reconciling a committed document must succeed");
    assert!(second.created.is_empty(), "second pass created components");
    assert!(second.removed.is_empty(), "second pass removed components");
});
