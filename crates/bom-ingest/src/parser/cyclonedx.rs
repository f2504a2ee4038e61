//! CycloneDX JSON 파서
//!
//! `metadata.component`(문서 대상), `components`(중첩 forest),
//! `dependencies`, `externalReferences`를 [`ParsedDocument`]로 변환합니다.

use serde::Deserialize;

use crate::error::IngestError;
use crate::model::{
    BomFormat, Classifier, ComponentAttributes, ExternalReference, ParsedComponent,
    ParsedDependency, ParsedDocument,
};
use crate::parser::BomParser;

/// CycloneDX JSON 파서
pub struct CycloneDxJsonParser;

impl BomParser for CycloneDxJsonParser {
    fn format(&self) -> BomFormat {
        BomFormat::CycloneDxJson
    }

    fn parse(&self, bytes: &[u8]) -> Result<ParsedDocument, IngestError> {
        let bom: CdxBom = serde_json::from_slice(bytes)
            .map_err(|e| IngestError::parse(BomFormat::CycloneDxJson.as_str(), e.to_string()))?;

        if !bom.bom_format.eq_ignore_ascii_case("CycloneDX") {
            return Err(IngestError::parse(
                BomFormat::CycloneDxJson.as_str(),
                format!("unexpected bomFormat '{}'", bom.bom_format),
            ));
        }

        let (root, root_refs) = match bom.metadata.and_then(|m| m.component) {
            Some(mut component) => {
                let refs = component.external_references.take();
                (Some(convert_component(component)), refs)
            }
            None => (None, None),
        };

        // 프로젝트 외부 참조: 대상 컴포넌트 것이 우선, 없으면 문서 최상위
        let external_references = root_refs
            .or(bom.external_references)
            .unwrap_or_default()
            .into_iter()
            .map(convert_external_reference)
            .collect();

        Ok(ParsedDocument {
            format: BomFormat::CycloneDxJson,
            spec_version: Some(bom.spec_version),
            root,
            components: bom
                .components
                .unwrap_or_default()
                .into_iter()
                .map(convert_component)
                .collect(),
            dependencies: bom
                .dependencies
                .unwrap_or_default()
                .into_iter()
                .map(|d| ParsedDependency {
                    bom_ref: d.ref_field,
                    depends_on: d.depends_on.unwrap_or_default(),
                })
                .collect(),
            external_references,
        })
    }
}

fn convert_component(c: CdxComponent) -> ParsedComponent {
    let license_url = c
        .licenses
        .as_ref()
        .and_then(|choices| {
            choices
                .iter()
                .filter_map(|choice| choice.license.as_ref())
                .find_map(|license| clean(license.url.clone()))
        });

    ParsedComponent {
        bom_ref: clean(c.bom_ref),
        classifier: c.component_type.as_deref().and_then(Classifier::from_str_loose),
        attributes: ComponentAttributes {
            author: clean(c.author),
            publisher: clean(c.publisher),
            group: clean(c.group),
            name: c.name.trim().to_owned(),
            version: clean(c.version),
            description: clean(c.description),
            license_url,
            purl: clean(c.purl),
            cpe: clean(c.cpe),
            swid_tag_id: c.swid.and_then(|s| clean(s.tag_id)),
        },
        children: c
            .components
            .unwrap_or_default()
            .into_iter()
            .map(convert_component)
            .collect(),
    }
}

fn convert_external_reference(r: CdxExternalReference) -> ExternalReference {
    ExternalReference {
        ref_type: r.ref_type,
        url: r.url,
        comment: clean(r.comment),
    }
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

// CycloneDX JSON 역직렬화 구조체

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CdxBom {
    bom_format: String,
    spec_version: String,
    metadata: Option<CdxMetadata>,
    components: Option<Vec<CdxComponent>>,
    dependencies: Option<Vec<CdxDependency>>,
    external_references: Option<Vec<CdxExternalReference>>,
}

#[derive(Debug, Deserialize)]
struct CdxMetadata {
    component: Option<CdxComponent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CdxComponent {
    #[serde(rename = "type")]
    component_type: Option<String>,
    #[serde(rename = "bom-ref")]
    bom_ref: Option<String>,
    name: String,
    version: Option<String>,
    group: Option<String>,
    author: Option<String>,
    publisher: Option<String>,
    description: Option<String>,
    purl: Option<String>,
    cpe: Option<String>,
    swid: Option<CdxSwid>,
    licenses: Option<Vec<CdxLicenseChoice>>,
    external_references: Option<Vec<CdxExternalReference>>,
    components: Option<Vec<CdxComponent>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CdxSwid {
    tag_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CdxLicenseChoice {
    license: Option<CdxLicense>,
}

#[derive(Debug, Deserialize)]
struct CdxLicense {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CdxExternalReference {
    #[serde(rename = "type")]
    ref_type: String,
    url: String,
    comment: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CdxDependency {
    #[serde(rename = "ref")]
    ref_field: String,
    depends_on: Option<Vec<String>>,
}
