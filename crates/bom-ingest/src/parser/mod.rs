//! BOM 파서 경계 -- 바이트 + 형식 → 정규화된 문서
//!
//! [`BomParser`] trait은 각 BOM 형식의 파서가 구현해야 하는 인터페이스입니다.
//! 파서는 전체 문서를 반환하거나 구조화된 파싱 에러를 반환하며,
//! 부분 트리를 반환하지 않습니다.
//!
//! # 지원 형식
//!
//! - CycloneDX JSON -- [`CycloneDxJsonParser`](cyclonedx::CycloneDxJsonParser)
//!
//! # 확장
//!
//! 새로운 형식을 지원하려면 `BomParser` trait을 구현하고
//! [`ParserRegistry::register`]로 등록합니다.

pub mod cyclonedx;

use std::sync::Arc;

use crate::error::IngestError;
use crate::model::{BomFormat, ParsedDocument};

/// BOM 파서 trait
///
/// 파싱은 CPU 작업이므로 동기 인터페이스이며,
/// 코디네이터가 `spawn_blocking` 안에서 호출합니다.
pub trait BomParser: Send + Sync {
    /// 이 파서가 담당하는 형식을 반환합니다.
    fn format(&self) -> BomFormat;

    /// 문서 바이트를 파싱합니다.
    fn parse(&self, bytes: &[u8]) -> Result<ParsedDocument, IngestError>;
}

/// 형식별 파서 레지스트리
#[derive(Clone)]
pub struct ParserRegistry {
    parsers: Vec<Arc<dyn BomParser>>,
}

impl ParserRegistry {
    /// 빈 레지스트리를 생성합니다.
    pub fn empty() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    /// 기본 파서가 등록된 레지스트리를 생성합니다.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(cyclonedx::CycloneDxJsonParser));
        registry
    }

    /// 파서를 등록합니다. 같은 형식의 기존 파서는 대체됩니다.
    pub fn register(&mut self, parser: Arc<dyn BomParser>) {
        let format = parser.format();
        self.parsers.retain(|p| p.format() != format);
        self.parsers.push(parser);
    }

    /// 형식에 해당하는 파서를 반환합니다.
    pub fn get(&self, format: BomFormat) -> Option<Arc<dyn BomParser>> {
        self.parsers.iter().find(|p| p.format() == format).cloned()
    }

}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
