#![no_main]

use arbitrary::Arbitrary;
use bomgate_core::EventMetadata;
use bomgate_ingest::{BusRecord, IngestEvent, Topic};
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzRecord {
    /// `Topic::ALL` 인덱스, 범위를 벗어나면 임의 문자열 토픽
    topic: u8,
    raw_topic: String,
    key: String,
    value: Vec<u8>,
}

fuzz_target!(|input: FuzzRecord| {
    let topic = Topic::ALL
        .get(usize::from(input.topic))
        .map(|t| t.as_str().to_owned())
        .unwrap_or(input.raw_topic);

    let record = BusRecord {
        id: "fuzz".to_owned(),
        topic,
        key: input.key,
        value: Bytes::from(input.value),
        metadata: EventMetadata::new("fuzz", "fuzz-trace"),
    };
    let _ = IngestEvent::from_record(&record);
});
