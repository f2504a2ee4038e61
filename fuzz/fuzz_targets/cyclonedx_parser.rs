#![no_main]

use bomgate_ingest::{BomParser, CycloneDxJsonParser};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = CycloneDxJsonParser.parse(data);
});
