#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use strata_db::store::{Page, PageKind, PageLayout};

#[derive(Arbitrary, Debug)]
struct DecodeInput {
    kind: u8,
    fanout_bits: u8,
    direct_capacity: u8,
    record_page_bits: u8,
    bytes: Vec<u8>,
}

fuzz_target!(|input: DecodeInput| {
    let Some(kind) = PageKind::from_u8(input.kind % 9) else {
        return;
    };
    let layout = PageLayout {
        indirect_fanout: 1 << (input.fanout_bits % 11),
        direct_capacity: (input.direct_capacity % 8) as usize + 1,
        record_page_bits: input.record_page_bits % 64,
    };

    // Decoding arbitrary bytes must fail cleanly, never panic
    let Ok(page) = Page::deserialize(kind, &input.bytes, &layout) else {
        return;
    };

    // Whatever decodes must re-encode to bytes that decode to the same page
    let encoded = page.serialize();
    let decoded = Page::deserialize(kind, &encoded, &layout).expect("re-encoded page must decode");
    assert_eq!(decoded, page);
});
