#![no_main]

use std::io::Cursor;
use libfuzzer_sys::fuzz_target;
use plybuf::Reader;

fuzz_target!(|data: &[u8]| {
    // Only panics and crashes are interesting, so all `Result`s are ignored.
    // Every property is requested on its own so that all of them are decoded.
    // The last byte picks the list size hint, so both the single pass and the
    // measuring two pass allocation are exercised.
    let hint = data.last().map_or(0, |b| u32::from(b % 5));

    let mut reader = Reader::new(Cursor::new(data));
    if reader.parse_header().is_err() {
        return;
    }

    let requests: Vec<_> = reader.elements()
        .iter()
        .enumerate()
        .flat_map(|(i, e)| e.properties.iter().map(move |p| (i, p.name.clone())))
        .collect();
    for (element, property) in requests {
        let _ = reader.request_properties_from_element_at(element, &[property.as_str()], hint);
    }

    let _ = reader.read();
});
