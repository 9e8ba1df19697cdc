use std::fmt::Write;


/// Panics with a readable comparison of the two files. PLY files are usually
/// partly ASCII and partly binary, so the header is printed as text and the
/// rest as hex dump.
pub(crate) fn file_failure(actual: &[u8], expected: &[u8], filename: &str) -> ! {
    let mut msg = String::new();

    writeln!(msg, "===== Expected data ('{}')", filename).unwrap();
    write_data(&mut msg, expected);
    writeln!(msg).unwrap();

    writeln!(msg, "===== Actual data").unwrap();
    write_data(&mut msg, actual);

    panic!("file comparison failed: \n{}", msg);

    fn write_data(msg: &mut String, data: &[u8]) {
        const END: &[u8] = b"end_header\n";

        let split = data.windows(END.len())
            .position(|w| w == END)
            .map(|pos| pos + END.len())
            .unwrap_or(0);
        let (header, payload) = data.split_at(split);

        msg.push_str(&String::from_utf8_lossy(header));
        match std::str::from_utf8(payload) {
            Ok(s) if !payload.contains(&0) => msg.push_str(s),
            _ => {
                for chunk in payload.chunks(32) {
                    for b in chunk {
                        write!(msg, "{:02x} ", b).unwrap();
                    }
                    writeln!(msg).unwrap();
                }
            }
        }
    }
}

/// Compares the given bytes with the content of a file in `src/test_files/`.
macro_rules! assert_eq_file {
    ($actual:expr, $filename:expr) => {
        let actual = $actual as &[u8];
        let expected = include_bytes!(concat!("test_files/", $filename)) as &[u8];
        if actual != expected {
            crate::test_utils::file_failure(actual, expected, $filename);
        }
    };
}

/// Returns a `Cursor` over a file in `src/test_files/`.
macro_rules! include_test_file {
    ($filename:expr) => {{
        let bytes = include_bytes!(concat!("test_files/", $filename)) as &[u8];
        std::io::Cursor::new(bytes)
    }};
}
