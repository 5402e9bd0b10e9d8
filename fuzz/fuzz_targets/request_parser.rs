#![no_main]

use libfuzzer_sys::fuzz_target;

use tunnelproxy::proxy::http::fuzzing::parse_request_head;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    let split = usize::from(data[0]);
    parse_request_head(&data[1..], split);
});
