#![no_main]

use libfuzzer_sys::fuzz_target;

use tunnelproxy::proxy::request::parse_host_port;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    let default_port = u16::from(data[0]).max(1);
    let value = String::from_utf8_lossy(&data[1..]);
    if let Ok(target) = parse_host_port(value.as_ref(), default_port) {
        assert!(!target.host.is_empty());
        let reparsed = parse_host_port(&target.to_addr(), default_port)
            .expect("dial address must parse back");
        assert_eq!(reparsed, target);
    }
});
