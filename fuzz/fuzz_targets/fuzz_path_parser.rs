#![no_main]

use libfuzzer_sys::fuzz_target;
use tether_runtime::reactive::PropertyPath;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(path) = PropertyPath::parse(text) {
        // Accepted paths render to the dotted form, which must parse back.
        let rendered = path.to_string();
        let reparsed = PropertyPath::parse(&rendered).expect("rendered path reparses");
        assert_eq!(path, reparsed);
        assert!(!path.segments().is_empty());
    }
});
