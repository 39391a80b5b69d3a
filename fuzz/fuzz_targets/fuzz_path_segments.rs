#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tether_runtime::reactive::PropertyPath;

#[derive(Arbitrary, Debug)]
struct Input {
    segments: Vec<String>,
    lambda_param: Option<String>,
}

fuzz_target!(|input: Input| {
    let built = PropertyPath::from_segments(input.segments.iter().map(String::as_str));
    if let Ok(path) = &built {
        assert_eq!(path.len(), input.segments.len());
    }

    // The lambda form must agree with the segment builder.
    if let Some(param) = input.lambda_param {
        let body = std::iter::once(param.clone())
            .chain(input.segments.iter().cloned())
            .collect::<Vec<_>>()
            .join(".");
        let lambda = PropertyPath::parse(&format!("{param} => {body}"));
        if let (Ok(a), Ok(b)) = (&built, &lambda) {
            assert_eq!(a, b);
        }
    }
});
