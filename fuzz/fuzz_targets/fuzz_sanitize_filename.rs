//! Fuzz target for `sanitize_filename` - upload name confinement.
//!
//! This fuzzer tests that:
//! 1. No input causes a panic
//! 2. Accepted names are a single component that stays inside the upload
//!    directory when joined onto it
//! 3. Accepted names always pass `validate_name`
//!
//! Run with: `cargo +nightly fuzz run fuzz_sanitize_filename`

#![no_main]

use arbitrary::Arbitrary;
use ephemera::relay::sanitize_filename;
use ephemera::storage::validate_name;
use libfuzzer_sys::fuzz_target;
use std::path::Path;

/// Structured input for more targeted fuzzing.
#[derive(Arbitrary, Debug)]
struct NameInput {
    /// Raw client file name
    name: String,
    /// Number of `../` components to prepend
    traversal_depth: u8,
    /// Use Windows separators for the injected prefix
    backslashes: bool,
}

impl NameInput {
    fn build(&self) -> String {
        let step = if self.backslashes { "..\\" } else { "../" };
        format!("{}{}", step.repeat(usize::from(self.traversal_depth % 16)), self.name)
    }
}

fuzz_target!(|data: NameInput| {
    let raw = data.build();

    let Ok(name) = sanitize_filename(&raw) else {
        return;
    };

    assert!(!name.is_empty(), "empty name accepted from {raw:?}");
    assert!(
        !name.contains('/') && !name.contains('\\'),
        "separator survived in {name:?}"
    );
    assert!(validate_name(&name).is_ok(), "{name:?} fails validation");

    let base = Path::new("/srv/uploads");
    let joined = base.join(&name);
    assert_eq!(joined.parent(), Some(base), "{raw:?} escaped as {name:?}");
});
