//! Fuzz harness for `PrefValue::from_json_str` and `canonicalize`.
//!
//! Arbitrary bytes are parsed as a preference value. Anything that parses is
//! canonicalized under each policy axis; the output must be deterministic,
//! pruning must be idempotent, and ASCII escaping must produce ASCII.

#![no_main]
use libfuzzer_sys::fuzz_target;
use prefmac_core::{CanonicalizationPolicy, PrefValue, canonicalize, prune_empty};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(value) = PrefValue::from_json_str(text) else {
        return;
    };

    let base = CanonicalizationPolicy::default();
    let policies = [
        base.clone(),
        base.clone().with_sort_keys(false),
        base.clone().with_prune_empty_containers(false),
        base.clone().with_ascii_escape(true),
        base.clone().with_escape_angle_bracket(true),
        base.with_separators(", ", ": "),
    ];
    for policy in &policies {
        let once = canonicalize(&value, policy);
        assert_eq!(once, canonicalize(&value, policy));
        if policy.ascii_escape() {
            assert!(once.is_ascii());
        }
    }

    let pruned = prune_empty(&value);
    assert_eq!(prune_empty(&pruned), pruned);
});
