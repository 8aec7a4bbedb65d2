//! Property-based tests for selfup.
//!
//! These tests use proptest to verify correctness properties across
//! randomly generated inputs.
//!
//! # Properties Tested
//!
//! - Property 1: Version ordering is numeric, not lexicographic
//! - Property 2: Check throttling
//! - Property 3: Published hash extraction
//! - Property 4: Platform asset selection
//! - Property 5: Cache validity follows content hashes

#![cfg(test)]

use proptest::prelude::*;
use tempfile::TempDir;

use crate::artifact;
use crate::gate::{UpdateGate, UpdateIntent};
use crate::release::{extract_expected_hash, select_asset, Asset, HASH_HEX_LEN};
use crate::version::Version;

const DAY: i64 = 24 * 3600;

// =============================================================================
// Generators
// =============================================================================

/// Generate version components.
fn arb_components() -> impl Strategy<Value = (u64, u64, u64)> {
    (0u64..1000, 0u64..1000, 0u64..1000)
}

/// Generate an optional `v`/`V` prefix.
fn arb_prefix() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just(""), Just("v"), Just("V")]
}

/// Generate a suffix that may follow the numeric triple.
fn arb_suffix() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        "-[a-z]{1,8}(\\.[0-9]{1,2})?",
        "\\+[a-z0-9]{1,8}",
    ]
}

/// Generate a mixed-case hash of the expected length.
fn arb_hash() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            prop::char::range('0', '9'),
            prop::char::range('a', 'f'),
            prop::char::range('A', 'F'),
        ],
        HASH_HEX_LEN,
    )
    .prop_map(|chars| chars.into_iter().collect())
}

/// Generate an asset file name stem.
fn arb_asset_stem() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_.-]{0,15}"
}

/// Generate a timestamp somewhere in this century.
fn arb_timestamp() -> impl Strategy<Value = i64> {
    946_684_800i64..4_102_444_800i64
}

// =============================================================================
// Property 1: Version Ordering
//
// *For any* two `[v]MAJOR.MINOR.PATCH` strings, comparing the parsed
// versions SHALL give the same result as comparing the integer triples.
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// **Property 1: Parsed ordering equals numeric ordering**
    #[test]
    fn prop_version_order_matches_tuples(
        a in arb_components(),
        b in arb_components(),
        prefix_a in arb_prefix(),
        prefix_b in arb_prefix(),
        suffix_a in arb_suffix(),
        suffix_b in arb_suffix(),
    ) {
        let va = Version::parse(&format!("{}{}.{}.{}{}", prefix_a, a.0, a.1, a.2, suffix_a));
        let vb = Version::parse(&format!("{}{}.{}.{}{}", prefix_b, b.0, b.1, b.2, suffix_b));

        prop_assert_eq!(va.cmp(&vb), a.cmp(&b));
        prop_assert_eq!(va == vb, a == b);
    }

    /// **Property 1: Parsing keeps the raw string**
    #[test]
    fn prop_version_keeps_raw(
        parts in arb_components(),
        prefix in arb_prefix(),
        suffix in arb_suffix(),
    ) {
        let raw = format!("{}{}.{}.{}{}", prefix, parts.0, parts.1, parts.2, suffix);
        let version = Version::parse(&raw);

        prop_assert_eq!(version.as_str(), raw.as_str());
        prop_assert_eq!((version.major(), version.minor(), version.patch()), parts);
    }

    /// **Property 1: Malformed strings parse as zero**
    #[test]
    fn prop_malformed_version_is_zero(raw in "[a-zA-Z ]{0,12}") {
        let version = Version::parse(&raw);
        prop_assert_eq!(version, Version::new(0, 0, 0));
    }
}

// =============================================================================
// Property 2: Check Throttling
//
// *For any* last check, an unforced check SHALL run only once the interval
// has elapsed, a forced check SHALL always run, and a suppressed check
// SHALL never run unless forced.
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// **Property 2: Throttled within a day, due after**
    #[test]
    fn prop_gate_throttles_one_day(
        last in arb_timestamp(),
        elapsed in 0i64..(3 * DAY),
    ) {
        let gate = UpdateGate::default();
        let intent = UpdateIntent::default();

        prop_assert_eq!(
            gate.should_check(last + elapsed, Some(last), &intent),
            elapsed >= DAY
        );
    }

    /// **Property 2: Same instant as the last check is throttled**
    #[test]
    fn prop_gate_false_right_after_check(now in arb_timestamp()) {
        let gate = UpdateGate::default();
        prop_assert!(!gate.should_check(now, Some(now), &UpdateIntent::default()));
    }

    /// **Property 2: Force always checks**
    #[test]
    fn prop_gate_force_always_checks(
        now in arb_timestamp(),
        last in proptest::option::of(arb_timestamp()),
        suppress in any::<bool>(),
        auto_confirm in any::<bool>(),
    ) {
        let intent = UpdateIntent {
            force_upgrade: true,
            suppress_upgrade: suppress,
            auto_confirm,
        };
        prop_assert!(UpdateGate::default().should_check(now, last, &intent));
    }

    /// **Property 2: Suppress without force never checks**
    #[test]
    fn prop_gate_suppress_never_checks(
        now in arb_timestamp(),
        last in proptest::option::of(arb_timestamp()),
    ) {
        let intent = UpdateIntent {
            suppress_upgrade: true,
            ..UpdateIntent::default()
        };
        prop_assert!(!UpdateGate::default().should_check(now, last, &intent));
    }
}

// =============================================================================
// Property 3: Hash Extraction
//
// *For any* asset name and hash, a body listing `<name>:<hash>` SHALL yield
// the hash lower-cased, and a body that never mentions the name SHALL
// yield none.
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// **Property 3: Listed hash is found and lower-cased**
    #[test]
    fn prop_hash_found_for_listed_asset(
        stem in arb_asset_stem(),
        hash in arb_hash(),
        before in "[ A-Za-z\n]{0,40}",
        after in "[ \nA-Za-z]{0,40}",
    ) {
        let name = format!("{}-linux.zip", stem);
        let body = format!("{}\n{}:{} {}", before, name, hash, after);

        prop_assert_eq!(extract_expected_hash(&body, &name), Some(hash.to_lowercase()));
    }

    /// **Property 3: Unlisted asset has no hash**
    #[test]
    fn prop_hash_absent_for_unlisted_asset(
        stem in arb_asset_stem(),
        hash in arb_hash(),
    ) {
        let name = format!("{}-linux.zip", stem);
        let body = format!("other-windows.exe:{}", hash);

        prop_assert_eq!(extract_expected_hash(&body, &name), None);
    }
}

// =============================================================================
// Property 4: Asset Selection
//
// *For any* asset list, selection SHALL return the first asset whose
// lower-cased name contains the platform token, or none.
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// **Property 4: First matching asset wins**
    #[test]
    fn prop_select_first_match(
        stems in prop::collection::vec(arb_asset_stem(), 0..6),
        tokens in prop::collection::vec(
            prop_oneof![Just("linux"), Just("LINUX"), Just("macos"), Just("windows")],
            0..6,
        ),
    ) {
        let assets: Vec<Asset> = stems
            .iter()
            .zip(tokens.iter())
            .map(|(stem, token)| {
                let name = format!("{}-{}.zip", stem, token);
                Asset::new(name.clone(), format!("https://dl/{}", name))
            })
            .collect();

        let expected = assets
            .iter()
            .find(|asset| asset.name.to_lowercase().contains("linux"));

        prop_assert_eq!(select_asset(&assets, "linux"), expected);
    }
}

// =============================================================================
// Property 5: Cache Validity
//
// *For any* cached content, the cache SHALL be valid against its own hash
// and invalid against any other.
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// **Property 5: Cache matches its own hash only**
    #[test]
    fn prop_cache_valid_only_for_own_hash(
        content in prop::collection::vec(any::<u8>(), 0..4096),
        other in arb_hash(),
    ) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("v1.0.0.zip");
        std::fs::write(&path, &content).unwrap();

        let own = artifact::content_hash(&content);
        prop_assume!(!own.eq_ignore_ascii_case(&other));

        prop_assert!(artifact::is_cache_valid(&path, Some(&own)).unwrap());
        prop_assert!(artifact::is_cache_valid(&path, Some(&own.to_uppercase())).unwrap());
        prop_assert!(!artifact::is_cache_valid(&path, Some(&other)).unwrap());
    }
}
