//! OC-020: BLAKE3 fingerprints for deterministic resource naming.

/// Hex characters kept in generated name suffixes.
pub const NAME_HASH_LEN: usize = 10;

/// Hash a string. Returns `"blake3:{hex}"`.
pub fn hash_string(s: &str) -> String {
    format!("blake3:{}", blake3::hash(s.as_bytes()).to_hex())
}

/// Compute a composite hash from multiple components. Components are NUL
/// separated, so `["ab", "c"]` and `["a", "bc"]` differ.
pub fn composite_hash(components: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for c in components {
        hasher.update(c.as_bytes());
        hasher.update(b"\0");
    }
    format!("blake3:{}", hasher.finalize().to_hex())
}

/// Short lowercase-hex fingerprint of `components`, usable in object names.
pub fn short_hash(components: &[&str]) -> String {
    let full = composite_hash(components);
    let hex = full.trim_start_matches("blake3:");
    hex[..NAME_HASH_LEN].to_string()
}

/// Identity of one auxiliary output produced by a trait placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraitOutputSeed<'a> {
    pub component: &'a str,
    pub trait_type: &'a str,
    /// Position among the component's traits of the same type
    pub ordinal: usize,
    pub output_key: &'a str,
    pub api_version: &'a str,
    pub kind: &'a str,
}

/// Name for a trait's auxiliary output: `<component>-<traitType>-<hash>`.
pub fn trait_output_name(seed: &TraitOutputSeed<'_>) -> String {
    let ordinal = seed.ordinal.to_string();
    let hash = short_hash(&[
        seed.component,
        seed.trait_type,
        &ordinal,
        seed.output_key,
        seed.api_version,
        seed.kind,
    ]);
    format!("{}-{}-{}", seed.component, seed.trait_type, hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn seed<'a>(output_key: &'a str, ordinal: usize) -> TraitOutputSeed<'a> {
        TraitOutputSeed {
            component: "myweb",
            trait_type: "scaler",
            ordinal,
            output_key,
            api_version: "core.oam.dev/v1alpha2",
            kind: "ManualScalerTrait",
        }
    }

    #[test]
    fn test_oc020_hash_string() {
        let h1 = hash_string("hello");
        let h2 = hash_string("hello");
        let h3 = hash_string("world");
        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
        assert!(h1.starts_with("blake3:"));
        assert_eq!(h1.len(), 7 + 64);
    }

    #[test]
    fn test_oc020_composite_hash_separates_components() {
        assert_ne!(composite_hash(&["ab", "c"]), composite_hash(&["a", "bc"]));
        assert_ne!(composite_hash(&["a", "b"]), composite_hash(&["b", "a"]));
    }

    #[test]
    fn test_oc020_short_hash_shape() {
        let h = short_hash(&["myweb", "scaler"]);
        assert_eq!(h.len(), NAME_HASH_LEN);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_oc020_trait_output_name_shape() {
        let name = trait_output_name(&seed("scaler", 0));
        assert!(name.starts_with("myweb-scaler-"));
        assert_eq!(name.len(), "myweb-scaler-".len() + NAME_HASH_LEN);
    }

    #[test]
    fn test_oc020_trait_output_name_stable() {
        assert_eq!(
            trait_output_name(&seed("scaler", 0)),
            trait_output_name(&seed("scaler", 0))
        );
    }

    #[test]
    fn test_oc020_output_key_changes_name() {
        assert_ne!(
            trait_output_name(&seed("scaler", 0)),
            trait_output_name(&seed("autoscaler", 0))
        );
    }

    #[test]
    fn test_oc020_ordinal_changes_name() {
        assert_ne!(
            trait_output_name(&seed("scaler", 0)),
            trait_output_name(&seed("scaler", 1))
        );
    }

    proptest! {
        #[test]
        fn prop_oc020_distinct_keys_distinct_names(a in "[a-z]{1,12}", b in "[a-z]{1,12}") {
            prop_assume!(a != b);
            prop_assert_ne!(trait_output_name(&seed(&a, 0)), trait_output_name(&seed(&b, 0)));
        }

        #[test]
        fn prop_oc020_name_is_deterministic(key in "[a-z0-9-]{1,20}", ordinal in 0usize..16) {
            prop_assert_eq!(
                trait_output_name(&seed(&key, ordinal)),
                trait_output_name(&seed(&key, ordinal))
            );
        }
    }
}
