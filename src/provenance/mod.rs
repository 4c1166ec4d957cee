//! Provenance — BLAKE3 naming fingerprints and reserved labels.

pub mod hasher;
pub mod labels;
