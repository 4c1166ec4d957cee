//! oamc — Appfile compiler for OAM applications.
//!
//! Resolves the component, trait, policy, and workflow-step definitions an
//! Application references, renders their templates, and emits one
//! provenance-labelled manifest per component.

pub mod cli;
pub mod core;
pub mod provenance;
pub mod template;
