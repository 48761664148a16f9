//! Command handlers

pub mod book;
pub mod config;
pub mod entry;
pub mod status;
pub mod sync;

use anyhow::{bail, Result};

use verse_core::Metadata;

/// Resolve a full id or a unique prefix against a listing
pub fn resolve_id<M: Metadata>(id: &str, candidates: &[M], what: &str) -> Result<String> {
    if let Some(exact) = candidates.iter().find(|m| m.id() == id) {
        return Ok(exact.id().to_string());
    }

    let matches: Vec<&M> = candidates.iter().filter(|m| m.id().starts_with(id)).collect();

    match matches.len() {
        0 => bail!("No {} found matching: {}", what, id),
        1 => Ok(matches[0].id().to_string()),
        _ => {
            eprintln!("Multiple {}s match '{}':", what, id);
            for meta in &matches {
                eprintln!("  {} - {}", meta.id(), meta.title());
            }
            bail!("Ambiguous ID. Please provide more characters.");
        }
    }
}
