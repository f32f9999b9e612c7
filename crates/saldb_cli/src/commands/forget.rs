//! Forget command implementation.

use super::state;
use saldb_core::RevisionId;
use std::path::Path;

/// Runs the forget command.
pub fn run(path: &Path, cutoff: u64, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    let store = state::open(path)?;
    let cutoff = RevisionId::new(cutoff);

    println!("Forgetting revisions older than {} in {:?}", cutoff.as_u64(), path);
    if dry_run {
        let doomed = store
            .revision_log()
            .iter()
            .filter(|meta| meta.id < cutoff)
            .count();
        println!("(dry run - no changes will be made)");
        println!("  Revisions to drop: {doomed}");
        return Ok(());
    }

    let dropped = store.forget_revisions(cutoff)?;
    if dropped == 0 {
        println!("Nothing to forget");
        return Ok(());
    }
    state::save(&store, path)?;
    println!("✓ Dropped {dropped} revisions; oldest is now {}", store.oldest_revision().as_u64());
    Ok(())
}
