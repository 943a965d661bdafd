use fp_bundle::{PaginationCursor, PoolDescriptor};

use crate::{BundleArchive, SyncError};

/// Listing cursor of the page starting with the finalized bundle that covers `height`.
///
/// The listing cannot be seeked by height, but it accepts a numeric offset. Bundle ids are sequential, so the cursor
/// returned by a one-record page at offset `id - 1` starts exactly at bundle `id`. Bundle 0 is the start of the
/// listing and needs no listing call.
pub async fn resolve_resume_cursor(
    archive: &dyn BundleArchive,
    pool: PoolDescriptor,
    height: u64,
) -> Result<PaginationCursor, SyncError> {
    let record = archive
        .finalized_bundle_for_height(pool, height)
        .await
        .map_err(|source| SyncError::BundleLookup { height, source })?;

    let Some(offset) = record.id.checked_sub(1) else {
        tracing::debug!("Height {height} is in the first bundle of {pool}, starting from the beginning");
        return Ok(PaginationCursor::start());
    };

    let page = archive
        .finalized_bundles_page(pool, 1, Some(offset), &PaginationCursor::start())
        .await
        .map_err(|source| SyncError::ResumePage { bundle_id: record.id, offset, source })?;

    let cursor = page.next_cursor().ok_or(SyncError::MissingResumeCursor { bundle_id: record.id, offset })?;
    tracing::debug!("Resuming {pool} at bundle {} (height {height}) with cursor {cursor}", record.id);
    Ok(cursor)
}
