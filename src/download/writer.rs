//! Orders verified pieces and writes the output file.
use super::FinishedPiece;
use anyhow::{ensure, Context, Result};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::info;

/// Sorts `pieces` by index and writes them sequentially to `path` with
/// create-or-truncate semantics.
///
/// Workers push pieces in completion order, so anything may arrive in any
/// order here; a contiguity check and a byte count against
/// `total_length` guard against holes and duplicates.
pub async fn assemble<P: AsRef<Path>>(
    path: P,
    mut pieces: Vec<FinishedPiece>,
    total_length: u64,
) -> Result<()> {
    let path = path.as_ref();
    pieces.sort_by_key(|piece| piece.index);

    ensure!(
        pieces
            .iter()
            .enumerate()
            .all(|(i, piece)| piece.index as usize == i),
        "finished pieces do not form a contiguous index range"
    );

    let mut file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("could not create {}", path.display()))?;

    let mut written = 0u64;
    for piece in &pieces {
        file.write_all(&piece.data).await?;
        written += piece.data.len() as u64;
    }
    file.flush().await?;

    ensure!(
        written == total_length,
        "assembled {} bytes, expected {}",
        written,
        total_length
    );

    info!(path = %path.display(), bytes = written, pieces = pieces.len(), "file assembled");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn piece(index: u32, data: &[u8]) -> FinishedPiece {
        FinishedPiece {
            index,
            data: data.to_vec(),
        }
    }

    #[tokio::test]
    async fn writes_pieces_in_index_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");

        let pieces = vec![
            piece(2, b"!!"),
            piece(0, b"hello "),
            piece(1, b"world"),
        ];
        assemble(&path, pieces, 13).await.unwrap();

        let contents = std::fs::read(&path).unwrap();
        assert_eq!(contents, b"hello world!!");
    }

    #[tokio::test]
    async fn truncates_an_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        std::fs::write(&path, b"stale content that is longer").unwrap();

        assemble(&path, vec![piece(0, b"fresh")], 5).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"fresh");
    }

    #[tokio::test]
    async fn rejects_a_missing_piece() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");

        let result = assemble(&path, vec![piece(0, b"aa"), piece(2, b"cc")], 6).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn rejects_a_byte_count_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");

        let result = assemble(&path, vec![piece(0, b"aa")], 999).await;
        assert!(result.is_err());
    }
}
