use std::path::Path;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use crate::core::{Result, VideoError};

/// 分片信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkInfo {
    pub index: u32,
    pub offset: u64,
    pub size: u64,
}

/// `ceil(file_size / chunk_size)`
pub fn total_chunks(file_size: u64, chunk_size: u64) -> u32 {
    if chunk_size == 0 {
        return 0;
    }
    file_size.div_ceil(chunk_size) as u32
}

/// 计算分片信息
pub fn calculate_chunks(file_size: u64, chunk_size: u64) -> Vec<ChunkInfo> {
    (0..total_chunks(file_size, chunk_size))
        .map(|index| chunk_at(index, file_size, chunk_size))
        .collect()
}

/// Byte range of chunk `index`; the last chunk holds the remainder.
pub fn chunk_at(index: u32, file_size: u64, chunk_size: u64) -> ChunkInfo {
    let offset = index as u64 * chunk_size;
    let size = chunk_size.min(file_size.saturating_sub(offset));
    ChunkInfo { index, offset, size }
}

/// Indices the server has not acknowledged yet, ascending.
pub fn missing_chunks(total_chunks: u32, acknowledged: &[u32]) -> Vec<u32> {
    (0..total_chunks)
        .filter(|index| !acknowledged.contains(index))
        .collect()
}

/// Lower-case hex SHA-256
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// 读取分片数据
pub async fn read_chunk(path: &Path, chunk: &ChunkInfo) -> Result<Bytes> {
    let mut file = File::open(path).await?;
    file.seek(std::io::SeekFrom::Start(chunk.offset)).await?;

    let size = usize::try_from(chunk.size)
        .map_err(|_| VideoError::internal_error(format!("Chunk {} is too large to buffer", chunk.index)))?;
    let mut buffer = vec![0u8; size];
    file.read_exact(&mut buffer).await?;

    Ok(Bytes::from(buffer))
}
