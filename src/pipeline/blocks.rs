//! Block partition of the fixed volume.
//!
//! The external pipeline splits the fixed high-resolution volume into cubic
//! blocks that overlap their neighbours. The partition is computed here
//! only to report it before the pipeline runs.

use crate::error::PipelineError;

/// Default block overlap, as a fraction of the block size.
pub const DEFAULT_OVERLAP_FACTOR: f64 = 0.5;

/// One block of the partition, in array order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRegion {
    /// Grid index of the block
    pub index: [u64; 3],

    /// First voxel covered, overlap included (clamped to 0)
    pub start: [u64; 3],

    /// One past the last voxel covered, overlap included (clamped to the shape)
    pub stop: [u64; 3],
}

impl BlockRegion {
    /// Extent of the block along each axis.
    pub fn shape(&self) -> [u64; 3] {
        [
            self.stop[0] - self.start[0],
            self.stop[1] - self.start[1],
            self.stop[2] - self.start[2],
        ]
    }
}

/// Overlapping block grid over a 3D volume.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockGrid {
    shape: [u64; 3],
    blocksize: [u64; 3],
    overlap: [u64; 3],
    nblocks: [u64; 3],
}

impl BlockGrid {
    /// Partition `shape` into blocks of `blocksize` voxels.
    ///
    /// `nblocks = ceil(shape / blocksize)` and
    /// `overlap = round(blocksize * overlap_factor)` per axis.
    pub fn new(
        shape: &[u64],
        blocksize: [u32; 3],
        overlap_factor: f64,
    ) -> Result<Self, PipelineError> {
        let shape: [u64; 3] = shape.try_into().map_err(|_| {
            PipelineError::InvalidRequest(format!(
                "block partition needs a 3D volume, got shape {:?}",
                shape
            ))
        })?;
        if blocksize.contains(&0) {
            return Err(PipelineError::InvalidRequest(format!(
                "block size {:?} must be positive",
                blocksize
            )));
        }
        if !(0.0..=1.0).contains(&overlap_factor) {
            return Err(PipelineError::InvalidRequest(format!(
                "overlap factor {} must be within 0..=1",
                overlap_factor
            )));
        }

        let blocksize = blocksize.map(u64::from);
        let mut overlap = [0u64; 3];
        let mut nblocks = [0u64; 3];
        for axis in 0..3 {
            overlap[axis] = (blocksize[axis] as f64 * overlap_factor).round() as u64;
            nblocks[axis] = shape[axis].div_ceil(blocksize[axis]);
        }

        Ok(Self {
            shape,
            blocksize,
            overlap,
            nblocks,
        })
    }

    /// Volume shape being partitioned.
    pub fn shape(&self) -> [u64; 3] {
        self.shape
    }

    /// Block size per axis.
    pub fn blocksize(&self) -> [u64; 3] {
        self.blocksize
    }

    /// Overlap added on each side of a block, per axis.
    pub fn overlap(&self) -> [u64; 3] {
        self.overlap
    }

    /// Number of blocks per axis.
    pub fn nblocks(&self) -> [u64; 3] {
        self.nblocks
    }

    /// Total number of blocks.
    pub fn block_count(&self) -> u64 {
        self.nblocks.iter().product()
    }

    /// Whether every axis is an exact multiple of the block size.
    pub fn evenly_divides(&self) -> bool {
        self.shape
            .iter()
            .zip(&self.blocksize)
            .all(|(&s, &b)| s % b == 0)
    }

    /// Every block of the grid, slowest axis outermost.
    pub fn blocks(&self) -> Vec<BlockRegion> {
        let mut blocks = Vec::with_capacity(self.block_count() as usize);
        for i in 0..self.nblocks[0] {
            for j in 0..self.nblocks[1] {
                for k in 0..self.nblocks[2] {
                    blocks.push(self.block([i, j, k]));
                }
            }
        }
        blocks
    }

    fn block(&self, index: [u64; 3]) -> BlockRegion {
        let mut start = [0u64; 3];
        let mut stop = [0u64; 3];
        for axis in 0..3 {
            let origin = index[axis] * self.blocksize[axis];
            start[axis] = origin.saturating_sub(self.overlap[axis]);
            stop[axis] = (origin + self.blocksize[axis] + self.overlap[axis]).min(self.shape[axis]);
        }
        BlockRegion { index, start, stop }
    }
}
