//! Conversion between flat and 2D indices into the recon plane, and the
//! partitioning of the plane into the voxel subsets processed by one VCD
//! update step.
//!
//! The plane is row-major: the column index varies fastest within the flat
//! index, so `flat = row * num_cols + col`.

pub type PlaneDim = [usize; 2];
pub type Index2 = [usize; 2];

#[inline]
pub fn index2_to_1([row, col]: Index2, [_nrows, ncols]: PlaneDim) -> usize {
    row * ncols + col
}

#[inline]
pub fn index1_to_2(i: usize, [_nrows, ncols]: PlaneDim) -> Index2 {
    [i / ncols, i % ncols]
}

/// Split the `num_pixels` flat plane indices into `num_subsets` interleaved
/// subsets. Striding (rather than chunking) spreads each subset across the
/// whole plane, which keeps the simultaneous per-subset VCD updates nearly
/// decoupled.
pub fn partition(num_pixels: usize, num_subsets: usize) -> Vec<Vec<usize>> {
    let num_subsets = num_subsets.clamp(1, num_pixels.max(1));
    let mut subsets = vec![vec![]; num_subsets];
    for i in 0..num_pixels {
        subsets[i % num_subsets].push(i);
    }
    subsets
}
