//! Box arithmetic over C-ordered element buffers.

/// Element strides of a C-ordered (last axis fastest) array.
pub(crate) fn c_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for axis in (0..shape.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1];
    }
    strides
}

/// Copy an `extent`-sized box between two C-ordered buffers.
///
/// `src_origin` and `dst_origin` are the box corners inside each buffer.
/// The caller guarantees the box fits in both; rows along the last axis are
/// copied as contiguous runs.
#[allow(clippy::too_many_arguments)]
pub(crate) fn copy_box(
    src: &[u8],
    src_shape: &[usize],
    src_origin: &[usize],
    dst: &mut [u8],
    dst_shape: &[usize],
    dst_origin: &[usize],
    extent: &[usize],
    element_size: usize,
) {
    let ndim = extent.len();
    if ndim == 0 || extent.iter().any(|&e| e == 0) {
        return;
    }

    let src_strides = c_strides(src_shape);
    let dst_strides = c_strides(dst_shape);
    let last = ndim - 1;
    let run = extent[last] * element_size;
    let mut index = vec![0usize; last];

    loop {
        let mut s = src_origin[last];
        let mut d = dst_origin[last];
        for axis in 0..last {
            s += (src_origin[axis] + index[axis]) * src_strides[axis];
            d += (dst_origin[axis] + index[axis]) * dst_strides[axis];
        }
        let (s, d) = (s * element_size, d * element_size);
        dst[d..d + run].copy_from_slice(&src[s..s + run]);

        // Advance the outer index, slowest axis last
        let mut axis = last;
        loop {
            if axis == 0 {
                return;
            }
            axis -= 1;
            index[axis] += 1;
            if index[axis] < extent[axis] {
                break;
            }
            index[axis] = 0;
        }
    }
}

/// All grid positions between `first` and `last` (both inclusive), in
/// C order.
pub(crate) fn grid_positions(first: &[u64], last: &[u64]) -> Vec<Vec<u64>> {
    if first.is_empty() || first.iter().zip(last).any(|(f, l)| f > l) {
        return Vec::new();
    }

    let mut positions = Vec::new();
    let mut current = first.to_vec();
    loop {
        positions.push(current.clone());

        let mut axis = current.len();
        loop {
            if axis == 0 {
                return positions;
            }
            axis -= 1;
            if current[axis] < last[axis] {
                current[axis] += 1;
                break;
            }
            current[axis] = first[axis];
        }
    }
}
