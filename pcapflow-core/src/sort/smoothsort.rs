//! In-place smoothsort.
//!
//! The slice is kept as a sequence of Leonardo heaps, largest first, whose
//! roots ascend left to right. Sizes follow the Leonardo numbers
//! `L(0) = L(1) = 1`, `L(k) = L(k-1) + L(k-2) + 1`, and a heap of order `k >= 2`
//! stores its root last, preceded by a left subheap of order `k-1` and a
//! right subheap of order `k-2`. The set of heap orders present fits in one
//! `u128`, so auxiliary memory is constant. Sorted input costs O(n).

/// Leonardo numbers up to the largest that fits in `usize` on 64-bit targets.
const LEONARDO: [usize; 92] = leonardo_numbers();

const fn leonardo_numbers() -> [usize; 92] {
    let mut table = [1usize; 92];
    let mut k = 2;
    while k < 92 {
        table[k] = table[k - 1] + table[k - 2] + 1;
        k += 1;
    }
    table
}

/// Sort `v` in place so that no element is `less` than its predecessor.
pub fn smoothsort<T, F>(v: &mut [T], mut less: F)
where
    F: FnMut(&T, &T) -> bool,
{
    let n = v.len();
    if n < 2 {
        return;
    }

    // Bit k set: a heap of order k is present.
    let mut orders: u128 = 0;

    for i in 0..n {
        orders = if orders == 0 {
            1 << 1
        } else {
            let k = orders.trailing_zeros();
            if orders & (1 << (k + 1)) != 0 {
                // Two adjacent orders merge under the new element.
                (orders & !(3 << k)) | (1 << (k + 2))
            } else if k == 1 {
                orders | 1
            } else {
                orders | (1 << 1)
            }
        };
        rectify(v, i, orders, &mut less);
    }

    for i in (1..n).rev() {
        let k = orders.trailing_zeros();
        orders &= !(1 << k);
        if k >= 2 {
            // Expose the two subheaps and restore the root order over them.
            orders |= (1 << (k - 1)) | (1 << (k - 2));
            let right = i - 1;
            let left = right - LEONARDO[k as usize - 2];
            rectify(v, left, orders & !(1 << (k - 2)), &mut less);
            rectify(v, right, orders, &mut less);
        }
    }
}

/// Move the root at `root` left along the root chain until the chain
/// ascends again, then sift it into its heap.
///
/// The lowest set bit of `orders` is the order of the heap rooted at
/// `root`; higher bits are the heaps to its left.
fn rectify<T, F>(v: &mut [T], mut root: usize, mut orders: u128, less: &mut F)
where
    F: FnMut(&T, &T) -> bool,
{
    let mut k = orders.trailing_zeros() as usize;
    loop {
        let rest = orders & !(1 << k);
        if rest == 0 {
            break;
        }
        let prev = root - LEONARDO[k];
        if !less(&v[root], &v[prev]) {
            break;
        }
        if k >= 2 {
            let right = root - 1;
            let left = right - LEONARDO[k - 2];
            if !less(&v[left], &v[prev]) || !less(&v[right], &v[prev]) {
                break;
            }
        }
        v.swap(root, prev);
        root = prev;
        orders = rest;
        k = orders.trailing_zeros() as usize;
    }
    sift(v, root, k, less);
}

fn sift<T, F>(v: &mut [T], mut root: usize, mut k: usize, less: &mut F)
where
    F: FnMut(&T, &T) -> bool,
{
    while k >= 2 {
        let right = root - 1;
        let left = right - LEONARDO[k - 2];
        let (child, child_order) = if less(&v[left], &v[right]) {
            (right, k - 2)
        } else {
            (left, k - 1)
        };
        if !less(&v[root], &v[child]) {
            break;
        }
        v.swap(root, child);
        root = child;
        k = child_order;
    }
}
