//! Element-wise compute kernels, run chunk-parallel across the CPU cores.

use crate::array::Values;

/// Applies the named operation to a segment buffer. Returns `None` for an
/// unknown operation or when the buffer's element type does not match the
/// kernel's; the caller logs and sends nothing.
pub fn apply_operation(operation: &str, values: &Values) -> Option<Values> {
    match (operation, values) {
        ("example1", Values::Double(v)) => Some(Values::Double(parallel_map(v, example1))),
        ("example2", Values::Int(v)) => Some(Values::Int(parallel_map(v, example2))),
        _ => None,
    }
}

/// `((sin x + cos x)^2) / (sqrt(|x|) + 1)`.
fn example1(x: f64) -> f64 {
    (x.sin() + x.cos()).powi(2) / (x.abs().sqrt() + 1.0)
}

/// `(x · ln x) mod 7` for multiples of three and values in `500..=1000`,
/// identity otherwise.
fn example2(x: i32) -> i32 {
    if x % 3 == 0 || (500..=1000).contains(&x) {
        ((f64::from(x) * f64::from(x).ln()) % 7.0) as i32
    } else {
        x
    }
}

/// Maps a kernel over the buffer with one chunk per core.
fn parallel_map<T, F>(values: &[T], kernel: F) -> Vec<T>
where
    T: Copy + Send + Sync,
    F: Fn(T) -> T + Sync,
{
    let threads = num_cpus::get().min(values.len()).max(1);
    if threads <= 1 {
        return values.iter().map(|&x| kernel(x)).collect();
    }

    let chunk_len = values.len().div_ceil(threads);
    std::thread::scope(|scope| {
        let handles: Vec<_> = values
            .chunks(chunk_len)
            .map(|chunk| {
                let kernel = &kernel;
                scope.spawn(move || chunk.iter().map(|&x| kernel(x)).collect::<Vec<T>>())
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().expect("kernel chunk panicked"))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn example1_matches_the_formula() {
        let x = 2.0f64;
        let expected = (x.sin() + x.cos()).powi(2) / (x.sqrt() + 1.0);
        let out = apply_operation("example1", &Values::Double(vec![x])).unwrap();
        assert_eq!(out, Values::Double(vec![expected]));
    }

    #[test]
    fn example2_transforms_selected_values_only() {
        let out = apply_operation("example2", &Values::Int(vec![4, 6, 700])).unwrap();
        let Values::Int(out) = out else {
            panic!("expected int output");
        };
        // 4 is neither a multiple of 3 nor in [500, 1000]: identity.
        assert_eq!(out[0], 4);
        // 6 and 700 pass through the kernel and land in [0, 7).
        assert_eq!(out[1], ((6.0 * 6.0f64.ln()) % 7.0) as i32);
        assert_eq!(out[2], ((700.0 * 700.0f64.ln()) % 7.0) as i32);
        assert!(out[1] < 7 && out[2] < 7);
    }

    #[test]
    fn unknown_operation_yields_none() {
        assert!(apply_operation("example3", &Values::Int(vec![1])).is_none());
    }

    #[test]
    fn mismatched_element_type_yields_none() {
        assert!(apply_operation("example1", &Values::Int(vec![1])).is_none());
        assert!(apply_operation("example2", &Values::Double(vec![1.0])).is_none());
    }

    #[test]
    fn parallel_map_matches_sequential_on_large_input() {
        let values: Vec<f64> = (0..10_000).map(f64::from).collect();
        let parallel = parallel_map(&values, example1);
        let sequential: Vec<f64> = values.iter().map(|&x| example1(x)).collect();
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn empty_buffer_maps_to_empty() {
        let out = apply_operation("example1", &Values::Double(Vec::new())).unwrap();
        assert_eq!(out, Values::Double(Vec::new()));
    }
}
