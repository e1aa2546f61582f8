use memchr::memmem;

/// Finds the first `N 0 obj` header for object `number` in `slice` that
/// sits at the start of a line (preceded by LF, then CR as a fallback).
/// Returns the index of the first digit of `N`.
pub fn locate_object(slice: &[u8], number: i64) -> Option<usize> {
    let lf = format!("\n{} 0 obj", number);
    if let Some(i) = memmem::find(slice, lf.as_bytes()) {
        return Some(i + 1);
    }
    let cr = format!("\r{} 0 obj", number);
    memmem::find(slice, cr.as_bytes()).map(|i| i + 1)
}
