use std::fs;
use std::path::Path;

/// Number of `.dat` segment files currently present in `dir`.
pub fn segment_file_count(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().and_then(|e| e.to_str()) == Some("dat"))
        .count()
}

/// Generates `num_values` random byte strings of `item_size` bytes each,
/// invoking `f` with each one as it is produced.
pub fn generate_random_values<F>(num_values: usize, item_size: usize, mut f: F)
where
    F: FnMut(Vec<u8>),
{
    for _ in 0..num_values {
        let value: Vec<u8> = (0..item_size).map(|_| rand::random::<u8>()).collect();
        f(value);
    }
}
