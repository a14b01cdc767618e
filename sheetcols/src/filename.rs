//! Upload filename and size rules

const SUPPORTED_EXTENSIONS: [&str; 2] = [".xlsx", ".xls"];
const UNSAFE_CHARS: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Whether the name carries a `.xlsx` or `.xls` extension, in any case
pub fn is_supported_filename(filename: &str) -> bool {
    let (_, ext) = split_extension(filename);
    let ext = ext.to_lowercase();
    SUPPORTED_EXTENSIONS.contains(&ext.as_str())
}

/// Replace path separators and reserved characters with `_`.
///
/// Non-ASCII characters are kept; a name left empty becomes `unnamed_file`.
pub fn sanitize_filename(filename: &str) -> String {
    let clean: String = filename
        .chars()
        .map(|c| if UNSAFE_CHARS.contains(&c) { '_' } else { c })
        .collect();
    let clean = clean.trim();
    if clean.is_empty() {
        "unnamed_file".to_string()
    } else {
        clean.to_string()
    }
}

/// Name of the processed document: `{stem}{suffix}{ext}`, `.xlsx` by default
pub fn output_filename(original: &str, suffix: &str) -> String {
    if original.is_empty() {
        return format!("processed_file{}.xlsx", suffix);
    }

    let clean = sanitize_filename(original);
    let (stem, ext) = split_extension(&clean);
    let ext = if ext.is_empty() { ".xlsx" } else { ext };
    format!("{}{}{}", stem, suffix, ext)
}

pub fn file_size_mb(size_bytes: u64) -> f64 {
    size_bytes as f64 / BYTES_PER_MB
}

pub fn is_within_size_limit(size_bytes: u64, max_mb: f64) -> bool {
    file_size_mb(size_bytes) <= max_mb
}

/// Split off the last extension, dot included. Leading dots belong to the stem.
fn split_extension(name: &str) -> (&str, &str) {
    let base_start = name.rfind(['/', '\\']).map_or(0, |i| i + 1);
    let base = &name[base_start..];
    let leading_dots = base.len() - base.trim_start_matches('.').len();

    match base[leading_dots..].rfind('.') {
        Some(i) => name.split_at(base_start + leading_dots + i),
        None => (name, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_extensions() {
        assert!(is_supported_filename("report.xlsx"));
        assert!(is_supported_filename("REPORT.XLS"));
        assert!(is_supported_filename("archive.2024.Xlsx"));
        assert!(!is_supported_filename("report.csv"));
        assert!(!is_supported_filename("report.xlsx.bak"));
        assert!(!is_supported_filename(".xlsx"));
        assert!(!is_supported_filename("xlsx"));
        assert!(!is_supported_filename(""));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("a/b\\c:d*e?f\"g<h>i|j"), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(sanitize_filename("  销售 数据.xlsx "), "销售 数据.xlsx");
        assert_eq!(sanitize_filename("   "), "unnamed_file");
        assert_eq!(sanitize_filename(""), "unnamed_file");
    }

    #[test]
    fn test_output_filename() {
        assert_eq!(output_filename("报表.xlsx", "_processed"), "报表_processed.xlsx");
        assert_eq!(output_filename("a/b:c", "_processed"), "a_b_c_processed.xlsx");
        assert_eq!(output_filename("old.XLS", "_processed"), "old_processed.XLS");
        assert_eq!(output_filename("q1.data.xlsx", "_x"), "q1.data_x.xlsx");
        assert_eq!(output_filename("", "_processed"), "processed_file_processed.xlsx");
        assert_eq!(output_filename(".hidden", "_p"), ".hidden_p.xlsx");
    }

    #[test]
    fn test_size_limit() {
        assert_eq!(file_size_mb(1024 * 1024), 1.0);
        assert!(is_within_size_limit(50 * 1024 * 1024, 50.0));
        assert!(!is_within_size_limit(50 * 1024 * 1024 + 1, 50.0));
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("a.b.c"), ("a.b", ".c"));
        assert_eq!(split_extension("..xlsx"), ("..xlsx", ""));
        assert_eq!(split_extension("dir.d/file"), ("dir.d/file", ""));
    }
}
