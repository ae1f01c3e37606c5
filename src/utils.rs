//! Small shared helpers.

/// Converts a raw name into a metric-safe (graphite-safe) string by
/// replacing `.` with `_` and `*` with `-`.
///
/// Used wherever collector names, peer strings or instance names end up in
/// a metric path.
pub fn graphite_safe(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '.' => '_',
            '*' => '-',
            c => c,
        })
        .collect()
}
