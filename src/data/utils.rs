use std::cmp::Ordering;

/// Run-parameter path of the SDK version, the default grouping dimension.
pub const SDK_VERSION_FIELD: &str = "impl.version";
pub const SDK_LANGUAGE_FIELD: &str = "impl.language";
pub const CLUSTER_VERSION_FIELD: &str = "cluster.version";

/// Grouping dimensions offered to the horizontal axis.
pub const GROUP_BY_FIELDS: &[&str] = &[
    SDK_VERSION_FIELD,
    SDK_LANGUAGE_FIELD,
    CLUSTER_VERSION_FIELD,
    "cluster.type",
    "vars.api",
    "vars.horizontalScaling",
    "vars.experimentName",
];

/// Turn a dotted field path (`impl.version`) into a SQLite JSON path
/// (`$.impl.version`). `None` when any segment is not a plain identifier.
pub fn json_path(field: &str) -> Option<String> {
    let field = field.trim();
    if field.is_empty() {
        return None;
    }
    let valid = field.split('.').all(|segment| {
        let mut chars = segment.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    });
    valid.then(|| format!("$.{field}"))
}

/// Order version-like strings by their numeric segments, so `3.10.0` sorts
/// after `3.9.1`. Non-numeric segments compare lexically.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let split = |s: &str| {
        s.split(|c: char| c == '.' || c == '-' || c == '+')
            .map(|part| part.to_string())
            .collect::<Vec<_>>()
    };
    let (left, right) = (split(a), split(b));
    for (l, r) in left.iter().zip(right.iter()) {
        let ord = match (l.parse::<u64>(), r.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            (Ok(_), Err(_)) => Ordering::Less,
            (Err(_), Ok(_)) => Ordering::Greater,
            (Err(_), Err(_)) => l.cmp(r),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    left.len().cmp(&right.len())
}
