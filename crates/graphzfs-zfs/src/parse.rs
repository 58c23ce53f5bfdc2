//! Parsers for `zfs` scripted (`-H`) output.

/// One name per line, as printed by `zfs list -H -o name`.
pub(crate) fn parse_names(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Value of the `clones` property. ZFS joins entries with commas; `-` or an
/// empty value means the snapshot has no clones.
pub(crate) fn parse_clones(stdout: &str) -> Vec<String> {
    stdout
        .split([',', '\n'])
        .map(str::trim)
        .filter(|entry| !entry.is_empty() && *entry != "-")
        .map(str::to_string)
        .collect()
}

/// Single property value with the trailing line terminator removed.
pub(crate) fn parse_value(stdout: &str) -> String {
    let value = stdout.strip_suffix('\n').unwrap_or(stdout);
    let value = value.strip_suffix('\r').unwrap_or(value);
    value.to_string()
}
