/// Formats bytes as uppercase hexadecimal pairs separated by spaces.
///
/// An empty slice renders as an empty string.
pub(crate) fn format_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|byte| hex::encode_upper([*byte]))
        .collect::<Vec<_>>()
        .join(" ")
}
