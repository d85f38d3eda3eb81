pub mod json;
pub mod time;

/// Trims an optional query parameter and treats blank input as absent.
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::non_empty;

    #[test]
    fn blank_parameters_count_as_missing() {
        assert_eq!(non_empty(None), None);
        assert_eq!(non_empty(Some("")), None);
        assert_eq!(non_empty(Some("   ")), None);
        assert_eq!(non_empty(Some("  Initech ")), Some("Initech"));
    }
}
