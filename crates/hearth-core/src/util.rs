//! Shared utility functions used across multiple modules.

/// Truncate text to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_text_trims_and_truncates() {
        assert_eq!(compact_text("  hi  "), "hi");
        let long = "x".repeat(500);
        assert_eq!(compact_text(&long).len(), 180);
    }
}
