//! `SETTINGS` frame values (RFC 7540 §6.5.2).

/// A set of HTTP/2 settings. Unset values are left to the peer's defaults.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Settings {
    pub header_table_size: Option<u32>,
    pub enable_push: Option<bool>,
    pub max_concurrent_streams: Option<u32>,
    pub initial_window_size: Option<u32>,
    pub max_frame_size: Option<u32>,
    pub max_header_list_size: Option<u32>,
}

impl Settings {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    #[must_use]
    pub fn header_table_size(mut self, value: u32) -> Self {
        self.header_table_size = Some(value);
        self
    }

    #[must_use]
    pub fn enable_push(mut self, value: bool) -> Self {
        self.enable_push = Some(value);
        self
    }

    #[must_use]
    pub fn max_concurrent_streams(mut self, value: u32) -> Self {
        self.max_concurrent_streams = Some(value);
        self
    }

    #[must_use]
    pub fn initial_window_size(mut self, value: u32) -> Self {
        self.initial_window_size = Some(value);
        self
    }

    #[must_use]
    pub fn max_frame_size(mut self, value: u32) -> Self {
        self.max_frame_size = Some(value);
        self
    }

    #[must_use]
    pub fn max_header_list_size(mut self, value: u32) -> Self {
        self.max_header_list_size = Some(value);
        self
    }

    /// Returns `true` when no setting is present.
    #[must_use]
    pub fn is_empty(&self) -> bool { *self == Self::default() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_only_requested_values() {
        let settings = Settings::new().max_concurrent_streams(100);
        assert_eq!(settings.max_concurrent_streams, Some(100));
        assert_eq!(settings.initial_window_size, None);
        assert!(!settings.is_empty());
        assert!(Settings::new().is_empty());
    }
}
