use lapin::BasicProperties;

/// Convenience methods for [`lapin::BasicProperties`].
pub trait BasicPropertiesExt {
    /// The `correlation_id` property.
    ///
    /// Returns `None` if unset or empty.
    fn correlation_id_str(&self) -> Option<&str>;
}

impl BasicPropertiesExt for BasicProperties {
    fn correlation_id_str(&self) -> Option<&str> {
        self.correlation_id()
            .as_ref()
            .map(|id| id.as_str())
            .filter(|id| !id.is_empty())
    }
}
