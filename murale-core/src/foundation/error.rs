pub type MuraleResult<T> = Result<T, MuraleError>;

#[derive(thiserror::Error, Debug)]
pub enum MuraleError {
    /// Malformed bytes: bad magic, truncated table, failed decompression.
    #[error("corrupt input: {0}")]
    Corrupt(String),

    /// A referenced asset could not be located by any resolver fallback.
    #[error("missing asset: {0}")]
    MissingAsset(String),

    /// Scene description violates the schema beyond what leniency covers.
    #[error("schema violation: {0}")]
    Schema(String),

    /// Shader compilation or render-target creation failed on the backend.
    #[error("gpu failure: {0}")]
    Gpu(String),

    /// Index out of range (frame, control point, array bounds).
    #[error("range error: {0}")]
    Range(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MuraleError {
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }

    pub fn missing_asset(msg: impl Into<String>) -> Self {
        Self::MissingAsset(msg.into())
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    pub fn gpu(msg: impl Into<String>) -> Self {
        Self::Gpu(msg.into())
    }

    pub fn range(msg: impl Into<String>) -> Self {
        Self::Range(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(MuraleError::corrupt("x").to_string().contains("corrupt input:"));
        assert!(
            MuraleError::missing_asset("x")
                .to_string()
                .contains("missing asset:")
        );
        assert!(MuraleError::schema("x").to_string().contains("schema violation:"));
        assert!(MuraleError::gpu("x").to_string().contains("gpu failure:"));
        assert!(MuraleError::range("x").to_string().contains("range error:"));
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = MuraleError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
