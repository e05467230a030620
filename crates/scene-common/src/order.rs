//! Imagery order lifecycle types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classified order lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OrderState {
    Pending,
    Success,
    Partial,
    Failed,
    /// Any state string the provider reports that we do not recognize.
    Unknown(String),
}

impl OrderState {
    /// Classify a provider state string.
    ///
    /// `queued` and `running` are the provider's in-flight states and count
    /// as pending.
    pub fn classify(state: &str) -> Self {
        match state.trim().to_ascii_lowercase().as_str() {
            "success" => Self::Success,
            "partial" => Self::Partial,
            "failed" => Self::Failed,
            "pending" | "queued" | "running" => Self::Pending,
            _ => Self::Unknown(state.trim().to_string()),
        }
    }

    /// Partial delivery is accepted the same as full success.
    pub fn should_proceed(&self) -> bool {
        matches!(self, Self::Success | Self::Partial)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
            Self::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for OrderState {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OrderState {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::classify(&raw))
    }
}

/// One delivered file of a completed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultArtifact {
    /// Remote download location
    pub location: String,
    /// Logical name, also the relative local path
    pub name: String,
}

impl ResultArtifact {
    pub fn new(location: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            name: name.into(),
        }
    }

    /// Final path component of the logical name.
    pub fn file_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(OrderState::classify("success"), OrderState::Success);
        assert_eq!(OrderState::classify("partial"), OrderState::Partial);
        assert_eq!(OrderState::classify("failed"), OrderState::Failed);
        assert_eq!(OrderState::classify("queued"), OrderState::Pending);
        assert_eq!(OrderState::classify("running"), OrderState::Pending);
        assert_eq!(
            OrderState::classify("cancelled"),
            OrderState::Unknown("cancelled".to_string())
        );
    }

    #[test]
    fn test_proceed_states() {
        assert!(OrderState::Success.should_proceed());
        assert!(OrderState::Partial.should_proceed());
        assert!(!OrderState::Failed.should_proceed());
        assert!(!OrderState::Pending.should_proceed());
        assert!(!OrderState::Unknown("x".into()).should_proceed());
    }

    #[test]
    fn test_state_serde() {
        let json = serde_json::to_string(&OrderState::Partial).unwrap();
        assert_eq!(json, "\"partial\"");
        let state: OrderState = serde_json::from_str("\"weird\"").unwrap();
        assert_eq!(state, OrderState::Unknown("weird".into()));
    }

    #[test]
    fn test_file_name() {
        let artifact = ResultArtifact::new(
            "https://example.com/dl/1",
            "abc/PSScene/20230601_X_3B_AnalyticMS_SR_clip.tif",
        );
        assert_eq!(artifact.file_name(), "20230601_X_3B_AnalyticMS_SR_clip.tif");
        assert_eq!(ResultArtifact::new("u", "plain.tif").file_name(), "plain.tif");
    }
}
