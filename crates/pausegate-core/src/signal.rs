use serde::{Deserialize, Serialize};

/// Kind of window that produced a foreground change, when the platform says
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    Application,
    InputMethod,
    System,
    AccessibilityOverlay,
    MagnificationOverlay,
    Unknown,
}

impl WindowKind {
    /// Window kinds that never represent the user leaving the current app
    #[must_use]
    pub const fn is_overlay(self) -> bool {
        matches!(
            self,
            Self::InputMethod | Self::System | Self::AccessibilityOverlay | Self::MagnificationOverlay
        )
    }
}

/// Raw foreground-change signal from the host platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForegroundSignal {
    pub package: Option<String>,
    #[serde(default)]
    pub window: Option<WindowKind>,
}

impl ForegroundSignal {
    #[must_use]
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: Some(package.into()),
            window: None,
        }
    }

    #[must_use]
    pub fn with_window(mut self, window: WindowKind) -> Self {
        self.window = Some(window);
        self
    }

    /// The package identifier if it is usable, `None` for empty or garbled input
    #[must_use]
    pub fn package_id(&self) -> Option<&str> {
        let id = self.package.as_deref()?.trim();
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | ':'));
        valid.then_some(id)
    }
}
