use crate::error::GenerationError;
use std::fmt;
use std::str::FromStr;

/// Attribute a rewrite can be steered toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlAttribute {
    Empathy,
    Actionability,
    Specificity,
}

impl ControlAttribute {
    pub const ALL: [Self; 3] = [Self::Empathy, Self::Actionability, Self::Specificity];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Empathy => "empathy",
            Self::Actionability => "actionability",
            Self::Specificity => "specificity",
        }
    }

    /// Only the specificity rewrite reads the thought and situation.
    #[must_use]
    pub const fn needs_context(self) -> bool {
        matches!(self, Self::Specificity)
    }
}

impl FromStr for ControlAttribute {
    type Err = GenerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "empathy" => Ok(Self::Empathy),
            "actionability" => Ok(Self::Actionability),
            "specificity" => Ok(Self::Specificity),
            other => Err(GenerationError::UnknownAttribute(other.to_string())),
        }
    }
}

impl fmt::Display for ControlAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
