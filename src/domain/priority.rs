//! Priority levels for task scheduling

use serde::{Deserialize, Serialize};

/// Priority level for tasks; a lower rank is dispatched earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
    Background,
}

impl Priority {
    /// Numeric rank: CRITICAL(1) through BACKGROUND(5)
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Critical => 1,
            Priority::High => 2,
            Priority::Medium => 3,
            Priority::Low => 4,
            Priority::Background => 5,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
            Self::Background => write!(f, "background"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" | "1" => Ok(Self::Critical),
            "high" | "2" => Ok(Self::High),
            "medium" | "normal" | "3" => Ok(Self::Medium),
            "low" | "4" => Ok(Self::Low),
            "background" | "5" => Ok(Self::Background),
            _ => Err(format!("Unknown priority: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        // Derived Ord follows declaration order: Critical sorts first
        assert!(Priority::Critical < Priority::High);
        assert!(Priority::High < Priority::Medium);
        assert!(Priority::Medium < Priority::Low);
        assert!(Priority::Low < Priority::Background);
    }

    #[test]
    fn test_priority_rank() {
        assert_eq!(Priority::Critical.rank(), 1);
        assert_eq!(Priority::Background.rank(), 5);
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!("critical".parse::<Priority>().unwrap(), Priority::Critical);
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!("normal".parse::<Priority>().unwrap(), Priority::Medium);
        assert_eq!("2".parse::<Priority>().unwrap(), Priority::High);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn test_priority_serde() {
        let json = serde_json::to_string(&Priority::Background).unwrap();
        assert_eq!(json, "\"background\"");

        let p: Priority = serde_json::from_str("\"critical\"").unwrap();
        assert_eq!(p, Priority::Critical);
    }
}
